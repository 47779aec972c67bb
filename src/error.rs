//! Crate-wide error type.
//!
//! A single enum covers every failure mode named in the specification:
//! a slotted page that can't satisfy a request, a schema violation, an
//! operation the engine deliberately declines to support, and I/O
//! failures from the underlying block files.

use std::fmt;

/// Errors produced anywhere in the storage engine or executor.
#[derive(Debug)]
pub enum Error {
    /// A slotted page has no room for the requested add/put.
    NoRoom,

    /// Unknown column, duplicate name, dropping a catalog table,
    /// an unsupported data type, or a row missing a required column.
    SchemaError(String),

    /// A WHERE shape, B-tree operation, or literal the engine
    /// deliberately does not implement (range scans, B-tree delete,
    /// non-equality predicates, multi-table FROM, ...).
    NotSupported(String),

    /// The underlying block file could not be read or written.
    Io(std::io::Error),

    /// A catalog write failed to reverse cleanly, or the catalog was
    /// found in a state that should be unreachable (e.g. a table
    /// listed in `_tables` with no matching `_columns` rows).
    Catalog(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NoRoom => write!(f, "no room"),
            Error::SchemaError(msg) => write!(f, "schema error: {msg}"),
            Error::NotSupported(msg) => write!(f, "not supported: {msg}"),
            Error::Io(e) => write!(f, "I/O error: {e}"),
            Error::Catalog(msg) => write!(f, "catalog error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Io(value)
    }
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
