//! Runtime values, rows and handles.
//!
//! [`Value`] is a tagged variant rather than a trait object hierarchy:
//! marshalling, comparison and printing all pattern-match on the tag,
//! the way the teacher's own `value.rs` matches on its (much larger)
//! `Value` enum instead of dispatching through a trait.

use std::cmp::Ordering;
use std::fmt;

use rustc_hash::FxHashMap;

use crate::config::BLOCK_SZ;
use crate::error::{Error, Result};

/// Block id in a block file. Block 0 is reserved; blocks are dense
/// from 1 to `last`.
pub type BlockId = u32;

/// Record id within a single slotted page. Ids are dense-issued per
/// page and never reused.
pub type RecordId = u16;

/// Opaque identifier of a stored row: (block id, record id). Stable
/// across reads, invalidated only by deleting that same record id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle {
    pub block_id: BlockId,
    pub record_id: RecordId,
}

impl Handle {
    pub fn new(block_id: BlockId, record_id: RecordId) -> Self {
        Self {
            block_id,
            record_id,
        }
    }
}

/// Column data type. `Bool` is not a user-facing CREATE TABLE type (the
/// SQL dialect only accepts INT and TEXT) but the catalog's own
/// `_indices.is_unique` column needs it, so marshalling always knows
/// how to encode it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataType {
    Int,
    Text,
    Bool,
}

impl DataType {
    /// Parse the data type name accepted by CREATE TABLE / CREATE INDEX
    /// column definitions ("INT" or "TEXT"). Other names are rejected
    /// per spec (DOUBLE, DATE, ... are out of scope).
    pub fn from_sql_name(name: &str) -> Result<Self> {
        match name.to_ascii_uppercase().as_str() {
            "INT" => Ok(DataType::Int),
            "TEXT" => Ok(DataType::Text),
            other => Err(Error::SchemaError(format!(
                "unsupported data type '{other}'"
            ))),
        }
    }

    /// Name as stored in `_columns.data_type`.
    pub fn sql_name(self) -> &'static str {
        match self {
            DataType::Int => "INT",
            DataType::Text => "TEXT",
            DataType::Bool => "BOOL",
        }
    }
}

/// A runtime value: tagged variant, not inheritance. Equality and
/// ordering are only defined within a single tag; comparing across
/// tags is a programmer error the executor is responsible for never
/// inducing (it guarantees tag agreement via each index's key profile).
#[derive(Clone, Debug)]
pub enum Value {
    Int(i32),
    Text(String),
    Bool(bool),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Int(_) => DataType::Int,
            Value::Text(_) => DataType::Text,
            Value::Bool(_) => DataType::Bool,
        }
    }

    /// Marshalled size in bytes: INT = 4, TEXT = 2 + len, BOOL = 1.
    pub fn encoded_len(&self) -> usize {
        match self {
            Value::Int(_) => 4,
            Value::Text(s) => 2 + s.len(),
            Value::Bool(_) => 1,
        }
    }

    /// Append this value's marshalled bytes to `out`.
    pub fn marshal_into(&self, out: &mut Vec<u8>) -> Result<()> {
        match self {
            Value::Int(n) => out.extend_from_slice(&n.to_le_bytes()),
            Value::Text(s) => {
                if s.len() > u16::MAX as usize {
                    return Err(Error::SchemaError("text value too long".into()));
                }
                out.extend_from_slice(&(s.len() as u16).to_le_bytes());
                out.extend_from_slice(s.as_bytes());
            }
            Value::Bool(b) => out.push(if *b { 1 } else { 0 }),
        }
        Ok(())
    }

    /// Read one value of `data_type` out of `bytes` starting at
    /// `offset`, returning the value and the offset just past it.
    pub fn unmarshal(data_type: DataType, bytes: &[u8], offset: usize) -> Result<(Value, usize)> {
        match data_type {
            DataType::Int => {
                let end = offset + 4;
                let arr: [u8; 4] = bytes
                    .get(offset..end)
                    .ok_or_else(|| Error::Catalog("truncated row".into()))?
                    .try_into()
                    .unwrap();
                Ok((Value::Int(i32::from_le_bytes(arr)), end))
            }
            DataType::Text => {
                let len_end = offset + 2;
                let len_bytes: [u8; 2] = bytes
                    .get(offset..len_end)
                    .ok_or_else(|| Error::Catalog("truncated row".into()))?
                    .try_into()
                    .unwrap();
                let len = u16::from_le_bytes(len_bytes) as usize;
                let end = len_end + len;
                let raw = bytes
                    .get(len_end..end)
                    .ok_or_else(|| Error::Catalog("truncated row".into()))?;
                let s = String::from_utf8(raw.to_vec())
                    .map_err(|_| Error::Catalog("non-utf8 text column".into()))?;
                Ok((Value::Text(s), end))
            }
            DataType::Bool => {
                let b = *bytes
                    .get(offset)
                    .ok_or_else(|| Error::Catalog("truncated row".into()))?;
                Ok((Value::Bool(b != 0), offset + 1))
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{n}"),
            Value::Text(s) => write!(f, "\"{s}\""),
            Value::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        matches!(self.partial_cmp(other), Some(Ordering::Equal))
    }
}
impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    /// Ordering within a single tag. Comparing across tags is
    /// undefined per spec.md §3 ("comparisons between mismatched tags
    /// are undefined"); here that is enforced with a panic, since it
    /// can only happen if a caller builds a key profile incorrectly.
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            _ => panic!("Value::cmp on mismatched tags"),
        }
    }
}

/// A row: column name to value, unique names within the row. Storage
/// order is schema order, not insertion order. Keyed with `rustc-hash`'s
/// `FxHashMap` rather than `std`'s default SipHash-keyed `HashMap` —
/// the teacher's `Cargo.toml` already carries `rustc-hash` as a
/// dependency (for exactly this non-adversarial small-map case) even
/// though its own `util::newmap` never ends up wired to it.
pub type Row = FxHashMap<String, Value>;

/// A tuple of values in key-column order, used as a B-tree key.
/// Ordering is lexicographic over the component values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyValue(pub Vec<Value>);

impl PartialOrd for KeyValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyValue {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            match a.cmp(b) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        self.0.len().cmp(&other.0.len())
    }
}

/// A row must fit in one block; this bounds the maximum size a single
/// marshalled row may have (generous headroom for the slotted-page
/// header entry itself).
pub fn max_row_len() -> usize {
    BLOCK_SZ - 16
}
