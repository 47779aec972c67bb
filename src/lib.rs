//! An educational relational storage engine: slotted-page heap
//! storage on a record-numbered block file, a B+tree secondary index,
//! and a self-describing catalog and executor for a small SQL dialect
//! (CREATE/DROP TABLE, CREATE/DROP INDEX, SHOW TABLES/COLUMNS/INDEX,
//! INSERT, DELETE, single-table equality SELECT).
//!
//! Layered bottom-up:
//!
//! `block` (fixed-size block file + intra-block slotted-page layout)
//! → `heap` (typed row marshalling over a heap file)
//! → `catalog` (`_tables`/`_columns`/`_indices` as heap relations)
//! → `btree` (typed-key B+tree secondary index)
//! → `plan` (TableScan/Select/Project/IndexLookup evaluation tree)
//! → `exec` (statement dispatch, driven by `ast`).
//!
//! SQL lexing and parsing proper, transactions, concurrency control
//! and crash recovery are out of scope — see spec.md §1. `ast` carries
//! only the line-oriented recognizer the `giraffe` REPL needs to drive
//! the executor.

pub mod ast;
pub mod block;
pub mod btree;
pub mod catalog;
pub mod config;
pub mod error;
pub mod exec;
pub mod heap;
pub mod plan;
pub mod selftest;
pub mod value;

pub use config::StoreConfig;
pub use error::{Error, Result};
pub use exec::{ExecResult, Executor};
