//! Heap file (C3) and heap relation (C4).
//!
//! `HeapFile` stitches the block file and the slotted page together:
//! it allocates new blocks, fetches existing ones wrapped as pages,
//! and writes pages back. `HeapRelation` adds the row-level API on
//! top: marshal/unmarshal typed rows against a schema, and the
//! insert/select/project/del/update operations the executor drives.

use std::path::{Path, PathBuf};

use crate::block::{BlockFile, CreateMode, SlottedPage};
use crate::error::{Error, Result};
use crate::value::{max_row_len, BlockId, DataType, Handle, Row, Value};

/// Ordered (column name, data type) pairs; column names are unique
/// within a relation and schema order drives marshalling.
pub type Schema = Vec<(String, DataType)>;

/// Row-number-keyed block store underneath one relation.
pub struct HeapFile {
    blocks: BlockFile,
    path: PathBuf,
}

impl HeapFile {
    /// Create a new heap file, allocating block 1 as an empty page.
    pub fn create(path: &Path, mode: CreateMode) -> Result<Self> {
        let mut blocks = BlockFile::create(path, mode)?;
        let id = blocks.allocate()?;
        let page = SlottedPage::new_empty();
        blocks.put(id, page.as_bytes())?;
        Ok(Self {
            blocks,
            path: path.to_path_buf(),
        })
    }

    /// Open an existing heap file.
    pub fn open(path: &Path) -> Result<Self> {
        let blocks = BlockFile::open(path)?;
        Ok(Self {
            blocks,
            path: path.to_path_buf(),
        })
    }

    /// Close the file and remove it from disk.
    pub fn drop_file(mut self) -> Result<()> {
        self.blocks.close();
        BlockFile::drop_file(&self.path)
    }

    /// Allocate a new, empty page and return its block id alongside it.
    pub fn get_new(&mut self) -> Result<(BlockId, SlottedPage)> {
        let id = self.blocks.allocate()?;
        let page = SlottedPage::new_empty();
        self.blocks.put(id, page.as_bytes())?;
        Ok((id, page))
    }

    /// Fetch block `id` as a slotted page.
    pub fn get(&self, id: BlockId) -> Result<SlottedPage> {
        let bytes = self.blocks.get(id)?;
        Ok(SlottedPage::from_bytes(bytes))
    }

    /// Write `page` back at `id`.
    pub fn put(&mut self, id: BlockId, page: &SlottedPage) -> Result<()> {
        self.blocks.put(id, page.as_bytes())
    }

    /// Ids of every allocated block, in ascending order (1..=last).
    pub fn block_ids(&self) -> Vec<BlockId> {
        (1..=self.blocks.count()).collect()
    }

    /// Largest allocated block id.
    pub fn last_block_id(&self) -> BlockId {
        self.blocks.count()
    }

    pub fn close(&mut self) {
        self.blocks.close();
    }
}

/// Row-level API over a heap file.
pub struct HeapRelation {
    file: HeapFile,
    schema: Schema,
}

impl HeapRelation {
    /// Create the relation's backing file fresh. Fails if it already
    /// exists.
    pub fn create(path: &Path, schema: Schema) -> Result<Self> {
        let file = HeapFile::create(path, CreateMode::Exclusive)?;
        Ok(Self { file, schema })
    }

    /// Create the relation if its file does not already exist,
    /// otherwise open it. Used by `CREATE TABLE ... IF NOT EXISTS`.
    pub fn create_if_not_exists(path: &Path, schema: Schema) -> Result<Self> {
        if path.exists() {
            Self::open(path, schema)
        } else {
            Self::create(path, schema)
        }
    }

    /// Open an existing relation.
    pub fn open(path: &Path, schema: Schema) -> Result<Self> {
        let file = HeapFile::open(path)?;
        Ok(Self { file, schema })
    }

    /// Delete the relation's backing file.
    pub fn drop_relation(self) -> Result<()> {
        self.file.drop_file()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn column_names(&self) -> Vec<String> {
        self.schema.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Every column must be present in `row`; extra keys are ignored.
    /// Returns a row restricted (and ordered, conceptually) to the
    /// schema's columns.
    fn validate(&self, row: &Row) -> Result<Row> {
        let mut out = Row::default();
        for (name, _) in &self.schema {
            match row.get(name) {
                Some(v) => {
                    out.insert(name.clone(), v.clone());
                }
                None => {
                    return Err(Error::SchemaError(format!(
                        "column '{name}' is required but missing from row"
                    )))
                }
            }
        }
        Ok(out)
    }

    fn marshal(&self, row: &Row) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        for (name, _) in &self.schema {
            let value = row
                .get(name)
                .ok_or_else(|| Error::SchemaError(format!("column '{name}' missing")))?;
            value.marshal_into(&mut bytes)?;
        }
        if bytes.len() > max_row_len() {
            return Err(Error::SchemaError("row does not fit in one block".into()));
        }
        Ok(bytes)
    }

    fn unmarshal(&self, bytes: &[u8]) -> Result<Row> {
        let mut row = Row::default();
        let mut offset = 0;
        for (name, data_type) in &self.schema {
            let (value, next) = Value::unmarshal(*data_type, bytes, offset)?;
            row.insert(name.clone(), value);
            offset = next;
        }
        Ok(row)
    }

    /// Validate, marshal, and append a new row. Returns its handle.
    pub fn insert(&mut self, row: &Row) -> Result<Handle> {
        let full_row = self.validate(row)?;
        let bytes = self.marshal(&full_row)?;
        self.append(&bytes)
    }

    /// Append already-marshalled bytes, allocating a new block on
    /// `NoRoom`.
    fn append(&mut self, bytes: &[u8]) -> Result<Handle> {
        let last = self.file.last_block_id();
        let mut page = self.file.get(last)?;
        match page.add(bytes) {
            Ok(record_id) => {
                self.file.put(last, &page)?;
                Ok(Handle::new(last, record_id))
            }
            Err(Error::NoRoom) => {
                let (block_id, mut page) = self.file.get_new()?;
                let record_id = page.add(bytes)?;
                self.file.put(block_id, &page)?;
                Ok(Handle::new(block_id, record_id))
            }
            Err(e) => Err(e),
        }
    }

    /// All live handles. Per spec.md §4.3, the relation itself does
    /// not filter by a predicate — that is the evaluation plan's
    /// `Select` node's job (see `plan.rs`); this simply yields every
    /// live handle.
    pub fn select(&self) -> Result<Vec<Handle>> {
        let mut handles = Vec::new();
        for block_id in self.file.block_ids() {
            let page = self.file.get(block_id)?;
            for record_id in page.ids() {
                handles.push(Handle::new(block_id, record_id));
            }
        }
        Ok(handles)
    }

    /// Whether `handle` still refers to a live (non-tombstoned) record.
    /// Used to filter stale handles an index may still hold after a
    /// delete the index itself could not be updated for.
    pub fn is_live(&self, handle: Handle) -> Result<bool> {
        let page = self.file.get(handle.block_id)?;
        Ok(page.get(handle.record_id).is_some())
    }

    /// Fetch and unmarshal the row at `handle`, restricted to
    /// `columns` if given (`None` means every schema column).
    pub fn project(&self, handle: Handle, columns: Option<&[String]>) -> Result<Row> {
        let page = self.file.get(handle.block_id)?;
        let bytes = page
            .get(handle.record_id)
            .ok_or_else(|| Error::Catalog("handle refers to a deleted record".into()))?;
        let row = self.unmarshal(bytes)?;
        match columns {
            None => Ok(row),
            Some(cols) => {
                let mut out = Row::default();
                for col in cols {
                    if let Some(v) = row.get(col) {
                        out.insert(col.clone(), v.clone());
                    }
                }
                Ok(out)
            }
        }
    }

    /// Delete the row at `handle`.
    pub fn del(&mut self, handle: Handle) -> Result<()> {
        let mut page = self.file.get(handle.block_id)?;
        page.del(handle.record_id);
        self.file.put(handle.block_id, &page)
    }

    /// Replace the row at `handle` with `values` merged over the
    /// current row.
    pub fn update(&mut self, handle: Handle, values: &Row) -> Result<()> {
        let mut page = self.file.get(handle.block_id)?;
        let mut current = {
            let bytes = page
                .get(handle.record_id)
                .ok_or_else(|| Error::Catalog("handle refers to a deleted record".into()))?;
            self.unmarshal(bytes)?
        };
        for (k, v) in values {
            current.insert(k.clone(), v.clone());
        }
        let bytes = self.marshal(&current)?;
        page.put(handle.record_id, &bytes)?;
        self.file.put(handle.block_id, &page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::DataType;
    use tempfile::tempdir;

    fn schema() -> Schema {
        vec![
            ("a".to_string(), DataType::Int),
            ("b".to_string(), DataType::Text),
        ]
    }

    #[test]
    fn create_insert_select_project_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.db");
        let mut rel = HeapRelation::create(&path, schema()).unwrap();
        let mut row = Row::default();
        row.insert("a".into(), Value::Int(12));
        row.insert("b".into(), Value::Text("Hello!".into()));
        let handle = rel.insert(&row).unwrap();
        let handles = rel.select().unwrap();
        assert_eq!(handles.len(), 1);
        assert_eq!(handles[0], handle);
        let result = rel.project(handle, None).unwrap();
        assert_eq!(result.get("a"), Some(&Value::Int(12)));
        assert_eq!(result.get("b"), Some(&Value::Text("Hello!".into())));
    }

    #[test]
    fn handle_stability_across_other_mutations() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t2.db");
        let mut rel = HeapRelation::create(&path, schema()).unwrap();
        let mut row1 = Row::default();
        row1.insert("a".into(), Value::Int(1));
        row1.insert("b".into(), Value::Text("keep".into()));
        let h1 = rel.insert(&row1).unwrap();

        for i in 0..20 {
            let mut row = Row::default();
            row.insert("a".into(), Value::Int(i));
            row.insert("b".into(), Value::Text(format!("row-{i}")));
            let h = rel.insert(&row).unwrap();
            if i % 3 == 0 {
                rel.del(h).unwrap();
            }
        }

        let result = rel.project(h1, None).unwrap();
        assert_eq!(result.get("a"), Some(&Value::Int(1)));
        assert_eq!(result.get("b"), Some(&Value::Text("keep".into())));
    }

    #[test]
    fn insert_allocates_new_block_on_no_room() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t3.db");
        let schema = vec![("a".to_string(), DataType::Text)];
        let mut rel = HeapRelation::create(&path, schema).unwrap();
        let big = "x".repeat(1000);
        for _ in 0..10 {
            let mut row = Row::default();
            row.insert("a".into(), Value::Text(big.clone()));
            rel.insert(&row).unwrap();
        }
        assert!(rel.file.last_block_id() > 1);
        assert_eq!(rel.select().unwrap().len(), 10);
    }

    #[test]
    fn del_then_select_excludes_row() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t4.db");
        let mut rel = HeapRelation::create(&path, schema()).unwrap();
        let mut row = Row::default();
        row.insert("a".into(), Value::Int(1));
        row.insert("b".into(), Value::Text("a".into()));
        let h = rel.insert(&row).unwrap();
        rel.del(h).unwrap();
        assert_eq!(rel.select().unwrap().len(), 0);
    }

    #[test]
    fn is_live_reflects_deletion() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t5.db");
        let mut rel = HeapRelation::create(&path, schema()).unwrap();
        let mut row = Row::default();
        row.insert("a".into(), Value::Int(1));
        row.insert("b".into(), Value::Text("a".into()));
        let h = rel.insert(&row).unwrap();
        assert!(rel.is_live(h).unwrap());
        rel.del(h).unwrap();
        assert!(!rel.is_live(h).unwrap());
    }
}
