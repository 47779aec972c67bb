//! B+tree secondary index (C6).
//!
//! Built on the same block file and slotted-page primitives as the
//! heap (`block.rs`): each node is one block, laid out as a slotted
//! page whose records are (key, handle) entries for leaves or
//! (boundary key, child block id) entries for interior nodes. Record
//! id 1 in every node is reserved for a fixed-size metadata entry (the
//! leaf chain pointer, or the interior node's leftmost child) so it is
//! always written first, before any key entry.
//!
//! Interior nodes hold child block ids, not child objects: a node is
//! decoded into an owned `LeafNode`/`InteriorNode` value for the
//! duration of one descent step and dropped once written back: there
//! is no long-lived in-memory tree to leak.

use std::path::{Path, PathBuf};

use crate::block::{BlockFile, CreateMode, SlottedPage};
use crate::config::{BLOCK_SZ, STAT_BLOCK};
use crate::error::{Error, Result};
use crate::heap::HeapRelation;
use crate::value::{BlockId, DataType, Handle, KeyValue, Value};

fn encode_key(key: &KeyValue, out: &mut Vec<u8>) -> Result<()> {
    for v in &key.0 {
        v.marshal_into(out)?;
    }
    Ok(())
}

fn decode_key(profile: &[DataType], bytes: &[u8], offset: usize) -> Result<(KeyValue, usize)> {
    let mut values = Vec::with_capacity(profile.len());
    let mut off = offset;
    for data_type in profile {
        let (v, next) = Value::unmarshal(*data_type, bytes, off)?;
        values.push(v);
        off = next;
    }
    Ok((KeyValue(values), off))
}

fn data_type_tag(dt: DataType) -> u8 {
    match dt {
        DataType::Int => 0,
        DataType::Text => 1,
        DataType::Bool => 2,
    }
}

fn data_type_from_tag(tag: u8) -> Result<DataType> {
    match tag {
        0 => Ok(DataType::Int),
        1 => Ok(DataType::Text),
        2 => Ok(DataType::Bool),
        _ => Err(Error::Catalog("corrupt key profile tag".into())),
    }
}

/// Persisted root/height/key-profile metadata, living in block
/// `STAT_BLOCK` of the index file, written with plain byte offsets
/// rather than the slotted-page layout (it is fixed shape and never
/// grows).
struct Stats {
    root_id: BlockId,
    height: u32,
    profile: Vec<DataType>,
}

impl Stats {
    fn encode(&self) -> [u8; BLOCK_SZ] {
        let mut buf = [0u8; BLOCK_SZ];
        buf[0..4].copy_from_slice(&self.root_id.to_le_bytes());
        buf[4..8].copy_from_slice(&self.height.to_le_bytes());
        buf[8..10].copy_from_slice(&(self.profile.len() as u16).to_le_bytes());
        for (i, dt) in self.profile.iter().enumerate() {
            buf[10 + i] = data_type_tag(*dt);
        }
        buf
    }

    fn decode(buf: &[u8; BLOCK_SZ]) -> Result<Self> {
        let root_id = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let height = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        let n = u16::from_le_bytes(buf[8..10].try_into().unwrap()) as usize;
        let mut profile = Vec::with_capacity(n);
        for i in 0..n {
            profile.push(data_type_from_tag(buf[10 + i])?);
        }
        Ok(Self {
            root_id,
            height,
            profile,
        })
    }
}

/// A leaf's view of a block: entries are `(key, handle)`, sorted on
/// demand (the slotted page itself keeps no order). Record id 1 is a
/// 4-byte "next leaf" block id (0 means none — the chain end).
struct LeafNode {
    page: SlottedPage,
}

impl LeafNode {
    fn new_empty() -> Self {
        let mut page = SlottedPage::new_empty();
        page.add(&0u32.to_le_bytes()).expect("fresh page has room");
        Self { page }
    }

    fn from_page(page: SlottedPage) -> Self {
        Self { page }
    }

    fn next(&self) -> BlockId {
        let bytes = self.page.get(1).expect("leaf metadata record missing");
        u32::from_le_bytes(bytes.try_into().unwrap())
    }

    fn set_next(&mut self, next: BlockId) {
        self.page
            .put(1, &next.to_le_bytes())
            .expect("metadata record never grows");
    }

    fn entries(&self, profile: &[DataType]) -> Result<Vec<(KeyValue, Handle)>> {
        let mut out = Vec::new();
        for id in self.page.ids() {
            if id == 1 {
                continue;
            }
            let bytes = self.page.get(id).unwrap();
            let (key, off) = decode_key(profile, bytes, 0)?;
            let block_id = u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
            let record_id = u16::from_le_bytes(bytes[off + 4..off + 6].try_into().unwrap());
            out.push((key, Handle::new(block_id, record_id)));
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }

    fn find_eq(&self, key: &KeyValue, profile: &[DataType]) -> Result<Option<Handle>> {
        Ok(self
            .entries(profile)?
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, h)| h))
    }

    fn try_insert(&mut self, key: &KeyValue, handle: Handle) -> Result<()> {
        let mut bytes = Vec::new();
        encode_key(key, &mut bytes)?;
        bytes.extend_from_slice(&handle.block_id.to_le_bytes());
        bytes.extend_from_slice(&handle.record_id.to_le_bytes());
        self.page.add(&bytes)?;
        Ok(())
    }
}

/// An interior node's view of a block: a leftmost child pointer
/// (record id 1) plus `(boundary key, child block id)` entries, one
/// per remaining child. A key `k` routes to the leftmost child if `k`
/// is less than every entry's boundary, otherwise to the entry with
/// the greatest boundary `<= k`.
struct InteriorNode {
    page: SlottedPage,
}

impl InteriorNode {
    fn new_empty(first_child: BlockId) -> Self {
        let mut page = SlottedPage::new_empty();
        page.add(&first_child.to_le_bytes())
            .expect("fresh page has room");
        Self { page }
    }

    fn from_page(page: SlottedPage) -> Self {
        Self { page }
    }

    fn first_child(&self) -> BlockId {
        let bytes = self.page.get(1).expect("interior metadata record missing");
        u32::from_le_bytes(bytes.try_into().unwrap())
    }

    fn entries(&self, profile: &[DataType]) -> Result<Vec<(KeyValue, BlockId)>> {
        let mut out = Vec::new();
        for id in self.page.ids() {
            if id == 1 {
                continue;
            }
            let bytes = self.page.get(id).unwrap();
            let (key, off) = decode_key(profile, bytes, 0)?;
            let child = u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
            out.push((key, child));
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }

    fn find_child(&self, key: &KeyValue, profile: &[DataType]) -> Result<BlockId> {
        let entries = self.entries(profile)?;
        let mut chosen = self.first_child();
        for (boundary, child) in entries {
            if boundary <= *key {
                chosen = child;
            } else {
                break;
            }
        }
        Ok(chosen)
    }

    fn try_insert(&mut self, boundary: &KeyValue, child: BlockId) -> Result<()> {
        let mut bytes = Vec::new();
        encode_key(boundary, &mut bytes)?;
        bytes.extend_from_slice(&child.to_le_bytes());
        self.page.add(&bytes)?;
        Ok(())
    }
}

/// A B+tree unique secondary index over one or more columns of a base
/// relation.
pub struct BTreeIndex {
    blocks: BlockFile,
    path: PathBuf,
    stats: Stats,
}

impl BTreeIndex {
    /// Build a fresh index over `columns` of `base`, bulk-loading every
    /// currently live row.
    pub fn create(path: &Path, base: &HeapRelation, columns: &[String]) -> Result<Self> {
        let profile = columns
            .iter()
            .map(|c| {
                base.schema()
                    .iter()
                    .find(|(name, _)| name == c)
                    .map(|(_, dt)| *dt)
                    .ok_or_else(|| Error::SchemaError(format!("no such column '{c}'")))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut blocks = BlockFile::create(path, CreateMode::Exclusive)?;
        blocks.allocate()?; // STAT_BLOCK placeholder
        let root_id = blocks.allocate()?;
        blocks.put(root_id, LeafNode::new_empty().page.as_bytes())?;
        let stats = Stats {
            root_id,
            height: 1,
            profile,
        };
        blocks.put(STAT_BLOCK, &stats.encode())?;

        let mut index = Self {
            blocks,
            path: path.to_path_buf(),
            stats,
        };
        for handle in base.select()? {
            let row = base.project(handle, Some(columns))?;
            let key = KeyValue(
                columns
                    .iter()
                    .map(|c| row.get(c).cloned())
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| Error::SchemaError("row missing key column".into()))?,
            );
            index.insert_key(key, handle)?;
        }
        Ok(index)
    }

    /// Open an existing index file, reading its persisted stats block.
    pub fn open(path: &Path) -> Result<Self> {
        let blocks = BlockFile::open(path)?;
        let stats = Stats::decode(&blocks.get(STAT_BLOCK)?)?;
        Ok(Self {
            blocks,
            path: path.to_path_buf(),
            stats,
        })
    }

    pub fn drop_file(path: &Path) -> Result<()> {
        BlockFile::drop_file(path)
    }

    fn load_leaf(&self, id: BlockId) -> Result<LeafNode> {
        Ok(LeafNode::from_page(SlottedPage::from_bytes(
            self.blocks.get(id)?,
        )))
    }

    fn load_interior(&self, id: BlockId) -> Result<InteriorNode> {
        Ok(InteriorNode::from_page(SlottedPage::from_bytes(
            self.blocks.get(id)?,
        )))
    }

    /// Exact-match lookup: the handle stored under `key`, if any.
    pub fn lookup(&self, key: &KeyValue) -> Result<Vec<Handle>> {
        Ok(self
            .lookup_one(self.stats.root_id, self.stats.height, key)?
            .into_iter()
            .collect())
    }

    fn lookup_one(&self, node_id: BlockId, height: u32, key: &KeyValue) -> Result<Option<Handle>> {
        if height == 1 {
            self.load_leaf(node_id)?.find_eq(key, &self.stats.profile)
        } else {
            let interior = self.load_interior(node_id)?;
            let child = interior.find_child(key, &self.stats.profile)?;
            self.lookup_one(child, height - 1, key)
        }
    }

    /// Insert `handle` under the key projected from `base` at
    /// `handle`'s row, using the columns fixed at construction time.
    pub fn insert(&mut self, handle: Handle, base: &HeapRelation, columns: &[String]) -> Result<()> {
        let row = base.project(handle, Some(columns))?;
        let key = KeyValue(
            columns
                .iter()
                .map(|c| row.get(c).cloned())
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| Error::SchemaError("row missing key column".into()))?,
        );
        self.insert_key(key, handle)
    }

    fn insert_key(&mut self, key: KeyValue, handle: Handle) -> Result<()> {
        if let Some((boundary, new_id)) =
            self.insert_recursive(self.stats.root_id, self.stats.height, &key, handle)?
        {
            let mut new_root = InteriorNode::new_empty(self.stats.root_id);
            new_root.try_insert(&boundary, new_id)?;
            let new_root_id = self.blocks.allocate()?;
            self.blocks.put(new_root_id, new_root.page.as_bytes())?;
            self.stats.root_id = new_root_id;
            self.stats.height += 1;
            self.persist_stats()?;
        }
        Ok(())
    }

    fn persist_stats(&mut self) -> Result<()> {
        let bytes = self.stats.encode();
        self.blocks.put(STAT_BLOCK, &bytes)
    }

    /// Returns `Some((boundary_key, new_right_sibling_id))` when the
    /// node at `node_id` had to split, `None` otherwise.
    fn insert_recursive(
        &mut self,
        node_id: BlockId,
        height: u32,
        key: &KeyValue,
        handle: Handle,
    ) -> Result<Option<(KeyValue, BlockId)>> {
        if height == 1 {
            let mut leaf = self.load_leaf(node_id)?;
            match leaf.try_insert(key, handle) {
                Ok(()) => {
                    self.blocks.put(node_id, leaf.page.as_bytes())?;
                    Ok(None)
                }
                Err(Error::NoRoom) => {
                    let mut entries = leaf.entries(&self.stats.profile)?;
                    entries.push((key.clone(), handle));
                    entries.sort_by(|a, b| a.0.cmp(&b.0));
                    let mid = entries.len() / 2;
                    let (left, right) = entries.split_at(mid);

                    let new_id = self.blocks.allocate()?;
                    let mut left_leaf = LeafNode::new_empty();
                    left_leaf.set_next(new_id);
                    for (k, h) in left {
                        left_leaf.try_insert(k, *h)?;
                    }
                    let mut right_leaf = LeafNode::new_empty();
                    right_leaf.set_next(leaf.next());
                    for (k, h) in right {
                        right_leaf.try_insert(k, *h)?;
                    }
                    self.blocks.put(node_id, left_leaf.page.as_bytes())?;
                    self.blocks.put(new_id, right_leaf.page.as_bytes())?;
                    Ok(Some((right[0].0.clone(), new_id)))
                }
                Err(e) => Err(e),
            }
        } else {
            let interior = self.load_interior(node_id)?;
            let child_id = interior.find_child(key, &self.stats.profile)?;
            match self.insert_recursive(child_id, height - 1, key, handle)? {
                None => Ok(None),
                Some((boundary, new_child_id)) => {
                    let mut interior = self.load_interior(node_id)?;
                    match interior.try_insert(&boundary, new_child_id) {
                        Ok(()) => {
                            self.blocks.put(node_id, interior.page.as_bytes())?;
                            Ok(None)
                        }
                        Err(Error::NoRoom) => {
                            let mut entries = interior.entries(&self.stats.profile)?;
                            entries.push((boundary, new_child_id));
                            entries.sort_by(|a, b| a.0.cmp(&b.0));
                            let mid = entries.len() / 2;
                            let up_key = entries[mid].0.clone();
                            let up_child = entries[mid].1;
                            let left = &entries[..mid];
                            let right = &entries[mid + 1..];

                            let new_id = self.blocks.allocate()?;
                            let mut left_node = InteriorNode::new_empty(interior.first_child());
                            for (k, c) in left {
                                left_node.try_insert(k, *c)?;
                            }
                            let mut right_node = InteriorNode::new_empty(up_child);
                            for (k, c) in right {
                                right_node.try_insert(k, *c)?;
                            }
                            self.blocks.put(node_id, left_node.page.as_bytes())?;
                            self.blocks.put(new_id, right_node.page.as_bytes())?;
                            Ok(Some((up_key, new_id)))
                        }
                        Err(e) => Err(e),
                    }
                }
            }
        }
    }

    /// Range scans are not implemented; the catalog only ever performs
    /// equality lookups (see spec.md §4.5, §4.8).
    pub fn range(&self, _low: &KeyValue, _high: &KeyValue) -> Result<Vec<Handle>> {
        Err(Error::NotSupported("B-tree range scans".into()))
    }

    /// Deleting index entries is not implemented; `DELETE` still calls
    /// this for every index on the table and propagates the error (see
    /// spec.md §4.7).
    pub fn del(&mut self, _handle: Handle) -> Result<()> {
        Err(Error::NotSupported("B-tree key deletion".into()))
    }

    pub fn close(&mut self) {
        self.blocks.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::Schema;
    use crate::value::Row;
    use tempfile::tempdir;

    fn make_base(dir: &Path, rows: usize) -> (HeapRelation, Vec<Handle>) {
        let schema: Schema = vec![
            ("id".to_string(), DataType::Int),
            ("name".to_string(), DataType::Text),
        ];
        let mut rel = HeapRelation::create(&dir.join("t.db"), schema).unwrap();
        let mut handles = Vec::new();
        for i in 0..rows {
            let mut row = Row::default();
            row.insert("id".into(), Value::Int(i as i32));
            row.insert("name".into(), Value::Text(format!("name-{i}")));
            handles.push(rel.insert(&row).unwrap());
        }
        (rel, handles)
    }

    #[test]
    fn create_and_lookup_small() {
        let dir = tempdir().unwrap();
        let (base, handles) = make_base(dir.path(), 5);
        let index = BTreeIndex::create(&dir.path().join("idx"), &base, &["id".to_string()]).unwrap();
        for (i, h) in handles.iter().enumerate() {
            let key = KeyValue(vec![Value::Int(i as i32)]);
            assert_eq!(index.lookup(&key).unwrap(), vec![*h]);
        }
        let missing = KeyValue(vec![Value::Int(999)]);
        assert!(index.lookup(&missing).unwrap().is_empty());
    }

    #[test]
    fn bulk_build_forces_splits_and_stays_lookup_correct() {
        let dir = tempdir().unwrap();
        let (base, handles) = make_base(dir.path(), 400);
        let index =
            BTreeIndex::create(&dir.path().join("idx2"), &base, &["id".to_string()]).unwrap();
        assert!(index.stats.height >= 2, "400 keys must force at least one split");
        for (i, h) in handles.iter().enumerate() {
            let key = KeyValue(vec![Value::Int(i as i32)]);
            assert_eq!(index.lookup(&key).unwrap(), vec![*h]);
        }
    }

    #[test]
    fn insert_after_open_is_visible() {
        let dir = tempdir().unwrap();
        let (mut base, _) = make_base(dir.path(), 3);
        let path = dir.path().join("idx3");
        {
            let _ = BTreeIndex::create(&path, &base, &["id".to_string()]).unwrap();
        }
        let mut index = BTreeIndex::open(&path).unwrap();
        let mut row = Row::default();
        row.insert("id".into(), Value::Int(100));
        row.insert("name".into(), Value::Text("new".into()));
        let handle = base.insert(&row).unwrap();
        index
            .insert(handle, &base, &["id".to_string()])
            .unwrap();
        let key = KeyValue(vec![Value::Int(100)]);
        assert_eq!(index.lookup(&key).unwrap(), vec![handle]);
    }

    #[test]
    fn range_and_del_are_not_supported() {
        let dir = tempdir().unwrap();
        let (base, _) = make_base(dir.path(), 2);
        let mut index =
            BTreeIndex::create(&dir.path().join("idx4"), &base, &["id".to_string()]).unwrap();
        let k = KeyValue(vec![Value::Int(0)]);
        assert!(matches!(index.range(&k, &k), Err(Error::NotSupported(_))));
        let h = index.lookup(&k).unwrap()[0];
        assert!(matches!(index.del(h), Err(Error::NotSupported(_))));
    }
}
