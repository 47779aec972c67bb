//! Self-describing catalog (C5): `_tables`, `_columns` and `_indices`
//! are ordinary heap relations that happen to describe every relation
//! in the store, themselves included. Bootstrapped lazily on first
//! open, the way the source this is modeled on opens its system tables
//! the first time a statement touches the catalog rather than at
//! startup.

use rustc_hash::FxHashMap;

use crate::btree::BTreeIndex;
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::heap::{HeapRelation, Schema};
use crate::value::{DataType, Handle, Row, Value};

const SYSTEM_TABLES: [&str; 3] = ["_tables", "_columns", "_indices"];

fn tables_schema() -> Schema {
    vec![("table_name".to_string(), DataType::Text)]
}

fn columns_schema() -> Schema {
    vec![
        ("table_name".to_string(), DataType::Text),
        ("column_name".to_string(), DataType::Text),
        ("data_type".to_string(), DataType::Text),
    ]
}

fn indices_schema() -> Schema {
    vec![
        ("table_name".to_string(), DataType::Text),
        ("index_name".to_string(), DataType::Text),
        ("column_name".to_string(), DataType::Text),
        ("seq_in_index".to_string(), DataType::Int),
        ("index_type".to_string(), DataType::Text),
        ("is_unique".to_string(), DataType::Bool),
    ]
}

fn text(row: &Row, col: &str) -> Result<String> {
    match row.get(col) {
        Some(Value::Text(s)) => Ok(s.clone()),
        _ => Err(Error::Catalog(format!("catalog row missing '{col}'"))),
    }
}

fn int(row: &Row, col: &str) -> Result<i32> {
    match row.get(col) {
        Some(Value::Int(n)) => Ok(*n),
        _ => Err(Error::Catalog(format!("catalog row missing '{col}'"))),
    }
}

fn boolean(row: &Row, col: &str) -> Result<bool> {
    match row.get(col) {
        Some(Value::Bool(b)) => Ok(*b),
        _ => Err(Error::Catalog(format!("catalog row missing '{col}'"))),
    }
}

/// Scan `rel` end to end, keeping every row whose columns match every
/// entry of `predicate` (empty predicate keeps everything). Used only
/// by the catalog itself; ordinary query execution goes through
/// `plan::pipeline`.
fn scan_matching(rel: &HeapRelation, predicate: &Row) -> Result<Vec<Row>> {
    let mut out = Vec::new();
    for handle in rel.select()? {
        let row = rel.project(handle, None)?;
        if predicate.iter().all(|(k, v)| row.get(k) == Some(v)) {
            out.push(row);
        }
    }
    Ok(out)
}

/// Like `scan_matching`, but returns handles rather than materialised
/// rows. Used when the caller needs to mutate the relation afterward,
/// since holding live rows alongside a `&mut` would conflict.
fn handles_matching(rel: &HeapRelation, predicate: &Row) -> Result<Vec<Handle>> {
    let mut out = Vec::new();
    for handle in rel.select()? {
        let row = rel.project(handle, None)?;
        if predicate.iter().all(|(k, v)| row.get(k) == Some(v)) {
            out.push(handle);
        }
    }
    Ok(out)
}

fn eq(col: &str, value: &str) -> Row {
    let mut row = Row::default();
    row.insert(col.to_string(), Value::Text(value.to_string()));
    row
}

/// `_tables` and `_columns`, plus the cache of opened base relations
/// (system tables included).
pub struct Tables {
    store: StoreConfig,
    tables_rel: HeapRelation,
    columns_rel: HeapRelation,
    cache: FxHashMap<String, HeapRelation>,
}

impl Tables {
    fn open(store: &StoreConfig) -> Result<(Self, bool)> {
        let tables_path = store.relation_path("_tables");
        let is_new = !tables_path.exists();
        let tables_rel = HeapRelation::create_if_not_exists(&tables_path, tables_schema())?;
        let columns_rel = HeapRelation::create_if_not_exists(
            &store.relation_path("_columns"),
            columns_schema(),
        )?;
        Ok((
            Self {
                store: store.clone(),
                tables_rel,
                columns_rel,
                cache: FxHashMap::default(),
            },
            is_new,
        ))
    }

    fn register_system_tables(&mut self) -> Result<()> {
        let defs: [(&str, Schema); 3] = [
            ("_tables", tables_schema()),
            ("_columns", columns_schema()),
            ("_indices", indices_schema()),
        ];
        for (name, schema) in defs {
            let mut row = Row::default();
            row.insert("table_name".to_string(), Value::Text(name.to_string()));
            self.tables_rel.insert(&row)?;
            for (column_name, data_type) in schema {
                let mut col_row = Row::default();
                col_row.insert("table_name".to_string(), Value::Text(name.to_string()));
                col_row.insert("column_name".to_string(), Value::Text(column_name));
                col_row.insert(
                    "data_type".to_string(),
                    Value::Text(data_type.sql_name().to_string()),
                );
                self.columns_rel.insert(&col_row)?;
            }
        }
        Ok(())
    }

    /// Whether `name` names a table the catalog knows about (system
    /// tables count).
    pub fn exists(&self, name: &str) -> Result<bool> {
        if SYSTEM_TABLES.contains(&name) {
            return Ok(true);
        }
        Ok(!scan_matching(&self.tables_rel, &eq("table_name", name))?.is_empty())
    }

    /// Column schema for `name`, in declaration order, read back from
    /// `_columns`.
    fn schema_for(&self, name: &str) -> Result<Schema> {
        match name {
            "_tables" => return Ok(tables_schema()),
            "_columns" => return Ok(columns_schema()),
            "_indices" => return Ok(indices_schema()),
            _ => {}
        }
        let rows = scan_matching(&self.columns_rel, &eq("table_name", name))?;
        if rows.is_empty() {
            return Err(Error::SchemaError(format!("table '{name}' does not exist")));
        }
        rows.iter()
            .map(|row| {
                let column_name = text(row, "column_name")?;
                let data_type = DataType::from_sql_name(&text(row, "data_type")?)?;
                Ok((column_name, data_type))
            })
            .collect()
    }

    /// Fetch (opening and caching on first access) the relation named
    /// `name`.
    pub fn get_table(&mut self, name: &str) -> Result<&mut HeapRelation> {
        if !self.cache.contains_key(name) {
            let schema = self.schema_for(name)?;
            let rel = HeapRelation::open(&self.store.relation_path(name), schema)?;
            self.cache.insert(name.to_string(), rel);
        }
        Ok(self.cache.get_mut(name).unwrap())
    }

    /// Names of every user table (system tables excluded), per
    /// CREATE/SHOW TABLES.
    pub fn table_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for row in scan_matching(&self.tables_rel, &Row::default())? {
            let name = text(&row, "table_name")?;
            if !SYSTEM_TABLES.contains(&name.as_str()) {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Column definitions for `name`, declaration order.
    pub fn column_defs(&self, name: &str) -> Result<Vec<(String, DataType)>> {
        self.schema_for(name)
    }

    /// Register a new table: one `_tables` row, one `_columns` row per
    /// column, then create its backing file. Fails (leaving the
    /// catalog untouched) if the table already exists.
    pub fn create_table(&mut self, name: &str, schema: Schema) -> Result<()> {
        if self.exists(name)? {
            return Err(Error::SchemaError(format!("table '{name}' already exists")));
        }
        let mut table_row = Row::default();
        table_row.insert("table_name".to_string(), Value::Text(name.to_string()));
        let table_handle = self.tables_rel.insert(&table_row)?;

        let mut column_handles = Vec::new();
        for (column_name, data_type) in &schema {
            let mut row = Row::default();
            row.insert("table_name".to_string(), Value::Text(name.to_string()));
            row.insert(
                "column_name".to_string(),
                Value::Text(column_name.clone()),
            );
            row.insert(
                "data_type".to_string(),
                Value::Text(data_type.sql_name().to_string()),
            );
            match self.columns_rel.insert(&row) {
                Ok(h) => column_handles.push(h),
                Err(e) => {
                    for h in column_handles {
                        let _ = self.columns_rel.del(h);
                    }
                    let _ = self.tables_rel.del(table_handle);
                    return Err(e);
                }
            }
        }

        match HeapRelation::create(&self.store.relation_path(name), schema) {
            Ok(rel) => {
                self.cache.insert(name.to_string(), rel);
                Ok(())
            }
            Err(e) => {
                for h in column_handles {
                    let _ = self.columns_rel.del(h);
                }
                let _ = self.tables_rel.del(table_handle);
                Err(e)
            }
        }
    }

    /// Drop a table: remove its `_columns` rows, its `_tables` row,
    /// close and delete its cached relation if open, then delete its
    /// backing file. Callers are responsible for dropping the table's
    /// indices first.
    pub fn drop_table(&mut self, name: &str) -> Result<()> {
        if SYSTEM_TABLES.contains(&name) {
            return Err(Error::SchemaError(format!(
                "system table '{name}' cannot be dropped"
            )));
        }
        for handle in handles_matching(&self.tables_rel, &eq("table_name", name))? {
            self.tables_rel.del(handle)?;
        }
        for handle in handles_matching(&self.columns_rel, &eq("table_name", name))? {
            self.columns_rel.del(handle)?;
        }
        if let Some(rel) = self.cache.remove(name) {
            rel.drop_relation()?;
        } else {
            HeapRelation::drop_relation(HeapRelation::open(
                &self.store.relation_path(name),
                self.schema_for(name).unwrap_or_default(),
            )?)?;
        }
        Ok(())
    }
}

/// `_indices`, plus the cache of opened B-tree index handles.
pub struct Indices {
    store: StoreConfig,
    indices_rel: HeapRelation,
    cache: FxHashMap<(String, String), BTreeIndex>,
}

impl Indices {
    fn open(store: &StoreConfig) -> Result<Self> {
        let indices_rel =
            HeapRelation::create_if_not_exists(&store.relation_path("_indices"), indices_schema())?;
        Ok(Self {
            store: store.clone(),
            indices_rel,
            cache: FxHashMap::default(),
        })
    }

    fn rows_for(&self, table: &str, index: Option<&str>) -> Result<Vec<Row>> {
        let mut rows = scan_matching(&self.indices_rel, &eq("table_name", table))?;
        if let Some(index) = index {
            rows.retain(|r| text(r, "index_name").as_deref() == Ok(index));
        }
        rows.sort_by_key(|r| int(r, "seq_in_index").unwrap_or(0));
        Ok(rows)
    }

    /// Names of every index defined on `table`, in the order their
    /// `CREATE INDEX` statements registered them.
    pub fn get_index_names(&self, table: &str) -> Result<Vec<String>> {
        let mut seen = Vec::new();
        for row in scan_matching(&self.indices_rel, &eq("table_name", table))? {
            let name = text(&row, "index_name")?;
            if !seen.contains(&name) {
                seen.push(name);
            }
        }
        Ok(seen)
    }

    /// Whether `table`'s `index` has a backing B-tree file at all. Only
    /// `BTREE`/unique indexes are actually built (see `create_index`);
    /// a `HASH` (non-unique) `_indices` row is recorded for `SHOW INDEX`
    /// but has no structure to maintain or query.
    pub fn is_usable(&self, table: &str, index: &str) -> Result<bool> {
        let rows = self.rows_for(table, Some(index))?;
        match rows.first() {
            Some(row) => Ok(text(row, "index_type")? == "BTREE" && boolean(row, "is_unique")?),
            None => Ok(false),
        }
    }

    /// Names of every index on `table` that actually has a backing
    /// B-tree file, i.e. `get_index_names` filtered to `is_usable`.
    pub fn usable_index_names(&self, table: &str) -> Result<Vec<String>> {
        let mut usable = Vec::new();
        for name in self.get_index_names(table)? {
            if self.is_usable(table, &name)? {
                usable.push(name);
            }
        }
        Ok(usable)
    }

    /// Every `_indices` row recorded for `table`, in `seq_in_index`
    /// order, for `SHOW INDEX FROM table`.
    pub fn describe(&self, table: &str) -> Result<Vec<Row>> {
        self.rows_for(table, None)
    }

    /// Key columns of `table`'s `index`, in `seq_in_index` order.
    pub fn key_columns(&self, table: &str, index: &str) -> Result<Vec<String>> {
        self.rows_for(table, Some(index))?
            .iter()
            .map(|r| text(r, "column_name"))
            .collect()
    }

    /// Open (and cache) the B-tree backing `table`'s `index`. Errors
    /// with `NotSupported` for a catalog row recorded with a non-BTREE
    /// index type, since that is the only index structure this engine
    /// builds.
    pub fn get_index(&mut self, table: &str, index: &str) -> Result<&mut BTreeIndex> {
        let key = (table.to_string(), index.to_string());
        if !self.cache.contains_key(&key) {
            let rows = self.rows_for(table, Some(index))?;
            let first = rows
                .first()
                .ok_or_else(|| Error::Catalog(format!("index '{index}' on '{table}' not found")))?;
            let index_type = text(first, "index_type")?;
            let is_unique = boolean(first, "is_unique")?;
            if index_type != "BTREE" || !is_unique {
                return Err(Error::NotSupported(format!(
                    "index type '{index_type}' is not implemented"
                )));
            }
            let path = self.store.index_path(table, index);
            let btree = BTreeIndex::open(&path)?;
            self.cache.insert(key.clone(), btree);
        }
        Ok(self.cache.get_mut(&key).unwrap())
    }

    /// Register `index` on `table` over `columns` and build it from
    /// the table's current contents. Rolls back its `_indices` rows on
    /// failure.
    pub fn create_index(
        &mut self,
        table: &str,
        index: &str,
        columns: &[String],
        index_type: &str,
        base: &HeapRelation,
    ) -> Result<()> {
        if self.get_index_names(table)?.iter().any(|n| n == index) {
            return Err(Error::SchemaError(format!(
                "index '{index}' already exists on '{table}'"
            )));
        }
        let is_unique = index_type == "BTREE";
        let mut handles = Vec::new();
        for (seq, column) in columns.iter().enumerate() {
            let mut row = Row::default();
            row.insert("table_name".to_string(), Value::Text(table.to_string()));
            row.insert("index_name".to_string(), Value::Text(index.to_string()));
            row.insert("column_name".to_string(), Value::Text(column.clone()));
            row.insert("seq_in_index".to_string(), Value::Int(seq as i32));
            row.insert(
                "index_type".to_string(),
                Value::Text(index_type.to_string()),
            );
            row.insert("is_unique".to_string(), Value::Bool(is_unique));
            match self.indices_rel.insert(&row) {
                Ok(h) => handles.push(h),
                Err(e) => {
                    for h in handles {
                        let _ = self.indices_rel.del(h);
                    }
                    return Err(e);
                }
            }
        }
        if !is_unique {
            return Ok(());
        }
        let path = self.store.index_path(table, index);
        match BTreeIndex::create(&path, base, columns) {
            Ok(btree) => {
                self.cache
                    .insert((table.to_string(), index.to_string()), btree);
                Ok(())
            }
            Err(e) => {
                for h in handles {
                    let _ = self.indices_rel.del(h);
                }
                Err(e)
            }
        }
    }

    /// Drop `index` on `table`: delete its `_indices` rows, drop the
    /// cached handle if open, and remove its backing file.
    pub fn drop_index(&mut self, table: &str, index: &str) -> Result<()> {
        let mut predicate = eq("table_name", table);
        predicate.insert("index_name".to_string(), Value::Text(index.to_string()));
        for handle in handles_matching(&self.indices_rel, &predicate)? {
            self.indices_rel.del(handle)?;
        }
        self.cache
            .remove(&(table.to_string(), index.to_string()));
        BTreeIndex::drop_file(&self.store.index_path(table, index))
    }
}

/// Ties `Tables` and `Indices` together behind one lazily-bootstrapped
/// handle, matching the source's single static catalog pointer.
pub struct Catalog {
    pub tables: Tables,
    pub indices: Indices,
}

impl Catalog {
    pub fn open(store: &StoreConfig) -> Result<Self> {
        let (mut tables, is_new) = Tables::open(store)?;
        let indices = Indices::open(store)?;
        if is_new {
            tables.register_system_tables()?;
        }
        Ok(Self { tables, indices })
    }
}
