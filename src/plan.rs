//! Evaluation plan (C7): a tagged tree of nodes, not a trait-object
//! hierarchy. `optimize` and `evaluate` are recursive functions that
//! pattern-match on [`Plan`], the way the teacher's `expr.rs`/`run.rs`
//! pattern-match on their own instruction enums instead of dispatching
//! through virtual methods.

use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::value::{Handle, KeyValue, Row};

/// One node of an evaluation plan.
#[derive(Clone, Debug)]
pub enum Plan {
    /// Every live row of a base relation.
    TableScan { table: String },

    /// Keep only rows matching every (column, value) pair — an
    /// equality conjunction, i.e. `AND(col = value)`.
    Select { predicate: Row, child: Box<Plan> },

    /// Restrict to `columns` (declaration order), or every schema
    /// column when `columns` is `None` (`SELECT *`).
    Project {
        child: Box<Plan>,
        columns: Option<Vec<String>>,
    },

    /// Produced only by [`optimize`]: an equality lookup through a
    /// B-tree index instead of a full table scan.
    IndexLookup {
        table: String,
        index: String,
        key: Row,
    },
}

impl Plan {
    pub fn table_scan(table: impl Into<String>) -> Self {
        Plan::TableScan {
            table: table.into(),
        }
    }

    pub fn select(self, predicate: Row) -> Self {
        Plan::Select {
            predicate,
            child: Box::new(self),
        }
    }

    pub fn project(self, columns: Option<Vec<String>>) -> Self {
        Plan::Project {
            child: Box::new(self),
            columns,
        }
    }
}

/// Resolve the base relation and the concrete handles that satisfy
/// every `Select` above a `TableScan` (or `IndexLookup`). Does not
/// handle `Project` — that is `evaluate`'s job.
pub fn pipeline(plan: &Plan, catalog: &mut Catalog) -> Result<(String, Vec<Handle>)> {
    match plan {
        Plan::TableScan { table } => {
            let rel = catalog.tables.get_table(table)?;
            Ok((table.clone(), rel.select()?))
        }
        Plan::Select { predicate, child } => {
            let (table, handles) = pipeline(child, catalog)?;
            let rel = catalog.tables.get_table(&table)?;
            let mut kept = Vec::new();
            for handle in handles {
                let row = rel.project(handle, None)?;
                if predicate.iter().all(|(col, val)| row.get(col) == Some(val)) {
                    kept.push(handle);
                }
            }
            Ok((table, kept))
        }
        Plan::IndexLookup { table, index, key } => {
            let key_cols = catalog.indices.key_columns(table, index)?;
            let key_value = KeyValue(
                key_cols
                    .iter()
                    .map(|c| {
                        key.get(c)
                            .cloned()
                            .ok_or_else(|| Error::Catalog(format!("missing key column {c}")))
                    })
                    .collect::<Result<Vec<_>>>()?,
            );
            let idx = catalog.indices.get_index(table, index)?;
            let handles = idx.lookup(&key_value)?;
            // The index has no delete support (spec.md §4.5): a
            // handle for a row deleted since the index was built is
            // still on the leaf, now pointing at a tombstone. Treat
            // that as a miss rather than surfacing the stale handle,
            // so an indexed lookup agrees with the non-indexed scan.
            let rel = catalog.tables.get_table(table)?;
            let mut live = Vec::with_capacity(handles.len());
            for handle in handles {
                if rel.is_live(handle)? {
                    live.push(handle);
                }
            }
            Ok((table.clone(), live))
        }
        Plan::Project { .. } => Err(Error::Catalog(
            "pipeline() does not evaluate Project nodes".into(),
        )),
    }
}

/// Fully materialise rows after projection: resolve the handles below
/// the top-level `Project`, then project each into the requested
/// columns.
pub fn evaluate(plan: &Plan, catalog: &mut Catalog) -> Result<(Vec<String>, Vec<Row>)> {
    match plan {
        Plan::Project { child, columns } => {
            let (table, handles) = pipeline(child, catalog)?;
            let rel = catalog.tables.get_table(&table)?;
            let out_columns = match columns {
                Some(cols) => cols.clone(),
                None => rel.column_names(),
            };
            let mut rows = Vec::with_capacity(handles.len());
            for handle in handles {
                rows.push(rel.project(handle, Some(&out_columns))?);
            }
            Ok((out_columns, rows))
        }
        _ => Err(Error::Catalog(
            "evaluate() expects a Project node at the root".into(),
        )),
    }
}

/// Rewrite pass: substitute an `IndexLookup` for a `Select` directly
/// over a `TableScan` whenever an index's key columns form a prefix of
/// the predicate (every key column is present in the WHERE map). The
/// residual predicate (WHERE entries the index doesn't cover) stays as
/// a `Select` above the `IndexLookup`, or is dropped if nothing is
/// left over.
pub fn optimize(plan: Plan, catalog: &mut Catalog) -> Result<Plan> {
    match plan {
        Plan::Project { child, columns } => Ok(Plan::Project {
            child: Box::new(optimize(*child, catalog)?),
            columns,
        }),
        Plan::Select { predicate, child } => {
            let child = optimize(*child, catalog)?;
            if let Plan::TableScan { table } = &child {
                for index_name in catalog.indices.usable_index_names(table)? {
                    let key_cols = catalog.indices.key_columns(table, &index_name)?;
                    if !key_cols.is_empty() && key_cols.iter().all(|c| predicate.contains_key(c)) {
                        let key: Row = key_cols
                            .iter()
                            .map(|c| (c.clone(), predicate[c].clone()))
                            .collect();
                        let residual: Row = predicate
                            .iter()
                            .filter(|(c, _)| !key_cols.contains(c))
                            .map(|(c, v)| (c.clone(), v.clone()))
                            .collect();
                        let lookup = Plan::IndexLookup {
                            table: table.clone(),
                            index: index_name,
                            key,
                        };
                        return Ok(if residual.is_empty() {
                            lookup
                        } else {
                            Plan::Select {
                                predicate: residual,
                                child: Box::new(lookup),
                            }
                        });
                    }
                }
            }
            Ok(Plan::Select {
                predicate,
                child: Box::new(child),
            })
        }
        other => Ok(other),
    }
}
