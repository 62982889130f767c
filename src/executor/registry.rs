//! Per-query table registry.
//!
//! The registry maps each table name or alias of a query's FROM clause to
//! its field layout, and records which fields the compiled expressions
//! actually reference. Join stages copy only those fields into rows.
//!
//! Column references resolve in two steps:
//!
//! 1. A qualified reference (`t.a`) must name a registered table and one of
//!    its visible fields.
//! 2. An unqualified reference checks the select aliases (when the caller
//!    allows them), then scans the tables in sorted-name order and takes the
//!    first table with a matching field. Ambiguous references resolve to
//!    that first match without an error.

use std::collections::{BTreeMap, HashMap};

use crate::source::Schema;

use super::error::ExecutorError;

/// One table reference of the query.
#[derive(Debug, Clone)]
pub(crate) struct SrcTable {
    /// Lowercase name or alias; the prefix of this table's row keys.
    pub name: String,
    /// Field layout of the table's records.
    pub schema: Schema,
    used: Vec<bool>,
}

/// A field a join stage must copy into rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UsedField {
    /// Declared field name on the record.
    pub field: String,
    /// Row key the value is stored under.
    pub key: String,
}

impl SrcTable {
    fn key(&self, field: &str) -> String {
        format!("{}.{}", self.name, field)
    }

    /// Returns the referenced fields in declaration order.
    pub fn used_fields(&self) -> Vec<UsedField> {
        self.schema
            .fields
            .iter()
            .zip(&self.used)
            .filter(|(_, used)| **used)
            .map(|(field, _)| UsedField {
                field: field.clone(),
                key: self.key(field),
            })
            .collect()
    }

    fn mark(&mut self, field: &str) -> Option<String> {
        let idx = self
            .schema
            .fields
            .iter()
            .position(|f| f.eq_ignore_ascii_case(field))?;
        self.used[idx] = true;
        Some(self.key(&self.schema.fields[idx]))
    }
}

/// A column produced by a wildcard expansion.
#[derive(Debug, Clone)]
pub(crate) struct ExpandedColumn {
    /// Output column name (the declared field name).
    pub name: String,
    /// Row key holding the value.
    pub key: String,
}

/// Table and alias bookkeeping for one query.
#[derive(Debug, Default)]
pub(crate) struct TableRegistry {
    /// Tables in FROM order.
    tables: Vec<SrcTable>,
    /// Lowercase name to index, iterated in sorted order.
    by_name: BTreeMap<String, usize>,
    /// Lowercase select alias to its row key.
    aliases: HashMap<String, String>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table under `name`, returning its index.
    pub fn register(&mut self, name: &str, schema: Schema) -> Result<usize, ExecutorError> {
        let name = name.to_lowercase();
        if self.by_name.contains_key(&name) {
            return Err(ExecutorError::Unsupported(format!(
                "table name \"{}\" specified more than once",
                name
            )));
        }
        let idx = self.tables.len();
        self.by_name.insert(name.clone(), idx);
        self.tables.push(SrcTable {
            name,
            used: vec![false; schema.fields.len()],
            schema,
        });
        Ok(idx)
    }

    /// Registers a select alias, returning the row key its value uses.
    pub fn add_alias(&mut self, alias: &str) -> String {
        let key = alias.to_lowercase();
        self.aliases.insert(key.clone(), key.clone());
        key
    }

    /// Returns the table at `idx`.
    pub fn table(&self, idx: usize) -> &SrcTable {
        &self.tables[idx]
    }

    /// Returns all tables in FROM order.
    pub fn tables(&self) -> &[SrcTable] {
        &self.tables
    }

    /// Resolves a column reference to a row key, marking the field as used.
    pub fn resolve(
        &mut self,
        table: Option<&str>,
        column: &str,
        allow_aliases: bool,
    ) -> Result<String, ExecutorError> {
        if let Some(table) = table {
            let table = table.to_lowercase();
            let idx = *self
                .by_name
                .get(&table)
                .ok_or_else(|| ExecutorError::TableNotFound {
                    name: table.clone(),
                })?;
            return self.tables[idx]
                .mark(column)
                .ok_or_else(|| ExecutorError::ColumnNotFound {
                    name: format!("{}.{}", table, column),
                });
        }

        if allow_aliases && let Some(key) = self.aliases.get(&column.to_lowercase()) {
            return Ok(key.clone());
        }

        for &idx in self.by_name.values() {
            if let Some(key) = self.tables[idx].mark(column) {
                return Ok(key);
            }
        }
        Err(ExecutorError::ColumnNotFound {
            name: column.to_string(),
        })
    }

    /// Expands `*` (or `table.*`) into columns, marking every field used.
    pub fn expand_wildcard(
        &mut self,
        qualifier: Option<&str>,
    ) -> Result<Vec<ExpandedColumn>, ExecutorError> {
        let indices: Vec<usize> = match qualifier {
            Some(table) => {
                let idx = *self.by_name.get(&table.to_lowercase()).ok_or_else(|| {
                    ExecutorError::TableNotFound {
                        name: table.to_string(),
                    }
                })?;
                vec![idx]
            }
            None => (0..self.tables.len()).collect(),
        };

        let mut columns = Vec::new();
        for idx in indices {
            let table = &mut self.tables[idx];
            if table.schema.has_private_fields {
                return Err(ExecutorError::PrivateFields {
                    table: table.name.clone(),
                });
            }
            table.used.iter_mut().for_each(|u| *u = true);
            columns.extend(table.schema.fields.iter().map(|field| ExpandedColumn {
                name: field.clone(),
                key: table.key(field),
            }));
        }
        Ok(columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TableRegistry {
        let mut reg = TableRegistry::new();
        reg.register("second", Schema::new(["A", "B"])).unwrap();
        reg.register("first", Schema::new(["A", "C"])).unwrap();
        reg
    }

    #[test]
    fn test_qualified_resolution() {
        let mut reg = registry();
        assert_eq!(reg.resolve(Some("SECOND"), "b", false).unwrap(), "second.B");
        assert!(matches!(
            reg.resolve(Some("first"), "b", false),
            Err(ExecutorError::ColumnNotFound { .. })
        ));
        assert!(matches!(
            reg.resolve(Some("third"), "a", false),
            Err(ExecutorError::TableNotFound { .. })
        ));
    }

    #[test]
    fn test_ambiguous_resolves_in_sorted_order() {
        let mut reg = registry();
        // "first" sorts before "second" even though it was registered later.
        assert_eq!(reg.resolve(None, "a", false).unwrap(), "first.A");
    }

    #[test]
    fn test_used_fields() {
        let mut reg = registry();
        reg.resolve(None, "c", false).unwrap();
        let used = reg.table(1).used_fields();
        assert_eq!(
            used,
            vec![UsedField {
                field: "C".to_string(),
                key: "first.C".to_string()
            }]
        );
        assert!(reg.table(0).used_fields().is_empty());
    }

    #[test]
    fn test_alias_shadowing() {
        let mut reg = registry();
        reg.add_alias("B");
        assert_eq!(reg.resolve(None, "b", true).unwrap(), "b");
        assert_eq!(reg.resolve(None, "b", false).unwrap(), "second.B");
    }

    #[test]
    fn test_wildcard_private_fields() {
        let mut reg = TableRegistry::new();
        reg.register("t", Schema::new(["a"]).private_fields(true))
            .unwrap();
        assert!(matches!(
            reg.expand_wildcard(None),
            Err(ExecutorError::PrivateFields { .. })
        ));
    }

    #[test]
    fn test_duplicate_table_name() {
        let mut reg = registry();
        assert!(reg.register("First", Schema::new(["x"])).is_err());
    }
}
