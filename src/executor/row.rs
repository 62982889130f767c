//! Intermediate row type flowing between pipeline stages.
//!
//! A [`Row`] maps a qualified column key (`table.field`, or a bare select
//! alias) to a value. Stages copy rows rather than share them, so a
//! downstream stage never observes a sibling branch's writes.

use std::collections::HashMap;

use crate::datum::Value;

use super::error::ExecutorError;

/// A single intermediate row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: HashMap<String, Value>,
    /// Finalized aggregate results, indexed by aggregate slot.
    ///
    /// Only populated on rows rendered by the group stage.
    pub(crate) aggregates: Vec<Value>,
}

impl Row {
    /// Creates an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the value under `key`, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Returns the value under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Returns true if the row has a value under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Reads the value under `key`, failing if the row has none.
    pub(crate) fn lookup(&self, key: &str) -> Result<Value, ExecutorError> {
        self.values
            .get(key)
            .cloned()
            .ok_or_else(|| ExecutorError::ColumnValueMissing {
                key: key.to_string(),
            })
    }

    /// Reads a finalized aggregate result.
    pub(crate) fn aggregate(&self, slot: usize) -> Result<Value, ExecutorError> {
        self.aggregates
            .get(slot)
            .cloned()
            .ok_or_else(|| ExecutorError::ColumnValueMissing {
                key: format!("aggregate #{slot}"),
            })
    }

    /// Returns the number of keyed values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the row has no keyed values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_missing() {
        let mut row = Row::new();
        row.insert("src.a", Value::Int64(1));
        assert_eq!(row.lookup("src.a").unwrap(), Value::Int64(1));
        assert_eq!(
            row.lookup("alias").unwrap_err(),
            ExecutorError::ColumnValueMissing {
                key: "alias".to_string()
            }
        );
    }

    #[test]
    fn test_clone_is_independent() {
        let mut left = Row::new();
        left.insert("t.a", Value::Int64(1));
        let mut copy = left.clone();
        copy.insert("u.b", Value::Int64(2));
        assert!(!left.contains("u.b"));
        assert_eq!(copy.len(), 2);
    }
}
