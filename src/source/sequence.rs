//! Revisitable sequence source.

use std::sync::Arc;

use super::{Record, RecordSet, Schema};

/// Cost of one pass over an in-memory sequence.
pub(super) const COST_HINT: usize = 2;

/// Cursor over a fixed collection of records.
///
/// The collection is shared, so any number of queries (and any number of
/// passes within one join) can walk it independently.
pub struct SequenceSource {
    schema: Schema,
    set: Arc<dyn RecordSet>,
    /// One past the current record; zero before the first `advance`.
    pos: usize,
}

impl SequenceSource {
    /// Creates a cursor positioned before the first record.
    pub fn new(schema: Schema, set: Arc<dyn RecordSet>) -> Self {
        Self {
            schema,
            set,
            pos: 0,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn rewind(&mut self) {
        self.pos = 0;
    }

    pub fn advance(&mut self) -> bool {
        if self.pos < self.set.len() {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub fn current(&self) -> Option<&dyn Record> {
        self.pos.checked_sub(1).and_then(|i| self.set.get(i))
    }
}
