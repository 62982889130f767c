//! Named tables and functions visible to a query.
//!
//! A [`Catalog`] maps case-insensitive names to the record collections,
//! record streams and host functions a query may reference. Names keep
//! their original spelling for display; lookups lowercase the query side.
//!
//! Entries are reference-counted, so cloning a catalog is cheap and a clone
//! shares the underlying collections.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::executor::{ExecutorError, HostFunction};
use crate::source::{self, Record, RecordReceiver, RecordSet, Schema, Source, StreamSlot, StreamSource};

/// A named table registered in a [`Catalog`].
pub struct TableEntry {
    /// Name as registered.
    pub name: String,
    /// Field layout of the table's records.
    pub schema: Schema,
    kind: TableKind,
}

enum TableKind {
    Sequence(Arc<dyn RecordSet>),
    /// Streams have a single consumer; the receiver is taken on first open
    /// and returned if the query never read from it.
    Stream(Arc<StreamSlot>),
}

impl TableEntry {
    /// Opens a cursor over the table.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::SourceConsumed`] if the table is a stream
    /// that an earlier query already opened.
    pub fn open(&self) -> Result<Source, ExecutorError> {
        match &self.kind {
            TableKind::Sequence(set) => Ok(source::sequence(self.schema.clone(), set.clone())),
            TableKind::Stream(slot) => {
                let source = StreamSource::take(self.schema.clone(), slot).ok_or_else(|| {
                    ExecutorError::SourceConsumed {
                        name: self.name.clone(),
                    }
                })?;
                Ok(Source::Stream(source))
            }
        }
    }

    /// Returns true if the table is backed by a live stream.
    pub fn is_stream(&self) -> bool {
        matches!(self.kind, TableKind::Stream(_))
    }
}

/// Registry of named tables and host functions.
#[derive(Clone, Default)]
pub struct Catalog {
    tables: HashMap<String, Arc<TableEntry>>,
    functions: HashMap<String, Arc<HostFunction>>,
}

impl Catalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a collection of records as a table.
    pub fn add_table<R: Record>(&mut self, name: &str, rows: Vec<R>) -> &mut Self {
        self.insert_table(name, R::schema(), TableKind::Sequence(Arc::new(rows)))
    }

    /// Registers a single record as a one-row table.
    pub fn add_record<R: Record>(&mut self, name: &str, record: R) -> &mut Self {
        self.add_table(name, vec![record])
    }

    /// Registers a live stream of records as a table.
    ///
    /// A stream can be read by one query only.
    pub fn add_stream<R: Record>(&mut self, name: &str, rx: mpsc::Receiver<R>) -> &mut Self {
        let rx: Box<dyn RecordReceiver> = Box::new(rx);
        self.insert_table(name, R::schema(), TableKind::Stream(Arc::new(Mutex::new(Some(rx)))))
    }

    /// Registers a host function.
    pub fn add_function(&mut self, name: &str, function: HostFunction) -> &mut Self {
        self.functions
            .insert(name.to_lowercase(), Arc::new(function));
        self
    }

    /// Removes a table or function by name, returning true if one existed.
    pub fn remove(&mut self, name: &str) -> bool {
        let key = name.to_lowercase();
        let table = self.tables.remove(&key).is_some();
        let function = self.functions.remove(&key).is_some();
        table || function
    }

    /// Looks up a table by case-insensitive name.
    pub fn table(&self, name: &str) -> Option<&Arc<TableEntry>> {
        self.tables.get(&name.to_lowercase())
    }

    /// Looks up a host function by case-insensitive name.
    pub fn function(&self, name: &str) -> Option<&Arc<HostFunction>> {
        self.functions.get(&name.to_lowercase())
    }

    /// Returns the registered table names, sorted.
    pub fn table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.values().map(|t| t.name.as_str()).collect();
        names.sort_unstable();
        names
    }

    fn insert_table(&mut self, name: &str, schema: Schema, kind: TableKind) -> &mut Self {
        let entry = TableEntry {
            name: name.to_string(),
            schema,
            kind,
        };
        self.tables.insert(name.to_lowercase(), Arc::new(entry));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct Foo {
        a: i64,
    }
    crate::impl_record!(Foo { a });

    #[test]
    fn test_lookup_is_case_insensitive() {
        let mut catalog = Catalog::new();
        catalog.add_table("Src", vec![Foo { a: 1 }]);
        let entry = catalog.table("SRC").unwrap();
        assert_eq!(entry.name, "Src");
        assert_eq!(catalog.table_names(), vec!["Src"]);
    }

    #[test]
    fn test_remove() {
        let mut catalog = Catalog::new();
        catalog.add_record("one", Foo { a: 1 });
        assert!(catalog.remove("ONE"));
        assert!(!catalog.remove("one"));
        assert!(catalog.table("one").is_none());
    }

    #[test]
    fn test_stream_opens_once() {
        let (_tx, rx) = mpsc::channel::<Foo>(1);
        let mut catalog = Catalog::new();
        catalog.add_stream("live", rx);
        let entry = catalog.table("live").unwrap();
        assert!(entry.is_stream());
        let first = entry.open();
        assert!(first.is_ok());
        assert!(matches!(
            entry.open(),
            Err(ExecutorError::SourceConsumed { .. })
        ));
        // Never read, so the stream is available again.
        drop(first);
        assert!(entry.open().is_ok());
    }
}
