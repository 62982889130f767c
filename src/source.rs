//! Record sources.
//!
//! A record source wraps one table-like object for the executor. It exposes
//! the table's visible fields, a cursor over its records, and by-name field
//! access on the current record. Two shapes exist:
//!
//! - [`SequenceSource`]: a fixed, revisitable collection (`Vec<R>`).
//! - [`StreamSource`]: a single-pass stream of records that can capture what
//!   it reads so later passes replay the captured records.

mod sequence;
mod stream;

pub use sequence::SequenceSource;
pub use stream::{RecordReceiver, StreamSource, ValuesRecord};
pub(crate) use stream::{RowReceiver, StreamSlot};

use std::sync::Arc;

use crate::datum::Value;

/// Field layout of a record type.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    /// Visible field names in declaration order.
    pub fields: Vec<String>,
    /// True if the record type has fields the engine cannot see.
    ///
    /// Selecting `*` over such a table is rejected.
    pub has_private_fields: bool,
}

impl Schema {
    /// Creates a schema with the given visible fields.
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            has_private_fields: false,
        }
    }

    /// Marks whether the record type carries non-visible fields.
    pub fn private_fields(mut self, has_private_fields: bool) -> Self {
        self.has_private_fields = has_private_fields;
        self
    }

    /// Finds a visible field by case-insensitive name, returning its
    /// declared spelling.
    pub fn find(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.eq_ignore_ascii_case(name))
            .map(String::as_str)
    }
}

/// A record the engine can read fields from.
///
/// Implement it with [`impl_record!`](crate::impl_record) for plain structs.
pub trait Record: Send + Sync + 'static {
    /// Returns the field layout shared by every record of this type.
    fn schema() -> Schema
    where
        Self: Sized;

    /// Returns the value of a visible field by its declared name.
    fn field(&self, name: &str) -> Option<Value>;
}

/// A fixed, indexable collection of records.
pub trait RecordSet: Send + Sync + 'static {
    /// Returns the number of records.
    fn len(&self) -> usize;

    /// Returns true if the collection holds no records.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the record at `index`.
    fn get(&self, index: usize) -> Option<&dyn Record>;
}

impl<R: Record> RecordSet for Vec<R> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn get(&self, index: usize) -> Option<&dyn Record> {
        self.as_slice().get(index).map(|r| r as &dyn Record)
    }
}

/// Implements [`Record`] for a struct by listing its visible fields.
///
/// Every listed field must be `Clone` and convertible into a
/// [`Value`](crate::Value). A trailing `..` marks the struct as having
/// private fields, which forbids `SELECT *` over it.
///
/// ```
/// struct Foo {
///     a: i64,
///     b: String,
/// }
/// loupe::impl_record!(Foo { a, b });
/// ```
#[macro_export]
macro_rules! impl_record {
    (@impl $ty:ty, $private:expr, $($field:ident),*) => {
        impl $crate::Record for $ty {
            fn schema() -> $crate::Schema {
                $crate::Schema::new([$(stringify!($field)),*]).private_fields($private)
            }

            fn field(&self, name: &str) -> Option<$crate::Value> {
                match name {
                    $(stringify!($field) => Some($crate::Value::from(self.$field.clone())),)*
                    _ => None,
                }
            }
        }
    };
    ($ty:ty { $($field:ident),+ , .. }) => {
        $crate::impl_record!(@impl $ty, true, $($field),+);
    };
    ($ty:ty { $($field:ident),+ $(,)? }) => {
        $crate::impl_record!(@impl $ty, false, $($field),+);
    };
}

/// An open cursor over one table of a query.
pub enum Source {
    /// Revisitable in-memory collection.
    Sequence(SequenceSource),
    /// Single-pass stream, optionally captured for replay.
    Stream(StreamSource),
}

impl Source {
    /// Returns the field layout of the underlying records.
    pub fn schema(&self) -> &Schema {
        match self {
            Source::Sequence(s) => s.schema(),
            Source::Stream(s) => s.schema(),
        }
    }

    /// Returns the advertised cost of one pass over the source.
    ///
    /// A join stage captures right-hand sources whose cost exceeds the
    /// configured threshold, so repeated passes replay memory instead.
    pub fn cost_hint(&self) -> usize {
        match self {
            Source::Sequence(_) => sequence::COST_HINT,
            Source::Stream(_) => stream::COST_HINT,
        }
    }

    /// Enables capture of records read on the first pass.
    pub fn set_multi_pass(&mut self, multi_pass: bool) {
        if let Source::Stream(s) = self {
            s.set_multi_pass(multi_pass);
        }
    }

    /// Restarts iteration from the first record.
    pub fn rewind(&mut self) {
        match self {
            Source::Sequence(s) => s.rewind(),
            Source::Stream(s) => s.rewind(),
        }
    }

    /// Moves to the next record, returning false when the pass is exhausted.
    pub async fn advance(&mut self) -> bool {
        match self {
            Source::Sequence(s) => s.advance(),
            Source::Stream(s) => s.advance().await,
        }
    }

    /// Returns the record the cursor is positioned on.
    pub fn current(&self) -> Option<&dyn Record> {
        match self {
            Source::Sequence(s) => s.current(),
            Source::Stream(s) => s.current(),
        }
    }

    /// Reads a field of the current record, yielding NULL when the cursor is
    /// not positioned or the record lacks the field.
    pub fn value(&self, field: &str) -> Value {
        self.current()
            .and_then(|r| r.field(field))
            .unwrap_or(Value::Null)
    }
}

/// Builds a sequence source over a shared record set.
pub(crate) fn sequence(schema: Schema, set: Arc<dyn RecordSet>) -> Source {
    Source::Sequence(SequenceSource::new(schema, set))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct Foo {
        a: i64,
        b: String,
    }
    crate::impl_record!(Foo { a, b });

    #[allow(dead_code)]
    struct Secret {
        a: i64,
        hidden: bool,
    }
    crate::impl_record!(Secret { a, .. });

    #[test]
    fn test_impl_record_schema() {
        let schema = Foo::schema();
        assert_eq!(schema.fields, vec!["a", "b"]);
        assert!(!schema.has_private_fields);
        assert!(Secret::schema().has_private_fields);
    }

    #[test]
    fn test_impl_record_field() {
        let foo = Foo {
            a: 1,
            b: "x".to_string(),
        };
        assert_eq!(foo.field("a"), Some(Value::Int64(1)));
        assert_eq!(foo.field("b"), Some(Value::from("x")));
        assert_eq!(foo.field("c"), None);
    }

    #[test]
    fn test_schema_find_case_insensitive() {
        let schema = Schema::new(["A", "B"]);
        assert_eq!(schema.find("a"), Some("A"));
        assert_eq!(schema.find("c"), None);
    }

    #[tokio::test]
    async fn test_sequence_source_rewind() {
        let rows = vec![
            Foo {
                a: 1,
                b: "x".to_string(),
            },
            Foo {
                a: 2,
                b: "y".to_string(),
            },
        ];
        let mut source = sequence(Foo::schema(), Arc::new(rows));
        assert_eq!(source.cost_hint(), 2);

        let mut seen = Vec::new();
        while source.advance().await {
            seen.push(source.value("a"));
        }
        source.rewind();
        assert!(source.advance().await);
        assert_eq!(source.value("a"), Value::Int64(1));
        assert_eq!(seen, vec![Value::Int64(1), Value::Int64(2)]);
    }
}
