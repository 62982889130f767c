//! Embedded SQL SELECT engine over in-process record collections.
//!
//! Register collections, single records, record streams and host functions
//! in a [`Catalog`], then query them with SQL:
//!
//! ```
//! use loupe::{Catalog, Engine, Value};
//!
//! #[derive(Clone)]
//! struct Foo {
//!     a: i64,
//!     b: String,
//! }
//! loupe::impl_record!(Foo { a, b });
//!
//! let mut catalog = Catalog::new();
//! catalog.add_table(
//!     "src",
//!     vec![
//!         Foo { a: 1, b: "hello".into() },
//!         Foo { a: 2, b: "world".into() },
//!     ],
//! );
//! let rows: Vec<Vec<Value>> = Engine::new()
//!     .collect_blocking("SELECT b FROM src WHERE a > 1", &catalog)
//!     .unwrap();
//! assert_eq!(rows, vec![vec![Value::from("world")]]);
//! ```
//!
//! Every query runs as a pipeline of Tokio tasks. [`Engine::execute`] and
//! [`Store::query`] return a [`QueryStream`] that yields rows as they are
//! produced.

pub mod catalog;
pub mod datum;
pub mod engine;
pub mod executor;
pub mod source;
pub mod sql;
pub mod store;

pub use catalog::Catalog;
pub use datum::{Type, Value};
pub use engine::{Engine, FromRow, FromValue, NamedRow, QueryError, QueryStream};
pub use executor::{ExecConfig, ExecutorError, HostFunction, Signature};
pub use source::{Record, RecordSet, Schema};
pub use sql::{SyntaxError, parse_query};
pub use store::Store;
