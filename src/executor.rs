//! Query executor: compiles SELECT statements into pipelines of concurrent
//! stages and runs them.
//!
//! # Architecture
//!
//! ```text
//! Statement
//!       |
//! [Planner] -- resolves tables via Catalog, compiles clauses to BoundExpr
//!       |
//! Pipeline (one tokio task per stage, bounded mpsc channels between them):
//!   seed ── join ── join ── filter ── projection | group ── sort ── output
//!              ^                                                     |
//!        subquery pipelines                                 Vec<Value> rows
//! ```
//!
//! # Components
//!
//! - `plan`: statement planning and stage wiring
//! - `expr` / `eval`: expression compilation and evaluation
//! - `join`, `group`, `sort`, `limit`, `union`: pipeline stages
//! - `pipeline`: cancellation scope and the failure slot shared by stages
//! - `registry`: per-query table and alias resolution

mod aggregate;
mod error;
mod eval;
mod expr;
mod function;
mod group;
mod join;
mod limit;
mod pipeline;
mod plan;
mod project;
mod registry;
mod row;
mod sort;
mod subquery;
mod union;

pub use aggregate::AggregateFunction;
pub use error::ExecutorError;
pub use function::{HostFunction, Signature};
pub use plan::ExecConfig;
pub use row::Row;

pub(crate) use expr::ExprCompiler;
pub(crate) use pipeline::Scope;
pub(crate) use plan::Planner;
pub(crate) use registry::TableRegistry;
pub(crate) use subquery::wait_all;
