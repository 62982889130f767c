//! Query entry points.
//!
//! The [`Engine`] plans a statement against a [`Catalog`] and starts its
//! pipeline on the current Tokio runtime. Results arrive through a
//! [`QueryStream`]; the `collect` helpers drain that stream into typed rows.
//!
//! # Architecture
//!
//! ```text
//! SQL text ──parse_query──> Statement
//!                              |
//!               Engine::execute(stmt, &Catalog)
//!                              |
//!                  Planner (root cancellation scope)
//!                              |
//!           QueryStream { columns, rows, failure slot }
//!                              |
//!            collect::<T: FromRow>() / into_stream()
//! ```

mod error;
mod from_row;
mod stream;

pub use error::QueryError;
pub use from_row::{FromRow, FromValue, NamedRow};
pub use stream::QueryStream;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::catalog::Catalog;
use crate::executor::{
    ExecConfig, ExecutorError, ExprCompiler, Planner, Row, Scope, TableRegistry, wait_all,
};
use crate::source::Record;
use crate::sql::{Statement, parse_query};

/// Runs queries against catalogs.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: ExecConfig,
}

impl Engine {
    /// Creates an engine with the default [`ExecConfig`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an engine with `config`. Zero channel capacities are raised
    /// to one.
    pub fn with_config(config: ExecConfig) -> Self {
        Self {
            config: config.normalized(),
        }
    }

    pub fn config(&self) -> &ExecConfig {
        &self.config
    }

    /// Plans `stmt` and starts its pipeline.
    ///
    /// Must be called from within a Tokio runtime. Plan errors are returned
    /// here; runtime errors arrive as the last item of the stream.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError`] for unknown tables or columns, unsupported
    /// clauses, misplaced aggregates and other planning failures.
    pub fn execute(&self, stmt: &Statement, catalog: &Catalog) -> Result<QueryStream, ExecutorError> {
        self.execute_under(stmt, Arc::new(catalog.clone()), &CancellationToken::new())
    }

    /// Starts a query whose cancellation scope is a child of `parent`.
    pub(crate) fn execute_under(
        &self,
        stmt: &Statement,
        catalog: Arc<Catalog>,
        parent: &CancellationToken,
    ) -> Result<QueryStream, ExecutorError> {
        let scope = Scope::root(parent);
        let planner = Planner::new(catalog, self.config, scope.clone());
        match planner.plan(stmt) {
            Ok(planned) => {
                scope.start();
                debug!(columns = ?planned.columns, "query started");
                Ok(QueryStream::new(planned.columns, planned.rows, scope))
            }
            Err(err) => {
                debug!(error = %err, "planning failed");
                // Stops subqueries started before the failing clause.
                scope.cancel();
                Err(err)
            }
        }
    }

    /// Parses `sql` and starts its pipeline.
    pub fn execute_sql(&self, sql: &str, catalog: &Catalog) -> Result<QueryStream, QueryError> {
        let stmt = parse_query(sql)?;
        Ok(self.execute(&stmt, catalog)?)
    }

    /// Runs `sql` to completion and converts every row into `T`.
    pub async fn collect<T: FromRow>(&self, sql: &str, catalog: &Catalog) -> Result<Vec<T>, QueryError> {
        drain(self.execute_sql(sql, catalog)?).await
    }

    /// Blocking form of [`collect`](Self::collect) for callers outside an
    /// async context.
    ///
    /// Builds a single-threaded runtime for the duration of the call. Must
    /// not be called from within a Tokio runtime.
    pub fn collect_blocking<T: FromRow>(&self, sql: &str, catalog: &Catalog) -> Result<Vec<T>, QueryError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(QueryError::Runtime)?;
        runtime.block_on(self.collect(sql, catalog))
    }

    /// Returns clones of the records of `rows` that satisfy `condition`, in
    /// input order.
    ///
    /// `condition` is a WHERE expression over the records' fields, evaluated
    /// as in `SELECT * FROM t0 WHERE <condition>`. Only built-in functions
    /// are available, and subqueries see no tables.
    pub async fn filter<R: Record + Clone>(&self, condition: &str, rows: &[R]) -> Result<Vec<R>, QueryError> {
        let stmt = parse_query(&format!("SELECT * FROM t0 WHERE {}", condition))?;
        let condition = stmt
            .as_select()
            .and_then(|select| select.where_clause.as_ref())
            .ok_or_else(|| ExecutorError::Unsupported("filter condition must be an expression".to_string()))?;

        let scope = Scope::root(&CancellationToken::new());
        let planner = Planner::new(Arc::new(Catalog::new()), self.config, scope.clone());
        let mut registry = TableRegistry::new();
        registry.register("t0", R::schema())?;
        let mut gates = Vec::new();
        let compiled = ExprCompiler::new(&planner, &mut registry, &mut gates).compile(condition);

        let result = async {
            let condition = compiled?;
            scope.start();
            let ready = wait_all(&mut gates, &scope).await;
            scope.finished().await;
            if let Some(err) = scope.failure() {
                return Err(err.clone());
            }
            if !ready {
                return Err(ExecutorError::Cancelled);
            }
            let fields = registry.table(0).used_fields();
            let mut matched = Vec::new();
            for record in rows {
                let mut row = Row::new();
                for field in &fields {
                    row.insert(field.key.clone(), record.field(&field.field).unwrap_or_default());
                }
                if condition.is_satisfied(&row)? {
                    matched.push(record.clone());
                }
            }
            Ok::<_, ExecutorError>(matched)
        }
        .await;
        scope.cancel();
        Ok(result?)
    }
}

/// Drains `stream` into typed rows.
pub(crate) async fn drain<T: FromRow>(mut stream: QueryStream) -> Result<Vec<T>, QueryError> {
    let columns = stream.columns().to_vec();
    let mut out = Vec::new();
    while let Some(row) = stream.next().await {
        out.push(T::from_row(&columns, row?)?);
    }
    if stream.is_cancelled() {
        return Err(ExecutorError::Cancelled.into());
    }
    Ok(out)
}
