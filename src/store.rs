//! Shared, process-wide registry of tables and functions.
//!
//! A [`Store`] owns a [`Catalog`] that many callers add to, remove from and
//! query concurrently. Queries run against a snapshot of the catalog taken
//! when they start, so later changes do not affect running queries.
//! Closing the store cancels every query started from it.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::catalog::Catalog;
use crate::engine::{Engine, FromRow, QueryError, QueryStream, drain};
use crate::executor::{ExecConfig, ExecutorError, HostFunction};
use crate::source::Record;
use crate::sql::parse_query;

/// A catalog shared between queries.
pub struct Store {
    catalog: RwLock<Catalog>,
    engine: Engine,
    cancel_token: CancellationToken,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self::with_config(ExecConfig::default())
    }

    pub fn with_config(config: ExecConfig) -> Self {
        Self {
            catalog: RwLock::new(Catalog::new()),
            engine: Engine::with_config(config),
            cancel_token: CancellationToken::new(),
        }
    }

    /// Registers a collection of records as a table, replacing any table of
    /// the same name.
    pub fn add_table<R: Record>(&self, name: &str, rows: Vec<R>) {
        self.catalog.write().add_table(name, rows);
    }

    /// Registers a single record as a one-row table.
    pub fn add_record<R: Record>(&self, name: &str, record: R) {
        self.catalog.write().add_record(name, record);
    }

    /// Registers a live stream of records as a table.
    pub fn add_stream<R: Record>(&self, name: &str, rx: mpsc::Receiver<R>) {
        self.catalog.write().add_stream(name, rx);
    }

    /// Registers a host function.
    pub fn add_function(&self, name: &str, function: HostFunction) {
        self.catalog.write().add_function(name, function);
    }

    /// Removes a table or function, returning true if one existed.
    pub fn delete(&self, name: &str) -> bool {
        self.catalog.write().remove(name)
    }

    /// Returns the registered table names, sorted.
    pub fn table_names(&self) -> Vec<String> {
        self.catalog
            .read()
            .table_names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Parses `sql` and starts it against a snapshot of the catalog.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn query(&self, sql: &str) -> Result<QueryStream, QueryError> {
        if self.is_closed() {
            return Err(ExecutorError::Cancelled.into());
        }
        let stmt = parse_query(sql)?;
        let catalog = Arc::new(self.catalog.read().clone());
        Ok(self.engine.execute_under(&stmt, catalog, &self.cancel_token)?)
    }

    /// Runs `sql` to completion and converts every row into `T`.
    pub async fn collect<T: FromRow>(&self, sql: &str) -> Result<Vec<T>, QueryError> {
        drain(self.query(sql)?).await
    }

    /// Cancels every running query and rejects new ones.
    pub fn close(&self) {
        debug!("closing store");
        self.cancel_token.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}
