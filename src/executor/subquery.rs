//! Nested queries.
//!
//! A nested query runs as its own sub-pipeline under a child scope of the
//! enclosing query, so its failure fails the whole query and cancelling the
//! enclosing query stops it.
//!
//! - `IN (SELECT ...)` collects the nested query's single column into a
//!   value list. The list is published through a [`SubqueryGate`]; the
//!   outer pipeline waits on every gate before it produces its first row.
//! - `FROM (SELECT ...)` presents the nested query's output as a stream
//!   source whose fields are the nested query's column names.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::datum::Value;
use crate::source::{RecordReceiver, RowReceiver, Schema, Source, StreamSource};
use crate::sql::Statement;

use super::error::ExecutorError;
use super::pipeline::Scope;
use super::plan::Planner;

type GateValue = Option<Arc<Vec<Value>>>;

/// Read side of a running `IN (SELECT ...)` subquery.
#[derive(Debug, Clone)]
pub(crate) struct SubqueryGate {
    rx: watch::Receiver<GateValue>,
}

impl SubqueryGate {
    /// Waits until the value list is published.
    ///
    /// Returns false if the subquery stopped without publishing, which only
    /// happens when the query was cancelled or failed.
    pub async fn ready(&mut self) -> bool {
        self.rx.wait_for(Option::is_some).await.is_ok()
    }

    /// Returns the published value list.
    pub fn values(&self) -> Result<Arc<Vec<Value>>, ExecutorError> {
        self.rx.borrow().clone().ok_or_else(|| {
            ExecutorError::Unsupported("subquery result read before it completed".to_string())
        })
    }

    #[cfg(test)]
    pub(crate) fn resolved(values: Vec<Value>) -> Self {
        let (_tx, rx) = watch::channel(Some(Arc::new(values)));
        Self { rx }
    }
}

/// Waits until every gate has its values.
///
/// Returns false if `scope` is cancelled first or a subquery stopped
/// without publishing.
pub(crate) async fn wait_all(gates: &mut [SubqueryGate], scope: &Scope) -> bool {
    for gate in gates {
        let ready = tokio::select! {
            biased;
            _ = scope.token().cancelled() => false,
            ready = gate.ready() => ready,
        };
        if !ready {
            return false;
        }
    }
    true
}

/// Starts an `IN (SELECT ...)` subquery and returns its gate.
pub(crate) fn start_list(planner: &Planner, stmt: &Statement) -> Result<SubqueryGate, ExecutorError> {
    let nested = planner.child();
    let output = nested.plan(stmt)?;
    if output.columns.len() != 1 {
        return Err(ExecutorError::Unsupported(format!(
            "subquery in IN must return one column, got {}",
            output.columns.len()
        )));
    }

    let (tx, rx) = watch::channel(None);
    let scope = nested.scope().clone();
    let mut rows = output.rows;
    scope.clone().spawn("subquery", async move {
        let mut values = Vec::new();
        while let Some(row) = scope.recv(&mut rows).await {
            values.extend(row.into_iter().next());
        }
        if scope.is_stopped() {
            return;
        }
        debug!(values = values.len(), "subquery list ready");
        // Receivers may already be gone if the outer query finished.
        let _ = tx.send(Some(Arc::new(values)));
    });
    Ok(SubqueryGate { rx })
}

/// Starts a `FROM (SELECT ...)` subquery and returns it as a stream source.
pub(crate) fn open_source(planner: &Planner, stmt: &Statement) -> Result<Source, ExecutorError> {
    let nested = planner.child();
    let output = nested.plan(stmt)?;
    let fields: Arc<[String]> = output.columns.iter().cloned().collect();
    let receiver: Box<dyn RecordReceiver> = Box::new(RowReceiver::new(fields, output.rows));
    Ok(Source::Stream(StreamSource::new(
        Schema::new(output.columns),
        receiver,
    )))
}
