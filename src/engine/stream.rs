//! Result stream of a running query.

use futures_util::Stream;
use tokio::sync::mpsc;
use tracing::debug;

use crate::datum::Value;
use crate::executor::{ExecutorError, Scope};

/// Rows of a running query.
///
/// Column names are known before the first row arrives. The stream yields
/// rows in pipeline order; if the query fails, the failure is yielded once
/// as the final item. Dropping the stream cancels the query.
pub struct QueryStream {
    columns: Vec<String>,
    rows: mpsc::Receiver<Vec<Value>>,
    scope: Scope,
    done: bool,
}

impl QueryStream {
    pub(crate) fn new(columns: Vec<String>, rows: mpsc::Receiver<Vec<Value>>, scope: Scope) -> Self {
        Self {
            columns,
            rows,
            scope,
            done: false,
        }
    }

    /// Returns the output column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the next row, the query's failure, or `None` at the end.
    pub async fn next(&mut self) -> Option<Result<Vec<Value>, ExecutorError>> {
        if self.done {
            return None;
        }
        match self.scope.recv(&mut self.rows).await {
            Some(row) => Some(Ok(row)),
            None => {
                self.scope.finished().await;
                self.done = true;
                self.scope.failure().cloned().map(Err)
            }
        }
    }

    /// Stops the query. Rows already produced may still be skipped.
    pub fn cancel(&self) {
        debug!("query cancelled by consumer");
        self.scope.cancel();
    }

    /// Returns true if the query was cancelled, by the consumer, by the
    /// owning store, or because it failed.
    pub fn is_cancelled(&self) -> bool {
        self.scope.is_cancelled()
    }

    /// Converts into a [`Stream`] of rows.
    pub fn into_stream(self) -> impl Stream<Item = Result<Vec<Value>, ExecutorError>> {
        futures_util::stream::unfold(self, |mut stream| async move {
            let item = stream.next().await?;
            Some((item, stream))
        })
    }
}

impl Drop for QueryStream {
    fn drop(&mut self) {
        self.scope.cancel();
    }
}
