//! UNION [ALL] merge stage.
//!
//! Both sides run as independent sub-pipelines. The merge stage forwards
//! rows from whichever side has one ready, without deduplication, and
//! closes once both sides are exhausted. A failure on either side fails the
//! whole query, which stops the other side too.

use tokio::sync::mpsc;
use tracing::debug;

use crate::datum::Value;
use crate::sql::{SetOperator, Statement};

use super::error::ExecutorError;
use super::pipeline::Scope;
use super::plan::{PlannedQuery, Planner};

/// Plans `left <op> right`.
pub(crate) fn plan(
    planner: &Planner,
    op: SetOperator,
    left: &Statement,
    right: &Statement,
) -> Result<PlannedQuery, ExecutorError> {
    if op != SetOperator::Union {
        return Err(ExecutorError::NotImplemented(op.as_str().to_string()));
    }
    let left = planner.child().plan(left)?;
    let right = planner.child().plan(right)?;
    if left.columns.len() != right.columns.len() {
        return Err(ExecutorError::ColumnCountMismatch {
            left: left.columns.len(),
            right: right.columns.len(),
        });
    }

    let (tx, rx) = mpsc::channel(planner.config().output_capacity);
    let scope = planner.scope().clone();
    scope.clone().spawn("union", merge(left.rows, right.rows, tx, scope));
    Ok(PlannedQuery {
        columns: left.columns,
        rows: rx,
    })
}

async fn merge(
    mut left: mpsc::Receiver<Vec<Value>>,
    mut right: mpsc::Receiver<Vec<Value>>,
    tx: mpsc::Sender<Vec<Value>>,
    scope: Scope,
) {
    debug!("union stage started");
    let mut left_open = true;
    let mut right_open = true;
    while left_open || right_open {
        let row = tokio::select! {
            _ = scope.token().cancelled() => return,
            row = left.recv(), if left_open => match row {
                Some(row) => row,
                None => {
                    left_open = false;
                    continue;
                }
            },
            row = right.recv(), if right_open => match row {
                Some(row) => row,
                None => {
                    right_open = false;
                    continue;
                }
            },
        };
        // A side that failed under a window closes without cancelling.
        if scope.is_stopped() {
            return;
        }
        if !scope.send(&tx, row).await {
            return;
        }
    }
    debug!("union stage finished");
}
