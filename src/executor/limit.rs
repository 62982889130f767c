//! LIMIT/OFFSET windowing and the output stage.
//!
//! The output stage is the last stage of every SELECT pipeline. It strips
//! the intermediate rows down to their output values, skips the OFFSET rows
//! and, once LIMIT rows were forwarded, cancels the upstream scope so the
//! producers stop instead of running to completion.
//!
//! A failure upstream of a window is pending until the window decides: it
//! fails the query if the input ends before LIMIT rows were forwarded and
//! is dropped otherwise.

use tokio::sync::mpsc;
use tracing::debug;

use crate::datum::Value;
use crate::sql::Expr;

use super::error::ExecutorError;
use super::pipeline::{Scope, drain};
use super::project::Projected;

/// The LIMIT/OFFSET window of a query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Window {
    pub offset: usize,
    pub limit: Option<usize>,
}

impl Window {
    /// Builds the window from the LIMIT and OFFSET clauses.
    ///
    /// Both must be non-negative integer literals.
    pub fn new(limit: Option<&Expr>, offset: Option<&Expr>) -> Result<Self, ExecutorError> {
        Ok(Self {
            offset: offset.map(|e| count(e, "OFFSET")).transpose()?.unwrap_or(0),
            limit: limit.map(|e| count(e, "LIMIT")).transpose()?,
        })
    }

    /// Returns true if the window can drop rows.
    pub fn is_bounded(&self) -> bool {
        self.offset > 0 || self.limit.is_some()
    }
}

fn count(expr: &Expr, clause: &str) -> Result<usize, ExecutorError> {
    match expr {
        Expr::Integer(n) => usize::try_from(*n).map_err(|_| {
            ExecutorError::Unsupported(format!("{} must not be negative", clause))
        }),
        _ => Err(ExecutorError::Unsupported(format!(
            "{} must be an integer literal",
            clause
        ))),
    }
}

/// Spawns the output stage.
///
/// `upstream` is the scope the producing stages run in. It is cancelled
/// once the window is filled.
pub(crate) fn spawn(
    mut input: mpsc::Receiver<Projected>,
    window: Window,
    upstream: Scope,
    scope: Scope,
    capacity: usize,
) -> mpsc::Receiver<Vec<Value>> {
    let (tx, rx) = mpsc::channel(capacity);
    scope.clone().spawn("limit", async move {
        if window.limit == Some(0) {
            upstream.cancel();
            drain(input);
            return;
        }

        let mut skipped = 0;
        let mut sent = 0;
        while let Some(p) = scope.recv(&mut input).await {
            if skipped < window.offset {
                skipped += 1;
                continue;
            }
            if !scope.send(&tx, p.values).await {
                return;
            }
            sent += 1;
            if window.limit == Some(sent) {
                debug!(rows = sent, "limit reached");
                upstream.cancel();
                drain(input);
                return;
            }
        }
        if !window.is_bounded() {
            return;
        }
        // The input ended, so nothing upstream can matter any more. A
        // panicking stage may close its output before recording its failure.
        upstream.cancel();
        upstream.finished().await;
        if let Some(err) = upstream.pending()
            && !scope.is_cancelled()
        {
            scope.abort("limit", err.clone());
        }
    });
    rx
}
