//! ORDER BY stage.
//!
//! A full barrier: the stage buffers every projected row, evaluates the
//! ORDER BY terms once per row, sorts stably and then emits in order. Terms
//! compare with the same rules as WHERE comparisons, except that NULL keys
//! are ordered (last for ascending terms, first for descending ones, unless
//! NULLS FIRST/LAST says otherwise). The first failing comparison fails the
//! whole query.

use std::cmp::Ordering;

use tokio::sync::mpsc;
use tracing::debug;

use crate::datum::Value;
use crate::sql::{NullOrdering, SortDirection};

use super::error::ExecutorError;
use super::eval::compare_values;
use super::expr::BoundExpr;
use super::pipeline::{Scope, drain};
use super::project::Projected;

/// One compiled ORDER BY term.
#[derive(Debug)]
pub(crate) struct SortKey {
    pub expr: BoundExpr,
    pub direction: SortDirection,
    pub nulls: NullOrdering,
}

impl SortKey {
    fn nulls_first(&self) -> bool {
        match self.nulls {
            NullOrdering::First => true,
            NullOrdering::Last => false,
            NullOrdering::Default => self.direction == SortDirection::Desc,
        }
    }

    fn compare(&self, a: &Value, b: &Value) -> Result<Ordering, ExecutorError> {
        let nulls_first = self.nulls_first();
        let ord = match (a.is_null(), b.is_null()) {
            (true, true) => return Ok(Ordering::Equal),
            (true, false) if nulls_first => return Ok(Ordering::Less),
            (true, false) => return Ok(Ordering::Greater),
            (false, true) if nulls_first => return Ok(Ordering::Greater),
            (false, true) => return Ok(Ordering::Less),
            (false, false) => compare_values(a, b)?,
        };
        Ok(match self.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        })
    }
}

/// Compares two rows' precomputed sort values term by term.
fn compare_rows(keys: &[SortKey], a: &[Value], b: &[Value]) -> Result<Ordering, ExecutorError> {
    for (key, (a, b)) in keys.iter().zip(a.iter().zip(b)) {
        match key.compare(a, b)? {
            Ordering::Equal => continue,
            ord => return Ok(ord),
        }
    }
    Ok(Ordering::Equal)
}

/// Sorts `rows` stably by `keys`.
fn sort_rows(keys: &[SortKey], rows: Vec<Projected>) -> Result<Vec<Projected>, ExecutorError> {
    let mut entries = rows
        .into_iter()
        .map(|p| {
            let values = keys
                .iter()
                .map(|k| k.expr.evaluate(&p.row))
                .collect::<Result<Vec<_>, _>>()?;
            Ok((values, p))
        })
        .collect::<Result<Vec<_>, ExecutorError>>()?;

    let mut failure = None;
    entries.sort_by(|(a, _), (b, _)| {
        if failure.is_some() {
            return Ordering::Equal;
        }
        compare_rows(keys, a, b).unwrap_or_else(|err| {
            failure = Some(err);
            Ordering::Equal
        })
    });
    match failure {
        Some(err) => Err(err),
        None => Ok(entries.into_iter().map(|(_, p)| p).collect()),
    }
}

/// Spawns the sort stage.
pub(crate) fn spawn(
    keys: Vec<SortKey>,
    mut input: mpsc::Receiver<Projected>,
    scope: Scope,
    capacity: usize,
) -> mpsc::Receiver<Projected> {
    let (tx, rx) = mpsc::channel(capacity);
    scope.clone().spawn("sort", async move {
        debug!(terms = keys.len(), "sort stage started");
        let mut rows = Vec::new();
        while let Some(p) = scope.recv(&mut input).await {
            rows.push(p);
        }
        if scope.is_stopped() {
            drain(input);
            return;
        }

        let sorted = match sort_rows(&keys, rows) {
            Ok(sorted) => sorted,
            Err(err) => {
                scope.abort("sort", err);
                return;
            }
        };
        debug!(rows = sorted.len(), "sort stage emitting");
        for p in sorted {
            if !scope.send(&tx, p).await {
                return;
            }
        }
    });
    rx
}
