//! WHERE filtering and direct projection stages.

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::datum::Value;

use super::error::ExecutorError;
use super::expr::BoundExpr;
use super::pipeline::{Scope, drain};
use super::row::Row;

/// A row together with its finalized output values.
///
/// The row stays attached so ORDER BY can evaluate terms that are not part
/// of the output.
#[derive(Debug)]
pub(crate) struct Projected {
    pub row: Row,
    pub values: Vec<Value>,
}

/// One expression of the SELECT list.
#[derive(Debug)]
pub(crate) struct ProjectItem {
    pub expr: BoundExpr,
    /// Row key the value is stored under when the item has an alias.
    pub alias_key: Option<String>,
}

/// The compiled SELECT list.
#[derive(Debug, Default)]
pub(crate) struct Projection {
    items: Vec<ProjectItem>,
}

impl Projection {
    pub fn new(items: Vec<ProjectItem>) -> Self {
        Self { items }
    }

    /// Evaluates the SELECT list and stores aliased values on the row.
    ///
    /// Aliases become visible only after the whole list is evaluated.
    pub fn render(&self, row: &mut Row) -> Result<Vec<Value>, ExecutorError> {
        let values = self
            .items
            .iter()
            .map(|item| item.expr.evaluate(row))
            .collect::<Result<Vec<_>, _>>()?;
        for (item, value) in self.items.iter().zip(&values) {
            if let Some(key) = &item.alias_key {
                row.insert(key.clone(), value.clone());
            }
        }
        Ok(values)
    }

    /// Stores every alias that can be evaluated on a raw input row.
    ///
    /// Aliases over aggregates cannot be evaluated before the group is
    /// finalized and are skipped.
    pub fn materialize_aliases(&self, row: &mut Row) {
        for item in &self.items {
            if let Some(key) = &item.alias_key
                && let Ok(value) = item.expr.evaluate(row)
            {
                row.insert(key.clone(), value);
            }
        }
    }
}

/// Spawns the WHERE stage.
pub(crate) fn spawn_filter(
    condition: BoundExpr,
    mut input: mpsc::Receiver<Row>,
    scope: Scope,
    capacity: usize,
) -> mpsc::Receiver<Row> {
    let (tx, rx) = mpsc::channel(capacity);
    scope.clone().spawn("filter", async move {
        debug!(%condition, "filter stage started");
        while let Some(row) = scope.recv(&mut input).await {
            match condition.is_satisfied(&row) {
                Ok(true) => {
                    if !scope.send(&tx, row).await {
                        return;
                    }
                }
                Ok(false) => trace!("row filtered out"),
                Err(err) => {
                    scope.abort("filter", err);
                    drain(input);
                    return;
                }
            }
        }
        debug!("filter stage finished");
    });
    rx
}

/// Spawns the projection stage of a query without grouping.
pub(crate) fn spawn_projection(
    projection: Projection,
    mut input: mpsc::Receiver<Row>,
    scope: Scope,
    capacity: usize,
) -> mpsc::Receiver<Projected> {
    let (tx, rx) = mpsc::channel(capacity);
    scope.clone().spawn("projection", async move {
        debug!(columns = projection.items.len(), "projection stage started");
        while let Some(mut row) = scope.recv(&mut input).await {
            let values = match projection.render(&mut row) {
                Ok(values) => values,
                Err(err) => {
                    scope.abort("projection", err);
                    drain(input);
                    return;
                }
            };
            if !scope.send(&tx, Projected { row, values }).await {
                return;
            }
        }
        debug!("projection stage finished");
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::BinaryOperator;
    use tokio_util::sync::CancellationToken;

    fn item(expr: BoundExpr, alias: Option<&str>) -> ProjectItem {
        ProjectItem {
            expr,
            alias_key: alias.map(str::to_string),
        }
    }

    fn doubled() -> BoundExpr {
        BoundExpr::Binary {
            left: Box::new(BoundExpr::Column("t.a".to_string())),
            op: BinaryOperator::Mul,
            right: Box::new(BoundExpr::Literal(Value::Int64(2))),
        }
    }

    fn row(a: i64) -> Row {
        let mut row = Row::new();
        row.insert("t.a", Value::Int64(a));
        row
    }

    #[test]
    fn test_render_stores_aliases() {
        let projection = Projection::new(vec![
            item(BoundExpr::Column("t.a".to_string()), None),
            item(doubled(), Some("d")),
        ]);
        let mut row = row(4);
        let values = projection.render(&mut row).unwrap();
        assert_eq!(values, vec![Value::Int64(4), Value::Int64(8)]);
        assert_eq!(row.get("d"), Some(&Value::Int64(8)));
    }

    #[test]
    fn test_materialize_skips_aggregates() {
        let projection = Projection::new(vec![
            item(BoundExpr::Aggregate(0), Some("total")),
            item(doubled(), Some("d")),
        ]);
        let mut row = row(1);
        projection.materialize_aliases(&mut row);
        assert!(!row.contains("total"));
        assert_eq!(row.get("d"), Some(&Value::Int64(2)));
    }

    #[tokio::test]
    async fn test_filter_error_aborts_query() {
        let scope = Scope::root(&CancellationToken::new());
        let (tx, input) = mpsc::channel(4);
        tx.send(row(1)).await.unwrap();
        drop(tx);

        let mut out = spawn_filter(BoundExpr::Column("t.a".to_string()), input, scope.clone(), 4);
        assert!(out.recv().await.is_none());
        assert!(matches!(
            scope.failure(),
            Some(ExecutorError::NotBoolean { .. })
        ));
    }
}
