//! Grouping and aggregation stage.
//!
//! The stage consumes every filtered row before it emits anything:
//!
//! 1. Each row is keyed by its GROUP BY values. A key that names a select
//!    alias is retried after the row's aliases are materialized.
//! 2. The first row of a group is kept as its representative; every row
//!    feeds the group's SELECT and HAVING aggregation states.
//! 3. Once input ends, groups are finalized in first-seen order: the SELECT
//!    list is rendered against the representative row and the SELECT
//!    aggregates, then HAVING is checked against the HAVING aggregates.
//!
//! Without GROUP BY the whole input is one group, and an empty input still
//! produces one row in which every source column is NULL.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::datum::Value;

use super::aggregate::{AggregateSpec, AggregateState, GroupKey};
use super::error::ExecutorError;
use super::expr::BoundExpr;
use super::pipeline::{Scope, drain};
use super::project::{Projected, Projection};
use super::row::Row;

/// Compiled grouping clauses of one query.
pub(crate) struct GroupPlan {
    pub keys: Vec<BoundExpr>,
    pub projection: Projection,
    pub select_aggregates: Vec<AggregateSpec>,
    pub having: Option<BoundExpr>,
    pub having_aggregates: Vec<AggregateSpec>,
    /// Representative row of the implicit group over an empty input.
    pub empty_row: Row,
}

struct Group {
    row: Row,
    select: AggregateState,
    having: AggregateState,
}

/// Groups in first-seen order.
#[derive(Default)]
struct Groups {
    groups: Vec<Group>,
    index: HashMap<GroupKey, usize>,
}

impl GroupPlan {
    fn key_values(&self, row: &Row) -> Result<Vec<Value>, ExecutorError> {
        self.keys.iter().map(|k| k.evaluate(row)).collect()
    }

    fn consume(&self, groups: &mut Groups, mut row: Row) -> Result<(), ExecutorError> {
        let values = match self.key_values(&row) {
            Err(ExecutorError::ColumnValueMissing { .. }) => {
                self.projection.materialize_aliases(&mut row);
                self.key_values(&row)?
            }
            other => other?,
        };
        let key = GroupKey::new(&values);

        let idx = match groups.index.get(&key) {
            Some(&idx) => idx,
            None => {
                trace!(groups = groups.groups.len() + 1, "new group");
                groups.groups.push(Group {
                    select: AggregateState::new(&self.select_aggregates),
                    having: AggregateState::new(&self.having_aggregates),
                    row: row.clone(),
                });
                groups.index.insert(key, groups.groups.len() - 1);
                groups.groups.len() - 1
            }
        };
        let group = &mut groups.groups[idx];
        group.select.update(&self.select_aggregates, &row)?;
        group.having.update(&self.having_aggregates, &row)?;
        Ok(())
    }

    /// Renders one group, returning `None` if HAVING rejects it.
    fn finalize(&self, group: Group) -> Result<Option<Projected>, ExecutorError> {
        let mut row = group.row;
        row.aggregates = group.select.finish();
        let values = self.projection.render(&mut row)?;

        if let Some(having) = &self.having {
            let select = std::mem::replace(&mut row.aggregates, group.having.finish());
            let pass = having.is_satisfied(&row)?;
            row.aggregates = select;
            if !pass {
                trace!("group rejected by HAVING");
                return Ok(None);
            }
        }
        Ok(Some(Projected { row, values }))
    }

    fn empty_group(&self) -> Group {
        Group {
            row: self.empty_row.clone(),
            select: AggregateState::new(&self.select_aggregates),
            having: AggregateState::new(&self.having_aggregates),
        }
    }
}

/// Spawns the group stage.
pub(crate) fn spawn(
    plan: GroupPlan,
    input: mpsc::Receiver<Row>,
    scope: Scope,
    capacity: usize,
) -> mpsc::Receiver<Projected> {
    let (tx, rx) = mpsc::channel(capacity);
    scope.clone().spawn("group", run(plan, input, tx, scope));
    rx
}

async fn run(
    plan: GroupPlan,
    mut input: mpsc::Receiver<Row>,
    tx: mpsc::Sender<Projected>,
    scope: Scope,
) {
    debug!(
        keys = plan.keys.len(),
        aggregates = plan.select_aggregates.len(),
        having = plan.having.is_some(),
        "group stage started"
    );
    let mut groups = Groups::default();
    while let Some(row) = scope.recv(&mut input).await {
        if let Err(err) = plan.consume(&mut groups, row) {
            scope.abort("group", err);
            drain(input);
            return;
        }
    }
    if scope.is_stopped() {
        return;
    }

    if groups.groups.is_empty() && plan.keys.is_empty() {
        groups.groups.push(plan.empty_group());
    }
    debug!(groups = groups.groups.len(), "finalizing groups");
    for group in groups.groups {
        match plan.finalize(group) {
            Ok(Some(projected)) => {
                if !scope.send(&tx, projected).await {
                    return;
                }
            }
            Ok(None) => {}
            Err(err) => {
                scope.abort("group", err);
                return;
            }
        }
    }
    debug!("group stage finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::aggregate::AggregateFunction;
    use crate::executor::project::ProjectItem;
    use crate::sql::BinaryOperator;
    use tokio_util::sync::CancellationToken;

    fn column(key: &str) -> BoundExpr {
        BoundExpr::Column(key.to_string())
    }

    fn sum_of_a() -> AggregateSpec {
        AggregateSpec {
            func: AggregateFunction::Sum,
            arg: Some(column("src.a")),
            distinct: false,
        }
    }

    fn rows() -> Vec<Row> {
        [(1, "h"), (2, "w"), (3, "h"), (4, "w"), (5, "h")]
            .into_iter()
            .map(|(a, b)| {
                let mut row = Row::new();
                row.insert("src.a", Value::Int64(a));
                row.insert("src.b", Value::from(b));
                row
            })
            .collect()
    }

    fn plan(keys: Vec<BoundExpr>, having: Option<BoundExpr>) -> GroupPlan {
        GroupPlan {
            keys,
            projection: Projection::new(vec![
                ProjectItem {
                    expr: BoundExpr::Aggregate(0),
                    alias_key: Some("total".to_string()),
                },
                ProjectItem {
                    expr: column("src.b"),
                    alias_key: Some("g".to_string()),
                },
            ]),
            select_aggregates: vec![sum_of_a()],
            having_aggregates: if having.is_some() { vec![sum_of_a()] } else { vec![] },
            having,
            empty_row: {
                let mut row = Row::new();
                row.insert("src.a", Value::Null);
                row.insert("src.b", Value::Null);
                row
            },
        }
    }

    async fn run_groups(plan: GroupPlan, input: Vec<Row>) -> Vec<Vec<Value>> {
        let scope = Scope::root(&CancellationToken::new());
        let (tx, rx) = mpsc::channel(input.len().max(1));
        for row in input {
            tx.send(row).await.unwrap();
        }
        drop(tx);
        let mut out = spawn(plan, rx, scope.clone(), 4);
        let mut result = Vec::new();
        while let Some(p) = out.recv().await {
            result.push(p.values);
        }
        assert!(scope.failure().is_none(), "{:?}", scope.failure());
        result
    }

    #[tokio::test]
    async fn test_groups_in_first_seen_order() {
        let result = run_groups(plan(vec![column("src.b")], None), rows()).await;
        assert_eq!(
            result,
            vec![
                vec![Value::Int64(9), Value::from("h")],
                vec![Value::Int64(6), Value::from("w")],
            ]
        );
    }

    #[tokio::test]
    async fn test_group_by_select_alias() {
        let result = run_groups(plan(vec![column("g")], None), rows()).await;
        assert_eq!(result.len(), 2);
    }

    #[tokio::test]
    async fn test_having_uses_its_own_aggregates() {
        let having = BoundExpr::Binary {
            left: Box::new(BoundExpr::Aggregate(0)),
            op: BinaryOperator::Lt,
            right: Box::new(BoundExpr::Literal(Value::Int64(7))),
        };
        let result = run_groups(plan(vec![column("src.b")], Some(having)), rows()).await;
        assert_eq!(result, vec![vec![Value::Int64(6), Value::from("w")]]);
    }

    #[tokio::test]
    async fn test_implicit_group_over_empty_input() {
        let result = run_groups(plan(vec![], None), vec![]).await;
        assert_eq!(result, vec![vec![Value::Null, Value::Null]]);
    }

    #[tokio::test]
    async fn test_empty_input_with_group_by() {
        let result = run_groups(plan(vec![column("src.b")], None), vec![]).await;
        assert!(result.is_empty());
    }
}
