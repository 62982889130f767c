//! Join tree construction and nested-loop join stages.
//!
//! The FROM clause becomes a left-deep list of [`JoinElement`]s. Each element
//! runs as one stage: for every row from the previous stage it rescans its
//! source from the start, extends a copy of the incoming row with the
//! source's used fields, and forwards the combinations that satisfy the ON
//! condition. Left-outer elements emit one NULL-padded row for an incoming
//! row that matched nothing.
//!
//! ```text
//! seed (one empty row, after subquery gates)
//!   └── a            (no condition)
//!         └── b      (ON a.x = b.x)
//!               └── c (LEFT, ON b.y = c.y)
//! ```
//!
//! `a RIGHT JOIN b` is rewritten to `b LEFT JOIN a`.

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::datum::Value;
use crate::source::Source;
use crate::sql::{FromClause, JoinCondition, JoinType, TableRef};

use super::error::ExecutorError;
use super::expr::{BoundExpr, ExprCompiler};
use super::pipeline::Scope;
use super::plan::{ExecConfig, Planner};
use super::registry::{TableRegistry, UsedField};
use super::row::Row;
use super::subquery::{self, SubqueryGate};

/// One table of the join tree.
pub(crate) struct JoinElement {
    /// Index of the table in the query's registry.
    table: usize,
    source: Source,
    condition: Option<BoundExpr>,
    left_outer: bool,
}

/// Builds the join elements of a FROM clause, registering every table.
///
/// ON conditions are compiled as soon as both operands are registered, so
/// a condition can only reference tables to its left.
pub(crate) fn build(
    planner: &Planner,
    registry: &mut TableRegistry,
    gates: &mut Vec<SubqueryGate>,
    from: &FromClause,
) -> Result<Vec<JoinElement>, ExecutorError> {
    let [table_ref] = from.tables.as_slice() else {
        return Err(ExecutorError::Unsupported(
            "multiple tables in FROM (use JOIN)".to_string(),
        ));
    };
    let mut elements = Vec::new();
    add_table_ref(planner, registry, gates, table_ref, &mut elements)?;
    Ok(elements)
}

fn add_table_ref(
    planner: &Planner,
    registry: &mut TableRegistry,
    gates: &mut Vec<SubqueryGate>,
    table_ref: &TableRef,
    elements: &mut Vec<JoinElement>,
) -> Result<(), ExecutorError> {
    match table_ref {
        TableRef::Table { name, alias } => {
            let entry = planner
                .catalog()
                .table(name)
                .ok_or_else(|| ExecutorError::TableNotFound { name: name.clone() })?;
            let source = entry.open()?;
            let table = registry.register(alias.as_deref().unwrap_or(name), entry.schema.clone())?;
            elements.push(JoinElement::new(table, source));
            Ok(())
        }

        TableRef::Subquery { query, alias } => {
            let source = subquery::open_source(planner, query)?;
            let table = registry.register(alias, source.schema().clone())?;
            elements.push(JoinElement::new(table, source));
            Ok(())
        }

        TableRef::Nested(_) => Err(ExecutorError::Unsupported(
            "parenthesized join trees".to_string(),
        )),

        TableRef::Join {
            left,
            join_type,
            right,
            condition,
        } => {
            let (outer, inner, left_outer) = match join_type {
                JoinType::Inner => (left, right, false),
                JoinType::Left => (left, right, true),
                JoinType::Right => {
                    if matches!(**left, TableRef::Join { .. }) {
                        return Err(ExecutorError::Unsupported(
                            "RIGHT JOIN after another join".to_string(),
                        ));
                    }
                    (right, left, true)
                }
                JoinType::Full => return Err(unsupported_join("FULL JOIN")),
                JoinType::Cross => return Err(unsupported_join("CROSS JOIN")),
                JoinType::Natural => return Err(unsupported_join("NATURAL JOIN")),
                JoinType::Straight => return Err(unsupported_join("STRAIGHT_JOIN")),
            };
            if matches!(**inner, TableRef::Join { .. }) {
                return Err(ExecutorError::Unsupported(
                    "join as the right operand of a join".to_string(),
                ));
            }

            add_table_ref(planner, registry, gates, outer, elements)?;
            add_table_ref(planner, registry, gates, inner, elements)?;

            let on = match condition {
                Some(JoinCondition::On(expr)) => expr,
                Some(JoinCondition::Using(_)) => return Err(unsupported_join("JOIN ... USING")),
                None => return Err(unsupported_join("JOIN without ON")),
            };
            let condition = ExprCompiler::new(planner, registry, gates).compile(on)?;
            if let Some(element) = elements.last_mut() {
                element.condition = Some(condition);
                element.left_outer = left_outer;
            }
            Ok(())
        }
    }
}

fn unsupported_join(what: &str) -> ExecutorError {
    ExecutorError::Unsupported(what.to_string())
}

impl JoinElement {
    fn new(table: usize, source: Source) -> Self {
        Self {
            table,
            source,
            condition: None,
            left_outer: false,
        }
    }
}

/// Spawns the join stages and returns the receiver of joined rows.
///
/// Must be called after every clause is compiled: each stage copies only the
/// fields marked as used at this point.
pub(crate) fn spawn(
    elements: Vec<JoinElement>,
    registry: &TableRegistry,
    gates: Vec<SubqueryGate>,
    scope: &Scope,
    config: &ExecConfig,
) -> mpsc::Receiver<Row> {
    let mut rows = spawn_seed(gates, scope.clone());
    for (idx, mut element) in elements.into_iter().enumerate() {
        let table = registry.table(element.table);
        // The first element sees exactly one incoming row.
        let multi_pass = idx > 0 && element.source.cost_hint() > config.replay_cost_threshold;
        element.source.set_multi_pass(multi_pass);

        let stage = JoinStage {
            name: table.name.clone(),
            fields: table.used_fields(),
            element,
        };
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        scope.spawn("join", stage.run(rows, tx, scope.clone()));
        rows = rx;
    }
    rows
}

/// Emits the single empty row the first join stage starts from, once the
/// query is started and every `IN (SELECT ...)` gate has its values.
fn spawn_seed(mut gates: Vec<SubqueryGate>, scope: Scope) -> mpsc::Receiver<Row> {
    let (tx, rx) = mpsc::channel(1);
    scope.clone().spawn("seed", async move {
        if scope.started().await && subquery::wait_all(&mut gates, &scope).await {
            scope.send(&tx, Row::new()).await;
        }
    });
    rx
}

struct JoinStage {
    name: String,
    fields: Vec<UsedField>,
    element: JoinElement,
}

impl JoinStage {
    async fn run(mut self, mut input: mpsc::Receiver<Row>, tx: mpsc::Sender<Row>, scope: Scope) {
        debug!(table = %self.name, fields = self.fields.len(), "join stage started");
        while let Some(left) = scope.recv(&mut input).await {
            match self.join_row(left, &tx, &scope).await {
                Ok(true) => {}
                Ok(false) => return,
                Err(err) => {
                    scope.abort("join", err);
                    return;
                }
            }
        }
        debug!(table = %self.name, "join stage finished");
    }

    /// Joins one incoming row against a full pass over the source.
    ///
    /// Returns false when the stage must stop because the scope was
    /// cancelled or the downstream stage went away.
    async fn join_row(
        &mut self,
        left: Row,
        tx: &mpsc::Sender<Row>,
        scope: &Scope,
    ) -> Result<bool, ExecutorError> {
        let element = &mut self.element;
        element.source.rewind();
        let mut matched = false;
        loop {
            let more = tokio::select! {
                biased;
                _ = scope.token().cancelled() => return Ok(false),
                more = element.source.advance() => more,
            };
            if !more {
                break;
            }

            let mut row = left.clone();
            for field in &self.fields {
                row.insert(field.key.clone(), element.source.value(&field.field));
            }
            if let Some(condition) = &element.condition
                && !condition.is_satisfied(&row)?
            {
                continue;
            }
            matched = true;
            trace!(table = %self.name, "join match");
            if !scope.send(tx, row).await {
                return Ok(false);
            }
        }

        // The source may have ended early because a nested query failed.
        if scope.is_stopped() {
            return Ok(false);
        }
        if element.left_outer && !matched {
            let mut row = left;
            for field in &self.fields {
                row.insert(field.key.clone(), Value::Null);
            }
            trace!(table = %self.name, "left join padding");
            return Ok(scope.send(tx, row).await);
        }
        Ok(true)
    }
}
