//! Query planner.
//!
//! Planning compiles a statement and starts its pipeline in one pass: the
//! stages are spawned as soon as every clause is compiled, and the caller
//! receives the output column names together with the receiving end of the
//! final stage.
//!
//! ```text
//! seed ─ join stages ─ [WHERE] ─ projection | group ─ [ORDER BY] ─ output
//!                                                         LIMIT/OFFSET ┘
//! ```
//!
//! Everything left of the output stage runs in its own child scope when
//! the query has a LIMIT or OFFSET, so a filled window can stop it without
//! touching the rest of the query.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::catalog::Catalog;
use crate::datum::Value;
use crate::sql::{Expr, SelectItem, SelectStmt, Statement};

use super::error::ExecutorError;
use super::expr::{BoundExpr, ExprCompiler};
use super::group::{self, GroupPlan};
use super::join;
use super::limit::{self, Window};
use super::pipeline::Scope;
use super::project::{self, ProjectItem, Projection};
use super::registry::TableRegistry;
use super::row::Row;
use super::sort::{self, SortKey};
use super::union;

/// Execution settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecConfig {
    /// Capacity of the channels between pipeline stages.
    ///
    /// Small values keep memory flat: a producer blocks as soon as its
    /// consumer falls this many rows behind.
    pub queue_capacity: usize,
    /// Capacity of the channel feeding the query's consumer.
    pub output_capacity: usize,
    /// Join sources whose cost hint exceeds this are captured on their first
    /// pass and replayed from memory for later incoming rows.
    pub replay_cost_threshold: usize,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 5,
            output_capacity: 20,
            replay_cost_threshold: 5,
        }
    }
}

impl ExecConfig {
    /// Returns these settings with both channel capacities at least one.
    pub fn normalized(self) -> Self {
        Self {
            queue_capacity: self.queue_capacity.max(1),
            output_capacity: self.output_capacity.max(1),
            ..self
        }
    }
}

/// Output of a planned (and running) query.
pub(crate) struct PlannedQuery {
    pub columns: Vec<String>,
    pub rows: mpsc::Receiver<Vec<Value>>,
}

/// Plans statements into running pipelines within one scope.
#[derive(Clone)]
pub(crate) struct Planner {
    catalog: Arc<Catalog>,
    config: ExecConfig,
    scope: Scope,
}

impl Planner {
    pub fn new(catalog: Arc<Catalog>, config: ExecConfig, scope: Scope) -> Self {
        Self {
            catalog,
            config: config.normalized(),
            scope,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &ExecConfig {
        &self.config
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Returns a planner for a sub-pipeline in a child scope.
    pub fn child(&self) -> Planner {
        Planner {
            scope: self.scope.child(),
            ..self.clone()
        }
    }

    /// Returns a planner for the stages feeding a LIMIT/OFFSET window.
    pub fn windowed(&self) -> Planner {
        Planner {
            scope: self.scope.windowed(),
            ..self.clone()
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests(catalog: Catalog) -> Self {
        use tokio_util::sync::CancellationToken;

        Self::new(
            Arc::new(catalog),
            ExecConfig::default(),
            Scope::root(&CancellationToken::new()),
        )
    }

    /// Plans `stmt` and starts its pipeline.
    pub fn plan(&self, stmt: &Statement) -> Result<PlannedQuery, ExecutorError> {
        match stmt {
            Statement::Select(select) => self.plan_select(select),
            Statement::SetOperation {
                op, left, right, ..
            } => union::plan(self, *op, left, right),
        }
    }

    fn plan_select(&self, select: &SelectStmt) -> Result<PlannedQuery, ExecutorError> {
        if select.distinct {
            return Err(ExecutorError::Unsupported("DISTINCT".to_string()));
        }
        if select.locking.is_some() {
            return Err(ExecutorError::Unsupported("FOR UPDATE/SHARE".to_string()));
        }
        let window = Window::new(select.limit.as_ref(), select.offset.as_ref())?;
        let upstream = if window.is_bounded() {
            self.windowed()
        } else {
            self.clone()
        };

        let mut registry = TableRegistry::new();
        let mut gates = Vec::new();

        // Step 1: FROM clause -> join elements (ON conditions included)
        let elements = match &select.from {
            Some(from) => join::build(&upstream, &mut registry, &mut gates, from)?,
            None => Vec::new(),
        };

        // Step 2: SELECT list, collecting aggregates
        let mut columns = Vec::new();
        let mut items = Vec::new();
        let mut select_aggregates = Vec::new();
        for item in &select.columns {
            match item {
                SelectItem::Wildcard => {
                    expand_wildcard(&mut registry, None, &mut columns, &mut items)?;
                }
                SelectItem::QualifiedWildcard(table) => {
                    expand_wildcard(&mut registry, Some(table), &mut columns, &mut items)?;
                }
                SelectItem::Expr { expr, alias } => {
                    let bound = ExprCompiler::new(&upstream, &mut registry, &mut gates)
                        .with_aggregates(&mut select_aggregates)
                        .compile(expr)?;
                    let alias_key = alias.as_deref().map(|a| registry.add_alias(a));
                    columns.push(alias.clone().unwrap_or_else(|| infer_column_name(expr)));
                    items.push(ProjectItem {
                        expr: bound,
                        alias_key,
                    });
                }
            }
        }

        // Step 3: WHERE, GROUP BY, HAVING and ORDER BY
        let filter = match &select.where_clause {
            Some(expr) => Some(ExprCompiler::new(&upstream, &mut registry, &mut gates).compile(expr)?),
            None => None,
        };
        let keys = select
            .group_by
            .iter()
            .map(|expr| {
                ExprCompiler::new(&upstream, &mut registry, &mut gates)
                    .with_aliases()
                    .compile(expr)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let mut having_aggregates = Vec::new();
        let having = match &select.having {
            Some(expr) => Some(
                ExprCompiler::new(&upstream, &mut registry, &mut gates)
                    .with_aliases()
                    .with_aggregates(&mut having_aggregates)
                    .compile(expr)?,
            ),
            None => None,
        };
        let sort_keys = select
            .order_by
            .iter()
            .map(|item| {
                let expr = ExprCompiler::new(&upstream, &mut registry, &mut gates)
                    .with_aliases()
                    .compile(&item.expr)?;
                Ok(SortKey {
                    expr,
                    direction: item.direction,
                    nulls: item.nulls,
                })
            })
            .collect::<Result<Vec<_>, ExecutorError>>()?;

        let grouped =
            !keys.is_empty() || !select_aggregates.is_empty() || !having_aggregates.is_empty();
        if having.is_some() && !grouped {
            return Err(ExecutorError::Unsupported(
                "HAVING without GROUP BY or aggregates".to_string(),
            ));
        }
        debug!(
            tables = registry.tables().len(),
            subqueries = gates.len(),
            grouped,
            sorted = !sort_keys.is_empty(),
            ?window,
            "planned SELECT"
        );

        // Step 4: start the stages
        let scope = upstream.scope().clone();
        let capacity = self.config.queue_capacity;
        let mut rows = join::spawn(elements, &registry, gates, &scope, &self.config);
        if let Some(condition) = filter {
            rows = project::spawn_filter(condition, rows, scope.clone(), capacity);
        }
        let projection = Projection::new(items);
        let mut projected = if grouped {
            let plan = GroupPlan {
                keys,
                projection,
                select_aggregates,
                having,
                having_aggregates,
                empty_row: null_row(&registry),
            };
            group::spawn(plan, rows, scope.clone(), capacity)
        } else {
            project::spawn_projection(projection, rows, scope.clone(), capacity)
        };
        if !sort_keys.is_empty() {
            projected = sort::spawn(sort_keys, projected, scope.clone(), capacity);
        }
        let rows = limit::spawn(
            projected,
            window,
            scope,
            self.scope.clone(),
            self.config.output_capacity,
        );
        Ok(PlannedQuery { columns, rows })
    }
}

fn expand_wildcard(
    registry: &mut TableRegistry,
    qualifier: Option<&str>,
    columns: &mut Vec<String>,
    items: &mut Vec<ProjectItem>,
) -> Result<(), ExecutorError> {
    for column in registry.expand_wildcard(qualifier)? {
        columns.push(column.name);
        items.push(ProjectItem {
            expr: BoundExpr::Column(column.key),
            alias_key: None,
        });
    }
    Ok(())
}

/// Builds a row holding NULL for every used field of every table.
fn null_row(registry: &TableRegistry) -> Row {
    let mut row = Row::new();
    for table in registry.tables() {
        for field in table.used_fields() {
            row.insert(field.key, Value::Null);
        }
    }
    row
}

/// Infers a column name from an expression (for un-aliased expressions).
fn infer_column_name(expr: &Expr) -> String {
    match expr {
        Expr::ColumnRef { column, .. } => column.clone(),
        Expr::Function { name, .. } => name.clone(),
        _ => "?column?".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::parse_query;

    #[derive(Clone)]
    struct Foo {
        a: i64,
        b: String,
    }
    crate::impl_record!(Foo { a, b });

    fn catalog() -> Catalog {
        let rows: Vec<Foo> = [(1, "hello"), (2, "world"), (3, "hello")]
            .into_iter()
            .map(|(a, b)| Foo {
                a,
                b: b.to_string(),
            })
            .collect();
        let mut catalog = Catalog::new();
        catalog.add_table("src", rows);
        catalog
    }

    fn plan(sql: &str) -> Result<PlannedQuery, ExecutorError> {
        let planner = Planner::for_tests(catalog());
        let planned = planner.plan(&parse_query(sql).unwrap());
        planner.scope().start();
        planned
    }

    async fn rows(sql: &str) -> Vec<Vec<Value>> {
        let mut planned = plan(sql).unwrap();
        let mut out = Vec::new();
        while let Some(row) = planned.rows.recv().await {
            out.push(row);
        }
        out
    }

    #[tokio::test]
    async fn test_column_names() {
        let planned = plan("SELECT a, b AS label, upper(b), a + 1 FROM src").unwrap();
        assert_eq!(planned.columns, vec!["a", "label", "upper", "?column?"]);
        let planned = plan("SELECT * FROM src").unwrap();
        assert_eq!(planned.columns, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_select_without_from() {
        assert_eq!(
            rows("SELECT 1 + 1, 'x'").await,
            vec![vec![Value::Int64(2), Value::from("x")]]
        );
    }

    #[tokio::test]
    async fn test_where_and_limit() {
        assert_eq!(
            rows("SELECT a FROM src WHERE a > 1 LIMIT 1").await,
            vec![vec![Value::Int64(2)]]
        );
    }

    #[tokio::test]
    async fn test_zero_capacities_are_raised() {
        let config = ExecConfig {
            queue_capacity: 0,
            output_capacity: 0,
            ..ExecConfig::default()
        };
        let planner = Planner::new(
            Arc::new(catalog()),
            config,
            Scope::root(&tokio_util::sync::CancellationToken::new()),
        );
        assert_eq!(planner.config().queue_capacity, 1);
        assert_eq!(planner.config().output_capacity, 1);
        assert_eq!(planner.config().replay_cost_threshold, 5);

        let mut planned = planner
            .plan(&parse_query("SELECT a FROM src ORDER BY a DESC LIMIT 2").unwrap())
            .unwrap();
        planner.scope().start();
        let mut out = Vec::new();
        while let Some(row) = planned.rows.recv().await {
            out.push(row);
        }
        assert_eq!(out.len(), 2);
    }

    #[tokio::test]
    async fn test_unsupported_clauses_fail_fast() {
        for sql in [
            "SELECT DISTINCT a FROM src",
            "SELECT a FROM src FOR UPDATE",
            "SELECT a FROM src HAVING a > 1",
            "SELECT a FROM src LIMIT -1",
        ] {
            assert!(
                matches!(plan(sql), Err(ExecutorError::Unsupported(_))),
                "{sql}"
            );
        }
        assert!(matches!(
            plan("SELECT a FROM src INTERSECT SELECT a FROM src"),
            Err(ExecutorError::NotImplemented(_))
        ));
        assert!(matches!(
            plan("SELECT a FROM missing"),
            Err(ExecutorError::TableNotFound { .. })
        ));
    }
}
