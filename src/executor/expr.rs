//! Expression compiler.
//!
//! [`BoundExpr`] is the executor's compiled form of an AST
//! [`Expr`](crate::sql::Expr): column references are resolved to row keys
//! through the [`TableRegistry`], functions to their [`HostFunction`]
//! adapters, aggregate calls to slots of an aggregation state list, and
//! `IN (subquery)` to the gate of a running nested pipeline.

use std::fmt;

use crate::datum::Value;
use crate::sql::{BinaryOperator, Expr, UnaryOperator};

use super::aggregate::{AggregateFunction, AggregateSpec};
use super::error::ExecutorError;
use super::function::{self, HostFunction};
use super::plan::Planner;
use super::registry::TableRegistry;
use super::subquery::{self, SubqueryGate};

/// A compiled expression.
#[derive(Debug, Clone)]
pub(crate) enum BoundExpr {
    /// Constant value.
    Literal(Value),
    /// Value stored under a row key.
    Column(String),
    /// Finalized result of an aggregate slot.
    Aggregate(usize),
    /// Binary operation.
    Binary {
        left: Box<BoundExpr>,
        op: BinaryOperator,
        right: Box<BoundExpr>,
    },
    /// Logical negation.
    Not(Box<BoundExpr>),
    /// Arithmetic negation.
    Negate(Box<BoundExpr>),
    /// IS [NOT] NULL test.
    IsNull { expr: Box<BoundExpr>, negated: bool },
    /// IN list test.
    InList {
        expr: Box<BoundExpr>,
        list: Vec<BoundExpr>,
        negated: bool,
    },
    /// IN test against the result of a nested query.
    InSubquery {
        expr: Box<BoundExpr>,
        gate: SubqueryGate,
        negated: bool,
    },
    /// LIKE / ILIKE pattern matching.
    Like {
        expr: Box<BoundExpr>,
        pattern: Box<BoundExpr>,
        escape: Option<Box<BoundExpr>>,
        negated: bool,
        case_insensitive: bool,
    },
    /// Scalar function call.
    Call {
        name: String,
        function: HostFunction,
        args: Vec<BoundExpr>,
    },
}

impl fmt::Display for BoundExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundExpr::Literal(v) => write!(f, "{}", v),
            BoundExpr::Column(key) => write!(f, "{}", key),
            BoundExpr::Aggregate(slot) => write!(f, "$agg{}", slot),
            BoundExpr::Binary { left, op, right } => {
                write!(f, "({} {} {})", left, op.as_str(), right)
            }
            BoundExpr::Not(e) => write!(f, "(NOT {})", e),
            BoundExpr::Negate(e) => write!(f, "(-{})", e),
            BoundExpr::IsNull { expr, negated } => {
                let neg = if *negated { " NOT" } else { "" };
                write!(f, "({} IS{} NULL)", expr, neg)
            }
            BoundExpr::InList {
                expr,
                list,
                negated,
            } => {
                let items: Vec<String> = list.iter().map(|e| e.to_string()).collect();
                let neg = if *negated { " NOT" } else { "" };
                write!(f, "({}{} IN ({}))", expr, neg, items.join(", "))
            }
            BoundExpr::InSubquery { expr, negated, .. } => {
                let neg = if *negated { " NOT" } else { "" };
                write!(f, "({}{} IN (<subquery>))", expr, neg)
            }
            BoundExpr::Like {
                expr,
                pattern,
                negated,
                case_insensitive,
                ..
            } => {
                let op = if *case_insensitive { "ILIKE" } else { "LIKE" };
                let neg = if *negated { " NOT" } else { "" };
                write!(f, "({}{} {} {})", expr, neg, op, pattern)
            }
            BoundExpr::Call { name, args, .. } => {
                let items: Vec<String> = args.iter().map(|e| e.to_string()).collect();
                write!(f, "{}({})", name, items.join(", "))
            }
        }
    }
}

/// Compiles AST expressions for one clause of a query.
///
/// The clause decides two things: whether select aliases are visible, and
/// whether aggregate calls are allowed (and into which slot list they go).
pub(crate) struct ExprCompiler<'a> {
    planner: &'a Planner,
    registry: &'a mut TableRegistry,
    gates: &'a mut Vec<SubqueryGate>,
    aggregates: Option<&'a mut Vec<AggregateSpec>>,
    allow_aliases: bool,
    in_aggregate: bool,
}

impl<'a> ExprCompiler<'a> {
    pub fn new(
        planner: &'a Planner,
        registry: &'a mut TableRegistry,
        gates: &'a mut Vec<SubqueryGate>,
    ) -> Self {
        Self {
            planner,
            registry,
            gates,
            aggregates: None,
            allow_aliases: false,
            in_aggregate: false,
        }
    }

    /// Makes select aliases visible to unqualified column references.
    pub fn with_aliases(mut self) -> Self {
        self.allow_aliases = true;
        self
    }

    /// Allows aggregate calls, reserving their slots in `aggregates`.
    pub fn with_aggregates(mut self, aggregates: &'a mut Vec<AggregateSpec>) -> Self {
        self.aggregates = Some(aggregates);
        self
    }

    /// Compiles one expression.
    pub fn compile(&mut self, expr: &Expr) -> Result<BoundExpr, ExecutorError> {
        match expr {
            Expr::Null => Ok(BoundExpr::Literal(Value::Null)),
            Expr::Boolean(b) => Ok(BoundExpr::Literal(Value::Boolean(*b))),
            Expr::Integer(n) => Ok(BoundExpr::Literal(Value::Int64(*n))),
            Expr::Float(n) => Ok(BoundExpr::Literal(Value::Float64(*n))),
            Expr::String(s) => Ok(BoundExpr::Literal(Value::Text(s.clone()))),

            Expr::ColumnRef { table, column } => {
                let aliases = self.allow_aliases && !self.in_aggregate;
                let key = self.registry.resolve(table.as_deref(), column, aliases)?;
                Ok(BoundExpr::Column(key))
            }

            Expr::Star => Err(ExecutorError::Unsupported(
                "* is only allowed in COUNT(*)".to_string(),
            )),
            Expr::Parameter(n) => Err(ExecutorError::NotImplemented(format!("parameter ${}", n))),

            Expr::BinaryOp { op, .. } if *op == BinaryOperator::NullSafeEq => Err(
                ExecutorError::NotImplemented("operator <=>".to_string()),
            ),
            Expr::BinaryOp { left, op, right } => Ok(BoundExpr::Binary {
                left: Box::new(self.compile(left)?),
                op: *op,
                right: Box::new(self.compile(right)?),
            }),

            Expr::UnaryOp { op, operand } => {
                let operand = self.compile(operand)?;
                Ok(match op {
                    UnaryOperator::Not => BoundExpr::Not(Box::new(operand)),
                    UnaryOperator::Minus => BoundExpr::Negate(Box::new(operand)),
                    UnaryOperator::Plus => operand,
                })
            }

            Expr::IsNull { expr, negated } => Ok(BoundExpr::IsNull {
                expr: Box::new(self.compile(expr)?),
                negated: *negated,
            }),

            Expr::InList {
                expr,
                list,
                negated,
            } => {
                let expr = self.compile(expr)?;
                let list = list
                    .iter()
                    .map(|e| self.compile(e))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(BoundExpr::InList {
                    expr: Box::new(expr),
                    list,
                    negated: *negated,
                })
            }

            Expr::InSubquery {
                expr,
                subquery,
                negated,
            } => {
                let expr = self.compile(expr)?;
                let gate = subquery::start_list(self.planner, subquery)?;
                self.gates.push(gate.clone());
                Ok(BoundExpr::InSubquery {
                    expr: Box::new(expr),
                    gate,
                    negated: *negated,
                })
            }

            Expr::Like {
                expr,
                pattern,
                escape,
                negated,
                case_insensitive,
            } => {
                let escape = match escape {
                    Some(e) => Some(Box::new(self.compile(e)?)),
                    None => None,
                };
                Ok(BoundExpr::Like {
                    expr: Box::new(self.compile(expr)?),
                    pattern: Box::new(self.compile(pattern)?),
                    escape,
                    negated: *negated,
                    case_insensitive: *case_insensitive,
                })
            }

            Expr::Function {
                name,
                args,
                distinct,
            } => self.compile_function(name, args, *distinct),

            Expr::Between { .. } => Err(ExecutorError::NotImplemented("BETWEEN".to_string())),
            Expr::Exists { .. } => Err(ExecutorError::NotImplemented("EXISTS".to_string())),
            Expr::Case { .. } => Err(ExecutorError::NotImplemented("CASE".to_string())),
            Expr::Subquery(_) => Err(ExecutorError::NotImplemented(
                "scalar subquery".to_string(),
            )),
        }
    }

    fn compile_function(
        &mut self,
        name: &str,
        args: &[Expr],
        distinct: bool,
    ) -> Result<BoundExpr, ExecutorError> {
        if let Some(func) = AggregateFunction::from_name(name) {
            return self.compile_aggregate(name, func, args, distinct);
        }
        if distinct {
            return Err(ExecutorError::Unsupported(format!(
                "DISTINCT in non-aggregate function {}",
                name
            )));
        }
        if args.is_empty() {
            return Err(ExecutorError::ArgumentCount {
                function: name.to_string(),
                expected: "at least 1".to_string(),
                found: 0,
            });
        }
        if args.iter().any(|a| matches!(a, Expr::Star)) {
            return Err(ExecutorError::Unsupported(format!(
                "* as an argument to {}",
                name
            )));
        }

        let function = match function::builtin(name) {
            Some(f) => f,
            None => self
                .planner
                .catalog()
                .function(name)
                .map(|f| f.as_ref().clone())
                .ok_or_else(|| ExecutorError::FunctionNotFound {
                    name: name.to_string(),
                })?,
        };
        function.signature().check_arity(name, args.len())?;

        let args = args
            .iter()
            .map(|a| self.compile(a))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(BoundExpr::Call {
            name: name.to_lowercase(),
            function,
            args,
        })
    }

    fn compile_aggregate(
        &mut self,
        name: &str,
        func: AggregateFunction,
        args: &[Expr],
        distinct: bool,
    ) -> Result<BoundExpr, ExecutorError> {
        if self.aggregates.is_none() {
            return Err(ExecutorError::IllegalAggregate {
                name: name.to_string(),
            });
        }
        if self.in_aggregate {
            return Err(ExecutorError::NestedAggregate {
                name: name.to_string(),
            });
        }
        if distinct && func != AggregateFunction::Count {
            return Err(ExecutorError::Unsupported(format!("DISTINCT {}", func)));
        }
        let [arg] = args else {
            return Err(ExecutorError::ArgumentCount {
                function: name.to_string(),
                expected: "1".to_string(),
                found: args.len(),
            });
        };

        let arg = match arg {
            Expr::Star if func == AggregateFunction::Count && !distinct => None,
            Expr::Star => {
                return Err(ExecutorError::Unsupported(format!("{}(*)", func)));
            }
            arg => {
                self.in_aggregate = true;
                let compiled = self.compile(arg);
                self.in_aggregate = false;
                Some(compiled?)
            }
        };

        let slots = self
            .aggregates
            .as_deref_mut()
            .ok_or_else(|| ExecutorError::IllegalAggregate {
                name: name.to_string(),
            })?;
        slots.push(AggregateSpec {
            func,
            arg,
            distinct,
        });
        Ok(BoundExpr::Aggregate(slots.len() - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::source::Schema;
    use crate::sql::parse_query;
    use crate::sql::{SelectItem, Statement};

    fn select_expr(sql: &str) -> Expr {
        let Statement::Select(stmt) = parse_query(&format!("SELECT {sql} FROM t")).unwrap() else {
            panic!("expected SELECT");
        };
        match stmt.columns.into_iter().next() {
            Some(SelectItem::Expr { expr, .. }) => expr,
            other => panic!("unexpected select item {:?}", other),
        }
    }

    fn registry() -> TableRegistry {
        let mut reg = TableRegistry::new();
        reg.register("t", Schema::new(["A", "B"])).unwrap();
        reg
    }

    fn compile_plain(sql: &str) -> Result<BoundExpr, ExecutorError> {
        let planner = Planner::for_tests(Catalog::new());
        let mut reg = registry();
        let mut gates = Vec::new();
        ExprCompiler::new(&planner, &mut reg, &mut gates).compile(&select_expr(sql))
    }

    fn compile_agg(sql: &str) -> Result<(BoundExpr, Vec<AggregateSpec>), ExecutorError> {
        let planner = Planner::for_tests(Catalog::new());
        let mut reg = registry();
        let mut gates = Vec::new();
        let mut aggs = Vec::new();
        let expr = ExprCompiler::new(&planner, &mut reg, &mut gates)
            .with_aggregates(&mut aggs)
            .compile(&select_expr(sql))?;
        Ok((expr, aggs))
    }

    #[tokio::test]
    async fn test_compile_column_and_arithmetic() {
        let expr = compile_plain("a * 3 + 1").unwrap();
        assert_eq!(expr.to_string(), "((t.A * 3) + 1)");
    }

    #[tokio::test]
    async fn test_unknown_column() {
        assert!(matches!(
            compile_plain("c"),
            Err(ExecutorError::ColumnNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_aggregate_outside_select() {
        assert!(matches!(
            compile_plain("SUM(a)"),
            Err(ExecutorError::IllegalAggregate { .. })
        ));
    }

    #[tokio::test]
    async fn test_aggregate_slots() {
        let (expr, aggs) = compile_agg("SUM(a) + COUNT(*)").unwrap();
        assert_eq!(expr.to_string(), "($agg0 + $agg1)");
        assert_eq!(aggs.len(), 2);
        assert!(aggs[1].arg.is_none());
    }

    #[tokio::test]
    async fn test_nested_aggregate() {
        assert!(matches!(
            compile_agg("SUM(MAX(a))"),
            Err(ExecutorError::NestedAggregate { .. })
        ));
    }

    #[tokio::test]
    async fn test_distinct_only_for_count() {
        assert!(compile_agg("COUNT(DISTINCT b)").is_ok());
        assert!(matches!(
            compile_agg("SUM(DISTINCT a)"),
            Err(ExecutorError::Unsupported(_))
        ));
    }

    #[tokio::test]
    async fn test_star_only_in_count() {
        assert!(compile_agg("MAX(*)").is_err());
    }

    #[tokio::test]
    async fn test_function_arity_and_lookup() {
        assert!(compile_plain("substr(b, 1)").is_ok());
        assert!(matches!(
            compile_plain("upper(a, b)"),
            Err(ExecutorError::ArgumentCount { .. })
        ));
        assert!(matches!(
            compile_plain("nosuch(a)"),
            Err(ExecutorError::FunctionNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_not_implemented_constructs() {
        for sql in [
            "CASE WHEN a = 1 THEN 1 END",
            "a BETWEEN 1 AND 2",
            "$1",
            "a <=> 1",
        ] {
            assert!(
                matches!(compile_plain(sql), Err(ExecutorError::NotImplemented(_))),
                "{sql}"
            );
        }
    }
}
