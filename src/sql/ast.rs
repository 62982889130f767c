//! Statement tree of a parsed query.
//!
//! The parser produces these types and the planner consumes them. Host code
//! may also build statements directly and hand them to
//! [`Engine::execute`](crate::Engine::execute).

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(Box<SelectStmt>),
    /// `left UNION [ALL] right` and friends. Chains associate to the left.
    SetOperation {
        op: SetOperator,
        all: bool,
        left: Box<Statement>,
        right: Box<Statement>,
    },
}

impl Statement {
    /// Returns the SELECT if this is not a set operation.
    pub fn as_select(&self) -> Option<&SelectStmt> {
        match self {
            Statement::Select(select) => Some(select),
            Statement::SetOperation { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOperator {
    Union,
    Intersect,
    Except,
}

impl SetOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            SetOperator::Union => "UNION",
            SetOperator::Intersect => "INTERSECT",
            SetOperator::Except => "EXCEPT",
        }
    }
}

/// One SELECT block. Clauses absent from the text are `None` or empty.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectStmt {
    pub distinct: bool,
    pub columns: Vec<SelectItem>,
    pub from: Option<FromClause>,
    pub where_clause: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderByItem>,
    pub limit: Option<Expr>,
    pub offset: Option<Expr>,
    /// `FOR UPDATE` / `FOR SHARE`; parsed so it can be rejected.
    pub locking: Option<LockingClause>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// `*`
    Wildcard,
    /// `t.*`
    QualifiedWildcard(String),
    Expr { expr: Expr, alias: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FromClause {
    /// Comma-separated entries. Only a single entry can be planned.
    pub tables: Vec<TableRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableRef {
    Table { name: String, alias: Option<String> },
    Join {
        left: Box<TableRef>,
        join_type: JoinType,
        right: Box<TableRef>,
        condition: Option<JoinCondition>,
    },
    /// `(SELECT ...) AS alias`; the alias is mandatory.
    Subquery {
        query: Box<Statement>,
        alias: String,
    },
    /// `(a JOIN b ON ...)`
    Nested(Box<TableRef>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    /// `LEFT [OUTER]`
    Left,
    /// `RIGHT [OUTER]`
    Right,
    /// `FULL [OUTER]`
    Full,
    Cross,
    Natural,
    /// `STRAIGHT_JOIN`
    Straight,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JoinCondition {
    On(Expr),
    Using(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByItem {
    pub expr: Expr,
    pub direction: SortDirection,
    pub nulls: NullOrdering,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Placement of NULL keys. `Default` puts them last for ascending keys and
/// first for descending ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NullOrdering {
    #[default]
    Default,
    First,
    Last,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockingClause {
    pub mode: LockMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Update,
    Share,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    /// `column` or `table.column`, as written.
    ColumnRef {
        table: Option<String>,
        column: String,
    },
    /// The `*` of `COUNT(*)`.
    Star,
    /// `$n`
    Parameter(u32),
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expr>,
    },
    IsNull { expr: Box<Expr>, negated: bool },
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    InSubquery {
        expr: Box<Expr>,
        subquery: Box<Statement>,
        negated: bool,
    },
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
    /// `LIKE`, or `ILIKE` when `case_insensitive` is set.
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        escape: Option<Box<Expr>>,
        negated: bool,
        case_insensitive: bool,
    },
    Exists {
        subquery: Box<Statement>,
        negated: bool,
    },
    /// Simple (`operand` set) or searched CASE.
    Case {
        operand: Option<Box<Expr>>,
        when_clauses: Vec<WhenClause>,
        else_result: Option<Box<Expr>>,
    },
    /// Scalar or aggregate call; `distinct` is only meaningful for
    /// aggregates.
    Function {
        name: String,
        args: Vec<Expr>,
        distinct: bool,
    },
    /// Scalar subquery.
    Subquery(Box<Statement>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhenClause {
    pub condition: Expr,
    pub result: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Neq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    /// `<=>`
    NullSafeEq,
    And,
    Or,
    /// `||`
    Concat,
}

impl BinaryOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Mod => "%",
            BinaryOperator::Eq => "=",
            BinaryOperator::Neq => "<>",
            BinaryOperator::Lt => "<",
            BinaryOperator::LtEq => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::GtEq => ">=",
            BinaryOperator::NullSafeEq => "<=>",
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
            BinaryOperator::Concat => "||",
        }
    }

    /// True for the six ordering comparisons, which reject NULL operands.
    pub fn is_comparison(&self) -> bool {
        use BinaryOperator::*;
        matches!(self, Eq | Neq | Lt | LtEq | Gt | GtEq)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Minus,
    Plus,
}

impl UnaryOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnaryOperator::Not => "NOT",
            UnaryOperator::Minus => "-",
            UnaryOperator::Plus => "+",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_safe_eq_is_not_a_comparison() {
        assert!(BinaryOperator::Gt.is_comparison());
        assert!(!BinaryOperator::NullSafeEq.is_comparison());
        assert!(!BinaryOperator::Concat.is_comparison());
    }

    #[test]
    fn test_as_select() {
        let select = Statement::Select(Box::default());
        assert!(select.as_select().is_some());
        let union = Statement::SetOperation {
            op: SetOperator::Union,
            all: true,
            left: Box::new(select.clone()),
            right: Box::new(select),
        };
        assert!(union.as_select().is_none());
    }
}
