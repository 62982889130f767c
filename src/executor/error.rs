//! Executor-specific errors.

use crate::datum::Value;

/// Errors that can occur while planning or running a query.
///
/// Errors are cloned into the query's failure slot and handed to every
/// consumer that asks for the terminal result.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutorError {
    /// Referenced table does not exist in the catalog.
    TableNotFound { name: String },

    /// Referenced column does not exist.
    ColumnNotFound { name: String },

    /// A row is missing a value the expression expected to read.
    ///
    /// Raised when an expression references a select alias before the
    /// projection has materialized it on the row.
    ColumnValueMissing { key: String },

    /// Referenced function is neither built-in nor registered.
    FunctionNotFound { name: String },

    /// Type mismatch in expression evaluation.
    TypeMismatch { expected: String, found: String },

    /// A comparison operand was NULL.
    NullComparison { op: &'static str },

    /// A condition evaluated to a value that is not a boolean.
    NotBoolean { value: Value },

    /// Aggregate function used outside SELECT or HAVING.
    IllegalAggregate { name: String },

    /// Aggregate function nested inside another aggregate.
    NestedAggregate { name: String },

    /// Wrong number of arguments to a function.
    ArgumentCount {
        function: String,
        expected: String,
        found: usize,
    },

    /// `*` or `table.*` over a record type with non-visible fields.
    PrivateFields { table: String },

    /// The two sides of a UNION return different numbers of columns.
    ColumnCountMismatch { left: usize, right: usize },

    /// A stream table was opened by a second query.
    SourceConsumed { name: String },

    /// A host function reported a failure.
    FunctionFailed { function: String, message: String },

    /// A pipeline stage panicked.
    StagePanicked { stage: &'static str, message: String },

    /// Integer overflow.
    IntegerOverflow,

    /// Division by zero in an integer remainder.
    DivisionByZero,

    /// Construct recognized by the parser but not implemented by the engine.
    NotImplemented(String),

    /// Unsupported operation or feature.
    Unsupported(String),

    /// The query was cancelled before it completed.
    Cancelled,
}

impl std::fmt::Display for ExecutorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutorError::TableNotFound { name } => {
                write!(f, "table \"{}\" does not exist", name)
            }
            ExecutorError::ColumnNotFound { name } => {
                write!(f, "column \"{}\" does not exist", name)
            }
            ExecutorError::ColumnValueMissing { key } => {
                write!(f, "row has no value for \"{}\"", key)
            }
            ExecutorError::FunctionNotFound { name } => {
                write!(f, "function \"{}\" does not exist", name)
            }
            ExecutorError::TypeMismatch { expected, found } => {
                write!(f, "type mismatch: expected {}, found {}", expected, found)
            }
            ExecutorError::NullComparison { op } => {
                write!(f, "cannot compare NULL with operator {}", op)
            }
            ExecutorError::NotBoolean { value } => {
                write!(f, "condition evaluated to non-boolean value {}", value)
            }
            ExecutorError::IllegalAggregate { name } => {
                write!(f, "illegal location for aggregate function {}", name)
            }
            ExecutorError::NestedAggregate { name } => {
                write!(f, "aggregate function calls cannot be nested under {}", name)
            }
            ExecutorError::ArgumentCount {
                function,
                expected,
                found,
            } => write!(
                f,
                "function {} expects {} arguments, got {}",
                function, expected, found
            ),
            ExecutorError::PrivateFields { table } => {
                write!(f, "cannot select all fields of \"{}\": it has private fields", table)
            }
            ExecutorError::ColumnCountMismatch { left, right } => write!(
                f,
                "each UNION query must have the same number of columns: {} vs {}",
                left, right
            ),
            ExecutorError::SourceConsumed { name } => {
                write!(f, "stream table \"{}\" has already been consumed", name)
            }
            ExecutorError::FunctionFailed { function, message } => {
                write!(f, "function {} failed: {}", function, message)
            }
            ExecutorError::StagePanicked { stage, message } => {
                write!(f, "{} stage panicked: {}", stage, message)
            }
            ExecutorError::IntegerOverflow => write!(f, "integer overflow"),
            ExecutorError::DivisionByZero => write!(f, "division by zero"),
            ExecutorError::NotImplemented(what) => write!(f, "not implemented: {}", what),
            ExecutorError::Unsupported(msg) => write!(f, "unsupported: {}", msg),
            ExecutorError::Cancelled => write!(f, "query was cancelled"),
        }
    }
}

impl std::error::Error for ExecutorError {}

impl ExecutorError {
    /// Shorthand for a type mismatch against a single offending value.
    pub(crate) fn mismatch(expected: &str, found: &Value) -> Self {
        ExecutorError::TypeMismatch {
            expected: expected.to_string(),
            found: found.type_name().to_string(),
        }
    }
}
