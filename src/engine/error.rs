//! Query-level errors.

use crate::executor::ExecutorError;
use crate::sql::SyntaxError;

/// Errors returned by the [`Engine`](super::Engine) entry points.
#[derive(Debug)]
pub enum QueryError {
    /// SQL parsing error.
    Syntax(SyntaxError),
    /// Planning or execution error.
    Executor(ExecutorError),
    /// A result value could not be converted into the destination field.
    Decode { column: String, message: String },
    /// The runtime for a blocking call could not be started.
    Runtime(std::io::Error),
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryError::Syntax(e) => write!(f, "parse error: {}", e.message),
            QueryError::Executor(e) => write!(f, "{}", e),
            QueryError::Decode { column, message } => {
                write!(f, "cannot decode column \"{}\": {}", column, message)
            }
            QueryError::Runtime(e) => write!(f, "cannot start runtime: {}", e),
        }
    }
}

impl std::error::Error for QueryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            QueryError::Syntax(e) => Some(e),
            QueryError::Executor(e) => Some(e),
            QueryError::Runtime(e) => Some(e),
            QueryError::Decode { .. } => None,
        }
    }
}

impl From<SyntaxError> for QueryError {
    fn from(e: SyntaxError) -> Self {
        QueryError::Syntax(e)
    }
}

impl From<ExecutorError> for QueryError {
    fn from(e: ExecutorError) -> Self {
        QueryError::Executor(e)
    }
}

impl QueryError {
    /// Returns the executor error, if this is one.
    pub fn as_executor(&self) -> Option<&ExecutorError> {
        match self {
            QueryError::Executor(e) => Some(e),
            _ => None,
        }
    }
}
