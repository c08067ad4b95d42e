use thiserror::Error;

/// Coarse classification used by callers to tell user errors from internal ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ArgumentCount,
    Type,
    Index,
    Value,
    Precondition,
    Graph,
}

/// Failure raised while generating a graph.
///
/// Generation is all-or-nothing: once one of these is returned the caller never
/// observes a partially built graph through the generator's return value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompositeError {
    #[error("'{op}' requires {expected} argument(s), but got {actual}")]
    ArgumentCount {
        op: String,
        expected: usize,
        actual: usize,
    },
    #[error("TypeError: {0}")]
    Type(String),
    #[error("IndexError: {0}")]
    Index(String),
    #[error("ValueError: {0}")]
    Value(String),
    #[error("precondition violated: {0}")]
    Precondition(String),
    #[error("graph error: {0}")]
    Graph(String),
}

impl CompositeError {
    pub fn arg_count(op: impl Into<String>, expected: usize, actual: usize) -> Self {
        CompositeError::ArgumentCount {
            op: op.into(),
            expected,
            actual,
        }
    }

    pub fn type_error(msg: impl Into<String>) -> Self {
        CompositeError::Type(msg.into())
    }

    pub fn index(msg: impl Into<String>) -> Self {
        CompositeError::Index(msg.into())
    }

    pub fn value(msg: impl Into<String>) -> Self {
        CompositeError::Value(msg.into())
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        CompositeError::Precondition(msg.into())
    }

    pub fn graph(msg: impl Into<String>) -> Self {
        CompositeError::Graph(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CompositeError::ArgumentCount { .. } => ErrorKind::ArgumentCount,
            CompositeError::Type(_) => ErrorKind::Type,
            CompositeError::Index(_) => ErrorKind::Index,
            CompositeError::Value(_) => ErrorKind::Value,
            CompositeError::Precondition(_) => ErrorKind::Precondition,
            CompositeError::Graph(_) => ErrorKind::Graph,
        }
    }

    /// Returns `true` when the failure stems from bad user input rather than caller logic.
    pub fn is_user_error(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Precondition | ErrorKind::Graph)
    }
}

/// Convenience alias for generator results.
pub type Result<T> = std::result::Result<T, CompositeError>;

/// Checks the exact argument count of a generator.
pub fn check_args_size<T>(op: &str, args: &[T], expected: usize) -> Result<()> {
    if args.len() != expected {
        return Err(CompositeError::arg_count(op, expected, args.len()));
    }
    Ok(())
}

/// Ordinal label used in positional diagnostics (`first`, `second`, `third`, `4th`, ...).
pub fn ordinal(position: usize) -> String {
    match position {
        1 => "first".to_string(),
        2 => "second".to_string(),
        3 => "third".to_string(),
        n => format!("{n}th"),
    }
}
