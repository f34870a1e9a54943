//! Error types for expression evaluation and template expansion

use thiserror::Error;

use crate::template::expr::ParseError;

/// Failure raised by the expression evaluator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    /// An identifier with no binding
    #[error("ReferenceError: \"{0}\" is not defined")]
    Reference(String),

    /// A member access or call on a value that does not support it
    #[error("TypeError: {0}")]
    Type(String),

    #[error("SyntaxError: {0}")]
    Syntax(#[from] ParseError),

    /// Arithmetic faults, bad helper arguments
    #[error("{0}")]
    Runtime(String),
}

impl EvalError {
    /// Lookup failures are mapped to null by the expression context
    pub fn is_lookup_failure(&self) -> bool {
        matches!(self, EvalError::Reference(_) | EvalError::Type(_))
    }
}

/// A row-aborting failure during template expansion
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpandError {
    /// Structural misuse of a directive: `${else}` without `${if}`, wrong body shape, bad loop regex
    #[error("invalid template directive: {0}")]
    Directive(String),

    #[error("error evaluating \"{expression}\": {source}")]
    Evaluation {
        expression: String,
        #[source]
        source: EvalError,
    },

    /// Raised by an explicit `${error}` directive
    #[error("{0}")]
    User(String),

    #[error("cannot convert \"{value}\" to an integer (from \"{expression}\")")]
    InvalidInteger { expression: String, value: String },
}

impl ExpandError {
    pub fn evaluation(expression: impl Into<String>, source: EvalError) -> Self {
        ExpandError::Evaluation {
            expression: expression.into(),
            source,
        }
    }
}

/// Failure reading rows from a row supplier
#[derive(Error, Debug)]
pub enum RowError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A JSON row that is not an object
    #[error("row {index} is not a JSON object: {found}")]
    NotAnObject { index: usize, found: String },
}
