//! Errors produced while parsing, evaluating, or applying expressions.

/// Errors produced during expression parsing, evaluation, or update.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExpressionError {
    /// An unexpected token was encountered.
    #[error("Unexpected token at position {position}: expected {expected}, found {found}")]
    UnexpectedToken {
        /// What was expected.
        expected: String,
        /// What was found.
        found: String,
        /// Character offset of the offending token.
        position: usize,
    },
    /// The expression ended prematurely.
    #[error("Unexpected end of expression at position {position}")]
    UnexpectedEof {
        /// Character offset of the end of input.
        position: usize,
    },
    /// A `@name` placeholder had no bound value.
    #[error("Unresolved parameter: @{name}")]
    UnresolvedParameter {
        /// The parameter name without `@`.
        name: String,
    },
    /// A literal could not be read.
    #[error("Invalid literal at position {position}: {message}")]
    InvalidLiteral {
        /// Explanation.
        message: String,
        /// Character offset of the literal.
        position: usize,
    },
    /// A field path is malformed.
    #[error("Invalid field path '{path}': {message}")]
    InvalidPath {
        /// The path text.
        path: String,
        /// Explanation.
        message: String,
    },
    /// An operand is invalid for the given operation.
    #[error("Invalid operand for {operation}: {message}")]
    InvalidOperand {
        /// The operation that failed.
        operation: String,
        /// Explanation.
        message: String,
    },
    /// A type mismatch occurred during evaluation.
    #[error("Type mismatch: {message}")]
    TypeMismatch {
        /// Explanation.
        message: String,
    },
    /// Function name not in the builtin library.
    #[error("Function {name} not supported")]
    UnsupportedFunction {
        /// The function name.
        name: String,
    },
    /// Array index outside the array bounds during an update.
    #[error("Index {index} is out of range for array of length {len}")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Array length.
        len: usize,
    },
    /// An update operation cannot be applied to the document.
    #[error("Invalid update: {message}")]
    InvalidUpdate {
        /// Explanation.
        message: String,
    },
}

impl ExpressionError {
    /// Whether this error comes from malformed expression text.
    #[must_use]
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            Self::UnexpectedToken { .. }
                | Self::UnexpectedEof { .. }
                | Self::UnresolvedParameter { .. }
                | Self::InvalidLiteral { .. }
                | Self::InvalidPath { .. }
        )
    }

    pub(crate) fn invalid_update(message: impl Into<String>) -> Self {
        Self::InvalidUpdate {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_operand(operation: &str, message: impl Into<String>) -> Self {
        Self::InvalidOperand {
            operation: operation.to_owned(),
            message: message.into(),
        }
    }
}
