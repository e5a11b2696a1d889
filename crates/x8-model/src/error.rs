//! x8 error types.
//!
//! Every provider maps its native failures onto one shared taxonomy, so
//! callers see the same error for the same condition regardless of backend.

use std::fmt;

/// Well-known x8 error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum X8ErrorCode {
    /// Malformed condition, update, select, or order-by text.
    ParseError,
    /// Unsupported function or operator, missing argument, or irreconcilable types.
    #[default]
    BadRequest,
    /// The target of an unconditional operation does not exist.
    NotFound,
    /// A `where` condition evaluated to false.
    PreconditionFailed,
    /// The resource already exists, or a transaction failed validation.
    Conflict,
    /// The provider does not implement the operation.
    NotSupported,
    /// Unexpected internal failure.
    Internal,
}

impl X8ErrorCode {
    /// Returns the short error code string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ParseError => "ParseError",
            Self::BadRequest => "BadRequest",
            Self::NotFound => "NotFound",
            Self::PreconditionFailed => "PreconditionFailed",
            Self::Conflict => "Conflict",
            Self::NotSupported => "NotSupported",
            Self::Internal => "Internal",
        }
    }

    /// Returns the HTTP-style status code for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::ParseError | Self::BadRequest => 400,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::PreconditionFailed => 412,
            Self::NotSupported => 415,
            Self::Internal => 500,
        }
    }
}

impl fmt::Display for X8ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An x8 error.
#[derive(Debug)]
pub struct X8Error {
    /// The error code.
    pub code: X8ErrorCode,
    /// A human-readable error message.
    pub message: String,
    /// The underlying source error, if any.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for X8Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for X8Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl X8Error {
    /// Create a new `X8Error` from an error code.
    #[must_use]
    pub fn new(code: X8ErrorCode) -> Self {
        Self {
            message: code.as_str().to_owned(),
            code,
            source: None,
        }
    }

    /// Create a new `X8Error` with a custom message.
    #[must_use]
    pub fn with_message(code: X8ErrorCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code,
            source: None,
        }
    }

    /// Set the source error.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// HTTP-style status code of the error's code.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        self.code.status_code()
    }

    // -- Convenience constructors --

    /// Malformed expression text.
    #[must_use]
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::with_message(X8ErrorCode::ParseError, message)
    }

    /// Invalid request.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::with_message(X8ErrorCode::BadRequest, message)
    }

    /// Item, collection, or index not found.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_message(X8ErrorCode::NotFound, message)
    }

    /// Condition evaluated to false.
    #[must_use]
    pub fn precondition_failed(message: impl Into<String>) -> Self {
        Self::with_message(X8ErrorCode::PreconditionFailed, message)
    }

    /// Resource conflict or aborted transaction.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::with_message(X8ErrorCode::Conflict, message)
    }

    /// Operation not implemented by the provider.
    #[must_use]
    pub fn not_supported(operation: &str) -> Self {
        Self::with_message(
            X8ErrorCode::NotSupported,
            format!("Operation {operation} is not supported"),
        )
    }

    /// Internal error.
    #[must_use]
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::with_message(X8ErrorCode::Internal, message)
    }
}

/// Result of a provider call.
pub type StoreResult<T> = Result<T, X8Error>;

/// Create an `X8Error` from an error code.
///
/// # Examples
///
/// ```
/// use x8_model::x8_error;
/// use x8_model::error::X8ErrorCode;
///
/// let err = x8_error!(BadRequest);
/// assert_eq!(err.code, X8ErrorCode::BadRequest);
///
/// let err = x8_error!(NotFound, "Key 7 not found");
/// assert_eq!(err.message, "Key 7 not found");
/// ```
#[macro_export]
macro_rules! x8_error {
    ($code:ident) => {
        $crate::error::X8Error::new($crate::error::X8ErrorCode::$code)
    };
    ($code:ident, $msg:expr) => {
        $crate::error::X8Error::with_message($crate::error::X8ErrorCode::$code, $msg)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_map_codes_to_status() {
        assert_eq!(X8Error::parse_error("x").status_code(), 400);
        assert_eq!(X8Error::not_found("x").status_code(), 404);
        assert_eq!(X8Error::conflict("x").status_code(), 409);
        assert_eq!(X8Error::precondition_failed("x").status_code(), 412);
        assert_eq!(X8Error::not_supported("get").status_code(), 415);
        assert_eq!(X8Error::internal_error("x").status_code(), 500);
    }

    #[test]
    fn test_should_format_error() {
        let err = x8_error!(PreconditionFailed, "where condition failed");
        assert_eq!(err.to_string(), "PreconditionFailed: where condition failed");
        assert_eq!(x8_error!(Conflict).message, "Conflict");
    }

    #[test]
    fn test_should_keep_source() {
        let io = std::io::Error::other("disk");
        let err = X8Error::internal_error("failed").with_source(io);
        assert!(std::error::Error::source(&err).is_some());
    }
}
