//! Conversions from engine errors into the x8 taxonomy.

use x8_model::error::{X8Error, X8ErrorCode};
use x8_ql::ExpressionError;

/// Convert an expression error into an x8 error.
///
/// Grammar failures become `ParseError`; evaluation and update failures
/// (bad operands, type mismatches, array index errors, unsupported
/// functions) become `BadRequest`. The expression error is kept as source.
#[must_use]
pub fn expression_error_to_x8(e: ExpressionError) -> X8Error {
    let code = if e.is_parse_error() {
        X8ErrorCode::ParseError
    } else {
        X8ErrorCode::BadRequest
    };
    X8Error::with_message(code, e.to_string()).with_source(e)
}
