//! Expression engine for x8.
//!
//! This crate owns the query language shared by every x8 provider: the
//! expression AST, the text parsers for `where`, `set`, `select` and
//! `order_by`, field path navigation and mutation, and [`QueryProcessor`],
//! the in-process evaluator that defines the reference semantics.
#![allow(clippy::module_name_repetitions)]

pub mod ast;
pub mod error;
pub mod evaluator;
pub mod parser;
pub mod path;
pub mod processor;
pub mod value;

pub use ast::{
    BUILTIN_NAMESPACE, Comparison, ComparisonOp, Expression, Field, Function, OrderBy,
    OrderByDirection, OrderByTerm, Select, SelectTerm, Update, UpdateOp, UpdateOperation,
};
pub use error::ExpressionError;
pub use evaluator::{EvalContext, PatternCache};
pub use parser::{Params, parse_condition, parse_order_by, parse_select, parse_update};
pub use path::{
    FieldPath, FieldResolver, IdentityResolver, PathSegment, apply_op, delete_field, get_field,
    insert_field, navigate, set_field,
};
pub use processor::QueryProcessor;
