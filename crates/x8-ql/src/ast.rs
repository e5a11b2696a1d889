//! AST types for x8 query expressions.
//!
//! This module defines the abstract syntax tree for condition (`where`),
//! update (`set`), projection (`select`), and ordering (`order_by`)
//! expressions. The tree is produced by the parser or built programmatically
//! and consumed by the evaluator in [`crate::processor`].
//!
//! Every node renders back to parseable text through [`fmt::Display`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Namespace of the builtin function library.
pub const BUILTIN_NAMESPACE: &str = "builtin";

/// Condition expression node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expression {
    /// A field path into the document, e.g. `obj.narr[0]` or `$etag`.
    Field(Field),
    /// A literal value.
    Value(Value),
    /// A builtin function call.
    Function(Function),
    /// A binary comparison.
    Comparison(Comparison),
    /// Logical conjunction.
    And {
        /// Left-hand expression.
        lexpr: Box<Expression>,
        /// Right-hand expression.
        rexpr: Box<Expression>,
    },
    /// Logical disjunction.
    Or {
        /// Left-hand expression.
        lexpr: Box<Expression>,
        /// Right-hand expression.
        rexpr: Box<Expression>,
    },
    /// Logical negation.
    Not {
        /// Negated expression.
        expr: Box<Expression>,
    },
}

/// A dotted/bracketed field path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    /// Path text, e.g. `arrobj[1].oint`.
    pub path: String,
}

impl Field {
    /// Create a field from its path text.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// Function call: `name(args..., key=value...)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    /// Function namespace, [`BUILTIN_NAMESPACE`] for the builtin library.
    pub namespace: String,
    /// Lowercased function name.
    pub name: String,
    /// Positional arguments.
    #[serde(default)]
    pub args: Vec<Expression>,
    /// Named arguments (`text_search(query="...", match_mode="and")`).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub named_args: BTreeMap<String, Expression>,
}

/// Binary comparison: `lexpr op rexpr`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    /// Left-hand operand.
    pub lexpr: Box<Expression>,
    /// Comparison operator.
    pub op: ComparisonOp,
    /// Right-hand operand. For `between`, `in` and `not in` this is a list.
    pub rexpr: Box<Expression>,
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOp {
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `in (...)`
    In,
    /// `not in (...)`
    Nin,
    /// `between a and b`
    Between,
    /// `like 'regex'`
    Like,
}

impl ComparisonOp {
    /// Operator text as it appears in expressions.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::In => "in",
            Self::Nin => "not in",
            Self::Between => "between",
            Self::Like => "like",
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Programmatic construction
// ---------------------------------------------------------------------------

impl Expression {
    /// A field reference.
    #[must_use]
    pub fn field(path: impl Into<String>) -> Self {
        Self::Field(Field::new(path))
    }

    /// A literal value.
    #[must_use]
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }

    /// A builtin function call with positional arguments.
    #[must_use]
    pub fn function(name: impl Into<String>, args: Vec<Expression>) -> Self {
        Self::Function(Function {
            namespace: BUILTIN_NAMESPACE.to_owned(),
            name: name.into().to_ascii_lowercase(),
            args,
            named_args: BTreeMap::new(),
        })
    }

    /// A comparison between two expressions.
    #[must_use]
    pub fn compare(lexpr: Expression, op: ComparisonOp, rexpr: Expression) -> Self {
        Self::Comparison(Comparison {
            lexpr: Box::new(lexpr),
            op,
            rexpr: Box::new(rexpr),
        })
    }

    /// `lexpr = rexpr`.
    #[must_use]
    pub fn eq(lexpr: Expression, rexpr: Expression) -> Self {
        Self::compare(lexpr, ComparisonOp::Eq, rexpr)
    }

    /// `lexpr and rexpr`.
    #[must_use]
    pub fn and(lexpr: Expression, rexpr: Expression) -> Self {
        Self::And {
            lexpr: Box::new(lexpr),
            rexpr: Box::new(rexpr),
        }
    }

    /// `lexpr or rexpr`.
    #[must_use]
    pub fn or(lexpr: Expression, rexpr: Expression) -> Self {
        Self::Or {
            lexpr: Box::new(lexpr),
            rexpr: Box::new(rexpr),
        }
    }

    /// `not (expr)`.
    #[must_use]
    pub fn negate(expr: Expression) -> Self {
        Self::Not {
            expr: Box::new(expr),
        }
    }

    /// Returns the function node if this is a call to the builtin `name`.
    #[must_use]
    pub fn as_builtin_call(&self, name: &str) -> Option<&Function> {
        match self {
            Self::Function(func) if func.namespace == BUILTIN_NAMESPACE && func.name == name => {
                Some(func)
            }
            _ => None,
        }
    }
}

impl From<Field> for Expression {
    fn from(field: Field) -> Self {
        Self::Field(field)
    }
}

impl From<Value> for Expression {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Comparison> for Expression {
    fn from(comparison: Comparison) -> Self {
        Self::Comparison(comparison)
    }
}

impl From<Function> for Expression {
    fn from(function: Function) -> Self {
        Self::Function(function)
    }
}

// ---------------------------------------------------------------------------
// Select / OrderBy
// ---------------------------------------------------------------------------

/// Projection: the fields to return. No terms means all fields (`*`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Select {
    /// Selected terms in output order.
    #[serde(default)]
    pub terms: Vec<SelectTerm>,
}

/// One projected field, optionally renamed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectTerm {
    /// Field path.
    pub field: String,
    /// Output name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl Select {
    /// An empty projection (all fields).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field.
    #[must_use]
    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.terms.push(SelectTerm {
            field: field.into(),
            alias: None,
        });
        self
    }

    /// Add a field under a different output name.
    #[must_use]
    pub fn field_as(mut self, field: impl Into<String>, alias: impl Into<String>) -> Self {
        self.terms.push(SelectTerm {
            field: field.into(),
            alias: Some(alias.into()),
        });
        self
    }

    /// Whether this projection returns whole documents.
    #[must_use]
    pub fn is_all(&self) -> bool {
        self.terms.is_empty()
    }
}

/// Sort specification. Terms compose lexicographically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    /// Sort terms, most significant first.
    #[serde(default)]
    pub terms: Vec<OrderByTerm>,
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderByTerm {
    /// Field path.
    pub field: String,
    /// Sort direction.
    #[serde(default)]
    pub direction: OrderByDirection,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderByDirection {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl OrderBy {
    /// An empty sort specification.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an ascending term.
    #[must_use]
    pub fn asc(mut self, field: impl Into<String>) -> Self {
        self.terms.push(OrderByTerm {
            field: field.into(),
            direction: OrderByDirection::Asc,
        });
        self
    }

    /// Add a descending term.
    #[must_use]
    pub fn desc(mut self, field: impl Into<String>) -> Self {
        self.terms.push(OrderByTerm {
            field: field.into(),
            direction: OrderByDirection::Desc,
        });
        self
    }
}

// ---------------------------------------------------------------------------
// Update
// ---------------------------------------------------------------------------

/// Ordered list of field mutations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Update {
    /// Operations, applied left to right.
    #[serde(default)]
    pub operations: Vec<UpdateOperation>,
}

/// A single field mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateOperation {
    /// Target field path.
    pub field: String,
    /// Mutation kind.
    pub op: UpdateOp,
    /// Operation arguments. `move` carries the source path as a string.
    #[serde(default)]
    pub args: Vec<Value>,
}

/// Update operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateOp {
    /// Set the field, replacing any previous value.
    Put,
    /// Add a key, insert at an array index, or append with `[-]`.
    Insert,
    /// Remove the field or array element.
    Delete,
    /// Numeric add.
    Increment,
    /// Set the field from another field, then remove that field.
    Move,
    /// Append elements not already present.
    ArrayUnion,
    /// Remove every element equal to one of the arguments.
    ArrayRemove,
}

impl UpdateOp {
    /// Function name used in update text.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Put => "put",
            Self::Insert => "insert",
            Self::Delete => "delete",
            Self::Increment => "increment",
            Self::Move => "move",
            Self::ArrayUnion => "array_union",
            Self::ArrayRemove => "array_remove",
        }
    }

    /// Parse an operation name (case-insensitive).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "put" => Some(Self::Put),
            "insert" => Some(Self::Insert),
            "delete" => Some(Self::Delete),
            "increment" => Some(Self::Increment),
            "move" => Some(Self::Move),
            "array_union" => Some(Self::ArrayUnion),
            "array_remove" => Some(Self::ArrayRemove),
            _ => None,
        }
    }
}

impl fmt::Display for UpdateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Update {
    /// An empty update.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, field: impl Into<String>, op: UpdateOp, args: Vec<Value>) -> Self {
        self.operations.push(UpdateOperation {
            field: field.into(),
            op,
            args,
        });
        self
    }

    /// `field=put(value)`.
    #[must_use]
    pub fn put(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(field, UpdateOp::Put, vec![value.into()])
    }

    /// `field=insert(value)`.
    #[must_use]
    pub fn insert(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(field, UpdateOp::Insert, vec![value.into()])
    }

    /// `field=delete()`.
    #[must_use]
    pub fn delete(self, field: impl Into<String>) -> Self {
        self.push(field, UpdateOp::Delete, Vec::new())
    }

    /// `field=increment(delta)`.
    #[must_use]
    pub fn increment(self, field: impl Into<String>, delta: impl Into<Value>) -> Self {
        self.push(field, UpdateOp::Increment, vec![delta.into()])
    }

    /// `field=move(source)`: `field` takes the value of `source`, which is removed.
    #[must_use]
    pub fn move_field(self, field: impl Into<String>, source: impl Into<String>) -> Self {
        self.push(field, UpdateOp::Move, vec![Value::String(source.into())])
    }

    /// `field=array_union([...])`.
    #[must_use]
    pub fn array_union(self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.push(field, UpdateOp::ArrayUnion, vec![Value::Array(values)])
    }

    /// `field=array_remove([...])`.
    #[must_use]
    pub fn array_remove(self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.push(field, UpdateOp::ArrayRemove, vec![Value::Array(values)])
    }

    /// Whether there is nothing to apply.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

/// Write a literal in expression syntax. Strings use single quotes.
pub(crate) fn write_literal(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::String(s) => {
            f.write_str("'")?;
            for c in s.chars() {
                match c {
                    '\'' => f.write_str("\\'")?,
                    '\\' => f.write_str("\\\\")?,
                    '\n' => f.write_str("\\n")?,
                    '\t' => f.write_str("\\t")?,
                    '\r' => f.write_str("\\r")?,
                    c => write!(f, "{c}")?,
                }
            }
            f.write_str("'")
        }
        Value::Array(items) => {
            f.write_str("[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write_literal(f, item)?;
            }
            f.write_str("]")
        }
        Value::Object(map) => {
            f.write_str("{")?;
            for (i, (k, v)) in map.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write_literal(f, &Value::String(k.clone()))?;
                f.write_str(": ")?;
                write_literal(f, v)?;
            }
            f.write_str("}")
        }
        other => write!(f, "{other}"),
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(field) => f.write_str(&field.path),
            Self::Value(value) => write_literal(f, value),
            Self::Function(func) => write!(f, "{func}"),
            Self::Comparison(cmp) => write!(f, "{cmp}"),
            Self::And { lexpr, rexpr } => {
                write_operand(f, lexpr, matches!(lexpr.as_ref(), Self::Or { .. }))?;
                f.write_str(" and ")?;
                write_operand(
                    f,
                    rexpr,
                    matches!(rexpr.as_ref(), Self::Or { .. } | Self::And { .. }),
                )
            }
            Self::Or { lexpr, rexpr } => {
                write_operand(f, lexpr, false)?;
                f.write_str(" or ")?;
                write_operand(f, rexpr, matches!(rexpr.as_ref(), Self::Or { .. }))
            }
            Self::Not { expr } => write!(f, "not ({expr})"),
        }
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, expr: &Expression, wrap: bool) -> fmt::Result {
    if wrap {
        write!(f, "({expr})")
    } else {
        write!(f, "{expr}")
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        let mut first = true;
        for arg in &self.args {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{arg}")?;
        }
        for (name, arg) in &self.named_args {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{name}={arg}")?;
        }
        f.write_str(")")
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.op, self.rexpr.as_ref()) {
            (ComparisonOp::Between, Expression::Value(Value::Array(bounds))) if bounds.len() == 2 => {
                write!(f, "{} between ", self.lexpr)?;
                write_literal(f, &bounds[0])?;
                f.write_str(" and ")?;
                write_literal(f, &bounds[1])
            }
            (ComparisonOp::In | ComparisonOp::Nin, Expression::Value(Value::Array(items))) => {
                write!(f, "{} {} (", self.lexpr, self.op)?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write_literal(f, item)?;
                }
                f.write_str(")")
            }
            _ => write!(f, "{} {} {}", self.lexpr, self.op, self.rexpr),
        }
    }
}

impl fmt::Display for Select {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.terms.is_empty() {
            return f.write_str("*");
        }
        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(&term.field)?;
            if let Some(alias) = &term.alias {
                write!(f, " as {alias}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match term.direction {
                OrderByDirection::Asc => write!(f, "{} asc", term.field)?,
                OrderByDirection::Desc => write!(f, "{} desc", term.field)?,
            }
        }
        Ok(())
    }
}

impl fmt::Display for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, operation) in self.operations.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}(", operation.field, operation.op)?;
            for (j, arg) in operation.args.iter().enumerate() {
                if j > 0 {
                    f.write_str(", ")?;
                }
                match (operation.op, arg) {
                    (UpdateOp::Move, Value::String(path)) => f.write_str(path)?,
                    _ => write_literal(f, arg)?,
                }
            }
            f.write_str(")")?;
        }
        Ok(())
    }
}
