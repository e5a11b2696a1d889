//! Condition evaluation against a single document.
//!
//! The evaluator walks an [`Expression`] tree with a resolver that maps
//! logical field names to document paths. A document of `None` means the
//! target item does not exist: `exists()` is false, every field is undefined.

use std::borrow::Cow;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;

use regex::Regex;
use serde_json::Value;

use crate::ast::{BUILTIN_NAMESPACE, Comparison, ComparisonOp, Expression, Field, Function};
use crate::error::ExpressionError;
use crate::path::{FieldPath, FieldResolver, navigate};
use crate::value::{TYPE_NAMES, compare_values, is_truthy, list_contains, type_name, values_equal};

/// Output format of `now()`.
pub const NOW_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f%z";

/// Compiled `like` patterns, shared by every document of one query pass.
#[derive(Debug, Default)]
pub struct PatternCache {
    compiled: RefCell<HashMap<String, Regex>>,
}

impl PatternCache {
    /// An empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct patterns compiled so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.compiled.borrow().len()
    }

    /// Whether nothing has been compiled yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.compiled.borrow().is_empty()
    }

    fn get(&self, pattern: &str) -> Result<Regex, ExpressionError> {
        if let Some(re) = self.compiled.borrow().get(pattern) {
            return Ok(re.clone());
        }
        let re = compile_pattern(pattern)?;
        self.compiled
            .borrow_mut()
            .insert(pattern.to_owned(), re.clone());
        Ok(re)
    }
}

fn compile_pattern(pattern: &str) -> Result<Regex, ExpressionError> {
    Regex::new(pattern).map_err(|e| ExpressionError::invalid_operand("like", e.to_string()))
}

/// Evaluation context for condition expressions.
pub struct EvalContext<'a> {
    /// The document being tested, `None` when it does not exist.
    pub item: Option<&'a Value>,
    /// Maps logical field names onto document paths.
    pub resolver: &'a dyn FieldResolver,
    patterns: Option<&'a PatternCache>,
}

impl std::fmt::Debug for EvalContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvalContext")
            .field("item", &self.item)
            .finish_non_exhaustive()
    }
}

impl<'a> EvalContext<'a> {
    /// Create a context for `item`.
    #[must_use]
    pub fn new(item: Option<&'a Value>, resolver: &'a dyn FieldResolver) -> Self {
        Self {
            item,
            resolver,
            patterns: None,
        }
    }

    /// Reuse compiled `like` patterns from `cache`.
    #[must_use]
    pub fn with_patterns(mut self, cache: &'a PatternCache) -> Self {
        self.patterns = Some(cache);
        self
    }

    /// Evaluate a condition expression, returning `true` if it holds.
    ///
    /// `and`/`or` short-circuit; non-boolean operands use truthiness.
    pub fn evaluate(&self, expr: &Expression) -> Result<bool, ExpressionError> {
        match expr {
            Expression::And { lexpr, rexpr } => Ok(self.evaluate(lexpr)? && self.evaluate(rexpr)?),
            Expression::Or { lexpr, rexpr } => Ok(self.evaluate(lexpr)? || self.evaluate(rexpr)?),
            Expression::Not { expr } => Ok(!self.evaluate(expr)?),
            Expression::Comparison(cmp) => self.eval_comparison(cmp),
            operand => Ok(is_truthy(self.eval_operand(operand)?.as_deref())),
        }
    }

    /// Evaluate an operand to a value. `None` means undefined.
    pub fn eval_operand<'e>(
        &'e self,
        expr: &'e Expression,
    ) -> Result<Option<Cow<'e, Value>>, ExpressionError> {
        match expr {
            Expression::Field(field) => Ok(self.resolve(field)?.map(Cow::Borrowed)),
            Expression::Value(value) => Ok(Some(Cow::Borrowed(value))),
            Expression::Function(func) => Ok(Some(Cow::Owned(self.eval_function(func)?))),
            logical => Ok(Some(Cow::Owned(Value::Bool(self.evaluate(logical)?)))),
        }
    }

    fn resolve(&self, field: &Field) -> Result<Option<&'a Value>, ExpressionError> {
        let Some(item) = self.item else {
            return Ok(None);
        };
        let path = FieldPath::parse(&self.resolver.resolve_field(&field.path))?;
        Ok(navigate(item, &path))
    }

    fn eval_comparison(&self, cmp: &Comparison) -> Result<bool, ExpressionError> {
        let left = self.eval_operand(&cmp.lexpr)?;
        let right = self.eval_operand(&cmp.rexpr)?;
        let (left, right) = (left.as_deref(), right.as_deref());

        match cmp.op {
            ComparisonOp::Eq => Ok(matches!((left, right), (Some(l), Some(r)) if values_equal(l, r))),
            ComparisonOp::Ne => Ok(!matches!((left, right), (Some(l), Some(r)) if values_equal(l, r))),
            ComparisonOp::Lt | ComparisonOp::Lte | ComparisonOp::Gt | ComparisonOp::Gte => {
                let (Some(l), Some(r)) = (left, right) else {
                    return Ok(false);
                };
                let ord = ordered(l, r, cmp.op)?;
                Ok(match cmp.op {
                    ComparisonOp::Lt => ord.is_lt(),
                    ComparisonOp::Lte => ord.is_le(),
                    ComparisonOp::Gt => ord.is_gt(),
                    _ => ord.is_ge(),
                })
            }
            ComparisonOp::Between => self.eval_between(left, right),
            ComparisonOp::In | ComparisonOp::Nin => {
                let Some(Value::Array(list)) = right else {
                    return Err(ExpressionError::invalid_operand(
                        cmp.op.as_str(),
                        "right-hand side must be a list",
                    ));
                };
                let found = left.is_some_and(|l| list_contains(list, l));
                Ok(if cmp.op == ComparisonOp::In { found } else { !found })
            }
            ComparisonOp::Like => {
                let (Some(Value::String(s)), Some(Value::String(pattern))) = (left, right) else {
                    return Ok(false);
                };
                let re = match self.patterns {
                    Some(cache) => cache.get(pattern)?,
                    None => compile_pattern(pattern)?,
                };
                Ok(re.is_match(s))
            }
        }
    }

    #[allow(clippy::unused_self)]
    fn eval_between(&self, value: Option<&Value>, bounds: Option<&Value>) -> Result<bool, ExpressionError> {
        let Some(Value::Array(bounds)) = bounds else {
            return Err(ExpressionError::invalid_operand(
                "between",
                "bounds must be a list of two values",
            ));
        };
        let [low, high] = bounds.as_slice() else {
            return Err(ExpressionError::invalid_operand(
                "between",
                format!("expected 2 bounds, found {}", bounds.len()),
            ));
        };
        let Some(value) = value else {
            return Ok(false);
        };
        Ok(ordered(value, low, ComparisonOp::Between)?.is_ge()
            && ordered(value, high, ComparisonOp::Between)?.is_le())
    }

    // -----------------------------------------------------------------------
    // Builtin functions
    // -----------------------------------------------------------------------

    fn eval_function(&self, func: &Function) -> Result<Value, ExpressionError> {
        if func.namespace != BUILTIN_NAMESPACE {
            return Err(ExpressionError::UnsupportedFunction {
                name: format!("{}.{}", func.namespace, func.name),
            });
        }

        let result = match func.name.as_str() {
            "exists" => Value::Bool(self.item.is_some()),
            "not_exists" => Value::Bool(self.item.is_none()),
            "is_defined" => Value::Bool(self.arg(func, 0)?.is_some()),
            "is_not_defined" => Value::Bool(self.arg(func, 0)?.is_none()),
            "is_type" => {
                let value = self.arg(func, 0)?;
                let expected = self.arg(func, 1)?;
                let Some(Value::String(expected)) = expected.as_deref() else {
                    return Err(ExpressionError::invalid_operand("is_type", "type name must be a string"));
                };
                if !TYPE_NAMES.contains(&expected.as_str()) {
                    return Err(ExpressionError::invalid_operand(
                        "is_type",
                        format!("unknown type '{expected}'"),
                    ));
                }
                Value::Bool(value.is_some_and(|v| type_name(&v) == expected.as_str()))
            }
            "length" => match self.arg(func, 0)?.as_deref() {
                Some(Value::String(s)) => Value::from(s.chars().count()),
                _ => Value::from(0),
            },
            "array_length" => match self.arg(func, 0)?.as_deref() {
                Some(Value::Array(items)) => Value::from(items.len()),
                _ => Value::from(0),
            },
            "contains" => self.string_test(func, |s, sub| s.contains(sub))?,
            "starts_with" => self.string_test(func, |s, prefix| s.starts_with(prefix))?,
            "ends_with" => self.string_test(func, |s, suffix| s.ends_with(suffix))?,
            "starts_with_delimited" => {
                let delimiter = self.arg(func, 2)?;
                let Some(Value::String(delimiter)) = delimiter.as_deref() else {
                    return Err(ExpressionError::invalid_operand(
                        "starts_with_delimited",
                        "delimiter must be a string",
                    ));
                };
                self.string_test(func, |s, prefix| {
                    s.strip_prefix(prefix)
                        .is_some_and(|rest| delimiter.is_empty() || !rest.contains(delimiter.as_str()))
                })?
            }
            "array_contains" => {
                let array = self.arg(func, 0)?;
                let needle = self.arg(func, 1)?;
                match (array.as_deref(), needle.as_deref()) {
                    (Some(Value::Array(items)), Some(needle)) => Value::Bool(list_contains(items, needle)),
                    _ => Value::Bool(false),
                }
            }
            "array_contains_any" => {
                let array = self.arg(func, 0)?;
                let candidates = self.arg(func, 1)?;
                match (array.as_deref(), candidates.as_deref()) {
                    (Some(Value::Array(items)), Some(Value::Array(candidates))) => {
                        Value::Bool(candidates.iter().any(|c| list_contains(items, c)))
                    }
                    (Some(Value::Array(_)), Some(_)) => {
                        return Err(ExpressionError::invalid_operand(
                            "array_contains_any",
                            "second argument must be a list",
                        ));
                    }
                    _ => Value::Bool(false),
                }
            }
            "now" => Value::String(chrono::Utc::now().format(NOW_FORMAT).to_string()),
            _ => {
                return Err(ExpressionError::UnsupportedFunction {
                    name: func.name.clone(),
                });
            }
        };
        Ok(result)
    }

    fn arg<'e>(
        &'e self,
        func: &'e Function,
        index: usize,
    ) -> Result<Option<Cow<'e, Value>>, ExpressionError> {
        let Some(expr) = func.args.get(index) else {
            return Err(ExpressionError::invalid_operand(
                &func.name,
                format!("expected at least {} argument(s), found {}", index + 1, func.args.len()),
            ));
        };
        self.eval_operand(expr)
    }

    /// Applies `test` when the first two arguments are strings; false otherwise.
    fn string_test<F>(&self, func: &Function, test: F) -> Result<Value, ExpressionError>
    where
        F: Fn(&str, &str) -> bool,
    {
        let subject = self.arg(func, 0)?;
        let operand = self.arg(func, 1)?;
        Ok(Value::Bool(match (subject.as_deref(), operand.as_deref()) {
            (Some(Value::String(s)), Some(Value::String(o))) => test(s, o),
            _ => false,
        }))
    }
}

fn ordered(left: &Value, right: &Value, op: ComparisonOp) -> Result<Ordering, ExpressionError> {
    compare_values(left, right).ok_or_else(|| ExpressionError::TypeMismatch {
        message: format!(
            "cannot apply '{op}' to {} and {}",
            type_name(left),
            type_name(right)
        ),
    })
}
