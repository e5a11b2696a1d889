//! Field path parsing, resolution, and navigation.
//!
//! A path is a sequence of segments written with dots and brackets:
//! `obj.nobj.nnstr`, `arr[0]`, `arrobj[1].oint`, `arr[-]`. Reads never create
//! anything; writes create missing intermediate objects only for `put` and
//! `insert`.

use std::borrow::Cow;
use std::fmt;

use serde_json::{Map, Value};

use crate::ast::UpdateOp;
use crate::error::ExpressionError;
use crate::value::{add_numbers, list_contains, type_name, values_equal};

/// Maps logical field names (`$id`, `$pk`, `$etag`) onto document fields.
pub trait FieldResolver {
    /// Resolve a logical path to the physical path stored in documents.
    fn resolve_field<'a>(&self, field: &'a str) -> Cow<'a, str>;
}

/// Resolver that leaves every path unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityResolver;

impl FieldResolver for IdentityResolver {
    fn resolve_field<'a>(&self, field: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(field)
    }
}

/// One step in a field path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// Object key.
    Key(String),
    /// Array index (`[N]`).
    Index(usize),
    /// Append marker (`[-]`), valid only as the final segment of an insert.
    Append,
}

/// A parsed field path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<PathSegment>,
}

impl FieldPath {
    /// Parse path text into segments.
    ///
    /// # Errors
    ///
    /// Returns `ExpressionError::InvalidPath` for empty segments, unclosed
    /// brackets, or non-numeric indices.
    pub fn parse(path: &str) -> Result<Self, ExpressionError> {
        let invalid = |message: &str| ExpressionError::InvalidPath {
            path: path.to_owned(),
            message: message.to_owned(),
        };

        let mut segments = Vec::new();
        let mut chars = path.chars().peekable();
        let mut key = String::new();
        let mut expect_key = true;

        while let Some(c) = chars.next() {
            match c {
                '.' => {
                    if expect_key {
                        if key.is_empty() {
                            return Err(invalid("empty segment"));
                        }
                        segments.push(PathSegment::Key(std::mem::take(&mut key)));
                    }
                    expect_key = true;
                }
                '[' => {
                    if expect_key {
                        if key.is_empty() {
                            return Err(invalid("index without a field"));
                        }
                        segments.push(PathSegment::Key(std::mem::take(&mut key)));
                    }
                    let mut inner = String::new();
                    loop {
                        match chars.next() {
                            Some(']') => break,
                            Some(ch) => inner.push(ch),
                            None => return Err(invalid("unclosed '['")),
                        }
                    }
                    let inner = inner.trim();
                    if inner == "-" {
                        segments.push(PathSegment::Append);
                    } else {
                        let index = inner
                            .parse::<usize>()
                            .map_err(|_| invalid("index must be a non-negative integer or '-'"))?;
                        segments.push(PathSegment::Index(index));
                    }
                    expect_key = false;
                    if let Some(&next) = chars.peek() {
                        if next != '.' && next != '[' {
                            return Err(invalid("expected '.' or '[' after ']'"));
                        }
                    }
                }
                ']' => return Err(invalid("unexpected ']'")),
                c => {
                    if !expect_key {
                        return Err(invalid("expected '.' or '[' after ']'"));
                    }
                    key.push(c);
                }
            }
        }

        if expect_key {
            if key.is_empty() {
                return Err(invalid("empty segment"));
            }
            segments.push(PathSegment::Key(key));
        }

        if let Some(pos) = segments.iter().position(|s| *s == PathSegment::Append) {
            if pos + 1 != segments.len() {
                return Err(invalid("'[-]' may only be the last segment"));
            }
        }

        Ok(Self { segments })
    }

    /// The path segments.
    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// The first object key, used to name the top-level field a path reads.
    #[must_use]
    pub fn root(&self) -> Option<&str> {
        match self.segments.first() {
            Some(PathSegment::Key(key)) => Some(key),
            _ => None,
        }
    }

    /// Whether the path contains only object keys.
    #[must_use]
    pub fn is_plain(&self) -> bool {
        self.segments.iter().all(|s| matches!(s, PathSegment::Key(_)))
    }

    /// Whether the path ends with the `[-]` marker.
    #[must_use]
    pub fn is_append(&self) -> bool {
        matches!(self.segments.last(), Some(PathSegment::Append))
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Key(key) if i == 0 => f.write_str(key)?,
                PathSegment::Key(key) => write!(f, ".{key}")?,
                PathSegment::Index(index) => write!(f, "[{index}]")?,
                PathSegment::Append => f.write_str("[-]")?,
            }
        }
        Ok(())
    }
}

impl std::str::FromStr for FieldPath {
    type Err = ExpressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ---------------------------------------------------------------------------
// Navigation
// ---------------------------------------------------------------------------

/// Numeric object keys address array elements (`a.0` reads like `a[0]`).
fn key_as_index(key: &str) -> Option<usize> {
    if key.bytes().all(|b| b.is_ascii_digit()) {
        key.parse().ok()
    } else {
        None
    }
}

/// Read the value at `path`, or `None` if any segment is missing.
///
/// Navigating through `null`, scalars, or out-of-range indices returns
/// `None`; `null` itself at the end of the path is a defined value.
#[must_use]
pub fn navigate<'a>(document: &'a Value, path: &FieldPath) -> Option<&'a Value> {
    let mut current = document;
    for segment in &path.segments {
        current = match (current, segment) {
            (Value::Object(map), PathSegment::Key(key)) => map.get(key)?,
            (Value::Array(items), PathSegment::Index(index)) => items.get(*index)?,
            (Value::Array(items), PathSegment::Key(key)) => items.get(key_as_index(key)?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Read the value at path text; malformed paths read as absent.
#[must_use]
pub fn get_field<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    FieldPath::parse(path)
        .ok()
        .and_then(|p| navigate(document, &p))
}

// ---------------------------------------------------------------------------
// Mutation
// ---------------------------------------------------------------------------

/// Set `path` to `value`, creating intermediate objects.
///
/// # Errors
///
/// Returns an error if an intermediate segment is not an object/array or an
/// index is out of range.
pub fn set_field(document: &mut Value, path: &FieldPath, value: Value) -> Result<(), ExpressionError> {
    apply_op(document, path, UpdateOp::Put, Some(&value))
}

/// Insert `value` at `path`: new key, array insert at `[N]`, or append at `[-]`.
///
/// # Errors
///
/// Returns `ExpressionError::IndexOutOfRange` if `N` is past the end.
pub fn insert_field(
    document: &mut Value,
    path: &FieldPath,
    value: Value,
) -> Result<(), ExpressionError> {
    apply_op(document, path, UpdateOp::Insert, Some(&value))
}

/// Remove the field or array element at `path`. Missing keys are ignored.
///
/// # Errors
///
/// Returns `ExpressionError::IndexOutOfRange` for an out-of-range index.
pub fn delete_field(document: &mut Value, path: &FieldPath) -> Result<(), ExpressionError> {
    apply_op(document, path, UpdateOp::Delete, None)
}

/// Apply one update operation at `path`.
///
/// `arg` is the operation's first argument; `move` expects the source path
/// as a string.
///
/// # Errors
///
/// Returns an error when the operation does not fit the document shape.
pub fn apply_op(
    document: &mut Value,
    path: &FieldPath,
    op: UpdateOp,
    arg: Option<&Value>,
) -> Result<(), ExpressionError> {
    if path.is_append() && op != UpdateOp::Insert {
        return Err(ExpressionError::invalid_update(format!(
            "'[-]' in '{path}' is only valid with insert"
        )));
    }
    if op == UpdateOp::Move {
        return move_field(document, path, arg);
    }
    mutate(document, &path.segments, op, arg, path)
}

fn move_field(document: &mut Value, target: &FieldPath, arg: Option<&Value>) -> Result<(), ExpressionError> {
    let Some(Value::String(source_text)) = arg else {
        return Err(ExpressionError::invalid_operand(
            "move",
            "source must be a field path",
        ));
    };
    let source = FieldPath::parse(source_text)?;
    let Some(value) = navigate(document, &source).cloned() else {
        return Err(ExpressionError::invalid_update(format!(
            "Field {source} not found"
        )));
    };
    mutate(document, &target.segments, UpdateOp::Put, Some(&value), target)?;
    if source != *target {
        mutate(document, &source.segments, UpdateOp::Delete, None, &source)?;
    }
    Ok(())
}

fn required_arg<'v>(arg: Option<&'v Value>, op: UpdateOp) -> Result<&'v Value, ExpressionError> {
    arg.ok_or_else(|| ExpressionError::invalid_operand(op.as_str(), "missing argument"))
}

fn mutate(
    current: &mut Value,
    segments: &[PathSegment],
    op: UpdateOp,
    arg: Option<&Value>,
    full: &FieldPath,
) -> Result<(), ExpressionError> {
    let Some((segment, rest)) = segments.split_first() else {
        return Err(ExpressionError::InvalidPath {
            path: full.to_string(),
            message: "empty path".to_owned(),
        });
    };
    if rest.is_empty() {
        return apply_terminal(current, segment, op, arg, full);
    }

    let creates = matches!(op, UpdateOp::Put | UpdateOp::Insert);
    let next = match (current, segment) {
        (Value::Object(map), PathSegment::Key(key)) => {
            if !map.contains_key(key) {
                if creates {
                    map.insert(key.clone(), Value::Object(Map::new()));
                } else if op == UpdateOp::Delete {
                    return Ok(());
                } else {
                    return Err(ExpressionError::invalid_update(format!(
                        "Field {full} not found"
                    )));
                }
            }
            map.get_mut(key)
        }
        (Value::Array(items), PathSegment::Index(index)) => {
            let len = items.len();
            Some(
                items
                    .get_mut(*index)
                    .ok_or(ExpressionError::IndexOutOfRange { index: *index, len })?,
            )
        }
        (Value::Array(items), PathSegment::Key(key)) if key_as_index(key).is_some() => {
            let index = key_as_index(key).unwrap_or_default();
            let len = items.len();
            Some(
                items
                    .get_mut(index)
                    .ok_or(ExpressionError::IndexOutOfRange { index, len })?,
            )
        }
        (other, _) => {
            return Err(ExpressionError::invalid_update(format!(
                "Cannot navigate into {} while updating {full}",
                type_name(other)
            )));
        }
    };

    match next {
        Some(next) => mutate(next, rest, op, arg, full),
        None => Err(ExpressionError::invalid_update(format!(
            "Field {full} not found"
        ))),
    }
}

fn apply_terminal(
    current: &mut Value,
    segment: &PathSegment,
    op: UpdateOp,
    arg: Option<&Value>,
    full: &FieldPath,
) -> Result<(), ExpressionError> {
    match (current, segment) {
        (Value::Object(map), PathSegment::Key(key)) => apply_to_key(map, key, op, arg, full),
        (Value::Array(items), PathSegment::Index(index)) => apply_to_index(items, *index, op, arg),
        (Value::Array(items), PathSegment::Key(key)) if key_as_index(key).is_some() => {
            apply_to_index(items, key_as_index(key).unwrap_or_default(), op, arg)
        }
        (Value::Array(items), PathSegment::Append) => {
            items.push(required_arg(arg, op)?.clone());
            Ok(())
        }
        (other, _) => Err(ExpressionError::invalid_update(format!(
            "Cannot {op} {full} inside {}",
            type_name(other)
        ))),
    }
}

fn apply_to_key(
    map: &mut Map<String, Value>,
    key: &str,
    op: UpdateOp,
    arg: Option<&Value>,
    full: &FieldPath,
) -> Result<(), ExpressionError> {
    match op {
        UpdateOp::Put | UpdateOp::Insert => {
            map.insert(key.to_owned(), required_arg(arg, op)?.clone());
        }
        UpdateOp::Delete => {
            map.remove(key);
        }
        UpdateOp::Increment => {
            let Value::Number(delta) = required_arg(arg, op)? else {
                return Err(ExpressionError::invalid_operand("increment", "delta must be a number"));
            };
            match map.get_mut(key) {
                None => {
                    map.insert(key.to_owned(), Value::Number(delta.clone()));
                }
                Some(Value::Number(current)) => {
                    *current = add_numbers(current, delta).ok_or_else(|| {
                        ExpressionError::invalid_update(format!("Increment of {full} overflowed"))
                    })?;
                }
                Some(_) => {
                    return Err(ExpressionError::TypeMismatch {
                        message: format!("Increment field {full} should be a number"),
                    });
                }
            }
        }
        UpdateOp::ArrayUnion => {
            let additions = list_arg(arg, op)?;
            match map.get_mut(key) {
                None => {
                    let mut items: Vec<Value> = Vec::new();
                    for value in additions {
                        if !list_contains(&items, value) {
                            items.push(value.clone());
                        }
                    }
                    map.insert(key.to_owned(), Value::Array(items));
                }
                Some(Value::Array(items)) => {
                    for value in additions {
                        if !list_contains(items, value) {
                            items.push(value.clone());
                        }
                    }
                }
                Some(_) => {
                    return Err(ExpressionError::invalid_update(format!(
                        "Field {full} must be an array"
                    )));
                }
            }
        }
        UpdateOp::ArrayRemove => {
            let removals = list_arg(arg, op)?;
            match map.get_mut(key) {
                None => {}
                Some(Value::Array(items)) => {
                    items.retain(|item| !removals.iter().any(|r| values_equal(item, r)));
                }
                Some(_) => {
                    return Err(ExpressionError::invalid_update(format!(
                        "Field {full} must be an array"
                    )));
                }
            }
        }
        UpdateOp::Move => {
            return Err(ExpressionError::invalid_update("move must target a whole path"));
        }
    }
    Ok(())
}

fn apply_to_index(
    items: &mut Vec<Value>,
    index: usize,
    op: UpdateOp,
    arg: Option<&Value>,
) -> Result<(), ExpressionError> {
    let len = items.len();
    let out_of_range = ExpressionError::IndexOutOfRange { index, len };
    match op {
        UpdateOp::Put => {
            let slot = items.get_mut(index).ok_or(out_of_range)?;
            *slot = required_arg(arg, op)?.clone();
        }
        UpdateOp::Insert => {
            if index > len {
                return Err(out_of_range);
            }
            items.insert(index, required_arg(arg, op)?.clone());
        }
        UpdateOp::Delete => {
            if index >= len {
                return Err(out_of_range);
            }
            items.remove(index);
        }
        UpdateOp::Increment => {
            let Value::Number(delta) = required_arg(arg, op)? else {
                return Err(ExpressionError::invalid_operand("increment", "delta must be a number"));
            };
            match items.get_mut(index).ok_or(out_of_range)? {
                Value::Number(current) => {
                    *current = add_numbers(current, delta).ok_or_else(|| {
                        ExpressionError::invalid_update("Increment overflowed")
                    })?;
                }
                _ => {
                    return Err(ExpressionError::TypeMismatch {
                        message: "Increment field should be a number".to_owned(),
                    });
                }
            }
        }
        UpdateOp::Move | UpdateOp::ArrayUnion | UpdateOp::ArrayRemove => {
            return Err(ExpressionError::invalid_update(format!(
                "Operation {op} not supported on array elements"
            )));
        }
    }
    Ok(())
}

fn list_arg(arg: Option<&Value>, op: UpdateOp) -> Result<&[Value], ExpressionError> {
    match required_arg(arg, op)? {
        Value::Array(items) => Ok(items),
        _ => Err(ExpressionError::invalid_operand(op.as_str(), "argument must be a list")),
    }
}
