//! Typed access to the arguments of a [`StoreOperation`].
//!
//! Providers never match on operation arguments directly. They wrap the
//! operation in an [`OperationParser`] and ask for the pieces they need;
//! text-form `where`, `set`, `select` and `order_by` arguments are parsed
//! on first access with the operation's parameters and cached.

use std::cell::OnceCell;

use serde_json::Value;
use x8_model::error::X8Error;
use x8_model::operation::{Clause, OperationName, Returning, StoreOperation};
use x8_model::types::{CollectionConfig, Index, Key, MatchCondition};
use x8_ql::{
    ComparisonOp, Expression, OrderBy, Params, Select, Update, parse_condition, parse_order_by,
    parse_select, parse_update,
};

use crate::error::expression_error_to_x8;
use crate::item::ETAG_FIELD;

/// Lazily-parsing view over one operation.
#[derive(Debug)]
pub struct OperationParser<'a> {
    operation: &'a StoreOperation,
    where_: OnceCell<Option<Expression>>,
    set: OnceCell<Update>,
    select: OnceCell<Select>,
    order_by: OnceCell<OrderBy>,
    children: OnceCell<Vec<OperationParser<'a>>>,
}

impl<'a> OperationParser<'a> {
    /// Wrap `operation`.
    #[must_use]
    pub fn new(operation: &'a StoreOperation) -> Self {
        Self {
            operation,
            where_: OnceCell::new(),
            set: OnceCell::new(),
            select: OnceCell::new(),
            order_by: OnceCell::new(),
            children: OnceCell::new(),
        }
    }

    /// The wrapped operation.
    #[must_use]
    pub fn operation(&self) -> &'a StoreOperation {
        self.operation
    }

    /// The operation name.
    #[must_use]
    pub fn op_name(&self) -> OperationName {
        self.operation.name()
    }

    /// Whether the operation is `name`.
    #[must_use]
    pub fn op_equals(&self, name: OperationName) -> bool {
        self.operation.name() == name
    }

    /// Whether the operation targets a collection or the provider rather than an item.
    #[must_use]
    pub fn is_resource_op(&self) -> bool {
        self.operation.name().is_resource_op()
    }

    // -- Plain arguments --

    /// The `key` argument.
    #[must_use]
    pub fn get_key(&self) -> Option<&'a Key> {
        match self.operation {
            StoreOperation::Get(args) => Some(&args.key),
            StoreOperation::Put(args) => args.key.as_ref(),
            StoreOperation::Update(args) => Some(&args.key),
            StoreOperation::Delete(args) => Some(&args.key),
            _ => None,
        }
    }

    /// The `value` argument of a put.
    #[must_use]
    pub fn get_value(&self) -> Option<&'a Value> {
        match self.operation {
            StoreOperation::Put(args) => Some(&args.value),
            _ => None,
        }
    }

    /// The `limit` argument.
    #[must_use]
    pub fn get_limit(&self) -> Option<usize> {
        match self.operation {
            StoreOperation::Query(args) => args.limit,
            _ => None,
        }
    }

    /// The `offset` argument.
    #[must_use]
    pub fn get_offset(&self) -> Option<usize> {
        match self.operation {
            StoreOperation::Query(args) => args.offset,
            _ => None,
        }
    }

    /// The `returning` argument.
    #[must_use]
    pub fn get_returning(&self) -> Option<Returning> {
        match self.operation {
            StoreOperation::Put(args) => args.returning,
            StoreOperation::Update(args) => args.returning,
            _ => None,
        }
    }

    /// The bound `@name` parameters.
    #[must_use]
    pub fn get_params(&self) -> Option<&'a Params> {
        match self.operation {
            StoreOperation::Put(args) => args.params.as_ref(),
            StoreOperation::Update(args) => args.params.as_ref(),
            StoreOperation::Delete(args) => args.params.as_ref(),
            StoreOperation::Query(args) => args.params.as_ref(),
            StoreOperation::Count(args) => args.params.as_ref(),
            _ => None,
        }
    }

    /// Provider-native options. The memory provider ignores them.
    #[must_use]
    pub fn get_nargs(&self) -> Option<&'a Value> {
        match self.operation {
            StoreOperation::Get(args) => args.nargs.as_ref(),
            StoreOperation::Put(args) => args.nargs.as_ref(),
            StoreOperation::Update(args) => args.nargs.as_ref(),
            StoreOperation::Delete(args) => args.nargs.as_ref(),
            StoreOperation::Query(args) => args.nargs.as_ref(),
            StoreOperation::Count(args) => args.nargs.as_ref(),
            _ => None,
        }
    }

    /// The collection named by the operation.
    ///
    /// For a batch this is the collection of its first operation.
    #[must_use]
    pub fn get_collection_name(&self) -> Option<&'a str> {
        match self.operation {
            StoreOperation::Get(args) => args.collection.as_deref(),
            StoreOperation::Put(args) => args.collection.as_deref(),
            StoreOperation::Update(args) => args.collection.as_deref(),
            StoreOperation::Delete(args) => args.collection.as_deref(),
            StoreOperation::Query(args) => args.collection.as_deref(),
            StoreOperation::Count(args) => args.collection.as_deref(),
            StoreOperation::CreateCollection(args)
            | StoreOperation::DropCollection(args)
            | StoreOperation::HasCollection(args)
            | StoreOperation::ListIndexes(args) => args.collection.as_deref(),
            StoreOperation::CreateIndex(args) | StoreOperation::DropIndex(args) => {
                args.collection.as_deref()
            }
            StoreOperation::Batch(args) => args
                .operations
                .first()
                .and_then(|op| OperationParser::new(op).get_collection_name()),
            StoreOperation::Transact(_) | StoreOperation::ListCollections | StoreOperation::Close => {
                None
            }
        }
    }

    /// The `index` argument.
    pub fn get_index(&self) -> Result<&'a Index, X8Error> {
        match self.operation {
            StoreOperation::CreateIndex(args) | StoreOperation::DropIndex(args) => Ok(&args.index),
            _ => Err(X8Error::bad_request("Index parameter missing")),
        }
    }

    /// The `config` argument of `create_collection`.
    #[must_use]
    pub fn get_config(&self) -> Option<&'a CollectionConfig> {
        match self.operation {
            StoreOperation::CreateCollection(args) => args.config.as_ref(),
            _ => None,
        }
    }

    /// One parser per operation of a batch or transact.
    #[must_use]
    pub fn get_operation_parsers(&self) -> &[OperationParser<'a>] {
        self.children.get_or_init(|| match self.operation {
            StoreOperation::Batch(args) | StoreOperation::Transact(args) => {
                args.operations.iter().map(OperationParser::new).collect()
            }
            _ => Vec::new(),
        })
    }

    // -- Expression arguments --

    fn where_clause(&self) -> Option<&'a Clause<Expression>> {
        match self.operation {
            StoreOperation::Put(args) => args.where_.as_ref(),
            StoreOperation::Update(args) => args.where_.as_ref(),
            StoreOperation::Delete(args) => args.where_.as_ref(),
            StoreOperation::Query(args) => args.where_.as_ref(),
            StoreOperation::Count(args) => args.where_.as_ref(),
            StoreOperation::CreateCollection(args)
            | StoreOperation::DropCollection(args)
            | StoreOperation::HasCollection(args)
            | StoreOperation::ListIndexes(args) => args.where_.as_ref(),
            StoreOperation::CreateIndex(args) | StoreOperation::DropIndex(args) => {
                args.where_.as_ref()
            }
            _ => None,
        }
    }

    /// The `where` condition.
    pub fn get_where(&self) -> Result<Option<&Expression>, X8Error> {
        match self.where_clause() {
            None => Ok(None),
            Some(Clause::Parsed(expr)) => Ok(Some(expr)),
            Some(Clause::Text(text)) => {
                let parsed = cached(&self.where_, || {
                    if text.trim().is_empty() {
                        return Ok(None);
                    }
                    parse_condition(text, self.get_params())
                        .map(Some)
                        .map_err(expression_error_to_x8)
                })?;
                Ok(parsed.as_ref())
            }
        }
    }

    /// The `set` mutation of an update.
    pub fn get_set(&self) -> Result<&Update, X8Error> {
        let StoreOperation::Update(args) = self.operation else {
            return Err(X8Error::bad_request("Update set missing"));
        };
        match &args.set {
            Clause::Parsed(update) => Ok(update),
            Clause::Text(text) => cached(&self.set, || {
                parse_update(text, self.get_params()).map_err(expression_error_to_x8)
            }),
        }
    }

    /// The `select` projection of a query.
    pub fn get_select(&self) -> Result<Option<&Select>, X8Error> {
        let StoreOperation::Query(args) = self.operation else {
            return Ok(None);
        };
        match &args.select {
            None => Ok(None),
            Some(Clause::Parsed(select)) => Ok(Some(select)),
            Some(Clause::Text(text)) => cached(&self.select, || {
                parse_select(text).map_err(expression_error_to_x8)
            })
            .map(Some),
        }
    }

    /// The `order_by` specification of a query.
    pub fn get_order_by(&self) -> Result<Option<&OrderBy>, X8Error> {
        let StoreOperation::Query(args) = self.operation else {
            return Ok(None);
        };
        match &args.order_by {
            None => Ok(None),
            Some(Clause::Parsed(order_by)) => Ok(Some(order_by)),
            Some(Clause::Text(text)) => cached(&self.order_by, || {
                parse_order_by(text).map_err(expression_error_to_x8)
            })
            .map(Some),
        }
    }

    // -- Derived conditions --

    /// `Some(true)` if `where` is exactly `exists()` (or `not not_exists()`),
    /// `Some(false)` if it is exactly `not_exists()` (or `not exists()`).
    pub fn get_where_exists(&self) -> Result<Option<bool>, X8Error> {
        let Some(mut expr) = self.get_where()? else {
            return Ok(None);
        };
        let mut exists = true;
        if let Expression::Not { expr: inner } = expr {
            expr = inner.as_ref();
            exists = false;
        }
        if expr.as_builtin_call("exists").is_some() {
            return Ok(Some(exists));
        }
        if expr.as_builtin_call("not_exists").is_some() {
            return Ok(Some(!exists));
        }
        Ok(None)
    }

    /// The value compared in `where` when it is exactly `$etag = value`.
    pub fn get_where_etag(&self) -> Result<Option<&Value>, X8Error> {
        let Some(Expression::Comparison(cmp)) = self.get_where()? else {
            return Ok(None);
        };
        if cmp.op != ComparisonOp::Eq {
            return Ok(None);
        }
        Ok(etag_operand(&cmp.lexpr, &cmp.rexpr))
    }

    /// Fold a conjunction of presence and etag checks into a [`MatchCondition`].
    ///
    /// Other conjuncts are ignored; `or` and `not` are rejected.
    pub fn get_match_condition(&self) -> Result<MatchCondition, X8Error> {
        let mut condition = MatchCondition::default();
        let mut conjuncts = Vec::new();
        if let Some(expr) = self.get_where()? {
            flatten_and(expr, &mut conjuncts)?;
        }
        for expr in conjuncts {
            if expr.as_builtin_call("exists").is_some() {
                condition.exists = Some(true);
            } else if expr.as_builtin_call("not_exists").is_some() {
                condition.exists = Some(false);
            } else if let Expression::Comparison(cmp) = expr {
                let etag = etag_operand(&cmp.lexpr, &cmp.rexpr).and_then(Value::as_str);
                match (cmp.op, etag) {
                    (ComparisonOp::Eq, Some(etag)) => condition.if_match = Some(etag.to_owned()),
                    (ComparisonOp::Ne, Some(etag)) => {
                        condition.if_none_match = Some(etag.to_owned());
                    }
                    _ => {}
                }
            }
        }
        Ok(condition)
    }
}

/// Parse once into `cell`; later calls return the cached value.
fn cached<T>(cell: &OnceCell<T>, parse: impl FnOnce() -> Result<T, X8Error>) -> Result<&T, X8Error> {
    if let Some(value) = cell.get() {
        return Ok(value);
    }
    let value = parse()?;
    Ok(cell.get_or_init(|| value))
}

/// The literal on the other side of a `$etag` field, in either order.
fn etag_operand<'e>(lexpr: &'e Expression, rexpr: &'e Expression) -> Option<&'e Value> {
    match (lexpr, rexpr) {
        (Expression::Field(field), Expression::Value(value))
        | (Expression::Value(value), Expression::Field(field))
            if field.path == ETAG_FIELD =>
        {
            Some(value)
        }
        _ => None,
    }
}

fn flatten_and<'e>(expr: &'e Expression, out: &mut Vec<&'e Expression>) -> Result<(), X8Error> {
    match expr {
        Expression::And { lexpr, rexpr } => {
            flatten_and(lexpr, out)?;
            flatten_and(rexpr, out)
        }
        Expression::Or { .. } => Err(X8Error::bad_request("OR is not supported in WHERE")),
        Expression::Not { .. } => Err(X8Error::bad_request("NOT is not supported in WHERE")),
        other => {
            out.push(other);
            Ok(())
        }
    }
}
