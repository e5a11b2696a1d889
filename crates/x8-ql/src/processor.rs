//! In-memory query and update engine.
//!
//! `QueryProcessor` evaluates conditions, applies updates, and runs
//! filter/sort/paginate/project pipelines directly over JSON documents. It is
//! the reference semantics every backend translation must match.

use std::collections::BTreeSet;

use serde_json::{Map, Value};
use tracing::debug;

use crate::ast::{
    Expression, OrderBy, OrderByDirection, Select, SelectTerm, Update, UpdateOp,
};
use crate::error::ExpressionError;
use crate::evaluator::{EvalContext, PatternCache};
use crate::path::{FieldPath, FieldResolver, apply_op, navigate, set_field};
use crate::value::sort_order;

/// Stateless query/update engine over JSON documents.
#[derive(Debug, Default, Clone, Copy)]
pub struct QueryProcessor;

impl QueryProcessor {
    /// Whether `item` satisfies `expr`. No condition always holds.
    pub fn eval_expr(
        item: Option<&Value>,
        expr: Option<&Expression>,
        resolver: &dyn FieldResolver,
    ) -> Result<bool, ExpressionError> {
        match expr {
            Some(expr) => EvalContext::new(item, resolver).evaluate(expr),
            None => Ok(true),
        }
    }

    /// Apply `update` to a copy of `item` and return the new document.
    ///
    /// Operations apply left to right. On error the caller's document is
    /// untouched and no partial result is returned.
    pub fn update_item(
        item: &Value,
        update: &Update,
        resolver: &dyn FieldResolver,
    ) -> Result<Value, ExpressionError> {
        let mut document = item.clone();
        for operation in &update.operations {
            let path = FieldPath::parse(&resolver.resolve_field(&operation.field))?;
            let arg = match (operation.op, operation.args.first()) {
                (UpdateOp::Move, Some(Value::String(source))) => {
                    Some(Value::String(resolver.resolve_field(source).into_owned()))
                }
                (_, arg) => arg.cloned(),
            };
            apply_op(&mut document, &path, operation.op, arg.as_ref())?;
        }
        Ok(document)
    }

    /// Filter, sort, paginate, and project `items`.
    ///
    /// Sorting is stable; absent sort fields order before defined ones and a
    /// descending term reverses that. `offset` applies before `limit`.
    pub fn query_items<'a, I>(
        items: I,
        select: Option<&Select>,
        where_: Option<&Expression>,
        order_by: Option<&OrderBy>,
        limit: Option<usize>,
        offset: Option<usize>,
        resolver: &dyn FieldResolver,
    ) -> Result<Vec<Value>, ExpressionError>
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let mut matched = Self::filter(items, where_, resolver)?;
        let total = matched.len();

        if let Some(order_by) = order_by.filter(|o| !o.terms.is_empty()) {
            Self::sort(&mut matched, order_by, resolver)?;
        }

        let page = matched
            .into_iter()
            .skip(offset.unwrap_or(0))
            .take(limit.unwrap_or(usize::MAX));

        let result = match select.filter(|s| !s.is_all()) {
            Some(select) => page
                .map(|item| Self::project(item, select, resolver))
                .collect::<Result<Vec<_>, _>>()?,
            None => page.cloned().collect(),
        };

        debug!(matched = total, returned = result.len(), "query_items");
        Ok(result)
    }

    /// Number of `items` satisfying `where_`.
    pub fn count_items<'a, I>(
        items: I,
        where_: Option<&Expression>,
        resolver: &dyn FieldResolver,
    ) -> Result<usize, ExpressionError>
    where
        I: IntoIterator<Item = &'a Value>,
    {
        Ok(Self::filter(items, where_, resolver)?.len())
    }

    /// Distinct top-level document fields read by a condition.
    #[must_use]
    pub fn extract_filter_fields(
        expr: &Expression,
        resolver: &dyn FieldResolver,
    ) -> Vec<String> {
        let mut fields = BTreeSet::new();
        collect_fields(expr, resolver, &mut fields);
        fields.into_iter().collect()
    }

    /// Top-level output fields produced by an explicit projection. Empty for
    /// `*`.
    #[must_use]
    pub fn projected_fields(select: &Select) -> BTreeSet<String> {
        select
            .terms
            .iter()
            .map(|term| match output_path(term) {
                (name, Some(path)) => path.root().map_or(name, str::to_owned),
                (name, None) => name,
            })
            .collect()
    }

    fn filter<'a, I>(
        items: I,
        where_: Option<&Expression>,
        resolver: &dyn FieldResolver,
    ) -> Result<Vec<&'a Value>, ExpressionError>
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let Some(where_) = where_ else {
            return Ok(items.into_iter().collect());
        };
        let patterns = PatternCache::new();
        let mut matched = Vec::new();
        for item in items {
            if EvalContext::new(Some(item), resolver)
                .with_patterns(&patterns)
                .evaluate(where_)?
            {
                matched.push(item);
            }
        }
        Ok(matched)
    }

    fn sort(
        items: &mut [&Value],
        order_by: &OrderBy,
        resolver: &dyn FieldResolver,
    ) -> Result<(), ExpressionError> {
        let terms = order_by
            .terms
            .iter()
            .map(|term| {
                FieldPath::parse(&resolver.resolve_field(&term.field))
                    .map(|path| (path, term.direction))
            })
            .collect::<Result<Vec<_>, _>>()?;

        items.sort_by(|a, b| {
            terms
                .iter()
                .map(|(path, direction)| {
                    let ord = sort_order(navigate(a, path), navigate(b, path));
                    match direction {
                        OrderByDirection::Asc => ord,
                        OrderByDirection::Desc => ord.reverse(),
                    }
                })
                .find(|ord| ord.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(())
    }

    /// Keep only the selected fields. Dotted selections keep their nesting;
    /// a leading `$` is dropped from the output key.
    fn project(
        item: &Value,
        select: &Select,
        resolver: &dyn FieldResolver,
    ) -> Result<Value, ExpressionError> {
        let mut projected = Value::Object(Map::new());
        for term in &select.terms {
            let path = FieldPath::parse(&resolver.resolve_field(&term.field))?;
            let Some(value) = navigate(item, &path) else {
                continue;
            };

            let (name, nested) = output_path(term);
            match nested {
                Some(out_path) => set_field(&mut projected, &out_path, value.clone())?,
                None => {
                    if let Value::Object(map) = &mut projected {
                        map.insert(name, value.clone());
                    }
                }
            }
        }
        Ok(projected)
    }
}

/// Output key of a projected term, plus its nested path when an unaliased
/// dotted selection keeps its nesting.
fn output_path(term: &SelectTerm) -> (String, Option<FieldPath>) {
    match &term.alias {
        Some(alias) => (alias.clone(), None),
        None => {
            let name = term.field.trim_start_matches('$').to_owned();
            let nested = FieldPath::parse(&name).ok().filter(FieldPath::is_plain);
            (name, nested)
        }
    }
}

fn collect_fields(expr: &Expression, resolver: &dyn FieldResolver, out: &mut BTreeSet<String>) {
    match expr {
        Expression::Field(field) => {
            if let Ok(path) = FieldPath::parse(&resolver.resolve_field(&field.path)) {
                if let Some(root) = path.root() {
                    out.insert(root.to_owned());
                }
            }
        }
        Expression::Value(_) => {}
        Expression::Function(func) => {
            for arg in func.args.iter().chain(func.named_args.values()) {
                collect_fields(arg, resolver, out);
            }
        }
        Expression::Comparison(cmp) => {
            collect_fields(&cmp.lexpr, resolver, out);
            collect_fields(&cmp.rexpr, resolver, out);
        }
        Expression::And { lexpr, rexpr } | Expression::Or { lexpr, rexpr } => {
            collect_fields(lexpr, resolver, out);
            collect_fields(rexpr, resolver, out);
        }
        Expression::Not { expr } => collect_fields(expr, resolver, out),
    }
}
