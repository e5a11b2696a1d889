//! The x8 operation envelope.
//!
//! A [`StoreOperation`] is one logical request (get, put, query, ...). It
//! serializes as `{"name": "...", "args": {...}}`, and its `where`, `set`,
//! `select` and `order_by` arguments accept either text or a parsed AST.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use typed_builder::TypedBuilder;
use x8_ql::{Expression, OrderBy, Params, Select, Update};

use crate::types::{CollectionConfig, Index, Key};

/// An expression argument given as text or as an already-built AST.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Clause<T> {
    /// Text to be parsed, possibly with `@name` parameters.
    Text(String),
    /// A built AST.
    Parsed(T),
}

impl<T> From<&str> for Clause<T> {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl<T> From<String> for Clause<T> {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Expression> for Clause<Expression> {
    fn from(expr: Expression) -> Self {
        Self::Parsed(expr)
    }
}

impl From<Update> for Clause<Update> {
    fn from(update: Update) -> Self {
        Self::Parsed(update)
    }
}

impl From<Select> for Clause<Select> {
    fn from(select: Select) -> Self {
        Self::Parsed(select)
    }
}

impl From<OrderBy> for Clause<OrderBy> {
    fn from(order_by: OrderBy) -> Self {
        Self::Parsed(order_by)
    }
}

/// Which document version a write echoes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Returning {
    /// The document before the write.
    Old,
    /// The document after the write.
    New,
}

impl Returning {
    /// Returns the returning mode string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Old => "old",
            Self::New => "new",
        }
    }
}

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

/// Arguments of `get`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetArgs {
    /// Document key.
    pub key: Key,
    /// Target collection; the provider default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    /// Provider-native options, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nargs: Option<Value>,
}

/// Arguments of `put`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PutArgs {
    /// Document to store.
    pub value: Value,
    /// Explicit key; derived from the value when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<Key>,
    /// Condition the current document must satisfy.
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub where_: Option<Clause<Expression>>,
    /// Document version echoed back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returning: Option<Returning>,
    /// Values bound to `@name` placeholders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Params>,
    /// Target collection; the provider default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    /// Provider-native options, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nargs: Option<Value>,
}

/// Arguments of `update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateArgs {
    /// Document key.
    pub key: Key,
    /// Update operations.
    pub set: Clause<Update>,
    /// Condition the current document must satisfy.
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub where_: Option<Clause<Expression>>,
    /// Document version echoed back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returning: Option<Returning>,
    /// Values bound to `@name` placeholders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Params>,
    /// Target collection; the provider default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    /// Provider-native options, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nargs: Option<Value>,
}

/// Arguments of `delete`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteArgs {
    /// Document key.
    pub key: Key,
    /// Condition the current document must satisfy.
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub where_: Option<Clause<Expression>>,
    /// Values bound to `@name` placeholders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Params>,
    /// Target collection; the provider default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    /// Provider-native options, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nargs: Option<Value>,
}

/// Arguments of `query`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TypedBuilder)]
pub struct QueryArgs {
    /// Projection; all fields when absent.
    #[builder(default, setter(into, strip_option))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<Clause<Select>>,
    /// Condition the current document must satisfy.
    #[builder(default, setter(into, strip_option))]
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub where_: Option<Clause<Expression>>,
    /// Sort order.
    #[builder(default, setter(into, strip_option))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_by: Option<Clause<OrderBy>>,
    /// Maximum number of results.
    #[builder(default, setter(strip_option))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Results skipped before `limit` applies.
    #[builder(default, setter(strip_option))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    /// Values bound to `@name` placeholders.
    #[builder(default, setter(strip_option))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Params>,
    /// Target collection; the provider default when absent.
    #[builder(default, setter(into, strip_option))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    /// Provider-native options, passed through untouched.
    #[builder(default, setter(strip_option))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nargs: Option<Value>,
}

/// Arguments of `count`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CountArgs {
    /// Condition the current document must satisfy.
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub where_: Option<Clause<Expression>>,
    /// Values bound to `@name` placeholders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Params>,
    /// Target collection; the provider default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    /// Provider-native options, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nargs: Option<Value>,
}

/// Arguments of `batch` and `transact`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchArgs {
    /// Child operations, in order.
    pub operations: Vec<StoreOperation>,
}

/// Arguments of collection-level resource operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionArgs {
    /// Target collection; the provider default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    /// `exists()` or `not_exists()`.
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub where_: Option<Clause<Expression>>,
    /// Collection settings, including indexes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<CollectionConfig>,
}

/// Arguments of `create_index` and `drop_index`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexArgs {
    /// Index definition.
    pub index: Index,
    /// `exists()` or `not_exists()`.
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub where_: Option<Clause<Expression>>,
    /// Target collection; the provider default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// All supported store operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "args", rename_all = "snake_case")]
pub enum StoreOperation {
    // Item CRUD
    /// Read one document.
    Get(GetArgs),
    /// Write one document.
    Put(PutArgs),
    /// Mutate one document in place.
    Update(UpdateArgs),
    /// Remove one document.
    Delete(DeleteArgs),

    // Query
    /// Filter, sort, paginate, and project documents.
    Query(QueryArgs),
    /// Count matching documents.
    Count(CountArgs),

    // Multi-document
    /// Independent puts and deletes on one collection.
    Batch(BatchArgs),
    /// All-or-nothing group of writes.
    Transact(BatchArgs),

    // Resources
    /// Create a collection.
    CreateCollection(CollectionArgs),
    /// Drop a collection.
    DropCollection(CollectionArgs),
    /// List collection names.
    ListCollections,
    /// Whether a collection exists.
    HasCollection(CollectionArgs),
    /// Create an index.
    CreateIndex(IndexArgs),
    /// Drop an index.
    DropIndex(IndexArgs),
    /// List the indexes of a collection.
    ListIndexes(CollectionArgs),
    /// Release provider resources.
    Close,
}

impl StoreOperation {
    // -- Factories --

    /// `get(key)`.
    #[must_use]
    pub fn get(key: impl Into<Key>) -> Self {
        Self::Get(GetArgs {
            key: key.into(),
            collection: None,
            nargs: None,
        })
    }

    /// `put(value)`; the key is taken from the value.
    #[must_use]
    pub fn put(value: Value) -> Self {
        Self::Put(PutArgs {
            value,
            key: None,
            where_: None,
            returning: None,
            params: None,
            collection: None,
            nargs: None,
        })
    }

    /// `update(key, set)`.
    #[must_use]
    pub fn update(key: impl Into<Key>, set: impl Into<Clause<Update>>) -> Self {
        Self::Update(UpdateArgs {
            key: key.into(),
            set: set.into(),
            where_: None,
            returning: None,
            params: None,
            collection: None,
            nargs: None,
        })
    }

    /// `delete(key)`.
    #[must_use]
    pub fn delete(key: impl Into<Key>) -> Self {
        Self::Delete(DeleteArgs {
            key: key.into(),
            where_: None,
            params: None,
            collection: None,
            nargs: None,
        })
    }

    /// `query(...)`; see [`QueryArgs::builder`].
    #[must_use]
    pub fn query(args: QueryArgs) -> Self {
        Self::Query(args)
    }

    /// `count()` over every document.
    #[must_use]
    pub fn count() -> Self {
        Self::Count(CountArgs::default())
    }

    /// `batch(operations)`.
    #[must_use]
    pub fn batch(operations: Vec<StoreOperation>) -> Self {
        Self::Batch(BatchArgs { operations })
    }

    /// `transact(operations)`.
    #[must_use]
    pub fn transact(operations: Vec<StoreOperation>) -> Self {
        Self::Transact(BatchArgs { operations })
    }

    /// `create_collection()`.
    #[must_use]
    pub fn create_collection() -> Self {
        Self::CreateCollection(CollectionArgs::default())
    }

    /// `drop_collection()`.
    #[must_use]
    pub fn drop_collection() -> Self {
        Self::DropCollection(CollectionArgs::default())
    }

    /// `list_collections()`.
    #[must_use]
    pub fn list_collections() -> Self {
        Self::ListCollections
    }

    /// `has_collection()`.
    #[must_use]
    pub fn has_collection() -> Self {
        Self::HasCollection(CollectionArgs::default())
    }

    /// `create_index(index)`.
    #[must_use]
    pub fn create_index(index: Index) -> Self {
        Self::CreateIndex(IndexArgs {
            index,
            where_: None,
            collection: None,
        })
    }

    /// `drop_index(index)`.
    #[must_use]
    pub fn drop_index(index: Index) -> Self {
        Self::DropIndex(IndexArgs {
            index,
            where_: None,
            collection: None,
        })
    }

    /// `list_indexes()`.
    #[must_use]
    pub fn list_indexes() -> Self {
        Self::ListIndexes(CollectionArgs::default())
    }

    /// `close()`.
    #[must_use]
    pub fn close() -> Self {
        Self::Close
    }

    // -- Fluent arguments --
    // Each setter applies only to the variants that carry the argument.

    /// Set the `where` condition.
    #[must_use]
    pub fn with_where(mut self, condition: impl Into<Clause<Expression>>) -> Self {
        let condition = Some(condition.into());
        match &mut self {
            Self::Put(args) => args.where_ = condition,
            Self::Update(args) => args.where_ = condition,
            Self::Delete(args) => args.where_ = condition,
            Self::Query(args) => args.where_ = condition,
            Self::Count(args) => args.where_ = condition,
            Self::CreateCollection(args)
            | Self::DropCollection(args)
            | Self::HasCollection(args)
            | Self::ListIndexes(args) => args.where_ = condition,
            Self::CreateIndex(args) | Self::DropIndex(args) => args.where_ = condition,
            Self::Get(_) | Self::Batch(_) | Self::Transact(_) | Self::ListCollections | Self::Close => {}
        }
        self
    }

    /// Set the `returning` mode of a put or update.
    #[must_use]
    pub fn with_returning(mut self, returning: Returning) -> Self {
        match &mut self {
            Self::Put(args) => args.returning = Some(returning),
            Self::Update(args) => args.returning = Some(returning),
            _ => {}
        }
        self
    }

    /// Bind `@name` parameters for text arguments.
    #[must_use]
    pub fn with_params(mut self, params: Params) -> Self {
        let params = Some(params);
        match &mut self {
            Self::Put(args) => args.params = params,
            Self::Update(args) => args.params = params,
            Self::Delete(args) => args.params = params,
            Self::Query(args) => args.params = params,
            Self::Count(args) => args.params = params,
            _ => {}
        }
        self
    }

    /// Set an explicit key on a put.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<Key>) -> Self {
        if let Self::Put(args) = &mut self {
            args.key = Some(key.into());
        }
        self
    }

    /// Attach provider-native options.
    #[must_use]
    pub fn with_nargs(mut self, nargs: Value) -> Self {
        let nargs = Some(nargs);
        match &mut self {
            Self::Get(args) => args.nargs = nargs,
            Self::Put(args) => args.nargs = nargs,
            Self::Update(args) => args.nargs = nargs,
            Self::Delete(args) => args.nargs = nargs,
            Self::Query(args) => args.nargs = nargs,
            Self::Count(args) => args.nargs = nargs,
            _ => {}
        }
        self
    }

    /// Set the collection configuration of a `create_collection`.
    #[must_use]
    pub fn with_config(mut self, config: CollectionConfig) -> Self {
        if let Self::CreateCollection(args) = &mut self {
            args.config = Some(config);
        }
        self
    }

    /// Target a specific collection.
    #[must_use]
    pub fn in_collection(mut self, collection: impl Into<String>) -> Self {
        let collection = Some(collection.into());
        match &mut self {
            Self::Get(args) => args.collection = collection,
            Self::Put(args) => args.collection = collection,
            Self::Update(args) => args.collection = collection,
            Self::Delete(args) => args.collection = collection,
            Self::Query(args) => args.collection = collection,
            Self::Count(args) => args.collection = collection,
            Self::CreateCollection(args)
            | Self::DropCollection(args)
            | Self::HasCollection(args)
            | Self::ListIndexes(args) => args.collection = collection,
            Self::CreateIndex(args) | Self::DropIndex(args) => args.collection = collection,
            Self::Batch(_) | Self::Transact(_) | Self::ListCollections | Self::Close => {}
        }
        self
    }

    /// The operation name.
    #[must_use]
    pub fn name(&self) -> OperationName {
        match self {
            Self::Get(_) => OperationName::Get,
            Self::Put(_) => OperationName::Put,
            Self::Update(_) => OperationName::Update,
            Self::Delete(_) => OperationName::Delete,
            Self::Query(_) => OperationName::Query,
            Self::Count(_) => OperationName::Count,
            Self::Batch(_) => OperationName::Batch,
            Self::Transact(_) => OperationName::Transact,
            Self::CreateCollection(_) => OperationName::CreateCollection,
            Self::DropCollection(_) => OperationName::DropCollection,
            Self::ListCollections => OperationName::ListCollections,
            Self::HasCollection(_) => OperationName::HasCollection,
            Self::CreateIndex(_) => OperationName::CreateIndex,
            Self::DropIndex(_) => OperationName::DropIndex,
            Self::ListIndexes(_) => OperationName::ListIndexes,
            Self::Close => OperationName::Close,
        }
    }
}

/// Names of all store operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationName {
    // Item CRUD
    /// `get`
    Get,
    /// `put`
    Put,
    /// `update`
    Update,
    /// `delete`
    Delete,

    // Query
    /// `query`
    Query,
    /// `count`
    Count,

    // Multi-document
    /// `batch`
    Batch,
    /// `transact`
    Transact,

    // Resources
    /// `create_collection`
    CreateCollection,
    /// `drop_collection`
    DropCollection,
    /// `list_collections`
    ListCollections,
    /// `has_collection`
    HasCollection,
    /// `create_index`
    CreateIndex,
    /// `drop_index`
    DropIndex,
    /// `list_indexes`
    ListIndexes,
    /// `close`
    Close,
}

impl OperationName {
    /// Returns the operation name string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Put => "put",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Query => "query",
            Self::Count => "count",
            Self::Batch => "batch",
            Self::Transact => "transact",
            Self::CreateCollection => "create_collection",
            Self::DropCollection => "drop_collection",
            Self::ListCollections => "list_collections",
            Self::HasCollection => "has_collection",
            Self::CreateIndex => "create_index",
            Self::DropIndex => "drop_index",
            Self::ListIndexes => "list_indexes",
            Self::Close => "close",
        }
    }

    /// Parse an operation name string into an `OperationName`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "get" => Some(Self::Get),
            "put" => Some(Self::Put),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            "query" => Some(Self::Query),
            "count" => Some(Self::Count),
            "batch" => Some(Self::Batch),
            "transact" => Some(Self::Transact),
            "create_collection" => Some(Self::CreateCollection),
            "drop_collection" => Some(Self::DropCollection),
            "list_collections" => Some(Self::ListCollections),
            "has_collection" => Some(Self::HasCollection),
            "create_index" => Some(Self::CreateIndex),
            "drop_index" => Some(Self::DropIndex),
            "list_indexes" => Some(Self::ListIndexes),
            "close" => Some(Self::Close),
            _ => None,
        }
    }

    /// Whether the operation targets a collection or the provider rather than items.
    #[must_use]
    pub fn is_resource_op(&self) -> bool {
        matches!(
            self,
            Self::CreateCollection
                | Self::DropCollection
                | Self::ListCollections
                | Self::HasCollection
                | Self::CreateIndex
                | Self::DropIndex
                | Self::ListIndexes
                | Self::Close
        )
    }
}

impl fmt::Display for OperationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use x8_ql::ComparisonOp;

    use super::*;

    #[test]
    fn test_should_round_trip_operation_names() {
        for name in [
            OperationName::Get,
            OperationName::Transact,
            OperationName::CreateIndex,
            OperationName::Close,
        ] {
            assert_eq!(OperationName::from_name(name.as_str()), Some(name));
        }
        assert_eq!(OperationName::from_name("scan"), None);
        assert!(OperationName::ListIndexes.is_resource_op());
        assert!(!OperationName::Query.is_resource_op());
    }

    #[test]
    fn test_should_serialize_as_name_and_args() {
        let op = StoreOperation::update("1", "int=put(99)")
            .with_where("exists()")
            .with_returning(Returning::New)
            .in_collection("docs");
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(
            json,
            json!({
                "name": "update",
                "args": {
                    "key": {"id": "1"},
                    "set": "int=put(99)",
                    "where": "exists()",
                    "returning": "new",
                    "collection": "docs",
                }
            })
        );
        let back: StoreOperation = serde_json::from_value(json).unwrap();
        assert_eq!(back, op);
    }

    #[test]
    fn test_should_accept_parsed_expression_arguments() {
        let condition = Expression::compare(
            Expression::field("int"),
            ComparisonOp::Gt,
            Expression::value(3),
        );
        let op = StoreOperation::count().with_where(condition.clone());
        let json = serde_json::to_string(&op).unwrap();
        let back: StoreOperation = serde_json::from_str(&json).unwrap();
        match back {
            StoreOperation::Count(args) => {
                assert_eq!(args.where_, Some(Clause::Parsed(condition)));
            }
            other => panic!("expected Count, got {other:?}"),
        }
    }

    #[test]
    fn test_should_build_query_args() {
        let op = StoreOperation::query(
            QueryArgs::builder()
                .where_("pk = 'pk00'")
                .order_by(OrderBy::new().desc("int"))
                .limit(2)
                .build(),
        );
        assert_eq!(op.name(), OperationName::Query);
        let StoreOperation::Query(args) = op else {
            panic!("expected Query");
        };
        assert_eq!(args.limit, Some(2));
        assert_eq!(args.offset, None);
        assert!(matches!(args.order_by, Some(Clause::Parsed(_))));
    }

    #[test]
    fn test_should_serialize_unit_operations() {
        let json = serde_json::to_value(StoreOperation::close()).unwrap();
        assert_eq!(json, json!({"name": "close"}));
        let back: StoreOperation = serde_json::from_value(json!({"name": "list_collections"})).unwrap();
        assert_eq!(back, StoreOperation::ListCollections);
    }
}
