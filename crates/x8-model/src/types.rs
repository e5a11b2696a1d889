//! Shared result and resource types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Document identity: an id, optionally scoped by a partition key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    /// Document id.
    pub id: Value,
    /// Partition key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pk: Option<Value>,
}

impl Key {
    /// A key with only an id.
    #[must_use]
    pub fn new(id: impl Into<Value>) -> Self {
        Self {
            id: id.into(),
            pk: None,
        }
    }

    /// A key with an id and a partition key.
    #[must_use]
    pub fn with_pk(id: impl Into<Value>, pk: impl Into<Value>) -> Self {
        Self {
            id: id.into(),
            pk: Some(pk.into()),
        }
    }
}

impl From<&str> for Key {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for Key {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

/// Version and bookkeeping metadata of a stored item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Properties {
    /// Opaque version token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// Last modification time, when the backend tracks it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

/// A stored document together with its key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Document key.
    pub key: Key,
    /// Document body, omitted when not requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Backend-specific metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// Version properties.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Properties>,
}

impl Item {
    /// The item's etag, if any.
    #[must_use]
    pub fn etag(&self) -> Option<&str> {
        self.properties.as_ref()?.etag.as_deref()
    }
}

/// Result of a query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemList {
    /// Matching items in result order.
    pub items: Vec<Item>,
}

/// Outcome of a collection create or drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionStatus {
    /// The collection was created.
    Created,
    /// The collection already existed.
    Exists,
    /// The collection was dropped.
    Dropped,
    /// The collection did not exist.
    NotExists,
}

/// Outcome of an index create or drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    /// The index was created.
    Created,
    /// The index already existed.
    Exists,
    /// The index was dropped.
    Dropped,
    /// The index did not exist.
    NotExists,
}

/// Result of an index create or drop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexResult {
    /// Resolved index name.
    pub name: String,
    /// What happened.
    pub status: IndexStatus,
}

/// Result of a collection create or drop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionResult {
    /// What happened.
    pub status: CollectionStatus,
    /// Indexes created with the collection.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<IndexResult>,
}

/// Index kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    /// Ordered index for range queries.
    Range,
    /// Equality-only index.
    Hash,
    /// Generic single-field index.
    Field,
    /// Expiry index.
    Ttl,
    /// Index over every field.
    Wildcard,
    /// Index over array elements.
    Array,
    /// Full-text index.
    Text,
    /// Vector similarity index.
    Vector,
    /// Multi-field index.
    Composite,
}

impl IndexKind {
    /// Returns the kind name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Range => "range",
            Self::Hash => "hash",
            Self::Field => "field",
            Self::Ttl => "ttl",
            Self::Wildcard => "wildcard",
            Self::Array => "array",
            Self::Text => "text",
            Self::Vector => "vector",
            Self::Composite => "composite",
        }
    }
}

/// Index descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    /// Explicit name. Derived from kind and fields when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Index kind.
    pub kind: IndexKind,
    /// Indexed field paths.
    #[serde(default)]
    pub fields: Vec<String>,
}

impl Index {
    /// An unnamed index over `fields`.
    #[must_use]
    pub fn new(kind: IndexKind, fields: Vec<String>) -> Self {
        Self {
            name: None,
            kind,
            fields,
        }
    }

    /// Set an explicit name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The explicit name, or `{kind}_{field1}_{field2}`.
    #[must_use]
    pub fn resolved_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => {
                let mut name = self.kind.as_str().to_owned();
                for field in &self.fields {
                    name.push('_');
                    name.push_str(&field.replace(['.', '[', ']'], "_"));
                }
                name
            }
        }
    }
}

/// Collection creation options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Indexes to create with the collection.
    #[serde(default)]
    pub indexes: Vec<Index>,
}

/// Native conditional-write form of a `where` made only of presence and etag checks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCondition {
    /// `Some(true)` for `exists()`, `Some(false)` for `not_exists()`.
    pub exists: Option<bool>,
    /// Required etag (`$etag = 'x'`).
    pub if_match: Option<String>,
    /// Forbidden etag (`$etag != 'x'`).
    pub if_none_match: Option<String>,
}

/// Per-call context passed to providers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// Correlation id carried into log spans.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

impl Context {
    /// A context with a trace id.
    #[must_use]
    pub fn with_trace_id(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: Some(trace_id.into()),
        }
    }
}

/// Result of running one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "result", rename_all = "snake_case")]
pub enum Response {
    /// No payload (`delete`, `close`).
    Empty,
    /// A single item (`get`, `put`, `update`, `delete` with `returning`).
    Item(Item),
    /// Query results.
    Items(ItemList),
    /// `count` result.
    Count(usize),
    /// Per-operation results of `batch` or `transact`; `None` for deletes.
    Batch(Vec<Option<Item>>),
    /// Collection create/drop outcome.
    Collection(CollectionResult),
    /// Index create/drop outcome.
    Index(IndexResult),
    /// `list_indexes` result.
    Indexes(Vec<Index>),
    /// `list_collections` result.
    Names(Vec<String>),
    /// `has_collection` result.
    Bool(bool),
}

impl Response {
    /// The single item, if this is an item response.
    #[must_use]
    pub fn into_item(self) -> Option<Item> {
        match self {
            Self::Item(item) => Some(item),
            _ => None,
        }
    }

    /// The query results, if this is a query response.
    #[must_use]
    pub fn into_items(self) -> Option<Vec<Item>> {
        match self {
            Self::Items(list) => Some(list.items),
            _ => None,
        }
    }

    /// The batch/transact results.
    #[must_use]
    pub fn into_batch(self) -> Option<Vec<Option<Item>>> {
        match self {
            Self::Batch(results) => Some(results),
            _ => None,
        }
    }

    /// The count, if this is a count response.
    #[must_use]
    pub fn count(&self) -> Option<usize> {
        match self {
            Self::Count(n) => Some(*n),
            _ => None,
        }
    }

    /// The collection status, if this is a collection response.
    #[must_use]
    pub fn collection_status(&self) -> Option<CollectionStatus> {
        match self {
            Self::Collection(result) => Some(result.status),
            _ => None,
        }
    }

    /// The index status, if this is an index response.
    #[must_use]
    pub fn index_status(&self) -> Option<IndexStatus> {
        match self {
            Self::Index(result) => Some(result.status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_should_derive_index_name() {
        let index = Index::new(IndexKind::Range, vec!["obj.nint".to_owned(), "int".to_owned()]);
        assert_eq!(index.resolved_name(), "range_obj_nint_int");
        assert_eq!(index.named("by_int").resolved_name(), "by_int");
    }

    #[test]
    fn test_should_serialize_item_without_empty_fields() {
        let item = Item {
            key: Key::with_pk("1", "pk00"),
            value: None,
            metadata: None,
            properties: Some(Properties {
                etag: Some("e1".to_owned()),
                last_modified: None,
            }),
        };
        assert_eq!(
            serde_json::to_value(&item).unwrap(),
            json!({"key": {"id": "1", "pk": "pk00"}, "properties": {"etag": "e1"}})
        );
        assert_eq!(item.etag(), Some("e1"));
    }

    #[test]
    fn test_should_unwrap_response_variants() {
        assert_eq!(Response::Count(3).count(), Some(3));
        assert!(Response::Empty.into_item().is_none());
        let status = Response::Collection(CollectionResult {
            status: CollectionStatus::Exists,
            indexes: Vec::new(),
        })
        .collection_status();
        assert_eq!(status, Some(CollectionStatus::Exists));
    }
}
