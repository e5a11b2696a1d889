//! In-memory document store.
//!
//! [`Memory`] is the reference provider: every other backend must produce
//! the same results and errors for the same operation. Collections map a
//! normalized `(pk, id)` key to a JSON document and keep documents in
//! insertion order. Indexes are recorded but never used for lookups.
//!
//! All writes, including the validate-then-apply sequence of `transact`,
//! run under one write lock. Reads take the read lock, so they never observe
//! a partially applied transaction.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::{debug, info, info_span, warn};
use x8_model::error::{StoreResult, X8Error};
use x8_model::operation::{OperationName, Returning};
use x8_model::types::{
    CollectionResult, CollectionStatus, Context, Index, IndexResult, IndexStatus, Item, ItemList,
    Key, Response,
};
use x8_model::StoreOperation;
use x8_ql::{Expression, QueryProcessor};

use crate::config::MemoryConfig;
use crate::error::expression_error_to_x8;
use crate::item::{ItemProcessor, NormalizedKey};
use crate::parser::OperationParser;
use crate::provider::{AsyncStoreProvider, StoreProvider};

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Documents of one collection in insertion order.
#[derive(Debug, Default)]
struct CollectionData {
    next_seq: u64,
    slots: HashMap<NormalizedKey, u64>,
    documents: BTreeMap<u64, Value>,
}

impl CollectionData {
    fn get(&self, key: &NormalizedKey) -> Option<&Value> {
        self.documents.get(self.slots.get(key)?)
    }

    /// Insert or replace. A replaced document keeps its position.
    fn insert(&mut self, key: NormalizedKey, value: Value) {
        let seq = *self.slots.entry(key).or_insert_with(|| {
            self.next_seq += 1;
            self.next_seq
        });
        self.documents.insert(seq, value);
    }

    fn remove(&mut self, key: &NormalizedKey) -> Option<Value> {
        let seq = self.slots.remove(key)?;
        self.documents.remove(&seq)
    }

    fn values(&self) -> impl Iterator<Item = &Value> {
        self.documents.values()
    }
}

#[derive(Debug, Default)]
struct Database {
    collections: BTreeMap<String, CollectionData>,
    indexes: BTreeMap<String, BTreeMap<String, Index>>,
}

impl Database {
    /// The collection, created on first write.
    fn collection_mut(&mut self, name: &str) -> &mut CollectionData {
        self.collections.entry(name.to_owned()).or_default()
    }
}

/// A write computed during validation and applied once every check passed.
#[derive(Debug)]
struct StagedWrite {
    collection: String,
    key: NormalizedKey,
    value: Option<Value>,
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// In-memory store provider.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use x8_model::{Context, StoreOperation};
/// use x8_store::config::MemoryConfig;
/// use x8_store::memory::Memory;
/// use x8_store::provider::StoreProvider;
///
/// let store = Memory::new(MemoryConfig::builder().collection("docs").build());
/// let ctx = Context::default();
/// store.run(&StoreOperation::put(json!({"id": "1", "n": 1})), &ctx).unwrap();
/// let item = store.run(&StoreOperation::get("1"), &ctx).unwrap().into_item().unwrap();
/// assert_eq!(item.value.unwrap()["n"], json!(1));
/// ```
#[derive(Debug)]
pub struct Memory {
    /// Configuration.
    pub config: Arc<MemoryConfig>,
    state: RwLock<Database>,
    processors: DashMap<String, Arc<ItemProcessor>>,
}

impl Default for Memory {
    fn default() -> Self {
        Self::new(MemoryConfig::default())
    }
}

impl Memory {
    /// Create an empty store.
    #[must_use]
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            config: Arc::new(config),
            state: RwLock::new(Database::default()),
            processors: DashMap::new(),
        }
    }

    /// Drop every collection and index.
    pub fn reset(&self) {
        *self.state.write() = Database::default();
    }

    fn collection_name(&self, parser: &OperationParser<'_>) -> StoreResult<String> {
        parser
            .get_collection_name()
            .or(self.config.collection.as_deref())
            .map(str::to_owned)
            .ok_or_else(|| X8Error::bad_request("Collection name must be specified"))
    }

    fn processor(&self, collection: &str) -> Arc<ItemProcessor> {
        if let Some(processor) = self.processors.get(collection) {
            return Arc::clone(processor.value());
        }
        let processor = Arc::new(ItemProcessor {
            id_map_field: self.config.id_field(collection).map(str::to_owned),
            pk_map_field: self.config.pk_field(collection).map(str::to_owned),
            etag_embed_field: self.config.etag_field(collection).map(str::to_owned),
            local_etag: true,
            suppress_fields: self.config.suppress_fields.clone(),
            ..ItemProcessor::default()
        });
        self.processors
            .entry(collection.to_owned())
            .or_insert(processor)
            .value()
            .clone()
    }

    fn dispatch(&self, parser: &OperationParser<'_>) -> StoreResult<Response> {
        match parser.op_name() {
            OperationName::Get => self.handle_get(parser),
            OperationName::Put => self.handle_put(parser),
            OperationName::Update => self.handle_update(parser),
            OperationName::Delete => self.handle_delete(parser),
            OperationName::Query => self.handle_query(parser),
            OperationName::Count => self.handle_count(parser),
            OperationName::Batch => self.handle_batch(parser),
            OperationName::Transact => self.handle_transact(parser),
            OperationName::CreateCollection => self.handle_create_collection(parser),
            OperationName::DropCollection => self.handle_drop_collection(parser),
            OperationName::ListCollections => Ok(self.handle_list_collections()),
            OperationName::HasCollection => self.handle_has_collection(parser),
            OperationName::CreateIndex => self.handle_create_index(parser),
            OperationName::DropIndex => self.handle_drop_index(parser),
            OperationName::ListIndexes => self.handle_list_indexes(parser),
            OperationName::Close => Ok(Response::Empty),
        }
    }
}

impl StoreProvider for Memory {
    fn run(&self, operation: &StoreOperation, context: &Context) -> StoreResult<Response> {
        let span = info_span!(
            "x8.memory",
            op = %operation.name(),
            trace_id = context.trace_id.as_deref().unwrap_or_default(),
        );
        let _enter = span.enter();
        let parser = OperationParser::new(operation);
        self.dispatch(&parser)
    }
}

#[async_trait::async_trait]
impl AsyncStoreProvider for Memory {
    async fn arun(&self, operation: &StoreOperation, context: &Context) -> StoreResult<Response> {
        self.run(operation, context)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn require_key<'a>(parser: &OperationParser<'a>) -> StoreResult<&'a Key> {
    parser
        .get_key()
        .ok_or_else(|| X8Error::bad_request("Key parameter missing"))
}

fn require_value<'a>(parser: &OperationParser<'a>) -> StoreResult<&'a Value> {
    parser
        .get_value()
        .ok_or_else(|| X8Error::bad_request("Value parameter missing"))
}

fn eval_where(
    processor: &ItemProcessor,
    current: Option<&Value>,
    where_: Option<&Expression>,
) -> StoreResult<bool> {
    QueryProcessor::eval_expr(current, where_, processor).map_err(expression_error_to_x8)
}

fn not_found(key: &Key) -> X8Error {
    X8Error::not_found(format!("Key {} not found", key.id))
}

fn precondition_failed() -> X8Error {
    X8Error::precondition_failed("Where condition failed")
}

/// Item echoed back by a write, per `returning`.
fn returned_item(
    processor: &ItemProcessor,
    key: &Key,
    returning: Option<Returning>,
    old: Option<&Value>,
    new: &Value,
) -> Item {
    match returning {
        Some(Returning::New) => processor.build_item_from_value(new, true),
        Some(Returning::Old) => match old {
            Some(old) => processor.build_item_from_value(old, true),
            None => Item {
                key: key.clone(),
                value: Some(Value::Object(Map::new())),
                metadata: None,
                properties: None,
            },
        },
        None => processor.build_item_from_value(new, false),
    }
}

// ---------------------------------------------------------------------------
// Item operations
// ---------------------------------------------------------------------------

impl Memory {
    fn handle_get(&self, parser: &OperationParser<'_>) -> StoreResult<Response> {
        let collection = self.collection_name(parser)?;
        let processor = self.processor(&collection);
        let key = require_key(parser)?;
        let db_key = processor.get_normalized_key_from_key(key)?;

        let state = self.state.read();
        let value = state
            .collections
            .get(&collection)
            .and_then(|data| data.get(&db_key))
            .ok_or_else(|| not_found(key))?;
        debug!(collection = %collection, id = %key.id, "get");
        Ok(Response::Item(processor.build_item_from_value(value, true)))
    }

    fn handle_put(&self, parser: &OperationParser<'_>) -> StoreResult<Response> {
        let collection = self.collection_name(parser)?;
        let processor = self.processor(&collection);
        let value = require_value(parser)?;
        let document = processor.add_embed_fields(value.clone(), parser.get_key())?;
        let db_key = processor.get_normalized_key_from_value(&document)?;
        let where_ = parser.get_where()?;
        let returning = parser.get_returning();

        let mut state = self.state.write();
        let data = state.collection_mut(&collection);
        let current = data.get(&db_key);
        if where_.is_some() && !eval_where(&processor, current, where_)? {
            warn!(collection = %collection, id = %db_key.id, "put precondition failed");
            return Err(precondition_failed());
        }
        let old = data.remove(&db_key);
        data.insert(db_key, document.clone());
        drop(state);

        debug!(collection = %collection, "put");
        let key = processor.get_key_from_value(&document)?;
        Ok(Response::Item(returned_item(
            &processor,
            &key,
            returning,
            old.as_ref(),
            &document,
        )))
    }

    fn handle_update(&self, parser: &OperationParser<'_>) -> StoreResult<Response> {
        let collection = self.collection_name(parser)?;
        let processor = self.processor(&collection);
        let key = require_key(parser)?;
        let db_key = processor.get_normalized_key_from_key(key)?;
        let where_ = parser.get_where()?;
        let returning = parser.get_returning();
        let update = if processor.needs_local_etag() {
            processor.add_etag_update(parser.get_set()?.clone(), &ItemProcessor::generate_etag())
        } else {
            parser.get_set()?.clone()
        };

        let mut state = self.state.write();
        let data = state.collection_mut(&collection);
        let current = data.get(&db_key).cloned();
        match where_ {
            None if current.is_none() => return Err(not_found(key)),
            Some(_) if !eval_where(&processor, current.as_ref(), where_)? => {
                warn!(collection = %collection, id = %key.id, "update precondition failed");
                return Err(precondition_failed());
            }
            _ => {}
        }
        let base = current
            .clone()
            .unwrap_or_else(|| processor.get_value_from_key(key));
        let updated = QueryProcessor::update_item(&base, &update, &*processor)
            .map_err(expression_error_to_x8)?;
        data.insert(db_key, updated.clone());
        drop(state);

        debug!(collection = %collection, id = %key.id, upsert = current.is_none(), "update");
        Ok(Response::Item(returned_item(
            &processor,
            key,
            returning,
            current.as_ref(),
            &updated,
        )))
    }

    fn handle_delete(&self, parser: &OperationParser<'_>) -> StoreResult<Response> {
        let collection = self.collection_name(parser)?;
        let processor = self.processor(&collection);
        let key = require_key(parser)?;
        let db_key = processor.get_normalized_key_from_key(key)?;
        let where_ = parser.get_where()?;

        let mut state = self.state.write();
        let data = state.collection_mut(&collection);
        let current = data.get(&db_key);
        match where_ {
            None if current.is_none() => return Err(not_found(key)),
            Some(_) if !eval_where(&processor, current, where_)? => {
                warn!(collection = %collection, id = %key.id, "delete precondition failed");
                return Err(precondition_failed());
            }
            _ => {}
        }
        data.remove(&db_key);
        debug!(collection = %collection, id = %key.id, "delete");
        Ok(Response::Empty)
    }

    fn handle_query(&self, parser: &OperationParser<'_>) -> StoreResult<Response> {
        let collection = self.collection_name(parser)?;
        let processor = self.processor(&collection);
        let select = parser.get_select()?;
        let where_ = parser.get_where()?;
        let order_by = parser.get_order_by()?;

        let state = self.state.read();
        let documents: Vec<&Value> = state
            .collections
            .get(&collection)
            .map(|data| data.values().collect())
            .unwrap_or_default();
        let values = QueryProcessor::query_items(
            documents,
            select,
            where_,
            order_by,
            parser.get_limit(),
            parser.get_offset(),
            &*processor,
        )
        .map_err(expression_error_to_x8)?;
        drop(state);

        debug!(collection = %collection, returned = values.len(), "query");
        let selected = select.map(QueryProcessor::projected_fields).unwrap_or_default();
        let items = values
            .iter()
            .map(|value| processor.build_selected_item(value, &selected))
            .collect();
        Ok(Response::Items(ItemList { items }))
    }

    fn handle_count(&self, parser: &OperationParser<'_>) -> StoreResult<Response> {
        let collection = self.collection_name(parser)?;
        let processor = self.processor(&collection);
        let where_ = parser.get_where()?;

        let state = self.state.read();
        let count = match state.collections.get(&collection) {
            Some(data) => QueryProcessor::count_items(data.values(), where_, &*processor)
                .map_err(expression_error_to_x8)?,
            None => 0,
        };
        debug!(collection = %collection, count, "count");
        Ok(Response::Count(count))
    }
}

// ---------------------------------------------------------------------------
// Multi-document operations
// ---------------------------------------------------------------------------

impl Memory {
    fn handle_batch(&self, parser: &OperationParser<'_>) -> StoreResult<Response> {
        let children = parser.get_operation_parsers();
        let first = children.first().and_then(OperationParser::get_collection_name);
        for child in children {
            if !matches!(child.op_name(), OperationName::Put | OperationName::Delete) {
                return Err(X8Error::bad_request(format!(
                    "Operation {} not allowed in batch",
                    child.op_name()
                )));
            }
            if child.get_collection_name() != first {
                return Err(X8Error::bad_request(
                    "Batch operations must target a single collection",
                ));
            }
        }
        let collection = self.collection_name(parser)?;
        let processor = self.processor(&collection);

        // Resolve every key before touching the data.
        let mut writes = Vec::with_capacity(children.len());
        for child in children {
            if child.op_equals(OperationName::Put) {
                let document =
                    processor.add_embed_fields(require_value(child)?.clone(), child.get_key())?;
                let db_key = processor.get_normalized_key_from_value(&document)?;
                writes.push((db_key, Some(document)));
            } else {
                let db_key = processor.get_normalized_key_from_key(require_key(child)?)?;
                writes.push((db_key, None));
            }
        }

        let mut state = self.state.write();
        let data = state.collection_mut(&collection);
        let mut results = Vec::with_capacity(writes.len());
        for (db_key, document) in writes {
            match document {
                Some(document) => {
                    results.push(Some(processor.build_item_from_value(&document, false)));
                    data.insert(db_key, document);
                }
                None => {
                    data.remove(&db_key);
                    results.push(None);
                }
            }
        }
        debug!(collection = %collection, operations = results.len(), "batch");
        Ok(Response::Batch(results))
    }

    /// Validate every operation against the state as modified by the
    /// operations before it, then apply all writes. Any failed check aborts
    /// the whole transaction with `Conflict` and nothing is written.
    fn handle_transact(&self, parser: &OperationParser<'_>) -> StoreResult<Response> {
        let children = parser.get_operation_parsers();
        let mut plans = Vec::with_capacity(children.len());
        for child in children {
            if !matches!(
                child.op_name(),
                OperationName::Put | OperationName::Update | OperationName::Delete
            ) {
                return Err(X8Error::bad_request(format!(
                    "Operation {} not allowed in transact",
                    child.op_name()
                )));
            }
            let collection = self.collection_name(child)?;
            let processor = self.processor(&collection);
            plans.push((child, collection, processor));
        }

        let mut state = self.state.write();
        let mut staged: Vec<StagedWrite> = Vec::with_capacity(plans.len());
        let mut results = Vec::with_capacity(plans.len());

        for (child, collection, processor) in &plans {
            let where_ = child.get_where()?;
            // A put is keyed by the stored document, as in a plain put.
            let (db_key, key, mut document) = if child.op_equals(OperationName::Put) {
                let document =
                    processor.add_embed_fields(require_value(child)?.clone(), child.get_key())?;
                let db_key = processor.get_normalized_key_from_value(&document)?;
                (db_key, processor.get_key_from_value(&document)?, Some(document))
            } else {
                let key = require_key(child)?.clone();
                (processor.get_normalized_key_from_key(&key)?, key, None)
            };

            let current = staged
                .iter()
                .rev()
                .find(|w| &w.collection == collection && w.key == db_key)
                .map(|w| w.value.clone())
                .unwrap_or_else(|| {
                    state
                        .collections
                        .get(collection)
                        .and_then(|data| data.get(&db_key))
                        .cloned()
                });

            let missing = current.is_none() && !child.op_equals(OperationName::Put);
            if missing || !eval_where(processor, current.as_ref(), where_)? {
                warn!(
                    collection = %collection,
                    id = %key.id,
                    op = %child.op_name(),
                    "transaction aborted"
                );
                return Err(X8Error::conflict("Transaction failed"));
            }

            let (value, result) = match child.op_name() {
                OperationName::Put => {
                    let item = document
                        .as_ref()
                        .map(|document| processor.build_item_from_value(document, false));
                    (document.take(), item)
                }
                OperationName::Update => {
                    let update = processor.add_etag_update(
                        child.get_set()?.clone(),
                        &ItemProcessor::generate_etag(),
                    );
                    let base = current.clone().unwrap_or_else(|| processor.get_value_from_key(&key));
                    let updated = QueryProcessor::update_item(&base, &update, &**processor)
                        .map_err(expression_error_to_x8)?;
                    let item = returned_item(
                        processor,
                        &key,
                        child.get_returning(),
                        current.as_ref(),
                        &updated,
                    );
                    (Some(updated), Some(item))
                }
                _ => (None, None),
            };
            staged.push(StagedWrite {
                collection: collection.clone(),
                key: db_key,
                value,
            });
            results.push(result);
        }

        for write in staged {
            let data = state.collection_mut(&write.collection);
            match write.value {
                Some(value) => data.insert(write.key, value),
                None => {
                    data.remove(&write.key);
                }
            }
        }
        debug!(operations = results.len(), "transact");
        Ok(Response::Batch(results))
    }
}

// ---------------------------------------------------------------------------
// Resource operations
// ---------------------------------------------------------------------------

impl Memory {
    fn handle_create_collection(&self, parser: &OperationParser<'_>) -> StoreResult<Response> {
        let collection = self.collection_name(parser)?;
        let exists = parser.get_where_exists()?;
        let indexes = parser.get_config().map(|c| c.indexes.as_slice()).unwrap_or_default();

        let mut state = self.state.write();
        let already = state.collections.contains_key(&collection);
        if already && exists == Some(false) {
            warn!(collection = %collection, "collection already exists");
            return Err(X8Error::conflict(format!("Collection {collection} already exists")));
        }
        if !already {
            state.collections.insert(collection.clone(), CollectionData::default());
            info!(collection = %collection, "collection created");
        }

        let collection_indexes = state.indexes.entry(collection.clone()).or_default();
        let mut index_results = Vec::with_capacity(indexes.len());
        for index in indexes {
            let name = index.resolved_name();
            let status = if collection_indexes.contains_key(&name) {
                IndexStatus::Exists
            } else {
                collection_indexes.insert(name.clone(), Index {
                    name: Some(name.clone()),
                    ..index.clone()
                });
                IndexStatus::Created
            };
            index_results.push(IndexResult { name, status });
        }

        let status = if already {
            CollectionStatus::Exists
        } else {
            CollectionStatus::Created
        };
        Ok(Response::Collection(CollectionResult {
            status,
            indexes: index_results,
        }))
    }

    fn handle_drop_collection(&self, parser: &OperationParser<'_>) -> StoreResult<Response> {
        let collection = self.collection_name(parser)?;
        let exists = parser.get_where_exists()?;

        let mut state = self.state.write();
        let found = state.collections.remove(&collection).is_some();
        state.indexes.remove(&collection);
        if !found && exists == Some(true) {
            warn!(collection = %collection, "collection not found");
            return Err(X8Error::not_found(format!("Collection {collection} not found")));
        }
        let status = if found {
            info!(collection = %collection, "collection dropped");
            CollectionStatus::Dropped
        } else {
            CollectionStatus::NotExists
        };
        Ok(Response::Collection(CollectionResult {
            status,
            indexes: Vec::new(),
        }))
    }

    fn handle_list_collections(&self) -> Response {
        Response::Names(self.state.read().collections.keys().cloned().collect())
    }

    fn handle_has_collection(&self, parser: &OperationParser<'_>) -> StoreResult<Response> {
        let collection = self.collection_name(parser)?;
        Ok(Response::Bool(
            self.state.read().collections.contains_key(&collection),
        ))
    }

    fn handle_create_index(&self, parser: &OperationParser<'_>) -> StoreResult<Response> {
        let collection = self.collection_name(parser)?;
        let exists = parser.get_where_exists()?;
        let index = parser.get_index()?;
        let name = index.resolved_name();

        let mut state = self.state.write();
        let indexes = state.indexes.entry(collection.clone()).or_default();
        let status = if indexes.contains_key(&name) {
            if exists == Some(false) {
                return Err(X8Error::conflict(format!("Index {name} already exists")));
            }
            IndexStatus::Exists
        } else {
            info!(collection = %collection, index = %name, "index created");
            IndexStatus::Created
        };
        indexes.insert(name.clone(), Index {
            name: Some(name.clone()),
            ..index.clone()
        });
        Ok(Response::Index(IndexResult { name, status }))
    }

    fn handle_drop_index(&self, parser: &OperationParser<'_>) -> StoreResult<Response> {
        let collection = self.collection_name(parser)?;
        let exists = parser.get_where_exists()?;
        let name = parser.get_index()?.resolved_name();

        let mut state = self.state.write();
        let removed = state
            .indexes
            .get_mut(&collection)
            .and_then(|indexes| indexes.remove(&name))
            .is_some();
        let status = if removed {
            info!(collection = %collection, index = %name, "index dropped");
            IndexStatus::Dropped
        } else if exists == Some(true) {
            return Err(X8Error::not_found(format!("Index {name} not found")));
        } else {
            IndexStatus::NotExists
        };
        Ok(Response::Index(IndexResult { name, status }))
    }

    fn handle_list_indexes(&self, parser: &OperationParser<'_>) -> StoreResult<Response> {
        let collection = self.collection_name(parser)?;
        let state = self.state.read();
        let indexes = state
            .indexes
            .get(&collection)
            .map(|indexes| indexes.values().cloned().collect())
            .unwrap_or_default();
        Ok(Response::Indexes(indexes))
    }
}
