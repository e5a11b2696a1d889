//! Integration tests for the x8 engine.
//!
//! Every scenario runs against the in-memory provider through the public
//! [`StoreProvider`] API, seeded with the ten documents in
//! `fixtures/documents.json`. Documents `0..=4` live in partition `pk00`,
//! `5..=9` in `pk01`, and each document's `int` equals its index.
//!
//! ```text
//! cargo test -p x8-integration
//! ```

use std::sync::Once;

use anyhow::Context as _;
use serde_json::Value;
use x8_model::{Context, Key, Response, StoreOperation, StoreResult};
use x8_store::{Memory, MemoryConfig, StoreProvider};

static INIT: Once = Once::new();

const DOCUMENTS: &str = include_str!("../fixtures/documents.json");

/// Collection the fixture documents are loaded into.
pub const COLLECTION: &str = "documents";

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// The fixture documents, in index order.
pub fn documents() -> anyhow::Result<Vec<Value>> {
    serde_json::from_str(DOCUMENTS).context("invalid fixture documents")
}

/// The key of fixture document `index`.
#[must_use]
pub fn key(index: usize) -> Key {
    let pk = if index < 5 { "pk00" } else { "pk01" };
    Key::with_pk(index.to_string(), pk)
}

/// An empty store whose default collection is [`COLLECTION`].
#[must_use]
pub fn empty_store() -> Memory {
    init_tracing();
    Memory::new(MemoryConfig::builder().collection(COLLECTION).build())
}

/// A store holding every fixture document.
pub fn seeded_store() -> anyhow::Result<Memory> {
    let store = empty_store();
    let operations = documents()?.into_iter().map(StoreOperation::put).collect();
    run(&store, StoreOperation::batch(operations)).context("seeding fixtures")?;
    Ok(store)
}

/// Run one operation with an empty context.
pub fn run(store: &Memory, operation: StoreOperation) -> StoreResult<Response> {
    store.run(&operation, &Context::default())
}

/// The stored document for `key`.
pub fn get_value(store: &Memory, key: Key) -> anyhow::Result<Value> {
    run(store, StoreOperation::get(key))?
        .into_item()
        .and_then(|item| item.value)
        .context("get returned no value")
}

/// Fixture indices of the items a query returned, in order.
#[must_use]
pub fn indices(response: Response) -> Vec<usize> {
    response
        .into_items()
        .unwrap_or_default()
        .iter()
        .filter_map(|item| item.key.id.as_str()?.parse().ok())
        .collect()
}

mod test_async;
mod test_collection;
mod test_item;
mod test_query;
mod test_serde;
mod test_transact;
