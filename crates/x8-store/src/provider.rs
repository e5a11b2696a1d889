//! Provider calling conventions.
//!
//! Every backend implements [`StoreProvider`]. [`AsyncStoreProvider`] is the
//! await-based variant; backends without network I/O implement it by
//! delegating to the synchronous core.
//!
//! # Object safety
//!
//! [`AsyncStoreProvider`] uses `#[async_trait]` so it stays object-safe for
//! dynamic dispatch (e.g. `Box<dyn AsyncStoreProvider>`).

use x8_model::error::StoreResult;
use x8_model::operation::StoreOperation;
use x8_model::types::{Context, Response};

/// Synchronous store provider.
pub trait StoreProvider: Send + Sync {
    /// Execute one operation.
    fn run(&self, operation: &StoreOperation, context: &Context) -> StoreResult<Response>;
}

/// Asynchronous store provider.
#[async_trait::async_trait]
pub trait AsyncStoreProvider: Send + Sync {
    /// Execute one operation.
    async fn arun(&self, operation: &StoreOperation, context: &Context) -> StoreResult<Response>;
}
