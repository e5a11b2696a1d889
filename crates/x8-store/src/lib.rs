//! Store providers for x8.
//!
//! This crate turns [`x8_model::StoreOperation`] values into results. It
//! holds the pieces every provider shares:
//!
//! - [`OperationParser`]: typed, memoized access to operation arguments.
//! - [`ItemProcessor`]: key extraction, embed fields, etags and `$`-field
//!   resolution.
//! - [`StoreProvider`] / [`AsyncStoreProvider`]: the calling convention.
//!
//! [`Memory`] is the in-process reference provider.
#![allow(missing_docs, clippy::doc_markdown, clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod item;
pub mod memory;
pub mod parser;
pub mod provider;

pub use config::{FieldMapping, MemoryConfig};
pub use error::expression_error_to_x8;
pub use item::{ItemProcessor, NormalizedKey};
pub use memory::Memory;
pub use parser::OperationParser;
pub use provider::{AsyncStoreProvider, StoreProvider};
