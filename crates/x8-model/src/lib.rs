//! Model types for x8.
//!
//! This crate provides the operation envelope, result types, and error
//! taxonomy shared by x8 providers. The types are plain serde structs so an
//! operation can travel as JSON (`{"name": ..., "args": ...}`) between layers.
#![allow(clippy::module_name_repetitions)]
#![allow(missing_docs)]

pub mod error;
pub mod operation;
pub mod types;

pub use error::{StoreResult, X8Error, X8ErrorCode};
pub use operation::{
    BatchArgs, Clause, CollectionArgs, CountArgs, DeleteArgs, GetArgs, IndexArgs, OperationName,
    PutArgs, QueryArgs, Returning, StoreOperation, UpdateArgs,
};
pub use types::{
    CollectionConfig, CollectionResult, CollectionStatus, Context, Index, IndexKind, IndexResult,
    IndexStatus, Item, ItemList, Key, MatchCondition, Properties, Response,
};
