//! Persistent stores for rooms and their documents.
//!
//! ```text
//! ┌────────────────────────┐      ┌────────────────────────────────┐
//! │ RoomStore              │      │ DocumentPersistence            │
//! │ (RocksDB TransactionDB)│      │ (RocksDB, one CF per room)     │
//! │                        │      │                                │
//! │ CF "rooms"             │      │ CF "<room id>" - update log    │
//! │ CF "participants"      │      │   flushed every N updates      │
//! └────────────────────────┘      └────────────────────────────────┘
//! ```
//!
//! Both stores are synchronous. Async callers go through [`blocking`], which
//! runs the store call on tokio's blocking pool.

pub mod documents;
pub mod rooms;

pub use documents::DocumentPersistence;
pub use rooms::RoomStore;

use std::sync::Arc;

use crate::error::CollabResult;

/// Run `op` against `store` on the blocking thread pool.
pub(crate) async fn blocking<S, T, F>(store: Arc<S>, op: F) -> CollabResult<T>
where
    S: Send + Sync + 'static,
    T: Send + 'static,
    F: FnOnce(&S) -> CollabResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || op(&store)).await?
}
