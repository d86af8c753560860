//! Lazy, single-winner connections to the room and document stores.
//!
//! Construct one [`StoreConnectionManager`] at process start and share it
//! (behind an `Arc`) with every repository and service. Each store is opened
//! on first use and cached for the life of the manager:
//!
//! - concurrent first callers wait on the same initialization, so at most
//!   one open attempt is in flight per store;
//! - callers see either "not started" or a fully opened store, never a
//!   partially initialized one;
//! - a failed attempt leaves the slot empty and the next call retries.

use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::config::CollabConfig;
use crate::error::{CollabError, CollabResult};
use crate::storage::{DocumentPersistence, RoomStore};

pub struct StoreConnectionManager {
    config: CollabConfig,
    rooms: OnceCell<Arc<RoomStore>>,
    documents: OnceCell<Arc<DocumentPersistence>>,
}

impl StoreConnectionManager {
    pub fn new(config: CollabConfig) -> Self {
        Self {
            config,
            rooms: OnceCell::new(),
            documents: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &CollabConfig {
        &self.config
    }

    /// Handle to the room store, opening it on first use.
    pub async fn room_store(&self) -> CollabResult<Arc<RoomStore>> {
        let store = self
            .rooms
            .get_or_try_init(|| async {
                let config = self.config.room_store.clone();
                let path = config.path.clone();
                let store = tokio::task::spawn_blocking(move || RoomStore::open(config)).await??;
                log::info!("Connected to the room store at {}", path.display());
                Ok::<_, CollabError>(Arc::new(store))
            })
            .await
            .inspect_err(|e| log::error!("Failed to connect to the room store: {e}"))?;
        Ok(Arc::clone(store))
    }

    /// Handle to the document store, opening it and initializing the
    /// document engine (flush size, per-room namespaces) on first use.
    pub async fn document_store(&self) -> CollabResult<Arc<DocumentPersistence>> {
        let store = self
            .documents
            .get_or_try_init(|| async {
                let config = self.config.document_store.clone();
                let flush_size = self.config.flush_size;
                let path = config.path.clone();
                let store = tokio::task::spawn_blocking(move || {
                    DocumentPersistence::open(config, flush_size)
                })
                .await??;
                log::info!(
                    "Connected to the document store at {} (flush size {flush_size})",
                    path.display()
                );
                Ok::<_, CollabError>(Arc::new(store))
            })
            .await
            .inspect_err(|e| log::error!("Failed to connect to the document store: {e}"))?;
        Ok(Arc::clone(store))
    }

    /// Open both stores eagerly. Fails with the first connection error.
    pub async fn start(&self) -> CollabResult<()> {
        self.room_store().await?;
        self.document_store().await?;
        log::info!("Connected to both room and document stores");
        Ok(())
    }

    pub fn is_room_store_connected(&self) -> bool {
        self.rooms.initialized()
    }

    pub fn is_document_store_connected(&self) -> bool {
        self.documents.initialized()
    }
}
