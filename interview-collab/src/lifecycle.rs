//! Creation and deletion of per-room documents.
//!
//! A document's lifecycle is independent of its room: closing a room keeps
//! the document, and deleting a document leaves the room untouched.

use futures_util::future::join_all;
use interview_core::RoomId;
use std::sync::Arc;
use yrs::updates::decoder::Decode;
use yrs::{Doc, ReadTxn, StateVector, Transact, Update};

use crate::connection::StoreConnectionManager;
use crate::error::{CollabError, CollabResult};
use crate::storage::{blocking, DocumentPersistence};

/// Result of [`DocumentLifecycleService::create_document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentCreation {
    /// A fresh namespace was set up and the empty baseline persisted.
    Created,
    /// The document already had content; nothing was written.
    Existing,
}

/// Result of [`DocumentLifecycleService::delete_document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// There was no document for the room. Not an error.
    Missing,
}

pub struct DocumentLifecycleService {
    connections: Arc<StoreConnectionManager>,
}

impl DocumentLifecycleService {
    pub fn new(connections: Arc<StoreConnectionManager>) -> Self {
        Self { connections }
    }

    /// Set up the document for `room_id` and persist its empty baseline.
    ///
    /// Calling this for a room whose document already holds updates leaves
    /// that content untouched.
    pub async fn create_document(&self, room_id: RoomId) -> CollabResult<DocumentCreation> {
        let outcome = self
            .run("create_document", room_id, move |store| {
                let created = store.create_namespace(room_id)?;
                if !created && store.update_count(room_id)?.unwrap_or(0) > 0 {
                    return Ok(DocumentCreation::Existing);
                }

                let baseline = {
                    let doc = Doc::new();
                    let txn = doc.transact();
                    txn.encode_state_as_update_v1(&StateVector::default())
                };
                store.store_update(room_id, &baseline)?;
                Ok(DocumentCreation::Created)
            })
            .await?;

        match outcome {
            DocumentCreation::Created => log::info!("Document created for room {room_id}"),
            DocumentCreation::Existing => {
                log::info!("Document for room {room_id} already exists, keeping its content")
            }
        }
        Ok(outcome)
    }

    /// Irreversibly drop the document's namespace and update log.
    pub async fn delete_document(&self, room_id: RoomId) -> CollabResult<DeleteOutcome> {
        log::info!("Deleting document for room {room_id}");
        let dropped = self
            .run("delete_document", room_id, move |store| store.drop_namespace(room_id))
            .await?;

        if dropped {
            log::info!("Document for room {room_id} deleted");
            Ok(DeleteOutcome::Deleted)
        } else {
            log::warn!("No document to delete for room {room_id}");
            Ok(DeleteOutcome::Missing)
        }
    }

    /// Delete several documents, reporting each room separately. A failure
    /// for one room does not stop the others.
    pub async fn delete_documents(
        &self,
        room_ids: &[RoomId],
    ) -> Vec<(RoomId, CollabResult<DeleteOutcome>)> {
        let results = join_all(room_ids.iter().map(|&id| self.delete_document(id))).await;
        room_ids.iter().copied().zip(results).collect()
    }

    /// Append a live edit delta (an encoded v1 update) to the room's log.
    pub async fn apply_update(&self, room_id: RoomId, update: Vec<u8>) -> CollabResult<()> {
        if let Err(e) = Update::decode_v1(&update) {
            let err = CollabError::Corrupt(format!("undecodable update: {e}"));
            log::error!("apply_update rejected for room {room_id}: {err}");
            return Err(err);
        }
        self.run("apply_update", room_id, move |store| {
            store.store_update(room_id, &update).map(|_| ())
        })
        .await
    }

    pub async fn document_exists(&self, room_id: RoomId) -> CollabResult<bool> {
        self.run("document_exists", room_id, move |store| {
            Ok(store.namespace_exists(room_id))
        })
        .await
    }

    async fn run<T, F>(&self, op: &'static str, room_id: RoomId, call: F) -> CollabResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&DocumentPersistence) -> CollabResult<T> + Send + 'static,
    {
        let result = async {
            let store = self.connections.document_store().await?;
            blocking(store, call).await
        }
        .await;
        result.inspect_err(|e| log::error!("{op} failed for room {room_id}: {e}"))
    }
}
