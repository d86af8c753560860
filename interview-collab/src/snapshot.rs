//! Read-only projection of a live document.

use interview_core::{
    RoomId, Snapshot, EDITOR_TEXT_FIELD, LANGUAGE_MAP_FIELD, SELECTED_LANGUAGE_KEY,
};
use std::sync::Arc;
use yrs::{Any, Doc, GetString, Map, Out, Transact};

use crate::connection::StoreConnectionManager;
use crate::error::{CollabError, CollabResult};
use crate::storage::blocking;

pub struct SnapshotExtractor {
    connections: Arc<StoreConnectionManager>,
}

impl SnapshotExtractor {
    pub fn new(connections: Arc<StoreConnectionManager>) -> Self {
        Self { connections }
    }

    /// Rebuild the room's document from its log and read the editor text
    /// and selected language. Never writes to the store.
    pub async fn extract_snapshot(&self, room_id: RoomId) -> CollabResult<Snapshot> {
        let result = async {
            let store = self.connections.document_store().await?;
            blocking(store, move |store| {
                let doc = store
                    .get_doc(room_id)?
                    .ok_or_else(|| CollabError::document_not_found(room_id))?;
                Ok(read_snapshot(&doc))
            })
            .await
        }
        .await;

        result.inspect_err(|e| {
            if e.is_not_found() {
                log::warn!("extract_snapshot for room {room_id}: {e}");
            } else {
                log::error!("extract_snapshot failed for room {room_id}: {e}");
            }
        })
    }
}

/// Project the editor fields of an in-memory document.
pub fn read_snapshot(doc: &Doc) -> Snapshot {
    let text = doc.get_or_insert_text(EDITOR_TEXT_FIELD);
    let language = doc.get_or_insert_map(LANGUAGE_MAP_FIELD);

    let txn = doc.transact();
    let code = text.get_string(&txn);
    let language = match language.get(&txn, SELECTED_LANGUAGE_KEY) {
        Some(Out::Any(Any::String(s))) => s.to_string(),
        Some(other) => other.to_string(&txn),
        None => String::new(),
    };

    Snapshot { code, language }
}
