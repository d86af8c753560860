//! Room CRUD and queries over the room store.

use interview_core::{Question, Room, RoomId, RoomStatus, UserId};
use std::sync::Arc;
use std::time::SystemTime;

use crate::connection::StoreConnectionManager;
use crate::error::{CollabError, CollabResult};
use crate::storage::{blocking, RoomStore};

pub struct RoomRepository {
    connections: Arc<StoreConnectionManager>,
}

impl RoomRepository {
    pub fn new(connections: Arc<StoreConnectionManager>) -> Self {
        Self { connections }
    }

    /// Insert a new active room for two participants, neither forfeited.
    pub async fn create_room(
        &self,
        first: UserId,
        second: UserId,
        question: Question,
    ) -> CollabResult<RoomId> {
        let room = Room::new(RoomId::generate(), first, second, question, now_millis());
        let id = room.id();
        self.run("create_room", format!("room {id}"), move |store| store.insert(&room))
            .await?;
        log::info!("Created room {id}");
        Ok(id)
    }

    pub async fn find_room_by_id(&self, room_id: RoomId) -> CollabResult<Room> {
        self.run("find_room_by_id", format!("room {room_id}"), move |store| {
            store
                .get(room_id)?
                .ok_or_else(|| CollabError::room_not_found(room_id))
        })
        .await
    }

    /// Rooms with `status` where some seat is exactly `(user_id, is_forfeit)`.
    /// Empty when nothing matches.
    pub async fn find_rooms_by_participant(
        &self,
        user_id: &UserId,
        status: RoomStatus,
        is_forfeit: bool,
    ) -> CollabResult<Vec<Room>> {
        log::debug!(
            "Querying rooms for user {user_id} with status {status:?} and forfeit {is_forfeit}"
        );
        let user = user_id.clone();
        let rooms = self
            .run("find_rooms_by_participant", format!("user {user_id}"), move |store| {
                store.find_by_participant(&user, status, is_forfeit)
            })
            .await?;
        log::debug!("Found {} rooms for user {user_id}", rooms.len());
        Ok(rooms)
    }

    /// Mark the room closed. Closing a closed room succeeds unchanged.
    pub async fn close_room(&self, room_id: RoomId) -> CollabResult<Room> {
        let room = self
            .run("close_room", format!("room {room_id}"), move |store| {
                store.update(room_id, |room| {
                    room.close();
                    Ok(())
                })
            })
            .await?;
        log::info!("Room {room_id} closed");
        Ok(room)
    }

    /// Set the forfeit flag of `user_id` in `room_id` as one atomic store
    /// update. Either direction is allowed.
    pub async fn set_participant_forfeit(
        &self,
        room_id: RoomId,
        user_id: &UserId,
        is_forfeit: bool,
    ) -> CollabResult<Room> {
        let user = user_id.clone();
        let room = self
            .run("set_participant_forfeit", format!("room {room_id}"), move |store| {
                store.update(room_id, |room| {
                    if room.set_forfeit(&user, is_forfeit) {
                        Ok(())
                    } else {
                        Err(CollabError::participant_not_found(room_id, user.clone()))
                    }
                })
            })
            .await?;
        log::info!("User {user_id} forfeit set to {is_forfeit} in room {room_id}");
        Ok(room)
    }

    /// Run one store call off the async workers, logging any failure with
    /// the operation name and its target.
    async fn run<T, F>(&self, op: &'static str, target: String, call: F) -> CollabResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&RoomStore) -> CollabResult<T> + Send + 'static,
    {
        let result = async {
            let store = self.connections.room_store().await?;
            blocking(store, call).await
        }
        .await;
        result.inspect_err(|e| {
            if e.is_not_found() {
                log::warn!("{op} ({target}): {e}");
            } else {
                log::error!("{op} failed ({target}): {e}");
            }
        })
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
