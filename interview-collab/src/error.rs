//! Error taxonomy for the room and document layer.

use interview_core::{RoomId, UserId};
use std::fmt;

/// Which of the two persistent stores an error concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Rooms,
    Documents,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::Rooms => write!(f, "room store"),
            StoreKind::Documents => write!(f, "document store"),
        }
    }
}

/// What was missing. Room and participant absence are kept apart so callers
/// can tell a bad room reference from the wrong user for a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotFoundKind {
    Room(RoomId),
    Participant { room: RoomId, user: UserId },
    Document(RoomId),
}

impl fmt::Display for NotFoundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotFoundKind::Room(id) => write!(f, "room {id} not found"),
            NotFoundKind::Participant { room, user } => {
                write!(f, "user {user} is not a participant of room {room}")
            }
            NotFoundKind::Document(id) => write!(f, "document for room {id} not found"),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CollabError {
    /// A store could not be opened.
    #[error("failed to connect to the {store}: {reason}")]
    Connection { store: StoreKind, reason: String },
    #[error("{0}")]
    NotFound(NotFoundKind),
    /// Transient backend failure during an operation.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    /// A stored record or update could not be decoded.
    #[error("corrupt data: {0}")]
    Corrupt(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl CollabError {
    pub fn room_not_found(id: RoomId) -> Self {
        CollabError::NotFound(NotFoundKind::Room(id))
    }

    pub fn participant_not_found(room: RoomId, user: UserId) -> Self {
        CollabError::NotFound(NotFoundKind::Participant { room, user })
    }

    pub fn document_not_found(id: RoomId) -> Self {
        CollabError::NotFound(NotFoundKind::Document(id))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CollabError::NotFound(_))
    }
}

impl From<rocksdb::Error> for CollabError {
    fn from(e: rocksdb::Error) -> Self {
        CollabError::StoreUnavailable(e.to_string())
    }
}

impl From<tokio::task::JoinError> for CollabError {
    fn from(e: tokio::task::JoinError) -> Self {
        CollabError::StoreUnavailable(format!("store task did not complete: {e}"))
    }
}

pub type CollabResult<T> = Result<T, CollabError>;
