//! Value types shared by everything that touches an interview room.
//!
//! A [`Room`] pairs exactly two [`Participant`]s around one [`Question`].
//! The participant array is fixed-size, so the two-seat invariant holds for
//! the whole lifetime of a room; only the forfeit flag of a seat and the
//! one-way [`RoomStatus`] transition can change after creation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Root text type holding the shared editor contents.
pub const EDITOR_TEXT_FIELD: &str = "editorText";
/// Root map type holding structured editor settings.
pub const LANGUAGE_MAP_FIELD: &str = "language";
/// Key inside [`LANGUAGE_MAP_FIELD`] for the selected language.
pub const SELECTED_LANGUAGE_KEY: &str = "selected";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid room id {input:?}: {reason}")]
pub struct RoomIdError {
    pub input: String,
    pub reason: String,
}

/// Store-assigned room identifier. Immutable once assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoomId(Uuid);

impl RoomId {
    /// Allocate a fresh identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.as_hyphenated())
    }
}

impl FromStr for RoomId {
    type Err = RoomIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self).map_err(|e| RoomIdError {
            input: s.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Opaque external user identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One seat in a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    user_id: UserId,
    is_forfeit: bool,
}

impl Participant {
    /// A participant who has not forfeited.
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            is_forfeit: false,
        }
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn is_forfeit(&self) -> bool {
        self.is_forfeit
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "EASY"),
            Difficulty::Medium => write!(f, "MEDIUM"),
            Difficulty::Hard => write!(f, "HARD"),
        }
    }
}

/// Question embedded by value into a room at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub title: String,
    pub topics: Vec<String>,
    pub difficulty: Difficulty,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoomStatus {
    Active,
    Closed,
}

/// A paired interview room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    id: RoomId,
    participants: [Participant; 2],
    question: Question,
    /// Milliseconds since the Unix epoch.
    created_at: u64,
    status: RoomStatus,
}

impl Room {
    /// A new active room with both participants un-forfeited.
    pub fn new(
        id: RoomId,
        first: impl Into<UserId>,
        second: impl Into<UserId>,
        question: Question,
        created_at: u64,
    ) -> Self {
        Self {
            id,
            participants: [Participant::new(first), Participant::new(second)],
            question,
            created_at,
            status: RoomStatus::Active,
        }
    }

    pub fn id(&self) -> RoomId {
        self.id
    }

    pub fn participants(&self) -> &[Participant; 2] {
        &self.participants
    }

    pub fn question(&self) -> &Question {
        &self.question
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn status(&self) -> RoomStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == RoomStatus::Active
    }

    /// Look up a seat by user.
    pub fn participant(&self, user_id: &UserId) -> Option<&Participant> {
        self.participants.iter().find(|p| &p.user_id == user_id)
    }

    /// True if some seat has exactly this `(user_id, is_forfeit)` pair.
    pub fn has_participant_state(&self, user_id: &UserId, is_forfeit: bool) -> bool {
        self.participants
            .iter()
            .any(|p| &p.user_id == user_id && p.is_forfeit == is_forfeit)
    }

    /// Set the forfeit flag for `user_id`. Returns `false` if the user holds
    /// no seat in this room, in which case nothing changes.
    ///
    /// If the same user occupies both seats, the first one is updated.
    pub fn set_forfeit(&mut self, user_id: &UserId, is_forfeit: bool) -> bool {
        match self.participants.iter_mut().find(|p| &p.user_id == user_id) {
            Some(p) => {
                p.is_forfeit = is_forfeit;
                true
            }
            None => false,
        }
    }

    /// Move to [`RoomStatus::Closed`]. Closed is terminal, so calling this on
    /// a closed room is a no-op.
    pub fn close(&mut self) {
        self.status = RoomStatus::Closed;
    }
}

/// Point-in-time view of a room's shared document. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub code: String,
    pub language: String,
}
