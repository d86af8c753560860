//! # interview-collab: Room and document persistence for interview sessions
//!
//! Keeps two independently connected stores consistent without
//! cross-store transactions: a room store holding paired interview rooms,
//! and a document store holding each room's collaborative Yrs document.
//!
//! ## Architecture
//!
//! ```text
//!   create/close/forfeit      create/delete/update        snapshot
//!            │                         │                     │
//!            ▼                         ▼                     ▼
//! ┌──────────────────┐   ┌──────────────────────────┐  ┌──────────────────┐
//! │ RoomRepository   │   │ DocumentLifecycleService │  │ SnapshotExtractor│
//! └────────┬─────────┘   └────────────┬─────────────┘  └────────┬─────────┘
//!          │                          │                         │
//!          └──────────────┬───────────┴─────────────────────────┘
//!                         ▼
//!              ┌──────────────────────────┐
//!              │ StoreConnectionManager   │  lazy, single-winner open
//!              └──────┬────────────┬──────┘
//!                     ▼            ▼
//!              ┌───────────┐  ┌────────────────────┐
//!              │ RoomStore │  │ DocumentPersistence│
//!              │ (RocksDB) │  │ (RocksDB + Yrs)    │
//!              └───────────┘  └────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`connection`]: shared store handles, opened once on first use
//! - [`repository`]: room CRUD, participant queries, forfeit updates
//! - [`lifecycle`]: per-room document creation and deletion
//! - [`snapshot`]: code/language projection of a live document
//! - [`storage`]: the RocksDB stores themselves
//!
//! Closing a room never touches its document, and deleting a document never
//! closes its room.

pub mod config;
pub mod connection;
pub mod error;
pub mod lifecycle;
pub mod repository;
pub mod snapshot;
pub mod storage;

// Re-exports for convenience
pub use config::{CollabConfig, StoreConfig, DEFAULT_FLUSH_SIZE};
pub use connection::StoreConnectionManager;
pub use error::{CollabError, CollabResult, NotFoundKind, StoreKind};
pub use lifecycle::{DeleteOutcome, DocumentCreation, DocumentLifecycleService};
pub use repository::RoomRepository;
pub use snapshot::SnapshotExtractor;
pub use storage::{DocumentPersistence, RoomStore};

pub use interview_core::{
    Difficulty, Participant, Question, Room, RoomId, RoomStatus, Snapshot, UserId,
};
