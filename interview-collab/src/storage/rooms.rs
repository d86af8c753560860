//! RocksDB-backed room store.
//!
//! Column families:
//! - `rooms`:        room id (16 bytes) → bincode-encoded [`Room`]
//! - `participants`: `<user len:4 BE><user bytes><room id:16>` → empty
//!
//! Opened as a pessimistic `TransactionDB`. Every mutation of an existing
//! room locks the record inside the store (`get_for_update`), applies the
//! change and commits, so concurrent updates to the same room are
//! serialized by the store in arrival order and no partial write is ever
//! visible.

use interview_core::{Room, RoomId, RoomStatus, UserId};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, SingleThreaded,
    TransactionDB, TransactionDBOptions, TransactionOptions, WriteOptions,
};

use crate::config::StoreConfig;
use crate::error::{CollabError, CollabResult, StoreKind};

const CF_ROOMS: &str = "rooms";
const CF_PARTICIPANTS: &str = "participants";

const COLUMN_FAMILIES: &[&str] = &[CF_ROOMS, CF_PARTICIPANTS];

pub struct RoomStore {
    db: TransactionDB<SingleThreaded>,
    config: StoreConfig,
}

impl RoomStore {
    /// Open (or create) the room store at the configured path.
    pub fn open(config: StoreConfig) -> CollabResult<Self> {
        let db_opts = config.db_options();
        let txn_db_opts = TransactionDBOptions::default();
        let cache = config.block_cache();
        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, config.cf_options(&cache)))
            .collect();

        let db = TransactionDB::<SingleThreaded>::open_cf_descriptors(
            &db_opts,
            &txn_db_opts,
            &config.path,
            cf_descriptors,
        )
        .map_err(|e| CollabError::Connection {
            store: StoreKind::Rooms,
            reason: e.to_string(),
        })?;

        Ok(Self { db, config })
    }

    /// Insert a new room together with its participant index entries.
    pub fn insert(&self, room: &Room) -> CollabResult<()> {
        let cf_rooms = self.cf(CF_ROOMS)?;
        let cf_index = self.cf(CF_PARTICIPANTS)?;

        let txn = self
            .db
            .transaction_opt(&self.write_options(), &TransactionOptions::default());
        txn.put_cf(cf_rooms, room.id().as_bytes(), encode_room(room)?)?;
        for participant in room.participants() {
            txn.put_cf(cf_index, index_key(participant.user_id(), room.id()), b"")?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get(&self, id: RoomId) -> CollabResult<Option<Room>> {
        let cf = self.cf(CF_ROOMS)?;
        self.db
            .get_cf(cf, id.as_bytes())?
            .map(|bytes| decode_room(&bytes))
            .transpose()
    }

    /// Every room with `status` in which some seat is exactly
    /// `(user_id, is_forfeit)`.
    pub fn find_by_participant(
        &self,
        user_id: &UserId,
        status: RoomStatus,
        is_forfeit: bool,
    ) -> CollabResult<Vec<Room>> {
        let cf_index = self.cf(CF_PARTICIPANTS)?;
        let prefix = index_prefix(user_id);

        let mut rooms = Vec::new();
        let iter = self
            .db
            .iterator_cf(cf_index, IteratorMode::From(&prefix, Direction::Forward));
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            let room_id = room_id_from_index(&key[prefix.len()..])?;
            match self.get(room_id)? {
                Some(room)
                    if room.status() == status
                        && room.has_participant_state(user_id, is_forfeit) =>
                {
                    rooms.push(room)
                }
                Some(_) => {}
                None => {
                    log::warn!("participant index for {user_id} points at missing room {room_id}");
                }
            }
        }

        Ok(rooms)
    }

    /// Apply `change` to the stored room under a record lock and commit.
    ///
    /// If `change` fails nothing is written and its error is returned.
    pub fn update<F>(&self, id: RoomId, change: F) -> CollabResult<Room>
    where
        F: FnOnce(&mut Room) -> CollabResult<()>,
    {
        let cf = self.cf(CF_ROOMS)?;
        let txn = self
            .db
            .transaction_opt(&self.write_options(), &TransactionOptions::default());

        let bytes = txn
            .get_for_update_cf(cf, id.as_bytes(), true)?
            .ok_or_else(|| CollabError::room_not_found(id))?;
        let mut room = decode_room(&bytes)?;
        change(&mut room)?;

        txn.put_cf(cf, id.as_bytes(), encode_room(&room)?)?;
        txn.commit()?;
        Ok(room)
    }

    fn cf(&self, name: &str) -> CollabResult<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| CollabError::StoreUnavailable(format!("column family '{name}' not found")))
    }

    fn write_options(&self) -> WriteOptions {
        let mut opts = WriteOptions::default();
        opts.set_sync(self.config.sync_writes);
        opts
    }
}

fn encode_room(room: &Room) -> CollabResult<Vec<u8>> {
    bincode::serde::encode_to_vec(room, bincode::config::standard())
        .map_err(|e| CollabError::Corrupt(format!("cannot encode room {}: {e}", room.id())))
}

fn decode_room(bytes: &[u8]) -> CollabResult<Room> {
    let (room, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| CollabError::Corrupt(format!("cannot decode room: {e}")))?;
    Ok(room)
}

/// Length-prefixed so one user id can never be a prefix of another.
fn index_prefix(user_id: &UserId) -> Vec<u8> {
    let user = user_id.as_str().as_bytes();
    let mut prefix = Vec::with_capacity(4 + user.len() + 16);
    prefix.extend_from_slice(&(user.len() as u32).to_be_bytes());
    prefix.extend_from_slice(user);
    prefix
}

fn index_key(user_id: &UserId, room_id: RoomId) -> Vec<u8> {
    let mut key = index_prefix(user_id);
    key.extend_from_slice(room_id.as_bytes());
    key
}

fn room_id_from_index(suffix: &[u8]) -> CollabResult<RoomId> {
    let bytes: [u8; 16] = suffix
        .try_into()
        .map_err(|_| CollabError::Corrupt("invalid participant index key".into()))?;
    Ok(RoomId::from_bytes(bytes))
}
