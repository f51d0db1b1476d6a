//! In-process store backed by a sharded map.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::game::GameError;
use crate::game::state::{RoomId, RoomRecord};
use crate::store::{GameStore, Versioned};

#[derive(Default)]
pub struct MemoryStore {
    rooms: DashMap<RoomId, Versioned<RoomRecord>>,
    codes: DashMap<String, RoomId>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.rooms.len() }

    pub fn is_empty(&self) -> bool { self.rooms.is_empty() }
}

fn room_not_found(room_id: &str) -> GameError {
    GameError::not_found(format!("room {room_id} not found"))
}

#[async_trait]
impl GameStore for MemoryStore {
    async fn insert(&self, record: RoomRecord) -> Result<Versioned<RoomRecord>, GameError> {
        let id = record.room.id.clone();
        let code = record.room.code.clone();
        match self.codes.entry(code.clone()) {
            Entry::Occupied(_) => return Err(GameError::conflict(format!("join code {code} is taken"))),
            Entry::Vacant(slot) => {
                slot.insert(id.clone());
            }
        }
        match self.rooms.entry(id.clone()) {
            Entry::Occupied(_) => {
                self.codes.remove(&code);
                Err(GameError::conflict(format!("room id {id} is taken")))
            }
            Entry::Vacant(slot) => {
                let stored = Versioned { version: 1, value: record };
                slot.insert(stored.clone());
                Ok(stored)
            }
        }
    }

    async fn load(&self, room_id: &str) -> Result<Versioned<RoomRecord>, GameError> {
        self.rooms.get(room_id).map(|r| r.clone()).ok_or_else(|| room_not_found(room_id))
    }

    async fn find_by_code(&self, code: &str) -> Result<Versioned<RoomRecord>, GameError> {
        let room_id = self
            .codes
            .get(code)
            .map(|id| id.clone())
            .ok_or_else(|| GameError::not_found(format!("no room with code {code}")))?;
        self.load(&room_id).await
    }

    async fn commit(&self, room_id: &str, expected: u64, record: RoomRecord) -> Result<u64, GameError> {
        // the shard write guard makes check-and-replace atomic
        let mut entry = self.rooms.get_mut(room_id).ok_or_else(|| room_not_found(room_id))?;
        if entry.version != expected {
            return Err(GameError::conflict(format!(
                "room changed while the action was processed (expected version {expected}, found {}); retry",
                entry.version
            )));
        }
        if record.room.code != entry.value.room.code {
            return Err(GameError::internal("join code is immutable"));
        }
        entry.version += 1;
        entry.value = record;
        Ok(entry.version)
    }

    async fn remove(&self, room_id: &str) -> Result<(), GameError> {
        let (_, stored) = self.rooms.remove(room_id).ok_or_else(|| room_not_found(room_id))?;
        self.codes.remove(&stored.value.room.code);
        Ok(())
    }
}
