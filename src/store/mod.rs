//! Versioned room storage.
//!
//! The store is the only place room records live between transitions. Every
//! write is conditional on the version the writer read, which turns each
//! read-check-write in the room manager into one atomic step per room.

mod memory;

use async_trait::async_trait;

use crate::game::GameError;
use crate::game::state::RoomRecord;

pub use memory::MemoryStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: T,
}

#[async_trait]
pub trait GameStore: Send + Sync + 'static {
    /// Stores a new room at version 1. Fails with `Conflict` if the id or
    /// join code is already taken.
    async fn insert(&self, record: RoomRecord) -> Result<Versioned<RoomRecord>, GameError>;

    async fn load(&self, room_id: &str) -> Result<Versioned<RoomRecord>, GameError>;

    async fn find_by_code(&self, code: &str) -> Result<Versioned<RoomRecord>, GameError>;

    /// Replaces the record if the stored version is still `expected`, and
    /// returns the new version. Otherwise fails with `Conflict` and leaves
    /// the stored record alone.
    async fn commit(&self, room_id: &str, expected: u64, record: RoomRecord) -> Result<u64, GameError>;

    async fn remove(&self, room_id: &str) -> Result<(), GameError>;
}
