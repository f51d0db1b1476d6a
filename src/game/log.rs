//! Per-room action log. Observational only; the game never reads it back.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::game::state::PlayerId;

pub const DEFAULT_LOG_LIMIT: usize = 50;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    GameStarted,
    MemorizingEnded,
    Draw,
    Swap,
    Discard,
    Dutch,
    TurnTimeout,
    GameFinished,
}

/// A log line before the commit that produced it has a version.
#[derive(Debug, Clone, PartialEq)]
pub struct LogDraft {
    pub kind: LogKind,
    pub player_id: Option<PlayerId>,
    pub data: Option<Value>,
}

impl LogDraft {
    pub fn new(kind: LogKind, player_id: Option<PlayerId>) -> Self { Self { kind, player_id, data: None } }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn stamp(self, version: u64, timestamp: OffsetDateTime) -> LogEntry {
        LogEntry { kind: self.kind, player_id: self.player_id, data: self.data, timestamp, version }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    #[serde(rename = "type")]
    pub kind: LogKind,
    pub player_id: Option<PlayerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Store version of the commit this entry describes.
    pub version: u64,
}

/// Bounded log kept in commit order.
#[derive(Debug, Clone)]
pub struct ActionLog {
    entries: VecDeque<LogEntry>,
    limit: usize,
}

impl ActionLog {
    pub fn new(limit: usize) -> Self {
        Self { entries: VecDeque::with_capacity(limit.min(64)), limit: limit.max(1) }
    }

    /// Inserts by version so entries from commits that finish publishing out
    /// of order still read in transition order. Oldest entries fall off.
    pub fn append(&mut self, entry: LogEntry) {
        let at = self.entries.partition_point(|e| e.version <= entry.version);
        self.entries.insert(at, entry);
        while self.entries.len() > self.limit {
            self.entries.pop_front();
        }
    }

    /// Oldest first.
    pub fn recent(&self) -> Vec<LogEntry> { self.entries.iter().cloned().collect() }
}

impl Default for ActionLog {
    fn default() -> Self { Self::new(DEFAULT_LOG_LIMIT) }
}
