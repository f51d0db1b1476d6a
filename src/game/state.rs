//! Authoritative room and game records.
//!
//! A [`RoomRecord`] is the unit the store versions and commits: the room
//! lifecycle fields and the dealt game travel together so cards moving
//! between a hand and the shared piles are always written as one delta.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::game::cards::Card;
use crate::game::deal::{Deal, HAND_SIZE, INITIAL_REVEALED, MAX_PLAYERS, MIN_PLAYERS};
use crate::game::errors::GameError;
use crate::game::scoring::FinalScores;

pub type PlayerId = Uuid;
pub type RoomId = String;
pub type Hand = [Card; HAND_SIZE];

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus { Waiting, Playing, Finished }

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Phase { Memorizing, Playing, DutchRound, Finished }

impl Phase {
    /// Whether draw/swap/discard/dutch may be played in this phase.
    pub fn accepts_turn_actions(&self) -> bool { matches!(self, Phase::Playing | Phase::DutchRound) }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DrawSource { Deck, Discard }

impl DrawSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DrawSource::Deck => "deck",
            DrawSource::Discard => "discard",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind { Draw, Swap, Discard, Dutch, Timeout }

/// The held card: drawn from a pile, not yet swapped in or discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingDraw {
    pub player_id: PlayerId,
    pub card: Card,
    pub source: DrawSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastAction {
    pub kind: ActionKind,
    pub player_id: PlayerId,
    pub at: OffsetDateTime,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub player_id: PlayerId,
    pub name: String,
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    pub id: RoomId,
    pub code: String,
    pub host_id: PlayerId,
    pub max_players: usize,
    pub status: RoomStatus,
    pub current_turn: Option<PlayerId>,
    pub turn_started_at: Option<OffsetDateTime>,
    /// Bumped on every turn change; keys the server-side turn timer.
    pub turn_number: u64,
    pub dutch_caller: Option<PlayerId>,
    /// Ordered by position, which is the turn order.
    pub members: Vec<Member>,
    pub created_at: OffsetDateTime,
}

impl Room {
    pub fn new(
        id: RoomId,
        code: String,
        host_id: PlayerId,
        host_name: String,
        max_players: usize,
        now: OffsetDateTime,
    ) -> Result<Self, GameError> {
        if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&max_players) {
            return Err(GameError::validation(format!(
                "max players must be between {MIN_PLAYERS} and {MAX_PLAYERS}, got {max_players}"
            )));
        }
        Ok(Room {
            id,
            code,
            host_id,
            max_players,
            status: RoomStatus::Waiting,
            current_turn: None,
            turn_started_at: None,
            turn_number: 0,
            dutch_caller: None,
            members: vec![Member { player_id: host_id, name: host_name, position: 0 }],
            created_at: now,
        })
    }

    pub fn is_member(&self, player: PlayerId) -> bool {
        self.members.iter().any(|m| m.player_id == player)
    }

    pub fn member(&self, player: PlayerId) -> Option<&Member> {
        self.members.iter().find(|m| m.player_id == player)
    }

    pub fn player_order(&self) -> Vec<PlayerId> {
        self.members.iter().map(|m| m.player_id).collect()
    }

    pub fn is_full(&self) -> bool { self.members.len() >= self.max_players }

    /// Appends a member at the next position. Positions are never reused or
    /// reordered, so turn order is stable for the life of the room.
    pub fn add_member(&mut self, player_id: PlayerId, name: String) -> Result<&Member, GameError> {
        if self.status != RoomStatus::Waiting {
            return Err(GameError::invalid_state("the game has already started"));
        }
        if self.is_full() {
            return Err(GameError::invalid_state(format!("room is full ({} players)", self.max_players)));
        }
        let position = self.members.len();
        self.members.push(Member { player_id, name, position });
        Ok(&self.members[position])
    }

    /// The player seated after `player`, wrapping around.
    pub fn next_after(&self, player: PlayerId) -> Option<PlayerId> {
        let idx = self.members.iter().position(|m| m.player_id == player)?;
        let next = (idx + 1) % self.members.len();
        Some(self.members[next].player_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameState {
    pub deck: Vec<Card>,
    pub discard_pile: Vec<Card>,
    pub player_hands: HashMap<PlayerId, Hand>,
    pub revealed_cards: HashMap<PlayerId, BTreeSet<usize>>,
    pub phase: Phase,
    pub last_action: Option<LastAction>,
    pub pending_draw: Option<PendingDraw>,
    pub final_scores: Option<FinalScores>,
}

impl GameState {
    /// Game as it stands right after the deal: everyone memorizing their
    /// first and last card.
    pub fn from_deal(deal: Deal) -> Self {
        let revealed_cards = deal
            .hands
            .keys()
            .map(|pid| (*pid, INITIAL_REVEALED.iter().copied().collect()))
            .collect();
        GameState {
            deck: deal.deck,
            discard_pile: deal.discard_pile,
            player_hands: deal.hands,
            revealed_cards,
            phase: Phase::Memorizing,
            last_action: None,
            pending_draw: None,
            final_scores: None,
        }
    }

    pub fn discard_top(&self) -> Option<&Card> { self.discard_pile.last() }

    /// Every card the game accounts for, including one held mid-turn.
    pub fn total_cards(&self) -> usize {
        self.deck.len()
            + self.discard_pile.len()
            + self.player_hands.values().map(|h| h.len()).sum::<usize>()
            + usize::from(self.pending_draw.is_some())
    }
}

/// What the store versions: one per room, game present once dealt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomRecord {
    pub room: Room,
    pub game: Option<GameState>,
}

impl RoomRecord {
    pub fn new(room: Room) -> Self { Self { room, game: None } }

    pub fn game(&self) -> Result<&GameState, GameError> {
        self.game.as_ref().ok_or_else(|| GameError::not_found("the game has not started yet"))
    }

    /// Split borrow used by the action processor.
    pub fn parts_mut(&mut self) -> Result<(&mut Room, &mut GameState), GameError> {
        match self.game.as_mut() {
            Some(game) => Ok((&mut self.room, game)),
            None => Err(GameError::not_found("the game has not started yet")),
        }
    }
}
