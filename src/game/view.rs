//! Per-viewer projections of a room.
//!
//! Everything that leaves the server about a game goes through
//! [`project_for`]. Hand contents are only ever copied out of the viewer's
//! own hand; every other hand is reduced to its size.

use std::collections::BTreeMap;

use serde::Serialize;
use time::OffsetDateTime;

use crate::game::cards::Card;
use crate::game::scoring::FinalScores;
use crate::game::state::{
    ActionKind, DrawSource, GameState, Member, Phase, PlayerId, Room, RoomId, RoomStatus,
};

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerHandView {
    pub player_id: PlayerId,
    pub position: usize,
    pub card_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cards: Option<Vec<Card>>,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PendingDrawView {
    pub player_id: PlayerId,
    pub source: DrawSource,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LastActionView {
    pub kind: ActionKind,
    pub player_id: PlayerId,
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameStateView {
    pub room_id: RoomId,
    pub version: u64,
    pub status: RoomStatus,
    pub phase: Phase,
    pub current_turn: Option<PlayerId>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub turn_started_at: Option<OffsetDateTime>,
    pub dutch_caller: Option<PlayerId>,
    pub deck_count: usize,
    pub discard_pile: Vec<Card>,
    pub discard_top: Option<Card>,
    /// Seat order.
    pub player_hands: Vec<PlayerHandView>,
    /// Holds at most the viewer's own entry, and only while memorizing.
    pub revealed_cards: BTreeMap<PlayerId, Vec<usize>>,
    /// The viewer's own drawn card, if they are holding one.
    pub held_card: Option<Card>,
    pub pending_draw: Option<PendingDrawView>,
    pub last_action: Option<LastActionView>,
    pub final_scores: Option<FinalScores>,
}

pub fn project_for(viewer: PlayerId, room: &Room, game: &GameState, version: u64) -> GameStateView {
    let player_hands = room
        .members
        .iter()
        .filter_map(|m| {
            let hand = game.player_hands.get(&m.player_id)?;
            let cards = (m.player_id == viewer).then(|| hand.to_vec());
            Some(PlayerHandView { player_id: m.player_id, position: m.position, card_count: hand.len(), cards })
        })
        .collect();

    let mut revealed_cards = BTreeMap::new();
    if game.phase == Phase::Memorizing {
        if let Some(own) = game.revealed_cards.get(&viewer) {
            revealed_cards.insert(viewer, own.iter().copied().collect());
        }
    }

    let held_card = game.pending_draw.filter(|p| p.player_id == viewer).map(|p| p.card);
    let pending_draw = game
        .pending_draw
        .map(|p| PendingDrawView { player_id: p.player_id, source: p.source });

    GameStateView {
        room_id: room.id.clone(),
        version,
        status: room.status,
        phase: game.phase,
        current_turn: room.current_turn,
        turn_started_at: room.turn_started_at,
        dutch_caller: room.dutch_caller,
        deck_count: game.deck.len(),
        discard_pile: game.discard_pile.clone(),
        discard_top: game.discard_top().copied(),
        player_hands,
        revealed_cards,
        held_card,
        pending_draw,
        last_action: game
            .last_action
            .as_ref()
            .map(|a| LastActionView { kind: a.kind, player_id: a.player_id, at: a.at }),
        final_scores: game.final_scores.clone(),
    }
}

/// Lobby-level view of a room; no card data at all.
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomView {
    pub id: RoomId,
    pub code: String,
    pub host_id: PlayerId,
    pub max_players: usize,
    pub status: RoomStatus,
    pub current_turn: Option<PlayerId>,
    pub dutch_caller: Option<PlayerId>,
    pub members: Vec<Member>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub version: u64,
}

impl RoomView {
    pub fn of(room: &Room, version: u64) -> Self {
        RoomView {
            id: room.id.clone(),
            code: room.code.clone(),
            host_id: room.host_id,
            max_players: room.max_players,
            status: room.status,
            current_turn: room.current_turn,
            dutch_caller: room.dutch_caller,
            members: room.members.clone(),
            created_at: room.created_at,
            version,
        }
    }
}
