//! Turn and authorization checks.
//!
//! These only read. The processor calls them on the same snapshot it then
//! mutates, and the store commit is conditional on that snapshot's version,
//! so a check can never be invalidated between decision and write.

use crate::game::errors::GameError;
use crate::game::state::{ActionKind, GameState, PlayerId, Room, RoomStatus};

pub fn require_member(room: &Room, player: PlayerId) -> Result<(), GameError> {
    if room.is_member(player) { Ok(()) } else { Err(GameError::unauthorized("you are not a member of this room")) }
}

pub fn require_host(room: &Room, player: PlayerId) -> Result<(), GameError> {
    require_member(room, player)?;
    if room.host_id == player { Ok(()) } else { Err(GameError::unauthorized("only the host can do that")) }
}

/// Decides whether `player` may play `kind` right now.
pub fn authorize(room: &Room, game: &GameState, player: PlayerId, kind: ActionKind) -> Result<(), GameError> {
    require_member(room, player)?;
    if room.status != RoomStatus::Playing {
        return Err(GameError::invalid_state("the game is not in progress"));
    }
    if room.current_turn != Some(player) {
        return Err(not_your_turn(room));
    }
    if !game.phase.accepts_turn_actions() {
        return Err(GameError::invalid_state(format!("actions are not accepted during the {:?} phase", game.phase)));
    }

    let holding = game.pending_draw.as_ref().filter(|p| p.player_id == player);
    match kind {
        ActionKind::Draw if holding.is_some() => {
            Err(GameError::invalid_state("you already hold a drawn card; swap or discard it first"))
        }
        ActionKind::Swap | ActionKind::Discard if holding.is_none() => {
            Err(GameError::invalid_state("draw a card before swapping or discarding"))
        }
        ActionKind::Dutch if room.dutch_caller.is_some() => {
            Err(GameError::invalid_state("dutch has already been called"))
        }
        ActionKind::Dutch if holding.is_some() => {
            Err(GameError::invalid_state("dutch must be called before drawing"))
        }
        _ => Ok(()),
    }
}

fn not_your_turn(room: &Room) -> GameError {
    let whose = room
        .current_turn
        .and_then(|pid| room.member(pid))
        .map(|m| m.name.clone());
    match whose {
        Some(name) => GameError::unauthorized(format!("it is not your turn; waiting on {name}")),
        None => GameError::unauthorized("it is not your turn"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use time::OffsetDateTime;
    use uuid::Uuid;

    use super::*;
    use crate::game::cards::{Card, Rank, Suit};
    use crate::game::state::{DrawSource, PendingDraw, Phase};

    fn setup() -> (Room, GameState, PlayerId, PlayerId) {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut room = Room::new("r".into(), "C".into(), a, "alice".into(), 4, OffsetDateTime::now_utc()).unwrap();
        room.add_member(b, "bob".into()).unwrap();
        room.status = RoomStatus::Playing;
        room.current_turn = Some(a);
        let game = GameState {
            deck: vec![],
            discard_pile: vec![],
            player_hands: HashMap::new(),
            revealed_cards: HashMap::new(),
            phase: Phase::Playing,
            last_action: None,
            pending_draw: None,
            final_scores: None,
        };
        (room, game, a, b)
    }

    fn holding(player: PlayerId) -> Option<PendingDraw> {
        Some(PendingDraw { player_id: player, card: Card::new(Rank::Two, Suit::Hearts), source: DrawSource::Deck })
    }

    #[test]
    fn out_of_turn_is_unauthorized_and_names_current_player() {
        let (room, game, _a, b) = setup();
        let err = authorize(&room, &game, b, ActionKind::Draw).unwrap_err();
        assert_eq!(err, GameError::unauthorized("it is not your turn; waiting on alice"));
    }

    #[test]
    fn strangers_are_rejected() {
        let (room, game, _, _) = setup();
        let err = authorize(&room, &game, Uuid::new_v4(), ActionKind::Draw).unwrap_err();
        assert!(matches!(err, GameError::Unauthorized(_)));
    }

    #[test]
    fn memorizing_blocks_actions() {
        let (room, mut game, a, _) = setup();
        game.phase = Phase::Memorizing;
        assert!(matches!(authorize(&room, &game, a, ActionKind::Draw), Err(GameError::InvalidState(_))));
    }

    #[test]
    fn finished_room_blocks_actions() {
        let (mut room, game, a, _) = setup();
        room.status = RoomStatus::Finished;
        assert!(matches!(authorize(&room, &game, a, ActionKind::Draw), Err(GameError::InvalidState(_))));
    }

    #[test]
    fn draw_needs_empty_hand_slot() {
        let (room, mut game, a, _) = setup();
        assert!(authorize(&room, &game, a, ActionKind::Draw).is_ok());
        game.pending_draw = holding(a);
        assert!(matches!(authorize(&room, &game, a, ActionKind::Draw), Err(GameError::InvalidState(_))));
    }

    #[test]
    fn swap_and_discard_need_a_held_card() {
        let (room, mut game, a, _) = setup();
        assert!(authorize(&room, &game, a, ActionKind::Swap).is_err());
        assert!(authorize(&room, &game, a, ActionKind::Discard).is_err());
        game.pending_draw = holding(a);
        assert!(authorize(&room, &game, a, ActionKind::Swap).is_ok());
        assert!(authorize(&room, &game, a, ActionKind::Discard).is_ok());
    }

    #[test]
    fn dutch_only_once_and_before_drawing() {
        let (mut room, mut game, a, b) = setup();
        assert!(authorize(&room, &game, a, ActionKind::Dutch).is_ok());
        game.pending_draw = holding(a);
        assert!(authorize(&room, &game, a, ActionKind::Dutch).is_err());
        game.pending_draw = None;
        room.dutch_caller = Some(b);
        assert_eq!(
            authorize(&room, &game, a, ActionKind::Dutch),
            Err(GameError::invalid_state("dutch has already been called"))
        );
    }

    #[test]
    fn host_check() {
        let (room, _, a, b) = setup();
        assert!(require_host(&room, a).is_ok());
        assert!(require_host(&room, b).is_err());
    }
}
