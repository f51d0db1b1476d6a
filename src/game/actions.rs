//! Action processor: every transition a dealt room goes through.
//!
//! Functions here operate on a [`RoomRecord`] the caller owns. They check
//! everything before touching anything, and the room manager only commits a
//! record after the whole transition succeeded, so a rejected action never
//! leaves a trace.

use serde_json::json;
use time::OffsetDateTime;

use crate::game::cards::Card;
use crate::game::deal::{HAND_SIZE, deal_initial_hands};
use crate::game::errors::GameError;
use crate::game::guard;
use crate::game::log::{LogDraft, LogKind};
use crate::game::scoring::final_scores;
use crate::game::state::{
    ActionKind, DrawSource, GameState, LastAction, PendingDraw, Phase, PlayerId, Room, RoomRecord, RoomStatus,
};

/// A validated player action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Draw { source: DrawSource },
    Swap { hand_index: usize },
    Discard,
    CallDutch,
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Draw { .. } => ActionKind::Draw,
            Action::Swap { .. } => ActionKind::Swap,
            Action::Discard => ActionKind::Discard,
            Action::CallDutch => ActionKind::Dutch,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    /// Only ever returned to the player who drew it.
    pub drawn_card: Option<Card>,
    pub log: Vec<LogDraft>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnAdvance {
    Next(PlayerId),
    Finished,
}

/// Deals a fresh game into a waiting room and hands the first turn to the
/// first seat. Play starts in the memorizing phase.
pub fn start_game(record: &mut RoomRecord, deck: Vec<Card>, now: OffsetDateTime) -> Result<Vec<LogDraft>, GameError> {
    let room = &mut record.room;
    if room.status != RoomStatus::Waiting || record.game.is_some() {
        return Err(GameError::invalid_state("the game has already started"));
    }
    let order = room.player_order();
    let deal = deal_initial_hands(deck, &order)?;
    let first = order[0];

    room.status = RoomStatus::Playing;
    room.current_turn = Some(first);
    room.turn_started_at = Some(now);
    room.turn_number += 1;
    room.dutch_caller = None;
    record.game = Some(GameState::from_deal(deal));

    Ok(vec![LogDraft::new(LogKind::GameStarted, None).with_data(json!({ "players": order }))])
}

/// Closes the memorizing window: hides every revealed card and restarts the
/// first player's turn clock.
pub fn end_memorizing(record: &mut RoomRecord, now: OffsetDateTime) -> Result<Vec<LogDraft>, GameError> {
    let (room, game) = record.parts_mut()?;
    if game.phase != Phase::Memorizing {
        return Err(GameError::invalid_state("memorizing is already over"));
    }
    game.phase = Phase::Playing;
    for revealed in game.revealed_cards.values_mut() {
        revealed.clear();
    }
    room.turn_started_at = Some(now);
    room.turn_number += 1;
    Ok(vec![LogDraft::new(LogKind::MemorizingEnded, None)])
}

/// Runs one player action through the guard and applies it.
pub fn apply(record: &mut RoomRecord, player: PlayerId, action: Action, now: OffsetDateTime) -> Result<Outcome, GameError> {
    let (room, game) = record.parts_mut()?;
    guard::authorize(room, game, player, action.kind())?;

    let mut outcome = Outcome::default();
    match action {
        Action::Draw { source } => {
            let card = draw(game, player, source)?;
            outcome.drawn_card = Some(card);
            // a deck card is private until it lands somewhere
            let data = match source {
                DrawSource::Deck => json!({ "source": source }),
                DrawSource::Discard => json!({ "source": source, "card": card }),
            };
            outcome.log.push(LogDraft::new(LogKind::Draw, Some(player)).with_data(data));
        }
        Action::Swap { hand_index } => {
            let displaced = swap(game, player, hand_index)?;
            outcome.log.push(
                LogDraft::new(LogKind::Swap, Some(player))
                    .with_data(json!({ "handIndex": hand_index, "discarded": displaced })),
            );
            advance_and_log(room, game, now, &mut outcome)?;
        }
        Action::Discard => {
            let held = discard_held(game, player)?;
            outcome.log.push(
                LogDraft::new(LogKind::Discard, Some(player))
                    .with_data(json!({ "card": held.card, "source": held.source })),
            );
            advance_and_log(room, game, now, &mut outcome)?;
        }
        Action::CallDutch => {
            room.dutch_caller = Some(player);
            game.phase = Phase::DutchRound;
            outcome.log.push(LogDraft::new(LogKind::Dutch, Some(player)));
            // calling dutch uses up the caller's turn
            advance_and_log(room, game, now, &mut outcome)?;
        }
    }
    game.last_action = Some(LastAction { kind: action.kind(), player_id: player, at: now });
    Ok(outcome)
}

/// Whether the turn clock armed for `turn_number` is still running.
pub fn turn_is_live(record: &RoomRecord, turn_number: u64) -> bool {
    record.room.status == RoomStatus::Playing
        && record.room.turn_number == turn_number
        && record.game.as_ref().is_some_and(|g| g.phase.accepts_turn_actions())
}

/// Server-side turn timeout. Returns `None` when the timer is stale: the
/// turn it was armed for has already ended, or the game is not in a phase
/// with a running turn clock.
pub fn expire_turn(record: &mut RoomRecord, turn_number: u64, now: OffsetDateTime) -> Result<Option<Outcome>, GameError> {
    if !turn_is_live(record, turn_number) {
        return Ok(None);
    }
    let (room, game) = record.parts_mut()?;
    let player = room.current_turn.ok_or_else(|| GameError::internal("playing room without a current turn"))?;

    let auto_discarded = if game.pending_draw.is_some_and(|p| p.player_id == player) {
        Some(discard_held(game, player)?.card)
    } else {
        None
    };
    let mut outcome = Outcome::default();
    outcome.log.push(
        LogDraft::new(LogKind::TurnTimeout, Some(player)).with_data(json!({ "autoDiscarded": auto_discarded })),
    );
    game.last_action = Some(LastAction { kind: ActionKind::Timeout, player_id: player, at: now });
    advance_and_log(room, game, now, &mut outcome)?;
    Ok(Some(outcome))
}

/// Moves the turn to the next seat. When that seat is the dutch caller the
/// game ends instead: the caller never gets another turn.
pub fn advance_turn(room: &mut Room, game: &mut GameState, now: OffsetDateTime) -> Result<TurnAdvance, GameError> {
    let current = room.current_turn.ok_or_else(|| GameError::internal("no current turn to advance from"))?;
    let next = room
        .next_after(current)
        .ok_or_else(|| GameError::internal("current turn holder is not seated in the room"))?;
    room.turn_number += 1;

    if room.dutch_caller == Some(next) {
        finish(room, game);
        return Ok(TurnAdvance::Finished);
    }
    room.current_turn = Some(next);
    room.turn_started_at = Some(now);
    Ok(TurnAdvance::Next(next))
}

fn advance_and_log(room: &mut Room, game: &mut GameState, now: OffsetDateTime, outcome: &mut Outcome) -> Result<(), GameError> {
    if advance_turn(room, game, now)? == TurnAdvance::Finished {
        let scores = game.final_scores.as_ref().map(|s| json!(s));
        let mut draft = LogDraft::new(LogKind::GameFinished, None);
        if let Some(scores) = scores {
            draft = draft.with_data(scores);
        }
        outcome.log.push(draft);
    }
    Ok(())
}

fn finish(room: &mut Room, game: &mut GameState) {
    game.phase = Phase::Finished;
    room.status = RoomStatus::Finished;
    room.current_turn = None;
    room.turn_started_at = None;
    for (pid, revealed) in game.revealed_cards.iter_mut() {
        if game.player_hands.contains_key(pid) {
            *revealed = (0..HAND_SIZE).collect();
        }
    }
    game.final_scores = Some(final_scores(&room.player_order(), &game.player_hands));
}

fn draw(game: &mut GameState, player: PlayerId, source: DrawSource) -> Result<Card, GameError> {
    let pile = match source {
        DrawSource::Deck => &mut game.deck,
        DrawSource::Discard => &mut game.discard_pile,
    };
    let card = pile.pop().ok_or_else(|| match source {
        DrawSource::Deck => GameError::exhausted("the deck is empty; draw from the discard pile"),
        DrawSource::Discard => GameError::exhausted("the discard pile is empty; draw from the deck"),
    })?;
    game.pending_draw = Some(PendingDraw { player_id: player, card, source });
    Ok(card)
}

/// Puts the held card at `hand_index`; the card it replaces goes face up
/// on the discard pile. A card drawn from the discard pile was already
/// taken off it, so the displaced card simply becomes the new top.
fn swap(game: &mut GameState, player: PlayerId, hand_index: usize) -> Result<Card, GameError> {
    if hand_index >= HAND_SIZE {
        return Err(GameError::validation(format!("hand index must be 0..{}, got {hand_index}", HAND_SIZE - 1)));
    }
    if !game.player_hands.contains_key(&player) {
        return Err(GameError::internal("seated player has no hand"));
    }
    let held = take_held(game, player)?;
    let hand = game
        .player_hands
        .get_mut(&player)
        .ok_or_else(|| GameError::internal("seated player has no hand"))?;
    let displaced = std::mem::replace(&mut hand[hand_index], held.card);
    game.discard_pile.push(displaced);
    Ok(displaced)
}

/// Lays the held card on the discard pile. From the deck this moves it onto
/// the pile; from the discard pile it puts it back where it came from.
fn discard_held(game: &mut GameState, player: PlayerId) -> Result<PendingDraw, GameError> {
    let held = take_held(game, player)?;
    game.discard_pile.push(held.card);
    Ok(held)
}

fn take_held(game: &mut GameState, player: PlayerId) -> Result<PendingDraw, GameError> {
    match game.pending_draw {
        Some(p) if p.player_id == player => {
            game.pending_draw = None;
            Ok(p)
        }
        _ => Err(GameError::invalid_state("no drawn card is held")),
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use uuid::Uuid;

    use super::*;
    use crate::game::cards::{DECK_SIZE, create_deck};

    fn now() -> OffsetDateTime { OffsetDateTime::UNIX_EPOCH }

    fn dealt(n: usize, seed: u64) -> (RoomRecord, Vec<PlayerId>) {
        let ids: Vec<PlayerId> = (0..n).map(|_| Uuid::new_v4()).collect();
        let mut room = Room::new("room".into(), "CODE42".into(), ids[0], "p0".into(), 6, now()).unwrap();
        for (i, id) in ids.iter().enumerate().skip(1) {
            room.add_member(*id, format!("p{i}")).unwrap();
        }
        let mut record = RoomRecord::new(room);
        start_game(&mut record, create_deck(&mut StdRng::seed_from_u64(seed)), now()).unwrap();
        (record, ids)
    }

    fn playing(n: usize, seed: u64) -> (RoomRecord, Vec<PlayerId>) {
        let (mut record, ids) = dealt(n, seed);
        end_memorizing(&mut record, now()).unwrap();
        (record, ids)
    }

    fn game(record: &RoomRecord) -> &GameState { record.game.as_ref().unwrap() }

    #[test]
    fn deal_scenario() {
        let (record, ids) = dealt(3, 11);
        let g = game(&record);
        assert_eq!(g.deck.len(), 39);
        assert_eq!(g.discard_pile.len(), 1);
        assert_eq!(g.phase, Phase::Memorizing);
        for id in &ids {
            assert_eq!(g.player_hands[id].len(), 4);
            assert_eq!(g.revealed_cards[id].iter().copied().collect::<Vec<_>>(), vec![0, 3]);
        }
        assert_eq!(record.room.status, RoomStatus::Playing);
        assert_eq!(record.room.current_turn, Some(ids[0]));
        assert_eq!(g.total_cards(), DECK_SIZE);
    }

    #[test]
    fn start_requires_waiting_room() {
        let (mut record, _) = dealt(2, 1);
        let err = start_game(&mut record, create_deck(&mut StdRng::seed_from_u64(2)), now()).unwrap_err();
        assert!(matches!(err, GameError::InvalidState(_)));
    }

    #[test]
    fn start_requires_two_players() {
        let room = Room::new("r".into(), "C".into(), Uuid::new_v4(), "solo".into(), 4, now()).unwrap();
        let mut record = RoomRecord::new(room);
        let before = record.clone();
        let err = start_game(&mut record, create_deck(&mut StdRng::seed_from_u64(3)), now()).unwrap_err();
        assert!(matches!(err, GameError::Validation(_)));
        assert_eq!(record, before);
    }

    #[test]
    fn end_memorizing_hides_cards_once() {
        let (mut record, _) = dealt(2, 4);
        let turn = record.room.turn_number;
        end_memorizing(&mut record, now()).unwrap();
        assert_eq!(game(&record).phase, Phase::Playing);
        assert!(game(&record).revealed_cards.values().all(|r| r.is_empty()));
        assert_eq!(record.room.turn_number, turn + 1);
        assert!(matches!(end_memorizing(&mut record, now()), Err(GameError::InvalidState(_))));
    }

    #[test]
    fn draw_then_discard_from_deck() {
        let (mut record, ids) = playing(3, 5);
        let top = *game(&record).deck.last().unwrap();
        let hand_before = game(&record).player_hands[&ids[0]];

        let out = apply(&mut record, ids[0], Action::Draw { source: DrawSource::Deck }, now()).unwrap();
        assert_eq!(out.drawn_card, Some(top));
        assert_eq!(game(&record).deck.len(), 38);
        assert_eq!(game(&record).total_cards(), DECK_SIZE);

        apply(&mut record, ids[0], Action::Discard, now()).unwrap();
        let g = game(&record);
        assert_eq!(g.discard_pile.len(), 2);
        assert_eq!(g.discard_top(), Some(&top));
        assert_eq!(g.player_hands[&ids[0]], hand_before);
        assert_eq!(g.pending_draw, None);
        assert_eq!(record.room.current_turn, Some(ids[1]));
    }

    #[test]
    fn discard_of_a_discard_draw_puts_it_back() {
        let (mut record, ids) = playing(2, 6);
        let pile_before = game(&record).discard_pile.clone();
        apply(&mut record, ids[0], Action::Draw { source: DrawSource::Discard }, now()).unwrap();
        assert!(game(&record).discard_pile.is_empty());
        apply(&mut record, ids[0], Action::Discard, now()).unwrap();
        assert_eq!(game(&record).discard_pile, pile_before);
    }

    #[test]
    fn swap_from_deck_discards_displaced_card() {
        let (mut record, ids) = playing(2, 7);
        let drawn = apply(&mut record, ids[0], Action::Draw { source: DrawSource::Deck }, now())
            .unwrap()
            .drawn_card
            .unwrap();
        let old = game(&record).player_hands[&ids[0]][2];
        apply(&mut record, ids[0], Action::Swap { hand_index: 2 }, now()).unwrap();
        let g = game(&record);
        assert_eq!(g.player_hands[&ids[0]][2], drawn);
        assert_eq!(g.discard_top(), Some(&old));
        assert_eq!(g.discard_pile.len(), 2);
        assert_eq!(g.total_cards(), DECK_SIZE);
    }

    #[test]
    fn swapped_out_card_is_next_discard_draw() {
        let (mut record, ids) = playing(2, 8);
        apply(&mut record, ids[0], Action::Draw { source: DrawSource::Deck }, now()).unwrap();
        let displaced = game(&record).player_hands[&ids[0]][1];
        apply(&mut record, ids[0], Action::Swap { hand_index: 1 }, now()).unwrap();
        let got = apply(&mut record, ids[1], Action::Draw { source: DrawSource::Discard }, now()).unwrap();
        assert_eq!(got.drawn_card, Some(displaced));
    }

    #[test]
    fn discarded_deck_card_is_next_discard_draw() {
        let (mut record, ids) = playing(2, 9);
        let c = apply(&mut record, ids[0], Action::Draw { source: DrawSource::Deck }, now())
            .unwrap()
            .drawn_card;
        apply(&mut record, ids[0], Action::Discard, now()).unwrap();
        let got = apply(&mut record, ids[1], Action::Draw { source: DrawSource::Discard }, now()).unwrap();
        assert_eq!(got.drawn_card, c);
    }

    #[test]
    fn swap_from_discard_replaces_top() {
        let (mut record, ids) = playing(2, 10);
        let seed = *game(&record).discard_top().unwrap();
        apply(&mut record, ids[0], Action::Draw { source: DrawSource::Discard }, now()).unwrap();
        let old = game(&record).player_hands[&ids[0]][0];
        apply(&mut record, ids[0], Action::Swap { hand_index: 0 }, now()).unwrap();
        let g = game(&record);
        assert_eq!(g.player_hands[&ids[0]][0], seed);
        assert_eq!(g.discard_pile, vec![old]);
    }

    #[test]
    fn bad_hand_index_changes_nothing() {
        let (mut record, ids) = playing(2, 12);
        apply(&mut record, ids[0], Action::Draw { source: DrawSource::Deck }, now()).unwrap();
        let before = record.clone();
        let err = apply(&mut record, ids[0], Action::Swap { hand_index: 4 }, now()).unwrap_err();
        assert!(matches!(err, GameError::Validation(_)));
        assert_eq!(record, before);
    }

    #[test]
    fn out_of_turn_changes_nothing() {
        let (mut record, ids) = playing(3, 13);
        let before = record.clone();
        for action in [
            Action::Draw { source: DrawSource::Deck },
            Action::Swap { hand_index: 0 },
            Action::Discard,
            Action::CallDutch,
        ] {
            let err = apply(&mut record, ids[2], action, now()).unwrap_err();
            assert!(matches!(err, GameError::Unauthorized(_)), "{action:?} gave {err:?}");
            assert_eq!(record, before);
        }
    }

    #[test]
    fn empty_deck_is_exhausted_and_unchanged() {
        let (mut record, ids) = playing(2, 14);
        let g = record.game.as_mut().unwrap();
        let rest = std::mem::take(&mut g.discard_pile);
        g.discard_pile = std::mem::take(&mut g.deck);
        g.discard_pile.extend(rest);
        let before = record.clone();
        let err = apply(&mut record, ids[0], Action::Draw { source: DrawSource::Deck }, now()).unwrap_err();
        assert!(matches!(err, GameError::ResourceExhausted(_)));
        assert_eq!(record, before);
    }

    #[test]
    fn dutch_ends_when_turn_returns_to_caller() {
        let (mut record, ids) = playing(2, 15);
        apply(&mut record, ids[0], Action::CallDutch, now()).unwrap();
        assert_eq!(record.room.dutch_caller, Some(ids[0]));
        assert_eq!(game(&record).phase, Phase::DutchRound);
        assert_eq!(record.room.current_turn, Some(ids[1]));

        apply(&mut record, ids[1], Action::Draw { source: DrawSource::Deck }, now()).unwrap();
        let out = apply(&mut record, ids[1], Action::Discard, now()).unwrap();

        let g = game(&record);
        assert_eq!(g.phase, Phase::Finished);
        assert_eq!(record.room.status, RoomStatus::Finished);
        assert_eq!(record.room.current_turn, None);
        let scores = g.final_scores.as_ref().unwrap();
        assert_eq!(scores.scores.len(), 2);
        assert!(out.log.iter().any(|d| d.kind == LogKind::GameFinished));
    }

    #[test]
    fn dutch_round_lets_everyone_else_play_once() {
        let (mut record, ids) = playing(4, 16);
        // p0 discards, then p1 calls
        apply(&mut record, ids[0], Action::Draw { source: DrawSource::Deck }, now()).unwrap();
        apply(&mut record, ids[0], Action::Discard, now()).unwrap();
        apply(&mut record, ids[1], Action::CallDutch, now()).unwrap();
        for p in [ids[2], ids[3], ids[0]] {
            assert_eq!(game(&record).phase, Phase::DutchRound);
            assert_eq!(record.room.current_turn, Some(p));
            apply(&mut record, p, Action::Draw { source: DrawSource::Deck }, now()).unwrap();
            apply(&mut record, p, Action::Discard, now()).unwrap();
        }
        assert_eq!(game(&record).phase, Phase::Finished);
        assert!(apply(&mut record, ids[1], Action::Draw { source: DrawSource::Deck }, now()).is_err());
    }

    #[test]
    fn second_dutch_call_rejected() {
        let (mut record, ids) = playing(3, 17);
        apply(&mut record, ids[0], Action::CallDutch, now()).unwrap();
        let err = apply(&mut record, ids[1], Action::CallDutch, now()).unwrap_err();
        assert!(matches!(err, GameError::InvalidState(_)));
    }

    #[test]
    fn timeout_auto_discards_held_card() {
        let (mut record, ids) = playing(2, 18);
        let drawn = apply(&mut record, ids[0], Action::Draw { source: DrawSource::Deck }, now())
            .unwrap()
            .drawn_card;
        let turn = record.room.turn_number;
        let out = expire_turn(&mut record, turn, now()).unwrap().unwrap();
        assert_eq!(game(&record).discard_top().copied(), drawn);
        assert_eq!(game(&record).pending_draw, None);
        assert_eq!(record.room.current_turn, Some(ids[1]));
        assert_eq!(out.log[0].kind, LogKind::TurnTimeout);
        assert_eq!(game(&record).total_cards(), DECK_SIZE);
    }

    #[test]
    fn stale_timeout_is_ignored() {
        let (mut record, ids) = playing(2, 19);
        let turn = record.room.turn_number;
        apply(&mut record, ids[0], Action::CallDutch, now()).unwrap();
        let before = record.clone();
        assert_eq!(expire_turn(&mut record, turn, now()).unwrap(), None);
        assert_eq!(record, before);
    }

    #[test]
    fn no_timeout_while_memorizing() {
        let (mut record, _) = dealt(2, 20);
        let turn = record.room.turn_number;
        assert_eq!(expire_turn(&mut record, turn, now()).unwrap(), None);
    }

    #[test]
    fn timeout_can_finish_the_game() {
        let (mut record, ids) = playing(2, 21);
        apply(&mut record, ids[0], Action::CallDutch, now()).unwrap();
        let turn = record.room.turn_number;
        expire_turn(&mut record, turn, now()).unwrap().unwrap();
        assert_eq!(record.room.status, RoomStatus::Finished);
    }
}
