//! Initial deal.

use std::collections::HashMap;

use crate::game::cards::Card;
use crate::game::errors::GameError;
use crate::game::state::{Hand, PlayerId};

pub const HAND_SIZE: usize = 4;
pub const MIN_PLAYERS: usize = 2;
pub const MAX_PLAYERS: usize = 6;
/// Hand positions each player may look at while memorizing.
pub const INITIAL_REVEALED: [usize; 2] = [0, 3];

#[derive(Debug, Clone)]
pub struct Deal {
    pub deck: Vec<Card>,
    pub discard_pile: Vec<Card>,
    pub hands: HashMap<PlayerId, Hand>,
}

/// Deals four cards to each player in seat order off the top of `deck`,
/// then turns one more card face up to start the discard pile.
pub fn deal_initial_hands(mut deck: Vec<Card>, players: &[PlayerId]) -> Result<Deal, GameError> {
    if players.len() < MIN_PLAYERS {
        return Err(GameError::validation(format!(
            "at least {MIN_PLAYERS} players are needed to deal, got {}",
            players.len()
        )));
    }
    if players.len() > MAX_PLAYERS {
        return Err(GameError::validation(format!(
            "at most {MAX_PLAYERS} players can be dealt in, got {}",
            players.len()
        )));
    }
    let needed = players.len() * HAND_SIZE + 1;
    if deck.len() < needed {
        return Err(GameError::validation(format!("deck has {} cards, deal needs {needed}", deck.len())));
    }

    let mut hands = HashMap::with_capacity(players.len());
    for pid in players {
        let cards: Vec<Card> = (0..HAND_SIZE).filter_map(|_| deck.pop()).collect();
        let hand: Hand = cards
            .try_into()
            .map_err(|_| GameError::internal("deck ran out mid-deal"))?;
        if hands.insert(*pid, hand).is_some() {
            return Err(GameError::validation(format!("player {pid} listed twice")));
        }
    }
    let seed = deck.pop().ok_or_else(|| GameError::internal("no card left to seed the discard pile"))?;

    Ok(Deal { deck, discard_pile: vec![seed], hands })
}
