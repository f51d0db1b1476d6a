//! End-of-game scoring.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::game::cards::score_hand;
use crate::game::state::{Hand, PlayerId};

/// How ties on the lowest total are settled.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Every player sharing the lowest total wins.
    SharedWin,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerScore {
    pub player_id: PlayerId,
    pub total: i32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FinalScores {
    /// In seat order.
    pub scores: Vec<PlayerScore>,
    pub winners: Vec<PlayerId>,
    pub tie_break: TieBreak,
}

/// Scores every hand in seat order. Lower is better.
pub fn final_scores(order: &[PlayerId], hands: &HashMap<PlayerId, Hand>) -> FinalScores {
    let scores: Vec<PlayerScore> = order
        .iter()
        .filter_map(|pid| hands.get(pid).map(|h| PlayerScore { player_id: *pid, total: score_hand(h) }))
        .collect();
    let best = scores.iter().map(|s| s.total).min();
    let winners = scores
        .iter()
        .filter(|s| Some(s.total) == best)
        .map(|s| s.player_id)
        .collect();
    FinalScores { scores, winners, tie_break: TieBreak::SharedWin }
}
