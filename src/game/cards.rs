//! Cards, deck construction and hand scoring.

use std::fmt;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

pub const DECK_SIZE: usize = 52;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Suit { Hearts, Diamonds, Clubs, Spades }

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Hearts, Suit::Diamonds, Suit::Clubs, Suit::Spades];

    pub fn is_red(&self) -> bool { matches!(self, Suit::Diamonds | Suit::Hearts) }

    pub fn as_str(&self) -> &'static str {
        match self {
            Suit::Hearts => "hearts",
            Suit::Diamonds => "diamonds",
            Suit::Clubs => "clubs",
            Suit::Spades => "spades",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Rank {
    #[serde(rename = "A")] Ace,
    #[serde(rename = "2")] Two,
    #[serde(rename = "3")] Three,
    #[serde(rename = "4")] Four,
    #[serde(rename = "5")] Five,
    #[serde(rename = "6")] Six,
    #[serde(rename = "7")] Seven,
    #[serde(rename = "8")] Eight,
    #[serde(rename = "9")] Nine,
    #[serde(rename = "10")] Ten,
    #[serde(rename = "J")] Jack,
    #[serde(rename = "Q")] Queen,
    #[serde(rename = "K")] King,
}

impl Rank {
    pub const ALL: [Rank; 13] = [
        Rank::Ace, Rank::Two, Rank::Three, Rank::Four, Rank::Five, Rank::Six,
        Rank::Seven, Rank::Eight, Rank::Nine, Rank::Ten, Rank::Jack, Rank::Queen, Rank::King,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Rank::Ace => "A",
            Rank::Two => "2",
            Rank::Three => "3",
            Rank::Four => "4",
            Rank::Five => "5",
            Rank::Six => "6",
            Rank::Seven => "7",
            Rank::Eight => "8",
            Rank::Nine => "9",
            Rank::Ten => "10",
            Rank::Jack => "J",
            Rank::Queen => "Q",
            Rank::King => "K",
        }
    }
}

/// A single playing card. A standard deck holds each rank/suit pair once,
/// so `rank-suit` identifies a card uniquely.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Card { pub rank: Rank, pub suit: Suit }

impl Card {
    pub const fn new(rank: Rank, suit: Suit) -> Self { Self { rank, suit } }

    pub fn id(&self) -> String { format!("{}-{}", self.rank.as_str(), self.suit.as_str()) }

    /// Points this card is worth at the end of a game. Red kings are the
    /// only negative card.
    pub fn value(&self) -> i32 {
        match self.rank {
            Rank::Ace => 1,
            Rank::Two => 2,
            Rank::Three => 3,
            Rank::Four => 4,
            Rank::Five => 5,
            Rank::Six => 6,
            Rank::Seven => 7,
            Rank::Eight => 8,
            Rank::Nine => 9,
            Rank::Ten | Rank::Jack | Rank::Queen => 10,
            Rank::King => if self.suit.is_red() { -1 } else { 0 },
        }
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.rank.as_str(), self.suit.as_str())
    }
}

/// All 52 cards in suit-major order, unshuffled.
pub fn full_deck() -> Vec<Card> {
    let mut deck = Vec::with_capacity(DECK_SIZE);
    for s in Suit::ALL { for r in Rank::ALL { deck.push(Card::new(r, s)); } }
    deck
}

/// Fresh deck shuffled with a Fisher-Yates pass driven by `rng`.
/// The top of the deck is the end of the returned vector.
pub fn create_deck<R: Rng + ?Sized>(rng: &mut R) -> Vec<Card> {
    let mut deck = full_deck();
    deck.shuffle(rng);
    deck
}

pub fn score_hand(hand: &[Card]) -> i32 {
    hand.iter().map(Card::value).sum()
}
