//! Server-authoritative engine for Dutch, a multiplayer card game where each
//! player tries to finish with the lowest hand.

pub mod config;
pub mod game;
pub mod http;
pub mod room;
pub mod store;
pub mod telemetry;
pub mod util;
pub mod ws;
