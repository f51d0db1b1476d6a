//! Game rules, authoritative state, and per-viewer projections.

pub mod actions;
pub mod cards;
pub mod deal;
pub mod errors;
pub mod guard;
pub mod log;
pub mod scoring;
pub mod state;
pub mod view;

pub use errors::GameError;
