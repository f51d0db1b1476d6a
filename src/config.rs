//! Configuration utilities (ports, timers, signing key, env vars)

use std::env;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use anyhow::Context;
use rand::RngCore;

use crate::game::log::DEFAULT_LOG_LIMIT;

pub const DEFAULT_TURN_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MEMORIZE_DURATION: Duration = Duration::from_secs(10);

/// Knobs the room manager runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameSettings {
    /// How long a player may sit on their turn before the server plays it
    /// out for them.
    pub turn_timeout: Duration,
    /// How long the first and last card stay revealed after the deal.
    pub memorize_duration: Duration,
    /// Action log entries kept per room.
    pub action_log_limit: usize,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            turn_timeout: DEFAULT_TURN_TIMEOUT,
            memorize_duration: DEFAULT_MEMORIZE_DURATION,
            action_log_limit: DEFAULT_LOG_LIMIT,
        }
    }
}

/// Socket address to bind the server to.
///
/// Reads the `PORT` env var or defaults to 8080, binds to 0.0.0.0.
pub fn server_addr() -> SocketAddr {
    let port = env::var("PORT")
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(8080);
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))
}

/// Game timers and limits from `DUTCH_TURN_TIMEOUT_SECS`,
/// `DUTCH_MEMORIZE_SECS` and `DUTCH_ACTION_LOG_LIMIT`.
pub fn game_settings() -> anyhow::Result<GameSettings> {
    let defaults = GameSettings::default();
    Ok(GameSettings {
        turn_timeout: secs_var("DUTCH_TURN_TIMEOUT_SECS")?.unwrap_or(defaults.turn_timeout),
        memorize_duration: secs_var("DUTCH_MEMORIZE_SECS")?.unwrap_or(defaults.memorize_duration),
        action_log_limit: parse_var::<usize>("DUTCH_ACTION_LOG_LIMIT")?.unwrap_or(defaults.action_log_limit),
    })
}

/// Token signing key from `DUTCH_HMAC_KEY` (64 hex chars). Without it a
/// random key is generated, which invalidates tokens on restart.
pub fn hmac_key() -> anyhow::Result<[u8; 32]> {
    match env::var("DUTCH_HMAC_KEY") {
        Ok(hex_key) => parse_hmac_key(&hex_key),
        Err(_) => {
            tracing::warn!("DUTCH_HMAC_KEY not set; using an ephemeral signing key");
            let mut kb = [0u8; 32];
            rand::thread_rng().fill_bytes(&mut kb);
            Ok(kb)
        }
    }
}

fn parse_hmac_key(hex_key: &str) -> anyhow::Result<[u8; 32]> {
    let bytes = hex::decode(hex_key.trim()).context("DUTCH_HMAC_KEY is not valid hex")?;
    bytes
        .try_into()
        .map_err(|v: Vec<u8>| anyhow::anyhow!("DUTCH_HMAC_KEY must be 32 bytes, got {}", v.len()))
}

fn parse_var<T: std::str::FromStr>(name: &str) -> anyhow::Result<Option<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().map(Some).with_context(|| format!("{name}={raw:?} is invalid")),
        Err(_) => Ok(None),
    }
}

fn secs_var(name: &str) -> anyhow::Result<Option<Duration>> {
    Ok(parse_var::<u64>(name)?.map(Duration::from_secs))
}
