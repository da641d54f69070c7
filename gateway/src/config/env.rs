//! Environment variable loading.

use std::env;
use std::str::FromStr;

use super::{ConfigError, ServerConfig};
use crate::core::audio::WEBRTC_OPUS_SAMPLE_RATE;
use crate::core::realtime::openai::{
    OPENAI_BETA_HEADER_VALUE, OPENAI_DEFAULT_MODEL, OPENAI_REALTIME_URL,
};

/// Default bind address.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default listen port.
pub const DEFAULT_PORT: u16 = 3001;

/// Default cap on concurrent bridge sessions.
pub const DEFAULT_MAX_BRIDGE_SESSIONS: usize = 100;

/// Read a variable, treating empty values as unset.
fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Read and parse a variable, falling back to `default` when unset.
fn parse_var<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(raw) => raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{raw}': {e}"),
        }),
        None => Ok(default),
    }
}

/// Build a [`ServerConfig`] from environment variables and defaults.
pub(super) fn load_from_env() -> Result<ServerConfig, ConfigError> {
    Ok(ServerConfig {
        host: var("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
        port: parse_var("PORT", DEFAULT_PORT)?,
        openai_api_key: var("OPENAI_API_KEY"),
        realtime_url: var("OPENAI_REALTIME_URL").unwrap_or_else(|| OPENAI_REALTIME_URL.to_string()),
        realtime_model: var("OPENAI_REALTIME_MODEL")
            .unwrap_or_else(|| OPENAI_DEFAULT_MODEL.to_string()),
        realtime_voice: var("OPENAI_REALTIME_VOICE"),
        realtime_beta_header: var("OPENAI_BETA_HEADER")
            .unwrap_or_else(|| OPENAI_BETA_HEADER_VALUE.to_string()),
        realtime_instructions: var("REALTIME_INSTRUCTIONS"),
        peer_sample_rate: parse_var("PEER_SAMPLE_RATE", WEBRTC_OPUS_SAMPLE_RATE)?,
        peer_channels: parse_var("PEER_CHANNELS", 1u16)?,
        max_bridge_sessions: parse_var("MAX_BRIDGE_SESSIONS", DEFAULT_MAX_BRIDGE_SESSIONS)?,
    })
}
