//! Server configuration.
//!
//! Configuration is assembled from defaults, the process environment (with
//! `.env` loaded by `main.rs`) and an optional YAML file, in increasing order
//! of priority.

mod env;
mod yaml;

use std::path::Path;

use thiserror::Error;

use crate::core::audio::AudioFormat;
use crate::core::bridge::validate_opus_format;
use crate::core::realtime::RealtimeConfig;

pub use env::{DEFAULT_HOST, DEFAULT_MAX_BRIDGE_SESSIONS, DEFAULT_PORT};
pub use yaml::{PeerYaml, RealtimeYaml, ServerYaml, YamlConfig};

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Read(String),

    #[error("{0}")]
    Parse(String),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Gateway server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,

    /// Credential for the speech service. Sessions are refused while unset.
    pub openai_api_key: Option<String>,
    pub realtime_url: String,
    pub realtime_model: String,
    pub realtime_voice: Option<String>,
    pub realtime_beta_header: String,
    pub realtime_instructions: Option<String>,

    /// Opus clock rate assumed when a browser does not declare one
    pub peer_sample_rate: u32,
    /// Channel count assumed when a browser does not declare one
    pub peer_channels: u16,

    /// Upper bound on concurrently running bridge sessions
    pub max_bridge_sessions: usize,
}

/// Zeroize the speech-service credential when the configuration is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.openai_api_key {
            key.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// # Example
    /// ```rust,no_run
    /// use realtime_bridge::config::ServerConfig;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = ServerConfig::from_env()?;
    /// println!("Listening on {}", config.address());
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = env::load_from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base.
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, an environment
    /// variable has an invalid format, or the merged configuration is invalid.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let yaml_config = YamlConfig::from_file(path)?;
        let mut config = env::load_from_env()?;
        config.apply_yaml(yaml_config);
        config.validate()?;
        Ok(config)
    }

    fn apply_yaml(&mut self, yaml: YamlConfig) {
        if let Some(server) = yaml.server {
            if let Some(host) = server.host {
                self.host = host;
            }
            if let Some(port) = server.port {
                self.port = port;
            }
            if let Some(max) = server.max_bridge_sessions {
                self.max_bridge_sessions = max;
            }
        }

        if let Some(realtime) = yaml.realtime {
            if realtime.api_key.is_some() {
                self.openai_api_key = realtime.api_key;
            }
            if let Some(url) = realtime.url {
                self.realtime_url = url;
            }
            if let Some(model) = realtime.model {
                self.realtime_model = model;
            }
            if realtime.voice.is_some() {
                self.realtime_voice = realtime.voice;
            }
            if let Some(beta_header) = realtime.beta_header {
                self.realtime_beta_header = beta_header;
            }
            if realtime.instructions.is_some() {
                self.realtime_instructions = realtime.instructions;
            }
        }

        if let Some(peer) = yaml.peer {
            if let Some(sample_rate) = peer.sample_rate {
                self.peer_sample_rate = sample_rate;
            }
            if let Some(channels) = peer.channels {
                self.peer_channels = channels;
            }
        }
    }

    /// Check values that would otherwise only fail once a browser connects.
    ///
    /// A missing API key is not an error here: the server starts and each
    /// session is refused until a key is configured.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_bridge_sessions == 0 {
            return Err(ConfigError::Invalid(
                "max_bridge_sessions must be greater than zero".to_string(),
            ));
        }
        url::Url::parse(&self.realtime_url).map_err(|e| {
            ConfigError::Invalid(format!("realtime url '{}': {e}", self.realtime_url))
        })?;
        validate_opus_format(self.peer_format())
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(())
    }

    /// Get the server address as "host:port".
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether a speech-service credential is configured.
    pub fn has_api_key(&self) -> bool {
        self.openai_api_key.is_some()
    }

    /// Speech-service settings for a new session.
    ///
    /// Per-session `voice`/`instructions` take precedence over the server
    /// defaults.
    pub fn realtime_config(
        &self,
        voice: Option<String>,
        instructions: Option<String>,
    ) -> RealtimeConfig {
        RealtimeConfig {
            api_key: self.openai_api_key.clone().unwrap_or_default(),
            url: self.realtime_url.clone(),
            model: self.realtime_model.clone(),
            beta_header: self.realtime_beta_header.clone(),
            voice: voice.or_else(|| self.realtime_voice.clone()),
            instructions: instructions.or_else(|| self.realtime_instructions.clone()),
            temperature: None,
            turn_detection: None,
        }
    }

    /// Browser audio format assumed when the client does not declare one.
    pub fn peer_format(&self) -> AudioFormat {
        AudioFormat::opus(self.peer_sample_rate, self.peer_channels)
    }
}
