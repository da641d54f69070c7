use serde::Deserialize;
use std::path::Path;

use super::ConfigError;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present in
/// the file override the environment.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 3001
///   max_bridge_sessions: 32
///
/// realtime:
///   api_key: "sk-..."
///   url: "wss://api.openai.com/v1/realtime"
///   model: "gpt-4o-realtime-preview"
///   voice: "alloy"
///   beta_header: "realtime=v1"
///   instructions: "You are a helpful assistant."
///
/// peer:
///   sample_rate: 48000
///   channels: 1
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub realtime: Option<RealtimeYaml>,
    pub peer: Option<PeerYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub max_bridge_sessions: Option<usize>,
}

/// Speech service connection from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RealtimeYaml {
    pub api_key: Option<String>,
    pub url: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub beta_header: Option<String>,
    pub instructions: Option<String>,
}

/// Default browser-side audio parameters from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PeerYaml {
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
}

impl YamlConfig {
    /// Load YAML configuration from a file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or the YAML is malformed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::Read(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;

        serde_yaml::from_str(&contents)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse YAML config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_yaml_config_full() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 8080
  max_bridge_sessions: 4

realtime:
  api_key: "sk-yaml"
  model: "gpt-4o-mini-realtime-preview"
  voice: "verse"

peer:
  sample_rate: 16000
  channels: 2
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();

        let server = config.server.unwrap();
        assert_eq!(server.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(server.port, Some(8080));
        assert_eq!(server.max_bridge_sessions, Some(4));

        let realtime = config.realtime.unwrap();
        assert_eq!(realtime.api_key.as_deref(), Some("sk-yaml"));
        assert_eq!(
            realtime.model.as_deref(),
            Some("gpt-4o-mini-realtime-preview")
        );
        assert_eq!(realtime.voice.as_deref(), Some("verse"));
        assert!(realtime.url.is_none());

        let peer = config.peer.unwrap();
        assert_eq!(peer.sample_rate, Some(16000));
        assert_eq!(peer.channels, Some(2));
    }

    #[test]
    fn test_yaml_config_empty_sections() {
        let config: YamlConfig = serde_yaml::from_str("server: {}\n").unwrap();
        assert!(config.server.unwrap().port.is_none());
        assert!(config.realtime.is_none());
        assert!(config.peer.is_none());
    }

    #[test]
    fn test_from_file_reads_and_parses() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bridge.yaml");
        fs::write(&path, "server:\n  port: 4000\n").unwrap();

        let config = YamlConfig::from_file(&path).unwrap();
        assert_eq!(config.server.unwrap().port, Some(4000));
    }

    #[test]
    fn test_from_file_wrong_type() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bridge.yaml");
        fs::write(&path, "server:\n  port: \"not a number\"\n").unwrap();

        let err = YamlConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
