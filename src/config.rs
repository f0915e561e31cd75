use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub system: SystemConfig,
    pub speech: SpeechConfig,
    pub generation: GenerationConfig,
    pub datastore: DatastoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Cloud speech-recognition API. The streaming endpoint speaks WebSocket
/// (binary audio in, JSON transcript events out); the batch endpoint is
/// plain HTTP for uploaded files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    pub streaming_url: String,
    pub batch_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_speech_model")]
    pub model: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_sample_rate")]
    pub sample_rate_hz: u32,
}

fn default_speech_model() -> String {
    "general".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_sample_rate() -> u32 {
    16_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    pub model: String,
    #[serde(default = "default_instruction")]
    pub default_instruction: String,
}

fn default_instruction() -> String {
    "Turn the following transcript into a well-structured document. \
     Use Markdown headings and keep the speaker's wording where possible."
        .to_string()
}

/// Managed relational backend (PostgREST-style API). Row-level access
/// control lives there; we forward the caller's bearer token untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatastoreConfig {
    pub base_url: String,
    #[serde(default)]
    pub service_key: String,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;

        let mut config: Config = if path.to_lowercase().ends_with(".json") {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };

        // Secrets may come from the environment instead of the config file
        if let Ok(key) = std::env::var("SPEECH_API_KEY") {
            config.speech.api_key = key;
        }
        if let Ok(key) = std::env::var("GENERATION_API_KEY") {
            config.generation.api_key = key;
        }
        if let Ok(key) = std::env::var("DATASTORE_SERVICE_KEY") {
            config.datastore.service_key = key;
        }

        Ok(config)
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_yaml() {
        let yaml = r#"
speech:
  streaming_url: "wss://speech.example.com/v1/listen"
  batch_url: "https://speech.example.com/v1/recognize"
generation:
  base_url: "https://genlang.example.com/v1beta"
  model: "doc-writer-1"
datastore:
  base_url: "https://db.example.com/rest/v1"
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.system.port, 8080);
        assert_eq!(config.speech.model, "general");
        assert_eq!(config.speech.sample_rate_hz, 16_000);
        assert_eq!(config.generation.model, "doc-writer-1");
        assert!(!config.generation.default_instruction.is_empty());
    }

    #[test]
    fn explicit_values_override_defaults() {
        let yaml = r#"
system:
  host: "127.0.0.1"
  port: 9000
speech:
  streaming_url: "wss://speech.example.com/v1/listen"
  batch_url: "https://speech.example.com/v1/recognize"
  model: "meeting"
  language: "vi"
  sample_rate_hz: 48000
generation:
  base_url: "https://genlang.example.com/v1beta"
  model: "doc-writer-1"
datastore:
  base_url: "https://db.example.com/rest/v1"
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.system.port, 9000);
        assert_eq!(config.speech.language, "vi");
        assert_eq!(config.speech.sample_rate_hz, 48_000);
    }
}
