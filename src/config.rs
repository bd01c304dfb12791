//! # Configuration Management
//!
//! Loads application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix, plus OPENAI_API_KEY)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER__HOST, OPENAI_API_KEY, ...)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration that contains all settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub openai: OpenAiConfig,
    pub session: SessionConfig,
}

/// Server-specific configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// OpenAI collaborator configuration.
///
/// ## Fields:
/// - `api_key`: normally supplied via the OPENAI_API_KEY environment variable
/// - `transcription_model` / `chat_model` / `tts_model`: model names for the
///   three collaborator calls
/// - `tts_voice`: voice preset for speech synthesis
/// - `temperature` / `max_tokens`: completion sampling settings; responses
///   are kept short for children
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub transcription_model: String,
    pub chat_model: String,
    pub tts_model: String,
    pub tts_voice: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Streaming session tuning.
///
/// ## Fields:
/// - `heartbeat_interval_secs`: cadence of the server-to-client keep-alive
/// - `max_concurrent_sessions`: connections beyond this are refused
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub heartbeat_interval_secs: u64,
    pub max_concurrent_sessions: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            openai: OpenAiConfig {
                api_key: String::new(),
                transcription_model: "whisper-1".to_string(),
                chat_model: "gpt-4o".to_string(),
                tts_model: "tts-1-hd".to_string(),
                tts_voice: "nova".to_string(),
                temperature: 0.7,
                max_tokens: 200,
            },
            session: SessionConfig {
                heartbeat_interval_secs: 5,
                max_concurrent_sessions: 10,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, config.toml and the environment.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__HOST=0.0.0.0`: Override server host
    /// - `APP_SESSION__HEARTBEAT_INTERVAL_SECS=10`: Override heartbeat cadence
    /// - `OPENAI_API_KEY=sk-...`: Collaborator credentials
    /// - `HOST` / `PORT`: Special cases for deployment platforms
    ///
    /// The section separator is a double underscore so field names that
    /// themselves contain underscores survive the mapping.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        // Credentials and platform variables that don't follow the APP_
        // prefix convention.
        if let Ok(api_key) = env::var("OPENAI_API_KEY") {
            settings = settings.set_override("openai.api_key", api_key)?;
        }

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.session.heartbeat_interval_secs == 0 {
            return Err(anyhow::anyhow!("Heartbeat interval must be greater than 0"));
        }

        if self.session.max_concurrent_sessions == 0 {
            return Err(anyhow::anyhow!(
                "Max concurrent sessions must be greater than 0"
            ));
        }

        if !(0.0..=2.0).contains(&self.openai.temperature) {
            return Err(anyhow::anyhow!("Temperature must be between 0.0 and 2.0"));
        }

        Ok(())
    }

    /// Update configuration from a JSON string (runtime config updates).
    ///
    /// Only the fields present in the JSON are touched; everything else keeps
    /// its current value. The API key is deliberately not updatable this way.
    pub fn update_from_json(&mut self, json_str: &str) -> Result<()> {
        let partial: serde_json::Value = serde_json::from_str(json_str)?;

        if let Some(server) = partial.get("server") {
            if let Some(host) = server.get("host").and_then(|v| v.as_str()) {
                self.server.host = host.to_string();
            }
            if let Some(port) = server.get("port").and_then(|v| v.as_u64()) {
                self.server.port = port as u16;
            }
        }

        if let Some(openai) = partial.get("openai") {
            if let Some(model) = openai.get("transcription_model").and_then(|v| v.as_str()) {
                self.openai.transcription_model = model.to_string();
            }
            if let Some(model) = openai.get("chat_model").and_then(|v| v.as_str()) {
                self.openai.chat_model = model.to_string();
            }
            if let Some(model) = openai.get("tts_model").and_then(|v| v.as_str()) {
                self.openai.tts_model = model.to_string();
            }
            if let Some(voice) = openai.get("tts_voice").and_then(|v| v.as_str()) {
                self.openai.tts_voice = voice.to_string();
            }
            if let Some(temperature) = openai.get("temperature").and_then(|v| v.as_f64()) {
                self.openai.temperature = temperature as f32;
            }
            if let Some(max_tokens) = openai.get("max_tokens").and_then(|v| v.as_u64()) {
                self.openai.max_tokens = max_tokens as u32;
            }
        }

        if let Some(session) = partial.get("session") {
            if let Some(interval) = session
                .get("heartbeat_interval_secs")
                .and_then(|v| v.as_u64())
            {
                self.session.heartbeat_interval_secs = interval;
            }
            if let Some(sessions) = session
                .get("max_concurrent_sessions")
                .and_then(|v| v.as_u64())
            {
                self.session.max_concurrent_sessions = sessions as usize;
            }
        }

        self.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.session.heartbeat_interval_secs, 5);
        assert_eq!(config.openai.chat_model, "gpt-4o");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.session.heartbeat_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.openai.temperature = 3.5;
        assert!(config.validate().is_err());
    }

    /// Nested fields with underscores in their names must be reachable
    /// through the double-underscore section separator.
    #[test]
    fn test_env_override_reaches_nested_fields() {
        env::set_var("APP_SESSION__HEARTBEAT_INTERVAL_SECS", "9");
        let config = AppConfig::load().unwrap();
        env::remove_var("APP_SESSION__HEARTBEAT_INTERVAL_SECS");

        assert_eq!(config.session.heartbeat_interval_secs, 9);
    }

    #[test]
    fn test_config_update() {
        let mut config = AppConfig::default();
        let json = r#"{"session": {"heartbeat_interval_secs": 10}}"#;
        assert!(config.update_from_json(json).is_ok());
        assert_eq!(config.session.heartbeat_interval_secs, 10);
        // Untouched fields keep their values
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.openai.tts_voice, "nova");
    }

    #[test]
    fn test_config_update_rejects_invalid_values() {
        let mut config = AppConfig::default();
        let json = r#"{"session": {"max_concurrent_sessions": 0}}"#;
        assert!(config.update_from_json(json).is_err());
    }
}
