//! # Client Configuration
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [server]
//! origin = "https://plotter.local"
//! channel_path = "/api"
//! upload_path = "/upload"
//!
//! [client]
//! max_document_bytes = 1048576
//! queue_capacity = 32
//! log_level = "debug"
//! ```
//!
//! Every field has a default, so an empty file is a valid configuration.

// src/config.rs - Single configuration file
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::channel::{self, ChannelError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientOptions,
}

/// Where the device controller lives.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Origin of the page serving the UI. Its scheme decides `ws` vs `wss`.
    #[serde(default = "default_origin")]
    pub origin: String,
    #[serde(default = "default_channel_path")]
    pub channel_path: String,
    #[serde(default = "default_upload_path")]
    pub upload_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            channel_path: default_channel_path(),
            upload_path: default_upload_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientOptions {
    #[serde(default = "default_max_document_bytes")]
    pub max_document_bytes: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            max_document_bytes: default_max_document_bytes(),
            queue_capacity: default_queue_capacity(),
            log_level: default_log_level(),
        }
    }
}

impl ClientConfig {
    pub fn channel_url(&self) -> Result<Url, ChannelError> {
        channel::channel_url(&self.server.origin, &self.server.channel_path)
    }

    pub fn upload_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&self.server.origin)?.join(&self.server.upload_path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.channel_url()
            .map_err(|e| ConfigError::Invalid(format!("server.origin: {}", e)))?;
        if !self.server.channel_path.starts_with('/') {
            return Err(ConfigError::Invalid(
                "server.channel_path must start with '/'".to_string(),
            ));
        }
        if self.client.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "client.queue_capacity must be > 0".to_string(),
            ));
        }
        if self.client.max_document_bytes == 0 {
            return Err(ConfigError::Invalid(
                "client.max_document_bytes must be > 0".to_string(),
            ));
        }
        if self.client.log_level.parse::<tracing::Level>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "client.log_level '{}' is not a tracing level",
                self.client.log_level
            )));
        }
        Ok(())
    }
}

// Default value functions
fn default_origin() -> String { "http://localhost:8080".to_string() }
fn default_channel_path() -> String { channel::CHANNEL_PATH.to_string() }
fn default_upload_path() -> String { "/upload".to_string() }
fn default_max_document_bytes() -> u64 { 4 * 1024 * 1024 }
fn default_queue_capacity() -> usize { 64 }
fn default_log_level() -> String { "info".to_string() }

/// Load configuration from a TOML file at the given path.
pub fn load_config(path: &str) -> Result<ClientConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        tracing::error!("Failed to read config file '{}': {}", path, e);
        ConfigError::Io(e)
    })?;
    let config: ClientConfig = toml::from_str(&contents).map_err(|e| {
        tracing::error!("Failed to parse config TOML: {}", e);
        ConfigError::Toml(e)
    })?;
    config.validate()?;
    Ok(config)
}
