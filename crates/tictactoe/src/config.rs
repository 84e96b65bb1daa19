//! Configuration management for the tic-tac-toe server.
//!
//! This module handles loading, validation, and conversion of server configuration
//! from TOML files, environment variables and command-line arguments. Later
//! sources win: file, then environment, then command line.

use crate::cli::CliArgs;
use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tictactoe_server::{ServerConfig, TransportKind};
use tracing::info;

/// Environment variable that replaces the port of the bind address.
pub const PORT_ENV: &str = "PORT";
/// Environment variable that selects the transport (`tcp` or `ws`).
pub const MODE_ENV: &str = "MODE";

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration settings
    #[serde(default)]
    pub server: ServerSettings,
    /// Logging configuration settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Server-specific configuration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Network address to bind the server to (e.g., "0.0.0.0:42000")
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Number of lobbies in the pool
    #[serde(default = "default_lobbies")]
    pub lobbies: usize,
    /// Transport clients connect with: "tcp" or "ws"
    #[serde(default = "default_mode")]
    pub mode: String,
    /// Greeting timeout in seconds, applied to each direction
    #[serde(default = "default_timeout")]
    pub handshake_timeout: u64,
    /// Socket read/write deadline in seconds
    #[serde(default = "default_timeout")]
    pub io_timeout: u64,
    /// Capacity of each connection queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Listen backlog
    #[serde(default = "default_accept_backlog")]
    pub accept_backlog: usize,
}

fn default_bind_address() -> String {
    ServerConfig::default().bind_address.to_string()
}

fn default_lobbies() -> usize {
    ServerConfig::default().lobbies
}

fn default_mode() -> String {
    TransportKind::default().to_string()
}

fn default_timeout() -> u64 {
    60
}

fn default_queue_capacity() -> usize {
    ServerConfig::default().queue_capacity
}

fn default_accept_backlog() -> usize {
    ServerConfig::default().accept_backlog
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            lobbies: default_lobbies(),
            mode: default_mode(),
            handshake_timeout: default_timeout(),
            io_timeout: default_timeout(),
            queue_capacity: default_queue_capacity(),
            accept_backlog: default_accept_backlog(),
        }
    }
}

/// Logging system configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file at the
    /// specified path and returns the default configuration.
    pub async fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let config: AppConfig = toml::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content)
                .await
                .with_context(|| format!("Failed to create {}", path.display()))?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Applies `PORT` and `MODE` from the process environment.
    pub fn apply_env(&mut self) -> anyhow::Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Applies `PORT` and `MODE` as returned by `lookup`.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup(PORT_ENV) {
            let port: u16 = port
                .trim()
                .parse()
                .with_context(|| format!("{PORT_ENV} must be a port number, got '{port}'"))?;
            let mut addr: SocketAddr = self
                .server
                .bind_address
                .parse()
                .map_err(|_| anyhow!("Invalid bind address: {}", self.server.bind_address))?;
            addr.set_port(port);
            self.server.bind_address = addr.to_string();
        }
        if let Some(mode) = lookup(MODE_ENV) {
            self.server.mode = mode.trim().to_string();
        }
        Ok(())
    }

    /// Applies command-line overrides.
    pub fn apply_cli(&mut self, args: &CliArgs) {
        if let Some(bind) = &args.bind_address {
            self.server.bind_address = bind.clone();
        }
        if let Some(lobbies) = args.lobbies {
            self.server.lobbies = lobbies;
        }
        if let Some(mode) = &args.mode {
            self.server.mode = mode.clone();
        }
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
        if args.json_logs {
            self.logging.json_format = true;
        }
    }

    /// Validates the configuration for consistency and correctness.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.bind_address.parse::<SocketAddr>().is_err() {
            return Err(format!("Invalid bind address: {}", &self.server.bind_address));
        }

        if self.server.lobbies == 0 {
            return Err("At least one lobby is required".to_string());
        }

        if let Err(e) = self.server.mode.parse::<TransportKind>() {
            return Err(e.to_string());
        }

        if self.server.handshake_timeout == 0 || self.server.io_timeout == 0 {
            return Err("Timeouts must be at least one second".to_string());
        }

        if self.server.queue_capacity == 0 {
            return Err("Queue capacity must be positive".to_string());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }

    /// Converts the application configuration to a game server configuration.
    pub fn to_server_config(&self) -> anyhow::Result<ServerConfig> {
        let config = ServerConfig {
            bind_address: self
                .server
                .bind_address
                .parse()
                .with_context(|| format!("Invalid bind address: {}", self.server.bind_address))?,
            lobbies: self.server.lobbies,
            transport: self.server.mode.parse()?,
            handshake_timeout: Duration::from_secs(self.server.handshake_timeout),
            io_timeout: Duration::from_secs(self.server.io_timeout),
            queue_capacity: self.server.queue_capacity,
            accept_backlog: self.server.accept_backlog,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::{NamedTempFile, TempDir};
    use tokio::fs;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();

        assert_eq!(config.server.bind_address, "0.0.0.0:42000");
        assert_eq!(config.server.lobbies, 2);
        assert_eq!(config.server.mode, "tcp");
        assert_eq!(config.server.handshake_timeout, 60);
        assert_eq!(config.server.io_timeout, 60);
        assert_eq!(config.server.queue_capacity, 10);
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json_format);
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_load_from_nonexistent_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(path.exists());

        // The written file loads back to the same settings.
        let reloaded = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(reloaded, config);
    }

    #[tokio::test]
    async fn test_load_from_existing_file() {
        let toml_content = r#"
[server]
bind_address = "127.0.0.1:3000"
lobbies = 8
mode = "ws"
io_timeout = 30

[logging]
level = "debug"
json_format = true
"#;

        let temp_file = NamedTempFile::new().unwrap();
        fs::write(temp_file.path(), toml_content).await.unwrap();

        let config = AppConfig::load_from_file(temp_file.path()).await.unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:3000");
        assert_eq!(config.server.lobbies, 8);
        assert_eq!(config.server.mode, "ws");
        assert_eq!(config.server.io_timeout, 30);
        // Omitted fields fall back to defaults.
        assert_eq!(config.server.handshake_timeout, 60);
        assert_eq!(config.server.queue_capacity, 10);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json_format);
    }

    #[tokio::test]
    async fn test_load_rejects_malformed_file() {
        let temp_file = NamedTempFile::new().unwrap();
        fs::write(temp_file.path(), "[server\nlobbies = ").await.unwrap();
        assert!(AppConfig::load_from_file(temp_file.path()).await.is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [("PORT", "5000"), ("MODE", "ws")].into_iter().collect();
        let mut config = AppConfig::default();
        config
            .apply_env_from(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.server.bind_address, "0.0.0.0:5000");
        assert_eq!(config.server.mode, "ws");
    }

    #[test]
    fn test_env_rejects_bad_port() {
        let mut config = AppConfig::default();
        let result = config.apply_env_from(|key| (key == PORT_ENV).then(|| "http".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_wins_over_env() {
        let mut config = AppConfig::default();
        config
            .apply_env_from(|key| (key == MODE_ENV).then(|| "ws".to_string()))
            .unwrap();
        let args = CliArgs {
            mode: Some("tcp".to_string()),
            lobbies: Some(5),
            json_logs: true,
            ..CliArgs::default()
        };
        config.apply_cli(&args);

        assert_eq!(config.server.mode, "tcp");
        assert_eq!(config.server.lobbies, 5);
        assert!(config.logging.json_format);
    }

    #[test]
    fn test_validation() {
        let mut config = AppConfig::default();
        config.server.bind_address = "not an address".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.server.lobbies = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.server.mode = "udp".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_to_server_config() {
        let mut config = AppConfig::default();
        config.server.mode = "ws".to_string();
        config.server.io_timeout = 15;

        let server_config = config.to_server_config().unwrap();
        assert_eq!(server_config.bind_address.port(), 42000);
        assert_eq!(server_config.transport, TransportKind::WebSocket);
        assert_eq!(server_config.io_timeout, Duration::from_secs(15));
        assert_eq!(server_config.lobbies, 2);
    }
}
