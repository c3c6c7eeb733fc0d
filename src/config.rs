//! Configuration management for tcpline.
//!
//! Configuration is loaded from `~/.config/tcpline/config.toml` and then
//! overridden by command-line flags.

use crate::protocol::{Endpoint, Framing};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server to connect to.
    #[serde(default)]
    pub endpoint: EndpointConfig,
    /// Connection establishment.
    #[serde(default)]
    pub connect: ConnectConfig,
    /// Message framing and reply handling.
    #[serde(default)]
    pub wire: WireConfig,
    /// Operator loop.
    #[serde(default)]
    pub session: SessionConfig,
}

/// Default server endpoint, used when no host/port is given on the command line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "tcp-server".to_string()
}

fn default_port() -> u16 {
    12345
}

/// How the initial connection is established.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectConfig {
    /// Keep retrying while the server refuses the connection.
    #[serde(default = "default_true")]
    pub retry_refused: bool,
    /// Delay between refused attempts, in milliseconds.
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    /// Give up after this many refused attempts (unset: never).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    /// Bound on each individual attempt, in milliseconds (unset: none).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            retry_refused: true,
            retry_interval_ms: default_retry_interval_ms(),
            max_attempts: None,
            timeout_ms: None,
        }
    }
}

impl ConnectConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

fn default_retry_interval_ms() -> u64 {
    500
}

/// Message framing and reply handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireConfig {
    #[serde(default)]
    pub framing: Framing,
    /// Largest single read in raw framing.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Longest accepted reply line in newline framing.
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
    /// How long to wait for a reply, in milliseconds (unset: forever).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_timeout_ms: Option<u64>,
}

impl Default for WireConfig {
    fn default() -> Self {
        Self {
            framing: Framing::default(),
            buffer_size: default_buffer_size(),
            max_line_length: default_max_line_length(),
            reply_timeout_ms: None,
        }
    }
}

impl WireConfig {
    pub fn reply_timeout(&self) -> Option<Duration> {
        self.reply_timeout_ms.map(Duration::from_millis)
    }
}

fn default_buffer_size() -> usize {
    1024
}

fn default_max_line_length() -> usize {
    64 * 1024
}

/// Operator loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Input that ends the session without being sent. Empty disables it.
    #[serde(default = "default_exit_command")]
    pub exit_command: String,
    /// Prompt written before each input line when stdin is a terminal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            exit_command: default_exit_command(),
            prompt: None,
        }
    }
}

impl SessionConfig {
    pub fn exit_command(&self) -> Option<&str> {
        if self.exit_command.is_empty() {
            None
        } else {
            Some(&self.exit_command)
        }
    }
}

fn default_exit_command() -> String {
    "quit".to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Get the config directory path.
    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("tcpline"))
            .context("Could not determine config directory")
    }

    /// Get the config file path.
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from `path`, using defaults if the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// The endpoint to connect to.
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.endpoint.host.clone(), self.endpoint.port)
    }

    /// Reject settings that cannot produce a working session.
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.host.trim().is_empty() {
            bail!("endpoint host must not be empty");
        }
        if self.endpoint.port == 0 {
            bail!("endpoint port must be non-zero");
        }
        if self.connect.retry_refused && self.connect.retry_interval_ms == 0 {
            bail!("connect.retry_interval_ms must be non-zero when retrying");
        }
        if self.connect.max_attempts == Some(0) {
            bail!("connect.max_attempts must be at least 1");
        }
        if self.wire.buffer_size == 0 {
            bail!("wire.buffer_size must be non-zero");
        }
        if self.wire.max_line_length == 0 {
            bail!("wire.max_line_length must be non-zero");
        }
        Ok(())
    }
}

/// Command-line settings that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub no_retry: bool,
    pub retry_interval_ms: Option<u64>,
    pub max_attempts: Option<u32>,
    pub connect_timeout_ms: Option<u64>,
    pub framing: Option<Framing>,
    pub buffer_size: Option<usize>,
    pub reply_timeout_ms: Option<u64>,
    pub exit_command: Option<String>,
    pub no_exit_command: bool,
    pub prompt: Option<String>,
}

impl Overrides {
    /// Apply these overrides on top of `config`.
    pub fn apply(self, mut config: Config) -> Config {
        if let Some(host) = self.host {
            config.endpoint.host = host;
        }
        if let Some(port) = self.port {
            config.endpoint.port = port;
        }

        if self.no_retry {
            config.connect.retry_refused = false;
        }
        if let Some(interval) = self.retry_interval_ms {
            config.connect.retry_interval_ms = interval;
        }
        if self.max_attempts.is_some() {
            config.connect.max_attempts = self.max_attempts;
        }
        if self.connect_timeout_ms.is_some() {
            config.connect.timeout_ms = self.connect_timeout_ms;
        }

        if let Some(framing) = self.framing {
            config.wire.framing = framing;
        }
        if let Some(size) = self.buffer_size {
            config.wire.buffer_size = size;
        }
        if self.reply_timeout_ms.is_some() {
            config.wire.reply_timeout_ms = self.reply_timeout_ms;
        }

        if self.no_exit_command {
            config.session.exit_command.clear();
        } else if let Some(cmd) = self.exit_command {
            config.session.exit_command = cmd;
        }
        if self.prompt.is_some() {
            config.session.prompt = self.prompt;
        }
        config
    }
}
