// Daemon configuration.
//
// File: `~/.gitseal/config.toml`
// Environment overrides: `GITSEAL_LISTEN_ADDR`, `GITSEAL_LOG_FILTER`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::command::CommandTimeouts;

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8765";

/// Root directory for gitseal state: `~/.gitseal/`.
pub fn global_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".gitseal"))
}

/// Path to the config file: `~/.gitseal/config.toml`.
pub fn global_config_path() -> Option<PathBuf> {
    global_dir().map(|d| d.join("config.toml"))
}

// ── Config ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    pub server: ServerConfig,
    pub commands: CommandsConfig,
    /// `tracing_subscriber::EnvFilter` directive (e.g. `gitseal_daemon=debug`).
    pub log_filter: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            commands: CommandsConfig::default(),
            log_filter: "info".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Allowed CORS origins. Empty means local Jupyter origins; `["*"]` allows any.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { listen_addr: DEFAULT_LISTEN_ADDR.into(), cors_origins: Vec::new() }
    }
}

/// External programs and their deadlines.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CommandsConfig {
    pub git_program: String,
    pub gpg_program: String,
    /// Config reads, `rev-parse`, `show`, key listing.
    pub query_timeout_ms: u64,
    /// `verify-commit`.
    pub verify_timeout_ms: u64,
    /// Commit, amend, and signing probes.
    pub write_timeout_ms: u64,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        let timeouts = CommandTimeouts::default();
        Self {
            git_program: "git".into(),
            gpg_program: "gpg".into(),
            query_timeout_ms: timeouts.query.as_millis() as u64,
            verify_timeout_ms: timeouts.verify.as_millis() as u64,
            write_timeout_ms: timeouts.write.as_millis() as u64,
        }
    }
}

impl CommandsConfig {
    pub fn timeouts(&self) -> CommandTimeouts {
        CommandTimeouts {
            query: Duration::from_millis(self.query_timeout_ms.max(1)),
            verify: Duration::from_millis(self.verify_timeout_ms.max(1)),
            write: Duration::from_millis(self.write_timeout_ms.max(1)),
        }
    }
}

impl DaemonConfig {
    /// Load `~/.gitseal/config.toml` with environment overrides applied.
    /// A missing file yields defaults; an unreadable one is an error.
    pub fn load() -> Result<Self, ConfigError> {
        let base = match global_config_path() {
            Some(path) if path.exists() => Self::load_from(&path)?,
            _ => Self::default(),
        };
        Ok(base.with_env_fn(|key| std::env::var(key)))
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save to a specific path (creates parent directories).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Io)?;
        }
        let contents = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, contents).map_err(ConfigError::Io)
    }

    /// Testable override step that accepts an environment lookup function.
    pub fn with_env_fn<F>(mut self, env: F) -> Self
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        if let Ok(addr) = env("GITSEAL_LISTEN_ADDR") {
            if !addr.trim().is_empty() {
                self.server.listen_addr = addr.trim().to_string();
            }
        }
        if let Ok(filter) = env("GITSEAL_LOG_FILTER") {
            if !filter.trim().is_empty() {
                self.log_filter = filter.trim().to_string();
            }
        }
        self
    }
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config I/O error: {e}"),
            Self::Parse(e) => write!(f, "config parse error: {e}"),
            Self::Serialize(e) => write!(f, "config serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}
