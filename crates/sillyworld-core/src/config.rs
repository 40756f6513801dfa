//! Configuration loading and typed config structures for the bridge.
//!
//! The canonical configuration lives in `sillyworld-config.yaml`. Every
//! field has a default matching a local single-machine setup (game mod on
//! ports 28080/28081), so an absent file is not an error. A handful of
//! endpoints can be overridden from the environment for container
//! deployments.

use std::path::Path;

use serde::Deserialize;
use sillyworld_types::Locale;

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "SILLYWORLD_CONFIG";

/// Config file used when [`CONFIG_PATH_ENV`] is unset.
pub const DEFAULT_CONFIG_PATH: &str = "sillyworld-config.yaml";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is unusable.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level bridge configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BridgeConfig {
    /// Game-side endpoints and polling.
    #[serde(default)]
    pub game: GameConfig,

    /// Chat front-end (entry store and chat sessions).
    #[serde(default)]
    pub tavern: TavernConfig,

    /// Narrative output settings.
    #[serde(default)]
    pub narrative: NarrativeConfig,

    /// Control API server.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BridgeConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override endpoint values:
    /// - `SILLYWORLD_GAMESTATE_URL` overrides `game.gamestate_url`
    /// - `SILLYWORLD_LORE_URL` overrides `game.lore_url`
    /// - `SILLYWORLD_EVENT_SOCKET_URL` overrides `game.event_socket_url`
    /// - `SILLYWORLD_TAVERN_URL` overrides `tavern.base_url`
    /// - `SILLYWORLD_SERVER_PORT` overrides `server.port`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Load from `path`, falling back to defaults when the file does not
    /// exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            return Self::from_file(path);
        }
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    ///
    /// An empty document yields the defaults.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Override endpoints from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Override endpoints using `lookup` as the environment.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(val) = lookup("SILLYWORLD_GAMESTATE_URL") {
            self.game.gamestate_url = val;
        }
        if let Some(val) = lookup("SILLYWORLD_LORE_URL") {
            self.game.lore_url = val;
        }
        if let Some(val) = lookup("SILLYWORLD_EVENT_SOCKET_URL") {
            self.game.event_socket_url = val;
        }
        if let Some(val) = lookup("SILLYWORLD_TAVERN_URL") {
            self.tavern.base_url = val;
        }
        if let Some(val) = lookup("SILLYWORLD_SERVER_PORT") {
            self.server.port = val.parse().map_err(|e| ConfigError::Invalid {
                field: "server.port",
                reason: format!("{val:?}: {e}"),
            })?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.game.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "game.poll_interval_ms",
                reason: "must be at least 1".to_owned(),
            });
        }
        if self.tavern.worldbook_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "tavern.worldbook_prefix",
                reason: "must not be empty".to_owned(),
            });
        }
        Ok(())
    }
}

/// Game-side endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GameConfig {
    /// HTTP endpoint serving the state snapshot.
    #[serde(default = "default_gamestate_url")]
    pub gamestate_url: String,

    /// HTTP endpoint serving the lore document.
    #[serde(default = "default_lore_url")]
    pub lore_url: String,

    /// WebSocket endpoint streaming events.
    #[serde(default = "default_event_socket_url")]
    pub event_socket_url: String,

    /// Snapshot polling interval.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Delay before reconnecting a dropped event stream.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Per-request HTTP timeout.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            gamestate_url: default_gamestate_url(),
            lore_url: default_lore_url(),
            event_socket_url: default_event_socket_url(),
            poll_interval_ms: default_poll_interval_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Chat front-end settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TavernConfig {
    /// Base URL of the front-end's bridge endpoints.
    #[serde(default = "default_tavern_url")]
    pub base_url: String,

    /// Prefix of per-world book names; the world id is appended after a
    /// space.
    #[serde(default = "default_worldbook_prefix")]
    pub worldbook_prefix: String,

    /// Per-request HTTP timeout.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for TavernConfig {
    fn default() -> Self {
        Self {
            base_url: default_tavern_url(),
            worldbook_prefix: default_worldbook_prefix(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Narrative output settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NarrativeConfig {
    /// Dispatch narratives as soon as they are produced.
    #[serde(default)]
    pub auto_send: bool,

    /// Output language.
    #[serde(default)]
    pub language: Locale,

    /// Directory with lore template overrides.
    #[serde(default)]
    pub templates_dir: Option<String>,
}

/// Control API server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Listen port.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) used when `RUST_LOG` is
    /// unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

fn default_gamestate_url() -> String {
    "http://localhost:28080/gamestate".to_owned()
}

fn default_lore_url() -> String {
    "http://localhost:28080/lore".to_owned()
}

fn default_event_socket_url() -> String {
    "ws://localhost:28081/events".to_owned()
}

const fn default_poll_interval_ms() -> u64 {
    5000
}

const fn default_reconnect_delay_ms() -> u64 {
    5000
}

const fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_tavern_url() -> String {
    "http://localhost:8000/api/plugins/sillyworld".to_owned()
}

fn default_worldbook_prefix() -> String {
    "[Sillyworld] Data -".to_owned()
}

fn default_host() -> String {
    "127.0.0.1".to_owned()
}

const fn default_port() -> u16 {
    28090
}

fn default_log_level() -> String {
    "info".to_owned()
}
