//! Error types for the bridge process.
//!
//! Start-up failures (configuration, templates, HTTP client construction,
//! the control server) surface here. Failures inside the running loops are
//! logged and retried instead.

use sillyworld_core::config::ConfigError;
use sillyworld_core::lore::LoreError;
use sillyworld_server::ServerError;

/// Errors that abort the bridge process.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Configuration could not be loaded or is invalid.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Lore templates could not be loaded.
    #[error("lore template error: {0}")]
    Lore(#[from] LoreError),

    /// An HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    /// The logging filter is invalid.
    #[error("logging error: {0}")]
    Logging(String),

    /// The control API failed to start or crashed.
    #[error("server error: {0}")]
    Server(#[from] ServerError),
}
