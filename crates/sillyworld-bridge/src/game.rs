//! HTTP access to the game's state and lore endpoints.
//!
//! Both endpoints take the output language as a `lang` query parameter and
//! answer with a JSON document.

use async_trait::async_trait;
use serde_json::Value;
use sillyworld_core::collab::{CollaboratorError, GameStateSource};
use sillyworld_core::config::GameConfig;
use sillyworld_types::Locale;
use tracing::debug;

use crate::error::AppError;
use crate::http;

/// [`GameStateSource`] backed by the game's HTTP endpoints.
#[derive(Debug, Clone)]
pub struct HttpGameClient {
    client: reqwest::Client,
    gamestate_url: String,
    lore_url: String,
}

impl HttpGameClient {
    /// Create a client for the configured endpoints.
    pub fn new(config: &GameConfig) -> Result<Self, AppError> {
        Ok(Self {
            client: http::client(config.request_timeout_ms)?,
            gamestate_url: config.gamestate_url.clone(),
            lore_url: config.lore_url.clone(),
        })
    }

    async fn get_document(&self, url: &str, locale: Locale) -> Result<Value, CollaboratorError> {
        debug!(url, lang = locale.code(), "fetching game document");
        let response = self
            .client
            .get(url)
            .query(&[("lang", locale.code())])
            .send()
            .await
            .map_err(|e| http::transport(&e))?;
        http::decode(response).await
    }
}

#[async_trait]
impl GameStateSource for HttpGameClient {
    async fn fetch_snapshot(&self, locale: Locale) -> Result<Value, CollaboratorError> {
        self.get_document(&self.gamestate_url, locale).await
    }

    async fn fetch_lore(&self, locale: Locale) -> Result<Value, CollaboratorError> {
        self.get_document(&self.lore_url, locale).await
    }
}
