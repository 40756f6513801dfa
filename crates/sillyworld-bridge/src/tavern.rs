//! Client for the tavern-side REST shim.
//!
//! The shim is a small server plugin exposing the world book and chat
//! operations the bridge needs:
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | `POST` | `/worldbooks/ensure` | Create a book if needed and bind it to the chat |
//! | `GET` | `/worldbooks/entries?book=..` | List a book's entries |
//! | `POST` | `/worldbooks/entries` | Create or replace one entry |
//! | `POST` | `/worldbooks/entries/remove` | Remove entries by name |
//! | `POST` | `/chat/rebind` | Open the chat bound to a timeline |
//! | `POST` | `/chat/send` | Send a user turn and generate a reply |

use async_trait::async_trait;
use serde::Serialize;
use sillyworld_core::collab::{ChatSession, CollaboratorError, EntryStore};
use sillyworld_core::config::TavernConfig;
use sillyworld_types::{DerivedEntry, EntryUpsert, SessionKey, TimelineId, WorldId};
use tracing::debug;

use crate::error::AppError;
use crate::http;

#[derive(Serialize)]
struct BookRef<'a> {
    book: &'a str,
}

#[derive(Serialize)]
struct UpsertBody<'a> {
    book: &'a str,
    entry: &'a EntryUpsert,
}

#[derive(Serialize)]
struct RemoveBody<'a> {
    book: &'a str,
    names: &'a [String],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RebindBody<'a> {
    world_id: &'a WorldId,
    timeline_id: TimelineId,
    group_id: &'a str,
    chat_id: &'a str,
}

#[derive(Serialize)]
struct SendBody<'a> {
    text: &'a str,
}

/// [`EntryStore`] and [`ChatSession`] backed by the tavern shim.
#[derive(Debug, Clone)]
pub struct TavernClient {
    client: reqwest::Client,
    base_url: String,
}

impl TavernClient {
    /// Create a client for the configured shim.
    pub fn new(config: &TavernConfig) -> Result<Self, AppError> {
        Ok(Self {
            client: http::client(config.request_timeout_ms)?,
            base_url: config.base_url.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        http::join(&self.base_url, path)
    }

    async fn post<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<(), CollaboratorError> {
        let url = self.endpoint(path);
        debug!(url = %url, "tavern request");
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| http::transport(&e))?;
        http::check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl EntryStore for TavernClient {
    async fn ensure_book(&self, book: &str) -> Result<(), CollaboratorError> {
        self.post("worldbooks/ensure", &BookRef { book }).await
    }

    async fn list(&self, book: &str) -> Result<Vec<DerivedEntry>, CollaboratorError> {
        let response = self
            .client
            .get(self.endpoint("worldbooks/entries"))
            .query(&[("book", book)])
            .send()
            .await
            .map_err(|e| http::transport(&e))?;
        http::decode(response).await
    }

    async fn upsert(&self, book: &str, entry: &EntryUpsert) -> Result<(), CollaboratorError> {
        self.post("worldbooks/entries", &UpsertBody { book, entry }).await
    }

    async fn remove_batch(&self, book: &str, names: &[String]) -> Result<(), CollaboratorError> {
        if names.is_empty() {
            return Ok(());
        }
        self.post("worldbooks/entries/remove", &RemoveBody { book, names })
            .await
    }
}

#[async_trait]
impl ChatSession for TavernClient {
    async fn rebind_session(
        &self,
        world_id: &WorldId,
        timeline_id: TimelineId,
        session: &SessionKey,
    ) -> Result<(), CollaboratorError> {
        let body = RebindBody {
            world_id,
            timeline_id,
            group_id: &session.group_id,
            chat_id: &session.chat_id,
        };
        self.post("chat/rebind", &body).await
    }

    async fn dispatch_narrative(&self, text: &str) -> Result<(), CollaboratorError> {
        self.post("chat/send", &SendBody { text }).await
    }
}
