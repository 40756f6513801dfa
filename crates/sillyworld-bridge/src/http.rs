//! Shared `reqwest` plumbing for the game and tavern clients.

use std::time::Duration;

use serde::de::DeserializeOwned;
use sillyworld_core::collab::CollaboratorError;

use crate::error::AppError;

/// Longest error body kept in a [`CollaboratorError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// Build a client with a per-request timeout.
pub fn client(timeout_ms: u64) -> Result<reqwest::Client, AppError> {
    reqwest::Client::builder()
        .timeout(Duration::from_millis(timeout_ms))
        .build()
        .map_err(|e| AppError::HttpClient(format!("failed to build client: {e}")))
}

/// Map a failed send onto a transport error.
pub fn transport(err: &reqwest::Error) -> CollaboratorError {
    CollaboratorError::Transport(err.to_string())
}

/// Turn a non-success response into an error, passing successes through.
pub async fn check(response: reqwest::Response) -> Result<reqwest::Response, CollaboratorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unable to read error body".to_owned());
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(CollaboratorError::NotFound(truncate(&body)));
    }
    Err(CollaboratorError::Status {
        status: status.as_u16(),
        body: truncate(&body),
    })
}

/// Check the status and decode a JSON body.
pub async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, CollaboratorError> {
    check(response)
        .await?
        .json()
        .await
        .map_err(|e| CollaboratorError::Decode(e.to_string()))
}

fn truncate(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY).collect()
}

/// Join a base URL and a path with exactly one slash between them.
pub fn join(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_normalises_slashes() {
        assert_eq!(join("http://h/api/", "/chat/send"), "http://h/api/chat/send");
        assert_eq!(join("http://h/api", "chat/send"), "http://h/api/chat/send");
    }

    #[test]
    fn long_error_bodies_are_cut() {
        let body = "é".repeat(MAX_ERROR_BODY + 10);
        assert_eq!(truncate(&body).chars().count(), MAX_ERROR_BODY);
        assert_eq!(truncate("short"), "short");
    }
}
