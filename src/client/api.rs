use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::{
    error::{Field, ValidationError},
    message::{ChatMessage, SubmitMessage},
    routes::History,
};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("rejected: {0}")]
    Validation(ValidationError),
    #[error("unexpected response status {0}")]
    Status(StatusCode),
}

#[derive(Deserialize)]
struct Rejection {
    errors: BTreeMap<Field, Vec<String>>,
}

/// HTTP client for `/messages`.
#[derive(Debug, Clone)]
pub struct MessagesApi {
    http: reqwest::Client,
    base_url: String,
}

impl MessagesApi {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    /// Submits a message. `Ok` only acknowledges acceptance; the message itself
    /// arrives through the channel subscription like everyone else's.
    pub async fn send(&self, submission: &SubmitMessage) -> Result<(), ApiError> {
        let response = self
            .http
            .post(self.url())
            .json(submission)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::UNPROCESSABLE_ENTITY => {
                let rejection: Rejection = response.json().await?;
                Err(ApiError::Validation(ValidationError {
                    errors: rejection.errors,
                }))
            }
            status => Err(ApiError::Status(status)),
        }
    }

    pub async fn history(&self) -> Result<Vec<ChatMessage>, ApiError> {
        let response = self.http.get(self.url()).send().await?;

        if !response.status().is_success() {
            return Err(ApiError::Status(response.status()));
        }

        let history: History = response.json().await?;
        Ok(history.messages)
    }

    fn url(&self) -> String {
        format!("{}/messages", self.base_url)
    }
}

/// The transport endpoint that belongs to an HTTP base URL.
pub fn websocket_url(base_url: &str) -> String {
    let base_url = base_url.trim_end_matches('/');

    let socket_base = if let Some(rest) = base_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base_url.to_owned()
    };

    format!("{socket_base}/ws")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn websocket_url_swaps_scheme() {
        assert_eq!(websocket_url("http://127.0.0.1:3000"), "ws://127.0.0.1:3000/ws");
        assert_eq!(websocket_url("https://chat.example/"), "wss://chat.example/ws");
        assert_eq!(websocket_url("ws://host:1"), "ws://host:1/ws");
    }

    #[test]
    fn base_url_trailing_slash_is_ignored() {
        let api = MessagesApi::new("http://127.0.0.1:3000/");

        assert_eq!(api.url(), "http://127.0.0.1:3000/messages");
    }
}
