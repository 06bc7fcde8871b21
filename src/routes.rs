//! `/messages` handlers.

use axum::{extract::rejection::JsonRejection, extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    error::{ChattyError, Result},
    ingest,
    message::{ChatMessage, SubmitMessage},
    state::AppState,
};

pub async fn send_message(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SubmitMessage>, JsonRejection>,
) -> Result<StatusCode> {
    let Json(raw) = payload.map_err(|rejection| {
        warn!(%rejection, "unreadable message body");
        ChattyError::MalformedBody(rejection.body_text())
    })?;

    ingest::submit(&state.broadcaster, &raw)?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize, Serialize)]
pub struct History {
    pub messages: Vec<ChatMessage>,
}

/// Placeholder history; messages are never stored.
pub async fn message_history() -> Json<History> {
    Json(History {
        messages: vec![ChatMessage {
            username: String::from("System"),
            message: String::from("Welcome to the chat!"),
            timestamp: Utc::now(),
        }],
    })
}
