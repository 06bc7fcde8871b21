//! Message ingest: validate a submission and broadcast it.

use tracing::{debug, info};

use crate::{
    broadcast::{BroadcastEvent, Broadcaster},
    channel::MESSAGES_CHANNEL,
    error::{Field, ValidationError},
    message::{validate, ChatMessage, SubmitMessage},
};

/// Validates `raw` and emits exactly one `MessageSent` event on the public channel.
///
/// Emission is fire-and-forget: success says nothing about delivery. Senders
/// see their own message through their subscription like everyone else.
pub fn submit(broadcaster: &Broadcaster, raw: &SubmitMessage) -> Result<(), ValidationError> {
    info!(username = ?raw.username, text = ?raw.message, "message submitted");

    let fields = validate(raw).inspect_err(|error| {
        let invalid: Vec<Field> = error.fields().collect();
        info!(fields = ?invalid, %error, "message rejected");
    })?;
    let message = ChatMessage::stamp(fields);

    info!(
        username = %message.username,
        text = %message.message,
        "broadcasting message"
    );

    let receivers = broadcaster.emit(BroadcastEvent::message_sent(MESSAGES_CHANNEL, message));
    debug!(receivers, "event dispatched");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::MESSAGE_SENT;
    use chrono::Utc;
    use serde_json::json;
    use tokio::sync::broadcast::error::TryRecvError;

    #[test]
    fn valid_submission_emits_one_trimmed_event() {
        let broadcaster = Broadcaster::default();
        let mut rx = broadcaster.subscribe(MESSAGES_CHANNEL);
        let before = Utc::now();

        submit(&broadcaster, &SubmitMessage::new(" Alice ", " hi ")).unwrap();

        let event = rx.try_recv().unwrap();
        assert_eq!(event.channel, MESSAGES_CHANNEL);
        assert_eq!(event.event, MESSAGE_SENT);
        assert_eq!(event.data.username, "Alice");
        assert_eq!(event.data.message, "hi");
        assert!(event.data.timestamp >= before);
        assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Empty);
    }

    #[test]
    fn invalid_submissions_emit_nothing() {
        let broadcaster = Broadcaster::default();
        let mut rx = broadcaster.subscribe(MESSAGES_CHANNEL);

        let cases = [
            SubmitMessage::new("", "hi"),
            SubmitMessage::new("Alice", "   "),
            SubmitMessage::new("Alice", "x".repeat(501)),
            SubmitMessage::new("a".repeat(101), "hi"),
            serde_json::from_value(json!({ "message": "hi" })).unwrap(),
        ];

        for raw in &cases {
            assert!(submit(&broadcaster, raw).is_err(), "{raw:?} should be rejected");
        }

        assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Empty);
    }

    #[test]
    fn submitting_without_subscribers_still_succeeds() {
        let broadcaster = Broadcaster::default();

        assert!(submit(&broadcaster, &SubmitMessage::new("Alice", "hi")).is_ok());
    }
}
