use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Field, ValidationError};

pub const USERNAME_MAX_CHARS: usize = 100;
pub const MESSAGE_MAX_CHARS: usize = 500;

/// Payload of a `MessageSent` broadcast.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub username: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Stamps validated fields with the current server time.
    pub fn stamp(fields: ValidMessage) -> Self {
        Self {
            username: fields.username,
            message: fields.message,
            timestamp: Utc::now(),
        }
    }
}

/// Body of `POST /messages` exactly as the client sent it.
///
/// Fields stay untyped so that a missing field, a `null` and a non-string value
/// can each be reported against the field that caused them.
#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
pub struct SubmitMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<Value>,
}

impl SubmitMessage {
    pub fn new(username: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: Some(Value::String(message.into())),
            username: Some(Value::String(username.into())),
        }
    }
}

/// Trimmed fields that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidMessage {
    pub username: String,
    pub message: String,
}

pub fn validate(raw: &SubmitMessage) -> Result<ValidMessage, ValidationError> {
    let mut errors = ValidationError::default();

    let message = check(
        Field::Message,
        raw.message.as_ref(),
        MESSAGE_MAX_CHARS,
        &mut errors,
    );
    let username = check(
        Field::Username,
        raw.username.as_ref(),
        USERNAME_MAX_CHARS,
        &mut errors,
    );

    match (username, message) {
        (Some(username), Some(message)) if errors.is_empty() => {
            Ok(ValidMessage { username, message })
        }
        _ => Err(errors),
    }
}

fn check(
    field: Field,
    value: Option<&Value>,
    max_chars: usize,
    errors: &mut ValidationError,
) -> Option<String> {
    let text = match value {
        None | Some(Value::Null) => {
            errors.add(field, format!("The {field} field is required."));
            return None;
        }
        Some(Value::String(text)) => text.trim(),
        Some(_) => {
            errors.add(field, format!("The {field} field must be a string."));
            return None;
        }
    };

    if text.is_empty() {
        errors.add(field, format!("The {field} field is required."));
        return None;
    }

    if text.chars().count() > max_chars {
        errors.add(
            field,
            format!("The {field} field must not be greater than {max_chars} characters."),
        );
        return None;
    }

    Some(text.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_and_trims_valid_input() {
        let valid = validate(&SubmitMessage::new("  Alice ", "\thi there\n")).unwrap();

        assert_eq!(valid.username, "Alice");
        assert_eq!(valid.message, "hi there");
    }

    #[test]
    fn blank_fields_are_required() {
        let error = validate(&SubmitMessage::new("   ", "")).unwrap_err();

        assert_eq!(
            error.errors[&Field::Username],
            vec!["The username field is required."]
        );
        assert_eq!(
            error.errors[&Field::Message],
            vec!["The message field is required."]
        );
    }

    #[test]
    fn missing_and_null_fields_are_required() {
        let raw: SubmitMessage = serde_json::from_value(json!({ "username": null })).unwrap();
        let error = validate(&raw).unwrap_err();

        assert!(error.has(Field::Username));
        assert!(error.has(Field::Message));
    }

    #[test]
    fn non_string_values_are_rejected() {
        let raw: SubmitMessage =
            serde_json::from_value(json!({ "username": 7, "message": "hi" })).unwrap();
        let error = validate(&raw).unwrap_err();

        assert_eq!(
            error.errors[&Field::Username],
            vec!["The username field must be a string."]
        );
        assert!(!error.has(Field::Message));
    }

    #[test]
    fn length_bounds_count_characters_after_trimming() {
        let at_limit = "é".repeat(MESSAGE_MAX_CHARS);
        assert!(validate(&SubmitMessage::new("bob", format!("  {at_limit}  "))).is_ok());

        let over = "x".repeat(MESSAGE_MAX_CHARS + 1);
        let error = validate(&SubmitMessage::new("bob", over)).unwrap_err();
        assert_eq!(
            error.errors[&Field::Message],
            vec!["The message field must not be greater than 500 characters."]
        );

        let long_name = "n".repeat(USERNAME_MAX_CHARS + 1);
        let error = validate(&SubmitMessage::new(long_name, "hi")).unwrap_err();
        assert!(error.has(Field::Username));
        assert!(!error.has(Field::Message));
    }

    #[test]
    fn stamp_uses_server_clock() {
        let before = Utc::now();
        let message = ChatMessage::stamp(ValidMessage {
            username: "Alice".into(),
            message: "hi".into(),
        });

        assert!(message.timestamp >= before);
        assert!(message.timestamp <= Utc::now());
    }
}
