use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{collections::BTreeMap, fmt};
use thiserror::Error;

/// A submitted field that validation can reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Message,
    Username,
}

impl Field {
    pub fn as_str(self) -> &'static str {
        match self {
            Field::Message => "message",
            Field::Username => "username",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field-keyed validation failures. Every failing field is listed, not just the first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub errors: BTreeMap<Field, Vec<String>>,
}

impl ValidationError {
    pub fn add(&mut self, field: Field, reason: impl Into<String>) {
        self.errors.entry(field).or_default().push(reason.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has(&self, field: Field) -> bool {
        self.errors.contains_key(&field)
    }

    pub fn fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.errors.keys().copied()
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut reasons = self.errors.values().flatten();

        match reasons.next() {
            Some(first) => {
                f.write_str(first)?;
                match reasons.count() {
                    0 => Ok(()),
                    rest => write!(f, " (and {rest} more)"),
                }
            }
            None => f.write_str("invalid input"),
        }
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Error)]
pub enum ChattyError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("malformed request body: {0}")]
    MalformedBody(String),
}

impl IntoResponse for ChattyError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ChattyError::Validation(error) => {
                let body = json!({
                    "message": error.to_string(),
                    "errors": error.errors,
                });

                (StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response()
            }
            ChattyError::MalformedBody(reason) => {
                let body = json!({ "message": format!("malformed request body: {reason}") });

                (StatusCode::BAD_REQUEST, Json(body)).into_response()
            }
        }
    }
}

pub type Result<T, E = ChattyError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_mentions_remaining_errors() {
        let mut error = ValidationError::default();
        error.add(Field::Username, "The username field is required.");
        error.add(Field::Message, "The message field is required.");

        assert_eq!(
            error.to_string(),
            "The message field is required. (and 1 more)"
        );
        assert_eq!(
            error.fields().collect::<Vec<_>>(),
            vec![Field::Message, Field::Username]
        );
    }

    #[test]
    fn serializes_as_field_keyed_map() {
        let mut error = ValidationError::default();
        error.add(Field::Username, "The username field is required.");

        let value = serde_json::to_value(&error).unwrap();

        assert_eq!(
            value,
            json!({ "errors": { "username": ["The username field is required."] } })
        );
    }

    #[test]
    fn validation_maps_to_unprocessable_entity() {
        let mut error = ValidationError::default();
        error.add(Field::Message, "The message field is required.");

        let response = ChattyError::from(error).into_response();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
