use serde_json::Value;
use tracing::warn;

use crate::error::AppError;

/// Role whose messages are picked for translation
pub const USER_ROLE: &str = "user";

/// One entry of a chat-shaped payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    /// `None` when the entry carried no usable text
    pub content: Option<String>,
}

/// Body of `POST /translate`, decoded once at the boundary.
///
/// A `messages` key selects the chat shape even when `source` is also present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingPayload {
    /// `{ "messages": [ {"role", "content"}, ... ] }`
    Chat { messages: Vec<ChatMessage> },
    /// `{ "source", "source_language"?, "target_language"? }`
    ///
    /// The language tags are advisory; the deployed model decides the pair.
    Direct {
        source: String,
        source_language: Option<String>,
        target_language: Option<String>,
    },
    /// Neither shape, answered with an empty translation
    Unrecognized,
}

impl IncomingPayload {
    /// Parse a raw request body. Only non-JSON bodies and non-object JSON are rejected.
    pub fn from_slice(body: &[u8]) -> Result<(Value, Self), AppError> {
        let value: Value =
            serde_json::from_slice(body).map_err(|e| AppError::InvalidPayload(e.to_string()))?;
        let payload = Self::from_value(&value)?;
        Ok((value, payload))
    }

    pub fn from_value(value: &Value) -> Result<Self, AppError> {
        let object = value
            .as_object()
            .ok_or_else(|| AppError::InvalidPayload("expected a JSON object".to_string()))?;

        if let Some(messages) = object.get("messages") {
            return Ok(IncomingPayload::Chat {
                messages: parse_messages(messages),
            });
        }

        match object.get("source") {
            Some(Value::String(source)) => Ok(IncomingPayload::Direct {
                source: source.clone(),
                source_language: string_field(value, "source_language"),
                target_language: string_field(value, "target_language"),
            }),
            Some(other) => {
                warn!("Ignoring non-string source field: {}", other);
                Ok(IncomingPayload::Unrecognized)
            }
            None => Ok(IncomingPayload::Unrecognized),
        }
    }

    /// Text to translate, `None` for unrecognized payloads
    pub fn source_text(&self) -> Option<&str> {
        match self {
            IncomingPayload::Chat { messages } => Some(
                messages
                    .iter()
                    .rev()
                    .find(|m| m.role == USER_ROLE)
                    .and_then(|m| m.content.as_deref())
                    .unwrap_or(""),
            ),
            IncomingPayload::Direct { source, .. } => Some(source.as_str()),
            IncomingPayload::Unrecognized => None,
        }
    }

    /// Language tags carried by a direct payload, if any
    pub fn language_tags(&self) -> (Option<&str>, Option<&str>) {
        match self {
            IncomingPayload::Direct {
                source_language,
                target_language,
                ..
            } => (source_language.as_deref(), target_language.as_deref()),
            _ => (None, None),
        }
    }
}

/// Flatten a payload to the text to translate; unrecognized payloads give `""`.
pub fn normalize(payload: &IncomingPayload) -> String {
    payload.source_text().unwrap_or_default().to_string()
}

/// Lenient decoding of the `messages` array.
///
/// Entries without a string role are skipped. An entry whose content is
/// missing or unusable is kept with `content: None`, so a broken last user
/// turn yields empty text instead of an older turn. `content` may be a
/// string or an OpenAI-style list of parts, whose `text` parts are joined
/// with newlines.
fn parse_messages(messages: &Value) -> Vec<ChatMessage> {
    let Some(entries) = messages.as_array() else {
        warn!("messages is not an array, treating as empty");
        return Vec::new();
    };

    entries
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            let Some(role) = entry.get("role").and_then(|v| v.as_str()) else {
                warn!("Skipping message without role at index {}: {}", index, entry);
                return None;
            };
            let content = entry.get("content").and_then(content_text);
            if content.is_none() {
                warn!("Message at index {} has no usable content: {}", index, entry);
            }
            Some(ChatMessage {
                role: role.to_string(),
                content,
            })
        })
        .collect()
}

fn content_text(content: &Value) -> Option<String> {
    match content {
        Value::String(text) => Some(text.clone()),
        Value::Array(parts) => {
            let texts: Vec<&str> = parts
                .iter()
                .filter(|part| part.get("type").and_then(|t| t.as_str()) == Some("text"))
                .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
                .collect();
            if texts.is_empty() {
                None
            } else {
                Some(texts.join("\n"))
            }
        }
        _ => None,
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(|v| v.as_str()).map(|s| s.to_string())
}
