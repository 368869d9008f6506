use serde::{Deserialize, Serialize};

// Wire constants expected by OpenAI-style clients, never derived from input
pub const COMPLETION_ID: &str = "test";
pub const COMPLETION_OBJECT: &str = "chat.completion";
pub const ASSISTANT_ROLE: &str = "assistant";
pub const FINISH_REASON_STOP: &str = "stop";

/// `{source, translation}` answer of `/test` and `/interactive`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatTranslation {
    pub source: String,
    pub translation: String,
}

impl FlatTranslation {
    pub fn new(source: impl Into<String>, translation: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            translation: translation.into(),
        }
    }
}

/// Minimal chat-completion envelope returned by `/translate`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub id: String,
    pub object: String,
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: u32,
    pub message: AssistantMessage,
    pub finish_reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub role: String,
    pub content: String,
}

impl ChatCompletion {
    pub fn from_translation(translation: impl Into<String>) -> Self {
        Self {
            id: COMPLETION_ID.to_string(),
            object: COMPLETION_OBJECT.to_string(),
            choices: vec![ChatChoice {
                index: 0,
                message: AssistantMessage {
                    role: ASSISTANT_ROLE.to_string(),
                    content: translation.into(),
                },
                finish_reason: FINISH_REASON_STOP.to_string(),
            }],
        }
    }

    pub fn content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

/// `{"translation": ""}`, the answer to a payload with no recognized text
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyTranslation {
    pub translation: String,
}

/// Everything `/translate` can answer with
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TranslateReply {
    Completion(ChatCompletion),
    Empty(EmptyTranslation),
}
