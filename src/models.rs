use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Longest title (in chars, before the ellipsis) derived from a first message.
pub const MAX_TITLE_CHARS: usize = 48;
/// Number of leading words kept when deriving a title.
pub const MAX_TITLE_WORDS: usize = 6;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

// A single entry of a conversation transcript
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

// A persisted chat thread. Serialized with the camelCase field names the
// "conversations" key has always used.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub title: String, // Derived once from the first user message
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(id: Uuid, title: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            id,
            title: title.into(),
            messages,
            created_at: Utc::now(),
        }
    }

    /// Returns a copy with every field present in `patch` replaced.
    pub fn merged(&self, patch: &ConversationPatch) -> Conversation {
        let mut merged = self.clone();
        if let Some(title) = &patch.title {
            merged.title = title.clone();
        }
        if let Some(messages) = &patch.messages {
            merged.messages = messages.clone();
        }
        merged
    }
}

// Partial update applied by `ConversationStore::update_conversation`
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConversationPatch {
    pub title: Option<String>,
    pub messages: Option<Vec<Message>>,
}

impl ConversationPatch {
    pub fn messages(messages: Vec<Message>) -> Self {
        Self { title: None, messages: Some(messages) }
    }
}

/// Which assistant the backend should answer with.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    #[default]
    Encyclopedia,
    Map,
}

impl ModelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::Encyclopedia => "encyclopedia",
            ModelType::Map => "map",
        }
    }
}

impl std::str::FromStr for ModelType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "encyclopedia" => Ok(ModelType::Encyclopedia),
            "map" => Ok(ModelType::Map),
            other => Err(anyhow::anyhow!("Unknown model type: {}", other)),
        }
    }
}

// Body POSTed to the chat endpoint
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    pub model_type: ModelType,
    pub chat_id: Option<Uuid>,
}

/// Builds a sidebar title out of the first user message.
///
/// Keeps the leading [`MAX_TITLE_WORDS`] words and caps the result at
/// [`MAX_TITLE_CHARS`] characters; anything cut off is marked with `...`.
pub fn derive_title(first_message: &str) -> String {
    let words: Vec<&str> = first_message.split_whitespace().collect();
    let mut title = words
        .iter()
        .take(MAX_TITLE_WORDS)
        .copied()
        .collect::<Vec<_>>()
        .join(" ");
    let mut truncated = words.len() > MAX_TITLE_WORDS;

    if title.chars().count() > MAX_TITLE_CHARS {
        title = title.chars().take(MAX_TITLE_CHARS).collect::<String>().trim_end().to_string();
        truncated = true;
    }
    if truncated {
        title.push_str("...");
    }
    title
}
