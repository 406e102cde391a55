use crate::models::{Conversation, ConversationPatch, Message};
use crate::storage::KeyValueStore;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// Key the whole conversation list is persisted under.
pub const CONVERSATIONS_KEY: &str = "conversations";

/// Receives the live transcript of the selected conversation whenever it changes.
#[async_trait]
pub trait TranscriptSink: Send {
    async fn transcript_changed(&mut self, conversation_id: Uuid, messages: &[Message]);
}

/// Owns the newest-first list of conversations and mirrors it into a
/// [`KeyValueStore`] after every mutation.
///
/// The in-memory list is authoritative for the running session: a failed
/// write is logged and the mutation stays applied.
pub struct ConversationStore {
    backend: Arc<dyn KeyValueStore>,
    conversations: Vec<Conversation>,
}

impl ConversationStore {
    /// Reads the persisted list. An absent, unreadable or malformed value
    /// yields an empty store; this never fails.
    pub async fn load(backend: Arc<dyn KeyValueStore>) -> Self {
        let conversations = match backend.get(CONVERSATIONS_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<Conversation>>(&raw) {
                Ok(conversations) => {
                    log::info!("Loaded {} conversations", conversations.len());
                    conversations
                }
                Err(e) => {
                    log::warn!("Stored conversations are malformed, starting empty: {}", e);
                    Vec::new()
                }
            },
            Ok(None) => {
                log::info!("No stored conversations found");
                Vec::new()
            }
            Err(e) => {
                log::error!("Failed to read stored conversations, starting empty: {:?}", e);
                Vec::new()
            }
        };

        Self { backend, conversations }
    }

    /// Writes the full list back to the key-value store.
    pub async fn save(&self) {
        let json = match serde_json::to_string(&self.conversations) {
            Ok(json) => json,
            Err(e) => {
                log::error!("Failed to serialize conversations: {:?}", e);
                return;
            }
        };

        match self.backend.set(CONVERSATIONS_KEY, &json).await {
            Ok(()) => log::debug!("Saved {} conversations", self.conversations.len()),
            Err(e) => log::error!("Failed to save conversations, keeping in-memory state: {:?}", e),
        }
    }

    /// Newest first.
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn get_conversation(&self, id: Uuid) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    /// Inserts a new conversation at the front. `id` must not already be in use.
    pub async fn add_conversation(
        &mut self,
        id: Uuid,
        title: impl Into<String>,
        initial_messages: Vec<Message>,
    ) -> Conversation {
        debug_assert!(self.get_conversation(id).is_none(), "duplicate conversation id {}", id);

        let conversation = Conversation::new(id, title, initial_messages);
        log::info!("Creating conversation {} ({})", conversation.id, conversation.title);
        self.conversations.insert(0, conversation.clone());
        self.save().await;
        conversation
    }

    /// Merges `patch` into the conversation with `id`.
    ///
    /// Returns `false` without touching storage when the id is unknown or the
    /// merge would not change anything.
    pub async fn update_conversation(&mut self, id: Uuid, patch: ConversationPatch) -> bool {
        let Some(position) = self.conversations.iter().position(|c| c.id == id) else {
            log::warn!("Ignoring update for unknown conversation {}", id);
            return false;
        };

        let merged = self.conversations[position].merged(&patch);
        if merged == self.conversations[position] {
            return false;
        }

        log::debug!("Updating conversation {} ({} messages)", id, merged.messages.len());
        self.conversations[position] = merged;
        self.save().await;
        true
    }

    /// Removes the conversation with `id`; returns whether anything was removed.
    pub async fn delete_conversation(&mut self, id: Uuid) -> bool {
        let before = self.conversations.len();
        self.conversations.retain(|c| c.id != id);
        if self.conversations.len() == before {
            log::warn!("Attempted to delete non-existent conversation: {}", id);
            return false;
        }

        log::warn!("Deleted conversation {}", id);
        self.save().await;
        true
    }
}

#[async_trait]
impl TranscriptSink for ConversationStore {
    async fn transcript_changed(&mut self, conversation_id: Uuid, messages: &[Message]) {
        self.update_conversation(conversation_id, ConversationPatch::messages(messages.to_vec()))
            .await;
    }
}
