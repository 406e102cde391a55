// Operations the front end invokes on the application state

use crate::models::{derive_title, Conversation, Message, ModelType};
use crate::state::AppState;
use uuid::Uuid;

/// Sends `text` in the current mode.
///
/// With no conversation selected, a new one is created first (titled after
/// `text`) and selected, so the whole exchange is filed under it.
pub async fn send_message(state: &mut AppState, text: &str) {
    let text = text.trim();
    if text.is_empty() {
        log::debug!("Ignoring empty message");
        return;
    }

    if state.session.chat_id().is_none() {
        let id = Uuid::new_v4();
        let mut initial = state.session.messages().to_vec();
        initial.push(Message::user(text));
        state
            .store
            .add_conversation(id, derive_title(text), initial)
            .await;
        let transcript = state.session.messages().to_vec();
        state.session.associate(Some(id), transcript);
    }

    log::info!(
        "Sending message to conversation {:?} (mode: {})",
        state.session.chat_id(),
        state.mode.as_str()
    );
    let mode = state.mode;
    state.session.submit(text, mode, &mut state.store).await;
}

/// Leaves the current conversation; the next message starts a new one.
pub fn new_chat(state: &mut AppState) {
    log::info!("Starting a new chat");
    state.session.associate(None, Vec::new());
}

/// Makes `id` the active conversation and loads its transcript.
/// Returns `false` if no such conversation exists.
pub fn select_conversation(state: &mut AppState, id: Uuid) -> bool {
    let Some(conversation) = state.store.get_conversation(id) else {
        log::warn!("Cannot select unknown conversation {}", id);
        return false;
    };
    log::info!("Selecting conversation {} ({})", id, conversation.title);
    let messages = conversation.messages.clone();
    state.session.associate(Some(id), messages);
    true
}

/// Deletes `id`; if it was selected the session falls back to an empty new chat.
pub async fn delete_conversation(state: &mut AppState, id: Uuid) -> bool {
    let removed = state.store.delete_conversation(id).await;
    if state.session.chat_id() == Some(id) {
        state.session.associate(None, Vec::new());
    }
    removed
}

pub fn list_conversations(state: &AppState) -> &[Conversation] {
    state.store.conversations()
}

pub fn set_mode(state: &mut AppState, mode: ModelType) {
    log::info!("Switching to {} mode", mode.as_str());
    state.mode = mode;
}
