use crate::conversations::ConversationStore;
use crate::models::ModelType;
use crate::session::ChatSession;

// Application state owned by whoever drives the UI loop
pub struct AppState {
    pub store: ConversationStore,
    pub session: ChatSession,
    pub mode: ModelType, // Encyclopedia or map answers
}

impl AppState {
    pub fn new(store: ConversationStore, session: ChatSession) -> Self {
        Self {
            store,
            session,
            mode: ModelType::default(),
        }
    }
}
