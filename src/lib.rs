// Declare the modules
pub mod api;
pub mod commands;
pub mod config;
pub mod conversations;
pub mod models;
pub mod repl;
pub mod session;
pub mod sse;
pub mod state;
pub mod storage;
pub mod throttle;

use crate::api::{ChatBackend, HttpChatBackend};
use crate::config::AppConfig;
use crate::conversations::ConversationStore;
use crate::session::{ChatSession, SessionConfig};
use crate::state::AppState;
use crate::storage::{KeyValueStore, SqliteKeyValueStore};
use anyhow::Context;
use std::sync::Arc;

pub async fn run() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    log::info!("Using chat endpoint {}", config.chat_url());

    let kv = SqliteKeyValueStore::open(&config.database_path)
        .await
        .context("Failed to open local conversation storage")?;
    let kv = Arc::new(kv);
    let store = ConversationStore::load(kv.clone() as Arc<dyn KeyValueStore>).await;

    let backend: Arc<dyn ChatBackend> = Arc::new(HttpChatBackend::new(config.chat_url()));
    let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
    let session = ChatSession::new(
        backend,
        SessionConfig {
            streaming: config.streaming,
            render_interval: config.render_interval,
            completion_grace: config.completion_grace,
        },
    )
    .with_events(events_tx);

    let renderer = tokio::spawn(repl::render_events(events_rx));

    let mut state = AppState::new(store, session);
    let result = repl::run_loop(&mut state).await;

    // Dropping the state closes the event channel so the renderer drains and exits.
    drop(state);
    if let Err(e) = renderer.await {
        log::error!("Renderer task failed: {:?}", e);
    }
    kv.close().await;

    result
}
