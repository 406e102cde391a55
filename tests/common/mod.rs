#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use ski_sage_lib::api::{parse_reply, ByteStream, ChatBackend, TransportError};
use ski_sage_lib::conversations::TranscriptSink;
use ski_sage_lib::models::{ChatRequest, Message};
use ski_sage_lib::session::{ChatSession, SessionConfig, SessionEvent};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

/// Backend that replays one scripted reply per mode and records requests.
#[derive(Default)]
pub struct ScriptedBackend {
    json_reply: Mutex<Option<(u16, String)>>,
    stream_reply: Mutex<Option<ByteStream>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedBackend {
    pub fn json(status: u16, body: &str) -> Arc<Self> {
        let backend = Self::default();
        *backend.json_reply.lock().unwrap() = Some((status, body.to_string()));
        Arc::new(backend)
    }

    pub fn stream(chunks: Vec<&'static str>) -> Arc<Self> {
        let items: Vec<Result<Bytes, TransportError>> = chunks
            .into_iter()
            .map(|chunk| Ok(Bytes::from_static(chunk.as_bytes())))
            .collect();
        Self::stream_from(Box::pin(futures::stream::iter(items)))
    }

    pub fn stream_from(stream: ByteStream) -> Arc<Self> {
        let backend = Self::default();
        *backend.stream_reply.lock().unwrap() = Some(stream);
        Arc::new(backend)
    }

    /// Stream fed chunk by chunk through the returned sender.
    pub fn live_stream() -> (Arc<Self>, UnboundedSender<Result<Bytes, TransportError>>) {
        let (tx, rx) = unbounded_channel();
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        (Self::stream_from(Box::pin(stream)), tx)
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn send_chat_request(&self, request: &ChatRequest) -> Result<String, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let (status, body) = self
            .json_reply
            .lock()
            .unwrap()
            .take()
            .expect("no JSON reply scripted");
        parse_reply(StatusCode::from_u16(status).unwrap(), &body)
    }

    async fn send_chat_stream_request(
        &self,
        request: &ChatRequest,
    ) -> Result<ByteStream, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let stream = self.stream_reply.lock().unwrap().take();
        stream.ok_or(TransportError::Status {
            status: 503,
            detail: "no stream scripted".to_string(),
        })
    }
}

/// Sink that remembers every transcript it was handed.
#[derive(Default)]
pub struct RecordingSink {
    pub updates: Vec<(Uuid, Vec<Message>)>,
}

#[async_trait]
impl TranscriptSink for RecordingSink {
    async fn transcript_changed(&mut self, conversation_id: Uuid, messages: &[Message]) {
        self.updates.push((conversation_id, messages.to_vec()));
    }
}

pub fn json_config() -> SessionConfig {
    SessionConfig {
        streaming: false,
        render_interval: Duration::ZERO,
        completion_grace: Duration::ZERO,
    }
}

pub fn stream_config(render_interval: Duration) -> SessionConfig {
    SessionConfig {
        streaming: true,
        render_interval,
        completion_grace: Duration::from_millis(5),
    }
}

pub fn session_with_events(
    backend: Arc<ScriptedBackend>,
    config: SessionConfig,
) -> (ChatSession, UnboundedReceiver<SessionEvent>) {
    let (tx, rx) = unbounded_channel();
    (ChatSession::new(backend, config).with_events(tx), rx)
}

pub fn drain(events: &mut UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}
