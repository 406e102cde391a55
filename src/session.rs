//! One chat request/response cycle against the backend.
//!
//! [`ChatSession::submit`] appends the user message, sends the request,
//! assembles streamed fragments into the visible "typing" text and finally
//! appends the assistant reply. Every state change is published as a
//! [`SessionEvent`] and every transcript change is handed to a
//! [`TranscriptSink`] while a conversation is attached.

use crate::api::{ChatBackend, TransportError};
use crate::conversations::TranscriptSink;
use crate::models::{ChatRequest, Message, ModelType};
use crate::sse::{LineSplitter, SseLine};
use crate::throttle::RenderThrottle;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use uuid::Uuid;

/// Assistant message shown whenever an exchange fails.
pub const FAILURE_NOTICE: &str = "Sorry, there was an error processing your request.";

/// Liveness token shared between a session and whoever owns its lifetime.
///
/// Once torn down it stays down; continuations check it before mutating.
#[derive(Debug, Clone)]
pub struct SessionScope {
    alive: Arc<AtomicBool>,
}

impl SessionScope {
    pub fn new() -> Self {
        Self {
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn teardown(&self) {
        if self.alive.swap(false, Ordering::AcqRel) {
            log::info!("Session scope torn down");
        }
    }
}

impl Default for SessionScope {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    MessagesChanged(Vec<Message>),
    /// Trimmed text assembled so far; empty once the reply is finalized.
    StreamingMessage(String),
    LoadingChanged(bool),
    /// The exchange failed; carries the underlying error for diagnostics.
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Sending,
    Streaming,
    Finalizing,
    Error,
}

/// Per-request scratch state, reset at the start of every submission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamState {
    pub accumulated_text: String,
    pub is_complete: bool,
    pub is_loading: bool,
    fragments: usize,
}

impl StreamState {
    /// Appends a fragment, space-separated from the previous one.
    pub fn push_fragment(&mut self, fragment: &str) {
        if self.fragments > 0 {
            self.accumulated_text.push(' ');
        }
        self.accumulated_text.push_str(fragment);
        self.fragments += 1;
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Request an event stream; otherwise a single JSON reply.
    pub streaming: bool,
    pub render_interval: Duration,
    /// Pause between the stream's completion marker and the final append.
    pub completion_grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            streaming: true,
            render_interval: Duration::from_millis(40),
            completion_grace: Duration::from_millis(100),
        }
    }
}

// Result of a single exchange that did not fail
enum Exchange {
    Completed(String),
    Abandoned,
}

pub struct ChatSession {
    backend: Arc<dyn ChatBackend>,
    config: SessionConfig,
    scope: SessionScope,
    events: Option<UnboundedSender<SessionEvent>>,
    messages: Vec<Message>,
    input: String,
    chat_id: Option<Uuid>,
    stream: StreamState,
    current_streaming_message: String,
    phase: SessionPhase,
    last_error: Option<TransportError>,
}

impl ChatSession {
    pub fn new(backend: Arc<dyn ChatBackend>, config: SessionConfig) -> Self {
        Self {
            backend,
            config,
            scope: SessionScope::new(),
            events: None,
            messages: Vec::new(),
            input: String::new(),
            chat_id: None,
            stream: StreamState::default(),
            current_streaming_message: String::new(),
            phase: SessionPhase::Idle,
            last_error: None,
        }
    }

    /// Publishes state changes to `events` from now on.
    pub fn with_events(mut self, events: UnboundedSender<SessionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn scope(&self) -> SessionScope {
        self.scope.clone()
    }

    /// Tears the session down; in-flight continuations stop mutating.
    pub fn teardown(&self) {
        self.scope.teardown();
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, input: impl Into<String>) {
        self.input = input.into();
    }

    pub fn chat_id(&self) -> Option<Uuid> {
        self.chat_id
    }

    pub fn is_loading(&self) -> bool {
        self.stream.is_loading
    }

    pub fn current_streaming_message(&self) -> &str {
        &self.current_streaming_message
    }

    pub fn stream_state(&self) -> &StreamState {
        &self.stream
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn last_error(&self) -> Option<&TransportError> {
        self.last_error.as_ref()
    }

    /// Switches the session to another conversation (or none) and its
    /// transcript in one step, so later messages are never filed under the
    /// previous conversation's id.
    pub fn associate(&mut self, chat_id: Option<Uuid>, messages: Vec<Message>) {
        if !self.scope.is_alive() {
            log::warn!("Ignoring conversation switch on a torn-down session");
            return;
        }
        log::debug!("Session now attached to {:?} ({} messages)", chat_id, messages.len());
        self.chat_id = chat_id;
        self.messages = messages;
        self.emit(SessionEvent::MessagesChanged(self.messages.clone()));
    }

    /// Submits the current input buffer.
    pub async fn handle_submit(&mut self, mode: ModelType, sink: &mut dyn TranscriptSink) {
        let text = std::mem::take(&mut self.input);
        self.submit(&text, mode, sink).await;
    }

    /// Runs one full exchange for `text`.
    ///
    /// Whitespace-only text is ignored. Failures never escape: they end up as
    /// a [`FAILURE_NOTICE`] message and in [`ChatSession::last_error`].
    pub async fn submit(&mut self, text: &str, mode: ModelType, sink: &mut dyn TranscriptSink) {
        let text = text.trim();
        if text.is_empty() {
            log::debug!("Ignoring empty submission");
            return;
        }
        if !self.scope.is_alive() {
            log::warn!("Ignoring submission on a torn-down session");
            return;
        }

        self.begin(text);
        self.sync_transcript(sink).await;
        if !self.scope.is_alive() {
            return;
        }

        let request = ChatRequest {
            message: text.to_string(),
            model_type: mode,
            chat_id: self.chat_id,
        };

        let outcome = if self.config.streaming {
            self.run_streaming(&request).await
        } else {
            self.run_single(&request).await
        };

        match outcome {
            Ok(Exchange::Completed(reply)) => self.finish(Message::assistant(reply.trim())),
            Ok(Exchange::Abandoned) => {
                log::info!("Session torn down mid-request; dropping the reply");
                return;
            }
            Err(e) => {
                if !self.scope.is_alive() {
                    log::info!("Session torn down before the request failed: {}", e);
                    return;
                }
                self.fail(e);
            }
        }
        self.sync_transcript(sink).await;
    }

    // Optimistic user append; precedes any network activity.
    fn begin(&mut self, text: &str) {
        self.messages.push(Message::user(text));
        self.input.clear();
        self.stream = StreamState {
            is_loading: true,
            ..StreamState::default()
        };
        self.current_streaming_message.clear();
        self.last_error = None;
        self.phase = SessionPhase::Sending;

        self.emit(SessionEvent::MessagesChanged(self.messages.clone()));
        self.emit(SessionEvent::LoadingChanged(true));
    }

    async fn run_single(&mut self, request: &ChatRequest) -> Result<Exchange, TransportError> {
        let reply = self.backend.send_chat_request(request).await?;
        if !self.scope.is_alive() {
            return Ok(Exchange::Abandoned);
        }
        Ok(Exchange::Completed(reply))
    }

    async fn run_streaming(&mut self, request: &ChatRequest) -> Result<Exchange, TransportError> {
        let mut body = self.backend.send_chat_stream_request(request).await?;
        if !self.scope.is_alive() {
            return Ok(Exchange::Abandoned);
        }
        self.phase = SessionPhase::Streaming;

        let mut splitter = LineSplitter::new();
        let mut throttle = RenderThrottle::new(self.config.render_interval);
        let mut done = false;

        while !done {
            let next = tokio::select! {
                chunk = body.next() => Some(chunk),
                _ = throttle.wait_due() => None,
            };
            if !self.scope.is_alive() {
                return Ok(Exchange::Abandoned);
            }

            let chunk = match next {
                // Trailing refresh for a coalesced update.
                None => {
                    throttle.mark_emitted(Instant::now());
                    self.publish_streaming_text();
                    continue;
                }
                Some(None) => break,
                Some(Some(chunk)) => chunk?,
            };

            for line in splitter.push(&chunk) {
                if self.apply_line(&line, &mut throttle) {
                    done = true;
                    break;
                }
            }
        }

        if !done {
            if let Some(line) = splitter.finish() {
                done = self.apply_line(&line, &mut throttle);
            }
            if !done {
                if self.stream.fragment_count() == 0 {
                    return Err(TransportError::EmptyStream);
                }
                log::warn!("Stream closed without a completion marker; keeping the partial reply");
            }
        }
        drop(body);

        self.phase = SessionPhase::Finalizing;
        self.stream.is_complete = true;
        if throttle.has_pending() {
            self.publish_streaming_text();
        }

        tokio::time::sleep(self.config.completion_grace).await;
        if !self.scope.is_alive() {
            return Ok(Exchange::Abandoned);
        }
        Ok(Exchange::Completed(self.stream.accumulated_text.clone()))
    }

    // Returns true once the completion marker is seen.
    fn apply_line(&mut self, line: &str, throttle: &mut RenderThrottle) -> bool {
        match SseLine::parse(line) {
            Some(SseLine::Done) => {
                log::info!("Stream finished with [DONE]");
                true
            }
            Some(SseLine::Data(fragment)) => {
                log::debug!("Received fragment ({} bytes)", fragment.len());
                self.stream.push_fragment(&fragment);
                if throttle.record(Instant::now()) {
                    self.publish_streaming_text();
                }
                false
            }
            None => false,
        }
    }

    fn publish_streaming_text(&mut self) {
        let visible = self.stream.accumulated_text.trim();
        if visible == self.current_streaming_message {
            return;
        }
        self.current_streaming_message = visible.to_string();
        self.emit(SessionEvent::StreamingMessage(self.current_streaming_message.clone()));
    }

    fn finish(&mut self, reply: Message) {
        self.phase = SessionPhase::Finalizing;
        self.stream.is_complete = true;
        self.messages.push(reply);
        self.clear_stream();
        self.phase = SessionPhase::Idle;
        self.emit(SessionEvent::MessagesChanged(self.messages.clone()));
    }

    fn fail(&mut self, error: TransportError) {
        log::error!("Chat request failed: {}", error);
        self.phase = SessionPhase::Error;
        self.messages.push(Message::assistant(FAILURE_NOTICE));
        self.clear_stream();
        self.emit(SessionEvent::Failed(error.to_string()));
        self.emit(SessionEvent::MessagesChanged(self.messages.clone()));
        self.last_error = Some(error);
        self.phase = SessionPhase::Idle;
    }

    fn clear_stream(&mut self) {
        self.stream.accumulated_text.clear();
        self.stream.is_loading = false;
        if !self.current_streaming_message.is_empty() {
            self.current_streaming_message.clear();
            self.emit(SessionEvent::StreamingMessage(String::new()));
        }
        self.emit(SessionEvent::LoadingChanged(false));
    }

    async fn sync_transcript(&mut self, sink: &mut dyn TranscriptSink) {
        if let Some(chat_id) = self.chat_id {
            sink.transcript_changed(chat_id, &self.messages).await;
        }
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(events) = &self.events {
            // A closed receiver only means nobody renders anymore.
            let _ = events.send(event);
        }
    }
}
