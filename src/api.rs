use crate::models::ChatRequest;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use std::pin::Pin;

// Raw body chunks of a streamed reply
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Why an exchange with the chat backend produced no usable reply.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request to chat backend failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("chat backend returned HTTP {status}: {detail}")]
    Status { status: u16, detail: String },
    #[error("chat backend reported an error: {0}")]
    Backend(String),
    #[error("malformed response body: {0}")]
    MalformedBody(String),
    #[error("response stream ended without any content")]
    EmptyStream,
}

// Trait defining the interface to the chat endpoint
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// JSON mode: the whole reply in one body.
    async fn send_chat_request(&self, request: &ChatRequest) -> Result<String, TransportError>;

    /// Streaming mode: the raw event-stream body, chunk by chunk.
    async fn send_chat_stream_request(
        &self,
        request: &ChatRequest,
    ) -> Result<ByteStream, TransportError>;
}

#[derive(Deserialize, Debug)]
struct ReplyBody {
    response: Option<String>,
    error: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
    detail: Option<String>,
}

pub struct HttpChatBackend {
    client: Client,
    chat_url: String,
}

impl HttpChatBackend {
    pub fn new(chat_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            chat_url: chat_url.into(),
        }
    }

    pub fn chat_url(&self) -> &str {
        &self.chat_url
    }
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn send_chat_request(&self, request: &ChatRequest) -> Result<String, TransportError> {
        log::info!(
            "Sending chat request to {} (mode: {})",
            self.chat_url,
            request.model_type.as_str()
        );

        let response = self
            .client
            .post(&self.chat_url)
            .header(header::CONTENT_TYPE, "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        parse_reply(status, &body)
    }

    async fn send_chat_stream_request(
        &self,
        request: &ChatRequest,
    ) -> Result<ByteStream, TransportError> {
        log::info!(
            "Sending STREAM chat request to {} (mode: {})",
            self.chat_url,
            request.model_type.as_str()
        );

        let response = self
            .client
            .post(&self.chat_url)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<Failed to read error body>".to_string());
            log::error!("Chat stream request failed with status {}: {}", status, body);
            return Err(status_error(status, &body));
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(TransportError::from));
        Ok(Box::pin(stream))
    }
}

/// Interprets a JSON-mode reply. Success needs a 2xx status and a `response` field.
pub fn parse_reply(status: StatusCode, body: &str) -> Result<String, TransportError> {
    if !status.is_success() {
        log::error!("Chat request failed with status {}: {}", status, body);
        return Err(status_error(status, body));
    }

    let reply: ReplyBody = serde_json::from_str(body)
        .map_err(|e| TransportError::MalformedBody(e.to_string()))?;
    match reply {
        ReplyBody { response: Some(text), .. } => Ok(text),
        ReplyBody { error: Some(error), .. } => Err(TransportError::Backend(error)),
        _ => Err(TransportError::MalformedBody(
            "missing 'response' field".to_string(),
        )),
    }
}

fn status_error(status: StatusCode, body: &str) -> TransportError {
    let detail = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|e| e.message.or(e.error).or(e.detail))
        .unwrap_or_else(|| body.trim().to_string());
    TransportError::Status {
        status: status.as_u16(),
        detail,
    }
}
