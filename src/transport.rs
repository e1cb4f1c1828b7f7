//! Inbound transport seam.
//!
//! A transport turns conversation history into an ordered byte stream that
//! ends with an explicit end-of-stream. Nothing here retries; a failed read
//! ends the turn.

use crate::types::{InterpreterError, Result, Turn};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub type ByteStream = BoxStream<'static, std::result::Result<Bytes, std::io::Error>>;

#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn open(&self, history: &[Turn]) -> Result<ByteStream>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: String,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    messages: Vec<ChatMessage<'a>>,
}

impl<'a> ChatRequest<'a> {
    fn from_history(history: &'a [Turn]) -> Self {
        Self {
            messages: history
                .iter()
                .map(|t| ChatMessage {
                    role: t.role.to_string(),
                    content: &t.text,
                })
                .collect(),
        }
    }
}

/// POSTs the history to a chat endpoint and streams the response body.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    auth_token: Option<String>,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            auth_token: None,
        }
    }

    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn build_client(request_timeout: Duration, connect_timeout: Duration) -> Result<reqwest::Client> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .build()?;
        Ok(client)
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn open(&self, history: &[Turn]) -> Result<ByteStream> {
        let body = ChatRequest::from_history(history);
        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        tracing::debug!(
            "[⚙️  -> ☁️ ] POST {} ({} messages)",
            self.endpoint,
            body.messages.len()
        );
        let response = request.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::NO_CONTENT {
            return Err(InterpreterError::MissingBody.into());
        }
        if !status.is_success() {
            let text = match response.text().await {
                Ok(t) => t,
                Err(_) => String::new(),
            };
            return Err(InterpreterError::Upstream(status, text).into());
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(std::io::Error::other))
            .boxed())
    }
}

/// Replays a fixed sequence of chunks. Used for offline replays and tests.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    chunks: Vec<Bytes>,
    fail_after: Option<(usize, String)>,
    refuse: Option<String>,
    opened_with: Arc<Mutex<Vec<Vec<Turn>>>>,
}

impl ScriptedTransport {
    pub fn new<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Bytes>,
    {
        Self {
            chunks: chunks.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Splits `text` into byte chunks of `chunk_size` bytes. Chunks may cut
    /// through multi-byte characters, as real transports do.
    pub fn from_text(text: &str, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        let chunks = text
            .as_bytes()
            .chunks(chunk_size)
            .map(Bytes::copy_from_slice)
            .collect::<Vec<_>>();
        Self::new(chunks)
    }

    /// Yields `n` chunks, then a read error.
    pub fn failing_after(mut self, n: usize, message: impl Into<String>) -> Self {
        self.fail_after = Some((n, message.into()));
        self
    }

    /// Fails at open time, before any body exists.
    pub fn refusing(mut self, message: impl Into<String>) -> Self {
        self.refuse = Some(message.into());
        self
    }

    /// Histories this transport was opened with, oldest first.
    pub fn opened_with(&self) -> Vec<Vec<Turn>> {
        match self.opened_with.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn open(&self, history: &[Turn]) -> Result<ByteStream> {
        if let Ok(mut opened) = self.opened_with.lock() {
            opened.push(history.to_vec());
        }
        if let Some(message) = &self.refuse {
            return Err(InterpreterError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                message.clone(),
            ))
            .into());
        }

        let mut items: Vec<std::result::Result<Bytes, std::io::Error>> = Vec::new();
        match &self.fail_after {
            Some((n, message)) => {
                items.extend(self.chunks.iter().take(*n).cloned().map(Ok));
                items.push(Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    message.clone(),
                )));
            }
            None => items.extend(self.chunks.iter().cloned().map(Ok)),
        }
        Ok(tokio_stream::iter(items).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_transport_replays_chunks() {
        let transport = ScriptedTransport::from_text("abcdefg", 3);
        let stream = match transport.open(&[Turn::user("hi")]).await {
            Ok(s) => s,
            Err(e) => panic!("open failed: {}", e),
        };
        let chunks: Vec<_> = stream.collect().await;
        assert_eq!(chunks.len(), 3);
        assert_eq!(transport.opened_with(), vec![vec![Turn::user("hi")]]);
    }

    #[tokio::test]
    async fn test_scripted_transport_fails_after_n() {
        let transport = ScriptedTransport::new(vec!["a", "b", "c"]).failing_after(1, "reset");
        let stream = match transport.open(&[]).await {
            Ok(s) => s,
            Err(e) => panic!("open failed: {}", e),
        };
        let chunks: Vec<_> = stream.collect().await;
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].is_ok());
        assert!(chunks[1].is_err());
    }

    #[test]
    fn test_request_body_shape() {
        let history = vec![Turn::user("where is invoice 7?"), Turn::assistant("Looking.")];
        let body = serde_json::to_value(ChatRequest::from_history(&history)).ok();
        assert_eq!(
            body,
            Some(serde_json::json!({"messages": [
                {"role": "user", "content": "where is invoice 7?"},
                {"role": "assistant", "content": "Looking."}
            ]}))
        );
    }
}
