//! Claude SSE writer backed by a bounded channel.
//!
//! The HTTP response body reads from the receiving half; when the client is
//! slow the channel fills up and `send` suspends the pump.

use super::{EventSink, StreamError, UpstreamUsage};
use crate::core::metrics::get_metrics;
use crate::services::claude_encoder::ClaudeStreamEncoder;
use crate::toolify::ParserEvent;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

/// Frames buffered between the pump and the response body.
pub const SSE_CHANNEL_CAPACITY: usize = 64;

/// [`EventSink`] that encodes events as Claude SSE and sends them to the client.
pub struct ClaudeSseWriter {
    encoder: ClaudeStreamEncoder,
    sender: Option<mpsc::Sender<Bytes>>,
}

impl ClaudeSseWriter {
    pub fn new(encoder: ClaudeStreamEncoder, sender: mpsc::Sender<Bytes>) -> Self {
        Self {
            encoder,
            sender: Some(sender),
        }
    }

    /// Writer plus the receiver the response body should drain.
    pub fn channel(encoder: ClaudeStreamEncoder) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(SSE_CHANNEL_CAPACITY);
        (Self::new(encoder, tx), rx)
    }

    pub fn encoder(&self) -> &ClaudeStreamEncoder {
        &self.encoder
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_none()
    }

    async fn send_all(&mut self, frames: Vec<String>) -> Result<(), StreamError> {
        let Some(sender) = self.sender.as_ref() else {
            return Err(StreamError::SinkClosed);
        };
        for frame in frames {
            sender
                .send(Bytes::from(frame))
                .await
                .map_err(|_| StreamError::SinkClosed)?;
        }
        Ok(())
    }
}

#[async_trait]
impl EventSink for ClaudeSseWriter {
    async fn init(&mut self) -> Result<(), StreamError> {
        let preamble = self.encoder.preamble();
        self.send_all(preamble).await
    }

    async fn handle_events(&mut self, events: Vec<ParserEvent>) -> Result<(), StreamError> {
        let mut frames = Vec::new();
        for event in &events {
            if let ParserEvent::ToolCall { name, .. } = event {
                tracing::info!(tool = %name, "Emitting tool_use block");
                get_metrics().tool_calls.with_label_values(&["stream"]).inc();
            }
            frames.extend(self.encoder.encode(event));
        }
        self.send_all(frames).await
    }

    async fn on_metadata(
        &mut self,
        finish_reason: Option<String>,
        usage: Option<UpstreamUsage>,
    ) -> Result<(), StreamError> {
        self.encoder.set_metadata(finish_reason, usage);
        Ok(())
    }

    async fn abort(&mut self, reason: &str) -> Result<(), StreamError> {
        let frame = self.encoder.error_event(reason);
        self.send_all(vec![frame]).await
    }

    async fn close(&mut self) {
        if self.sender.take().is_some() {
            tracing::debug!(message_id = %self.encoder.message_id(), "Closed client stream");
        }
    }
}
