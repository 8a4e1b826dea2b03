//! Upstream SSE ingestion and downstream event delivery.
//!
//! [`pump_upstream`] drives one response: it reads the upstream byte stream,
//! feeds the recovered text into a [`ToolifyParser`](crate::toolify::ToolifyParser)
//! and hands every batch of events to an [`EventSink`].

pub mod sse_reader;
pub mod writer;

use crate::toolify::ParserEvent;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use sse_reader::{extract_delta_text, pump_upstream, SseFrameReader, Utf8StreamDecoder};
pub use writer::{ClaudeSseWriter, SSE_CHANNEL_CAPACITY};

/// Errors raised while moving a stream from upstream to the client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// The upstream connection failed mid-stream.
    #[error("upstream transport error: {0}")]
    Transport(String),

    /// The client side of the stream has gone away.
    #[error("downstream closed")]
    SinkClosed,
}

/// How a pump run ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpOutcome {
    /// The upstream sent the `[DONE]` sentinel.
    Done,
    /// The upstream closed the connection without a sentinel.
    EndOfStream,
    /// The client disconnected before the stream finished.
    Cancelled,
}

impl PumpOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PumpOutcome::Done => "done",
            PumpOutcome::EndOfStream => "end_of_stream",
            PumpOutcome::Cancelled => "cancelled",
        }
    }
}

/// Token usage reported by the upstream in its final frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_tokens: Option<u64>,
}

impl UpstreamUsage {
    /// Read an OpenAI `usage` object. Missing counters are treated as zero.
    pub fn from_value(usage: &serde_json::Value) -> Option<Self> {
        let obj = usage.as_object()?;
        Some(Self {
            prompt_tokens: obj
                .get("prompt_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(0),
            completion_tokens: obj
                .get("completion_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(0),
            cached_tokens: obj
                .get("prompt_tokens_details")
                .and_then(|d| d.get("cached_tokens"))
                .and_then(|v| v.as_u64()),
        })
    }
}

/// Receiver of parser events for one response.
///
/// Every method may suspend while the client catches up. `close` must be safe
/// to call more than once.
#[async_trait]
pub trait EventSink: Send {
    /// Emit the stream preamble before any event.
    async fn init(&mut self) -> Result<(), StreamError>;

    /// Render a batch of events in order.
    async fn handle_events(&mut self, events: Vec<ParserEvent>) -> Result<(), StreamError>;

    /// Upstream finish reason and usage, delivered before the final batch.
    async fn on_metadata(
        &mut self,
        _finish_reason: Option<String>,
        _usage: Option<UpstreamUsage>,
    ) -> Result<(), StreamError> {
        Ok(())
    }

    /// Report a fatal error to the client. No further events follow.
    async fn abort(&mut self, reason: &str) -> Result<(), StreamError>;

    /// Release the client connection.
    async fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_usage_from_value() {
        let usage = UpstreamUsage::from_value(&json!({
            "prompt_tokens": 12,
            "completion_tokens": 5,
            "prompt_tokens_details": {"cached_tokens": 4}
        }))
        .unwrap();
        assert_eq!(usage.prompt_tokens, 12);
        assert_eq!(usage.completion_tokens, 5);
        assert_eq!(usage.cached_tokens, Some(4));

        let partial = UpstreamUsage::from_value(&json!({"completion_tokens": 2})).unwrap();
        assert_eq!(partial.prompt_tokens, 0);
        assert_eq!(partial.cached_tokens, None);

        assert!(UpstreamUsage::from_value(&json!(null)).is_none());
    }

    #[test]
    fn test_pump_outcome_labels() {
        assert_eq!(PumpOutcome::Done.as_str(), "done");
        assert_eq!(PumpOutcome::EndOfStream.as_str(), "end_of_stream");
        assert_eq!(PumpOutcome::Cancelled.as_str(), "cancelled");
    }
}
