//! Upstream SSE frame reader.
//!
//! Turns the raw chat-completions byte stream into JSON payloads, pulls the
//! delta text out of each one and feeds it to the parser character by
//! character, forwarding events to the sink as soon as they are produced.

use super::{EventSink, PumpOutcome, StreamError, UpstreamUsage};
use crate::core::metrics::get_metrics;
use crate::core::StreamCancelHandle;
use crate::toolify::ToolifyParser;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::fmt::Display;

/// Payload that terminates an OpenAI-style stream.
pub const DONE_SENTINEL: &str = "[DONE]";

// ============================================================================
// UTF-8 decoding
// ============================================================================

/// Incremental UTF-8 decoder.
///
/// A multi-byte character split across chunks is held back until the rest of
/// its bytes arrive. Invalid sequences decode to U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    pending: Vec<u8>,
}

impl Utf8StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much of `pending + chunk` as is complete.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::with_capacity(self.pending.len());
        let mut start = 0;

        loop {
            match std::str::from_utf8(&self.pending[start..]) {
                Ok(valid) => {
                    out.push_str(valid);
                    start = self.pending.len();
                    break;
                }
                Err(e) => {
                    let valid_up_to = start + e.valid_up_to();
                    // valid_up_to() guarantees this range is valid UTF-8
                    out.push_str(&String::from_utf8_lossy(&self.pending[start..valid_up_to]));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            start = valid_up_to + len;
                        }
                        None => {
                            start = valid_up_to;
                            break;
                        }
                    }
                }
            }
        }

        self.pending.drain(..start);
        out
    }

    /// Decode whatever is left at end of stream.
    pub fn flush(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}

// ============================================================================
// Frame reassembly
// ============================================================================

/// Reassembles SSE frames and yields their joined `data:` payloads.
#[derive(Debug, Default)]
pub struct SseFrameReader {
    decoder: Utf8StreamDecoder,
    buffer: String,
    /// A chunk ended in `\r`; it may be the first half of a `\r\n`.
    pending_cr: bool,
}

impl SseFrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return the payloads of every frame it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let text = self.decoder.decode(chunk);
        self.append(&text);

        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.find("\n\n") {
            let frame: String = self.buffer.drain(..pos + 2).collect();
            if let Some(payload) = frame_payload(&frame[..pos]) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Payload of a trailing frame the upstream did not terminate.
    pub fn finish(&mut self) -> Option<String> {
        let rest = self.decoder.flush();
        self.append(&rest);
        if std::mem::take(&mut self.pending_cr) {
            self.buffer.push('\r');
        }
        let frame = std::mem::take(&mut self.buffer);
        frame_payload(&frame)
    }

    fn append(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let mut owned;
        let mut text = text;
        if std::mem::take(&mut self.pending_cr) {
            owned = String::with_capacity(text.len() + 1);
            owned.push('\r');
            owned.push_str(text);
            text = &owned;
        }
        if let Some(head) = text.strip_suffix('\r') {
            self.pending_cr = true;
            text = head;
        }

        if text.contains('\r') {
            self.buffer.push_str(&text.replace("\r\n", "\n"));
        } else {
            self.buffer.push_str(text);
        }
    }
}

/// Join the values of every `data:` line in a frame.
fn frame_payload(frame: &str) -> Option<String> {
    let values: Vec<&str> = frame
        .lines()
        .map(str::trim)
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .collect();

    if values.is_empty() {
        None
    } else {
        Some(values.join("\n"))
    }
}

// ============================================================================
// Delta extraction
// ============================================================================

/// Text carried by `choices[0].delta.content`. Never fails; anything
/// unexpected contributes an empty string.
pub fn extract_delta_text(payload: &Value) -> String {
    let Some(content) = payload
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|choice| choice.get("delta"))
        .and_then(|delta| delta.get("content"))
    else {
        return String::new();
    };

    match content {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .map(|part| match part {
                Value::String(s) => s.clone(),
                Value::Object(obj) => coerce_text(obj.get("text")),
                _ => String::new(),
            })
            .collect(),
        Value::Object(obj) => coerce_text(obj.get("text")),
        _ => String::new(),
    }
}

fn coerce_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn extract_finish_reason(payload: &Value) -> Option<String> {
    payload
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|choice| choice.get("finish_reason"))
        .and_then(|r| r.as_str())
        .map(str::to_string)
}

// ============================================================================
// Pump
// ============================================================================

#[derive(Debug, Default)]
struct StreamMetadata {
    finish_reason: Option<String>,
    usage: Option<UpstreamUsage>,
}

enum PayloadStep {
    Continue,
    Done,
}

/// Drive one upstream stream through `parser` into `sink`.
///
/// Returns once the sentinel arrives, the upstream closes, or `cancel` fires.
/// A transport error aborts the sink and is returned as
/// [`StreamError::Transport`]. The sink is closed exactly once on every path.
pub async fn pump_upstream<S, E, K>(
    mut upstream: S,
    parser: &mut ToolifyParser,
    sink: &mut K,
    cancel: &StreamCancelHandle,
) -> Result<PumpOutcome, StreamError>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Display,
    K: EventSink + ?Sized,
{
    let result = run_pump(&mut upstream, parser, sink, cancel).await;

    match &result {
        Ok(_) | Err(StreamError::SinkClosed) => {}
        Err(StreamError::Transport(reason)) => {
            if let Err(e) = sink.abort(reason).await {
                tracing::debug!(error = %e, "Could not deliver abort to client");
            }
        }
    }
    sink.close().await;

    match result {
        Err(StreamError::SinkClosed) => {
            tracing::debug!("Client went away while streaming");
            Ok(PumpOutcome::Cancelled)
        }
        other => other,
    }
}

async fn run_pump<S, E, K>(
    upstream: &mut S,
    parser: &mut ToolifyParser,
    sink: &mut K,
    cancel: &StreamCancelHandle,
) -> Result<PumpOutcome, StreamError>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Display,
    K: EventSink + ?Sized,
{
    let mut reader = SseFrameReader::new();
    let mut metadata = StreamMetadata::default();
    let mut cancel_rx = cancel.subscribe();

    sink.init().await?;

    let outcome = 'read: loop {
        if cancel.is_cancelled() {
            return Ok(PumpOutcome::Cancelled);
        }

        let next = tokio::select! {
            chunk = upstream.next() => chunk,
            _ = cancel_rx.changed() => {
                tracing::info!("Client disconnected during streaming");
                return Ok(PumpOutcome::Cancelled);
            }
        };

        match next {
            Some(Ok(bytes)) => {
                for payload in reader.push(&bytes) {
                    if let PayloadStep::Done =
                        handle_payload(&payload, parser, sink, &mut metadata).await?
                    {
                        break 'read PumpOutcome::Done;
                    }
                }
            }
            Some(Err(e)) => {
                tracing::error!(error = %e, "Upstream stream failed");
                return Err(StreamError::Transport(e.to_string()));
            }
            None => {
                if let Some(payload) = reader.finish() {
                    if let PayloadStep::Done =
                        handle_payload(&payload, parser, sink, &mut metadata).await?
                    {
                        break 'read PumpOutcome::Done;
                    }
                }
                break 'read PumpOutcome::EndOfStream;
            }
        }
    };

    sink.on_metadata(metadata.finish_reason, metadata.usage)
        .await?;
    parser.finish();
    sink.handle_events(parser.consume_events()).await?;

    tracing::debug!(outcome = outcome.as_str(), "Upstream stream finished");
    Ok(outcome)
}

async fn handle_payload<K>(
    payload: &str,
    parser: &mut ToolifyParser,
    sink: &mut K,
    metadata: &mut StreamMetadata,
) -> Result<PayloadStep, StreamError>
where
    K: EventSink + ?Sized,
{
    if payload == DONE_SENTINEL {
        return Ok(PayloadStep::Done);
    }

    let value: Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, payload_len = payload.len(), "Skipping malformed SSE frame");
            get_metrics().sse_frames_skipped.inc();
            return Ok(PayloadStep::Continue);
        }
    };

    if let Some(reason) = extract_finish_reason(&value) {
        metadata.finish_reason = Some(reason);
    }
    if let Some(usage) = value.get("usage").and_then(UpstreamUsage::from_value) {
        metadata.usage = Some(usage);
    }

    let text = extract_delta_text(&value);
    for c in text.chars() {
        parser.feed_char(c);
        let events = parser.consume_events();
        if !events.is_empty() {
            sink.handle_events(events).await?;
        }
    }

    Ok(PayloadStep::Continue)
}
