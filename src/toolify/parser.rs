//! Character-level tool/thinking parser.
//!
//! The upstream model has no native tool calling, so it is prompted to announce
//! a tool call by writing a trigger signal followed by an `<invoke>` block, and
//! to wrap its reasoning in `<thinking>` tags. [`ToolifyParser`] watches the
//! streamed text one character at a time and turns it into [`ParserEvent`]s
//! while only ever seeing a prefix of the full response.
//!
//! Depending on configuration the parser runs in one of three shapes:
//!
//! - no trigger, thinking disabled: plain buffering, flushed every
//!   [`TEXT_FLUSH_THRESHOLD`] characters
//! - no trigger, thinking enabled: `Plain` and `Thinking` modes
//! - trigger configured: `Plain`, `Thinking` (when enabled) and `Capturing`

use super::invoke::{extract_invoke, INVOKE_CLOSE_RE, INVOKE_OPEN_RE};
use serde_json::{Map, Value};
use std::ops::Range;

/// Opening tag of a reasoning block.
pub const THINKING_START_TAG: &str = "<thinking>";

/// Closing tag of a reasoning block.
pub const THINKING_END_TAG: &str = "</thinking>";

/// Plain text is flushed as a `Text` event once this many characters are buffered.
pub const TEXT_FLUSH_THRESHOLD: usize = 256;

/// Event produced by the parser, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum ParserEvent {
    /// Literal output text. Never empty.
    Text { content: String },
    /// A complete reasoning block, emitted once the block closes.
    Thinking { content: String },
    /// One fully parsed tool invocation.
    ToolCall {
        name: String,
        arguments: Map<String, Value>,
    },
    /// No further events will follow.
    End,
}

impl ParserEvent {
    pub fn text(content: impl Into<String>) -> Self {
        ParserEvent::Text {
            content: content.into(),
        }
    }

    pub fn thinking(content: impl Into<String>) -> Self {
        ParserEvent::Thinking {
            content: content.into(),
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self, ParserEvent::End)
    }
}

/// Current accumulation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    #[default]
    Plain,
    Capturing,
    Thinking,
}

/// Mutable state for one in-flight response.
///
/// Only the buffer belonging to the current mode is ever non-empty.
#[derive(Debug, Default)]
struct ParserState {
    mode: ParseMode,
    text_buffer: String,
    /// Length of `text_buffer` in characters.
    text_len: usize,
    capture_buffer: String,
    /// Byte range of the open marker in `capture_buffer`, once seen.
    capture_open: Option<Range<usize>>,
    /// Offset in `capture_buffer` just past the last scanned `>`.
    capture_scan_from: usize,
    thinking_buffer: String,
    pending_events: Vec<ParserEvent>,
    finished: bool,
}

impl ParserState {
    fn emit_text(&mut self, content: String) {
        if !content.is_empty() {
            self.pending_events.push(ParserEvent::Text { content });
        }
    }

    fn emit_thinking(&mut self, content: String) {
        if !content.is_empty() {
            self.pending_events.push(ParserEvent::Thinking { content });
        }
    }

    fn push_text(&mut self, c: char) {
        self.text_buffer.push(c);
        self.text_len += 1;
    }

    fn take_text(&mut self) -> String {
        self.text_len = 0;
        std::mem::take(&mut self.text_buffer)
    }

    fn flush_text(&mut self) {
        let text = self.take_text();
        self.emit_text(text);
    }

    /// Flush all but the last `keep` characters of the plain buffer.
    fn flush_text_keeping_tail(&mut self, keep: usize) {
        if self.text_len <= keep {
            return;
        }
        let split_chars = self.text_len - keep;
        let split = self
            .text_buffer
            .char_indices()
            .nth(split_chars)
            .map(|(idx, _)| idx)
            .unwrap_or(self.text_buffer.len());
        let tail = self.text_buffer.split_off(split);
        let head = std::mem::replace(&mut self.text_buffer, tail);
        self.text_len = keep;
        self.emit_text(head);
    }

    /// Emit plain text preceding a just-matched tag of `tag_len` bytes.
    fn flush_text_before_tag(&mut self, tag_len: usize) {
        let mut text = self.take_text();
        text.truncate(text.len().saturating_sub(tag_len));
        self.emit_text(text);
    }

    fn enter_thinking(&mut self) {
        self.thinking_buffer.clear();
        self.mode = ParseMode::Thinking;
        tracing::trace!("parser entered thinking mode");
    }

    fn enter_capturing(&mut self) {
        self.reset_capture();
        self.mode = ParseMode::Capturing;
        tracing::trace!("parser entered capturing mode");
    }

    /// Emit the thinking block once its end tag has been appended.
    fn close_thinking(&mut self, strip_artifact: bool) {
        let mut content = std::mem::take(&mut self.thinking_buffer);
        content.truncate(content.len().saturating_sub(THINKING_END_TAG.len()));
        let content = if strip_artifact {
            strip_leading_artifact(&content).to_string()
        } else {
            content
        };
        self.emit_thinking(content);
        self.mode = ParseMode::Plain;
    }

    fn reset_capture(&mut self) {
        self.capture_buffer.clear();
        self.capture_open = None;
        self.capture_scan_from = 0;
    }

    /// Append one character to the capture and resolve it once the close
    /// marker is complete.
    ///
    /// Both markers end with the only `>` they contain, so the buffer is only
    /// scanned when a `>` arrives and only from just past the previous one.
    fn capture_char(&mut self, c: char) {
        self.capture_buffer.push(c);
        if c != '>' {
            return;
        }

        let scan_from =
            std::mem::replace(&mut self.capture_scan_from, self.capture_buffer.len());
        let Some(open) = self.capture_open.clone() else {
            self.capture_open = INVOKE_OPEN_RE
                .find_at(&self.capture_buffer, scan_from)
                .map(|m| m.range());
            return;
        };
        let Some(close) = INVOKE_CLOSE_RE.find_at(&self.capture_buffer, scan_from.max(open.end))
        else {
            return;
        };

        let events = resolve_block(&self.capture_buffer, open, close.range(), false);
        self.pending_events.extend(events);
        self.reset_capture();
        self.mode = ParseMode::Plain;
    }
}

/// Streaming parser for the trigger/invoke/thinking overlay protocol.
#[derive(Debug)]
pub struct ToolifyParser {
    trigger_signal: Option<String>,
    thinking_enabled: bool,
    /// Characters of plain text held back so a split trigger or tag is still seen.
    plain_tail_len: usize,
    state: ParserState,
}

impl ToolifyParser {
    /// Create a parser for one response.
    ///
    /// An empty trigger signal is treated the same as no trigger signal.
    pub fn new(trigger_signal: Option<String>, thinking_enabled: bool) -> Self {
        let trigger_signal = trigger_signal.filter(|signal| !signal.is_empty());
        let plain_tail_len = trigger_signal
            .as_deref()
            .map(|signal| {
                signal
                    .chars()
                    .count()
                    .max(THINKING_START_TAG.chars().count())
                    .saturating_sub(1)
            })
            .unwrap_or(0);

        Self {
            trigger_signal,
            thinking_enabled,
            plain_tail_len,
            state: ParserState::default(),
        }
    }

    pub fn trigger_signal(&self) -> Option<&str> {
        self.trigger_signal.as_deref()
    }

    pub fn thinking_enabled(&self) -> bool {
        self.thinking_enabled
    }

    pub fn mode(&self) -> ParseMode {
        self.state.mode
    }

    /// Whether `finish` has already queued the terminal `End` event.
    pub fn is_finished(&self) -> bool {
        self.state.finished
    }

    /// Feed one character of upstream text.
    pub fn feed_char(&mut self, c: char) {
        if self.state.finished {
            return;
        }
        match self.trigger_signal.as_deref() {
            None if !self.thinking_enabled => self.feed_passthrough(c),
            None => self.feed_thinking_only(c),
            Some(trigger) => {
                feed_with_trigger(&mut self.state, trigger, self.thinking_enabled, self.plain_tail_len, c)
            }
        }
    }

    /// Feed every character of `text` in order.
    pub fn feed_str(&mut self, text: &str) {
        for c in text.chars() {
            self.feed_char(c);
        }
    }

    /// Flush every buffer, resolve any pending capture and queue `End`.
    ///
    /// Calling this more than once has no further effect.
    pub fn finish(&mut self) {
        let state = &mut self.state;
        if state.finished {
            return;
        }

        state.flush_text();
        match state.mode {
            ParseMode::Thinking => {
                let content = std::mem::take(&mut state.thinking_buffer);
                state.emit_thinking(strip_leading_artifact(&content).to_string());
            }
            ParseMode::Capturing => {
                let buffer = std::mem::take(&mut state.capture_buffer);
                let events = resolve_capture(&buffer, true)
                    .unwrap_or_else(|| vec![ParserEvent::text(buffer.clone())]);
                state.pending_events.extend(events);
            }
            ParseMode::Plain => {}
        }

        state.pending_events.push(ParserEvent::End);
        state.mode = ParseMode::Plain;
        state.text_buffer.clear();
        state.text_len = 0;
        state.reset_capture();
        state.thinking_buffer.clear();
        state.finished = true;
    }

    /// Drain all queued events in emission order.
    pub fn consume_events(&mut self) -> Vec<ParserEvent> {
        std::mem::take(&mut self.state.pending_events)
    }

    fn feed_passthrough(&mut self, c: char) {
        self.state.push_text(c);
        if self.state.text_len >= TEXT_FLUSH_THRESHOLD {
            self.state.flush_text();
        }
    }

    fn feed_thinking_only(&mut self, c: char) {
        let state = &mut self.state;
        if state.mode == ParseMode::Thinking {
            state.thinking_buffer.push(c);
            if state.thinking_buffer.ends_with(THINKING_END_TAG) {
                state.close_thinking(false);
            }
            return;
        }

        state.push_text(c);
        if state.text_buffer.ends_with(THINKING_START_TAG) {
            state.flush_text_before_tag(THINKING_START_TAG.len());
            state.enter_thinking();
        } else if state.text_len >= TEXT_FLUSH_THRESHOLD {
            state.flush_text();
        }
    }
}

fn feed_with_trigger(
    state: &mut ParserState,
    trigger: &str,
    thinking_enabled: bool,
    plain_tail_len: usize,
    c: char,
) {
    match state.mode {
        ParseMode::Thinking => {
            state.thinking_buffer.push(c);
            if state.thinking_buffer.ends_with(THINKING_END_TAG) {
                state.close_thinking(true);
            }
        }
        ParseMode::Capturing => {
            state.capture_char(c);
        }
        ParseMode::Plain => {
            if thinking_enabled && completes_tag(&state.text_buffer, c, THINKING_START_TAG) {
                // `c` is the tag's last symbol and is consumed here.
                state.flush_text_before_tag(THINKING_START_TAG.len() - c.len_utf8());
                state.enter_thinking();
                return;
            }

            state.push_text(c);
            if state.text_buffer.ends_with(trigger) {
                state.flush_text_before_tag(trigger.len());
                state.enter_capturing();
            } else if state.text_len >= TEXT_FLUSH_THRESHOLD {
                state.flush_text_keeping_tail(plain_tail_len);
            }
        }
    }
}

fn completes_tag(buffer: &str, c: char, tag: &str) -> bool {
    tag.strip_suffix(c)
        .is_some_and(|head| buffer.ends_with(head))
}

/// Strip a leading `>` (with surrounding whitespace) left over from the
/// opening tag of a thinking block.
pub fn strip_leading_artifact(content: &str) -> &str {
    match content.trim_start().strip_prefix('>') {
        Some(rest) => rest.trim_start(),
        None => content,
    }
}

/// Try to turn a capture buffer into events.
///
/// Returns `None` while the buffer is still waiting for more input. A forced
/// resolution always returns `Some`.
pub(crate) fn resolve_capture(buffer: &str, forced: bool) -> Option<Vec<ParserEvent>> {
    let Some(open) = INVOKE_OPEN_RE.find(buffer) else {
        return forced.then(|| text_events(buffer));
    };
    let Some(close) = INVOKE_CLOSE_RE.find_at(buffer, open.end()) else {
        return forced.then(|| text_events(buffer));
    };
    Some(resolve_block(buffer, open.range(), close.range(), forced))
}

/// Resolve a capture whose first open and close markers are known.
fn resolve_block(
    buffer: &str,
    open: Range<usize>,
    close: Range<usize>,
    forced: bool,
) -> Vec<ParserEvent> {
    let after_close = &buffer[close.end..];
    let trailing = after_close.trim_start();
    if !forced && !trailing.is_empty() && !starts_with_open_marker(trailing) {
        tracing::debug!(
            trailing_len = trailing.len(),
            "Trailing content after invoke block, treating capture as text"
        );
        return text_events(buffer);
    }

    match extract_invoke(&buffer[open.start..close.end]) {
        Ok(call) => {
            let mut events = Vec::new();
            let preceding = &buffer[..open.start];
            if !preceding.is_empty() {
                events.push(ParserEvent::text(preceding));
            }
            tracing::debug!(tool = %call.name, "Parsed tool call from upstream text");
            events.push(ParserEvent::ToolCall {
                name: call.name,
                arguments: call.arguments,
            });

            let residue = skip_invoke_blocks(after_close);
            if !residue.trim().is_empty() {
                events.push(ParserEvent::text(residue));
            }
            events
        }
        Err(e) => {
            tracing::warn!(error = %e, "Malformed invoke block, emitting capture as text");
            text_events(buffer)
        }
    }
}

fn text_events(buffer: &str) -> Vec<ParserEvent> {
    if buffer.is_empty() {
        Vec::new()
    } else {
        vec![ParserEvent::text(buffer)]
    }
}

fn starts_with_open_marker(text: &str) -> bool {
    INVOKE_OPEN_RE
        .find(text)
        .is_some_and(|m| m.start() == 0)
}

/// Skip every further complete invoke block; only the first one per capture
/// becomes a tool call.
fn skip_invoke_blocks(mut rest: &str) -> &str {
    loop {
        let trimmed = rest.trim_start();
        let Some(open) = INVOKE_OPEN_RE.find(trimmed).filter(|m| m.start() == 0) else {
            return rest;
        };
        let Some(close) = INVOKE_CLOSE_RE.find_at(trimmed, open.end()) else {
            return rest;
        };
        tracing::debug!("Discarding additional invoke block in capture");
        rest = &trimmed[close.end()..];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn run(parser: &mut ToolifyParser, input: &str) -> Vec<ParserEvent> {
        parser.feed_str(input);
        parser.finish();
        parser.consume_events()
    }

    fn joined_text(events: &[ParserEvent]) -> String {
        events
            .iter()
            .filter_map(|e| match e {
                ParserEvent::Text { content } => Some(content.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_passthrough_flushes_at_threshold() {
        let mut parser = ToolifyParser::new(None, false);
        let input = "a".repeat(TEXT_FLUSH_THRESHOLD + 10);
        parser.feed_str(&input);

        let events = parser.consume_events();
        assert_eq!(events, vec![ParserEvent::text("a".repeat(TEXT_FLUSH_THRESHOLD))]);

        parser.finish();
        assert_eq!(
            parser.consume_events(),
            vec![ParserEvent::text("a".repeat(10)), ParserEvent::End]
        );
    }

    #[test]
    fn test_passthrough_counts_characters_not_bytes() {
        let mut parser = ToolifyParser::new(None, false);
        parser.feed_str(&"é".repeat(TEXT_FLUSH_THRESHOLD - 1));
        assert!(parser.consume_events().is_empty());
        parser.feed_char('é');
        assert_eq!(parser.consume_events().len(), 1);
    }

    #[test]
    fn test_thinking_only_mode() {
        let mut parser = ToolifyParser::new(None, true);
        let events = run(&mut parser, "A<thinking> B </thinking>C");
        assert_eq!(
            events,
            vec![
                ParserEvent::text("A"),
                ParserEvent::thinking(" B "),
                ParserEvent::text("C"),
                ParserEvent::End,
            ]
        );
    }

    #[test]
    fn test_thinking_disabled_keeps_tags_verbatim() {
        let mut parser = ToolifyParser::new(None, false);
        let events = run(&mut parser, "A<thinking>B</thinking>C");
        assert_eq!(joined_text(&events), "A<thinking>B</thinking>C");
        assert!(!events.iter().any(|e| matches!(e, ParserEvent::Thinking { .. })));
    }

    #[test]
    fn test_thinking_with_trigger_configured() {
        let mut parser = ToolifyParser::new(Some("<<CALL>>".to_string()), true);
        let events = run(&mut parser, "Hi<thinking>plan</thinking>done");
        assert_eq!(
            events,
            vec![
                ParserEvent::text("Hi"),
                ParserEvent::thinking("plan"),
                ParserEvent::text("done"),
                ParserEvent::End,
            ]
        );
    }

    #[test]
    fn test_thinking_leading_artifact_is_stripped() {
        let mut parser = ToolifyParser::new(Some("<<CALL>>".to_string()), true);
        let events = run(&mut parser, "<thinking> > idea</thinking>");
        assert_eq!(events, vec![ParserEvent::thinking("idea"), ParserEvent::End]);
    }

    #[test]
    fn test_unterminated_thinking_flushed_on_finish() {
        let mut parser = ToolifyParser::new(None, true);
        let events = run(&mut parser, "x<thinking>still going");
        assert_eq!(
            events,
            vec![
                ParserEvent::text("x"),
                ParserEvent::thinking("still going"),
                ParserEvent::End,
            ]
        );
    }

    #[test]
    fn test_empty_thinking_block_is_suppressed() {
        let mut parser = ToolifyParser::new(None, true);
        let events = run(&mut parser, "<thinking></thinking>ok");
        assert_eq!(events, vec![ParserEvent::text("ok"), ParserEvent::End]);
    }

    #[test]
    fn test_tool_call_after_trigger() {
        let mut parser = ToolifyParser::new(Some("<<CALL>>".to_string()), false);
        let events = run(
            &mut parser,
            "Hi<<CALL>>\n<invoke name=\"f\"><parameter name=\"x\">1</parameter></invoke>\n",
        );

        let mut expected_args = Map::new();
        expected_args.insert("x".to_string(), json!(1));
        assert_eq!(
            events,
            vec![
                ParserEvent::text("Hi"),
                ParserEvent::text("\n"),
                ParserEvent::ToolCall {
                    name: "f".to_string(),
                    arguments: expected_args,
                },
                ParserEvent::text("\n"),
                ParserEvent::End,
            ]
        );
    }

    #[test]
    fn test_tool_call_is_emitted_as_soon_as_block_closes() {
        let mut parser = ToolifyParser::new(Some("<<CALL>>".to_string()), false);
        parser.feed_str("<<CALL>><invoke name=\"f\"></invoke");
        assert!(parser.consume_events().is_empty());
        assert_eq!(parser.mode(), ParseMode::Capturing);

        parser.feed_char('>');
        let events = parser.consume_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ParserEvent::ToolCall { name, .. } if name == "f"));
        assert_eq!(parser.mode(), ParseMode::Plain);
    }

    #[test]
    fn test_whitespace_before_open_marker_is_kept() {
        let mut parser = ToolifyParser::new(Some("<<CALL>>".to_string()), false);
        let events = run(&mut parser, "<<CALL>>\n<invoke name=\"f\"></invoke>");
        assert_eq!(
            events,
            vec![
                ParserEvent::text("\n"),
                ParserEvent::ToolCall {
                    name: "f".to_string(),
                    arguments: Map::new(),
                },
                ParserEvent::End,
            ]
        );
    }

    #[test]
    fn test_large_invoke_block_resolves_in_linear_time() {
        // ~120 KB of argument text with a `>` on every line
        let content = "if a > b { write(a) }\n".repeat(5_500);
        let input = format!(
            "<<CALL>><invoke name=\"write\"><parameter name=\"content\">{}</parameter></invoke>",
            content
        );
        assert!(input.len() > 100_000);

        let started = std::time::Instant::now();
        let mut parser = ToolifyParser::new(Some("<<CALL>>".to_string()), false);
        let events = run(&mut parser, &input);
        assert!(
            started.elapsed() < std::time::Duration::from_secs(5),
            "took {:?}",
            started.elapsed()
        );

        assert_eq!(events.len(), 2);
        match &events[0] {
            ParserEvent::ToolCall { name, arguments } => {
                assert_eq!(name, "write");
                assert_eq!(arguments["content"], json!(content.trim()));
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(events[1], ParserEvent::End);
    }

    #[test]
    fn test_streamed_capture_matches_resolve_capture() {
        let bodies = [
            "\n<invoke name=\"a\"><parameter name=\"q\">x > y</parameter></invoke>",
            " <x>\n<INVOKE name='b' data-k=\"v\">\n<parameter name=\"n\">2</parameter>\n</Invoke >",
            "<invoke>no name</invoke>",
        ];
        for body in bodies {
            let mut parser = ToolifyParser::new(Some("<<CALL>>".to_string()), false);
            parser.feed_str("<<CALL>>");
            parser.feed_str(body);
            let mut expected = resolve_capture(body, false).unwrap();
            assert_eq!(parser.consume_events(), expected, "body: {}", body);
            assert_eq!(parser.mode(), ParseMode::Plain);

            parser.finish();
            expected = vec![ParserEvent::End];
            assert_eq!(parser.consume_events(), expected);
        }
    }

    #[test]
    fn test_second_invoke_block_is_not_a_tool_call() {
        let mut parser = ToolifyParser::new(Some("<<CALL>>".to_string()), false);
        let events = run(
            &mut parser,
            "<<CALL>><invoke name=\"a\"></invoke><invoke name=\"b\"></invoke>tail",
        );
        let calls: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, ParserEvent::ToolCall { .. }))
            .collect();
        assert_eq!(calls.len(), 1);
        assert!(matches!(calls[0], ParserEvent::ToolCall { name, .. } if name == "a"));
        assert!(joined_text(&events).ends_with("tail"));
    }

    #[test]
    fn test_forced_finish_with_incomplete_block_emits_text() {
        let mut parser = ToolifyParser::new(Some("<<CALL>>".to_string()), false);
        let events = run(&mut parser, "<<CALL>><invoke name=\"f\"><parameter name=\"x\">1");
        assert_eq!(
            events,
            vec![
                ParserEvent::text("<invoke name=\"f\"><parameter name=\"x\">1"),
                ParserEvent::End,
            ]
        );
    }

    #[test]
    fn test_forced_finish_without_open_marker_emits_text() {
        let mut parser = ToolifyParser::new(Some("<<CALL>>".to_string()), false);
        let events = run(&mut parser, "before<<CALL>> not a call");
        assert_eq!(
            events,
            vec![
                ParserEvent::text("before"),
                ParserEvent::text(" not a call"),
                ParserEvent::End,
            ]
        );
    }

    #[test]
    fn test_invoke_without_name_falls_back_to_text() {
        let mut parser = ToolifyParser::new(Some("<<CALL>>".to_string()), false);
        let events = run(&mut parser, "<<CALL>><invoke></invoke>");
        assert_eq!(
            events,
            vec![ParserEvent::text("<invoke></invoke>"), ParserEvent::End]
        );
    }

    #[test]
    fn test_resolve_capture_rolls_back_on_trailing_text() {
        let buffer = "<invoke name=\"f\"></invoke> and then more";
        let events = resolve_capture(buffer, false).unwrap();
        assert_eq!(events, vec![ParserEvent::text(buffer)]);
    }

    #[test]
    fn test_resolve_capture_forced_ignores_trailing_text() {
        let buffer = "<invoke name=\"f\"></invoke> and then more";
        let events = resolve_capture(buffer, true).unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], ParserEvent::ToolCall { name, .. } if name == "f"));
        assert_eq!(events[1], ParserEvent::text(" and then more"));
    }

    #[test]
    fn test_resolve_capture_discards_additional_blocks() {
        let buffer = "<invoke name=\"a\"></invoke>\n<invoke name=\"b\"></invoke>\nrest";
        let events = resolve_capture(buffer, false).unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], ParserEvent::ToolCall { name, .. } if name == "a"));
        assert_eq!(events[1], ParserEvent::text("\nrest"));
    }

    #[test]
    fn test_resolve_capture_waits_for_more_input() {
        assert!(resolve_capture("\n<invo", false).is_none());
        assert!(resolve_capture("<invoke name=\"f\">", false).is_none());
    }

    #[test]
    fn test_trigger_mode_streams_long_text_before_finish() {
        let trigger = "<<CALL>>";
        let mut parser = ToolifyParser::new(Some(trigger.to_string()), true);
        let input = "b".repeat(TEXT_FLUSH_THRESHOLD * 2);
        parser.feed_str(&input);

        let streamed = joined_text(&parser.consume_events());
        assert!(!streamed.is_empty());
        assert!(input.starts_with(&streamed));

        parser.finish();
        let rest = joined_text(&parser.consume_events());
        assert_eq!(format!("{}{}", streamed, rest), input);
    }

    #[test]
    fn test_trigger_split_across_flush_is_still_detected() {
        let trigger = "<<CALL>>";
        let mut parser = ToolifyParser::new(Some(trigger.to_string()), false);
        let prefix = "c".repeat(TEXT_FLUSH_THRESHOLD - 3);
        let events = run(
            &mut parser,
            &format!("{}{}<invoke name=\"f\"></invoke>", prefix, trigger),
        );
        assert_eq!(joined_text(&events), prefix);
        assert!(events
            .iter()
            .any(|e| matches!(e, ParserEvent::ToolCall { name, .. } if name == "f")));
    }

    #[test]
    fn test_finish_is_terminal() {
        let mut parser = ToolifyParser::new(None, false);
        parser.feed_str("abc");
        parser.finish();
        assert_eq!(
            parser.consume_events(),
            vec![ParserEvent::text("abc"), ParserEvent::End]
        );

        parser.finish();
        parser.feed_str("ignored");
        assert!(parser.consume_events().is_empty());
        assert!(parser.is_finished());
    }

    #[test]
    fn test_consume_events_is_destructive() {
        let mut parser = ToolifyParser::new(None, false);
        parser.feed_str("hello");
        parser.finish();
        assert_eq!(parser.consume_events().len(), 2);
        assert!(parser.consume_events().is_empty());
    }

    #[test]
    fn test_empty_trigger_disables_tool_parsing() {
        let parser = ToolifyParser::new(Some(String::new()), false);
        assert!(parser.trigger_signal().is_none());
    }

    #[test]
    fn test_strip_leading_artifact() {
        assert_eq!(strip_leading_artifact(">abc"), "abc");
        assert_eq!(strip_leading_artifact("  >  abc "), "abc ");
        assert_eq!(strip_leading_artifact(" abc "), " abc ");
        assert_eq!(strip_leading_artifact(""), "");
    }
}
