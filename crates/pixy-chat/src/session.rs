//! Per-request response state.
//!
//! A session sees the response body grow one chunk at a time and decides,
//! from the first decisive bytes, whether it is reading an SSE stream or a
//! single JSON document. Streamed bytes are consumed line by line as they
//! arrive; a monolithic document is left unconsumed and decoded once at
//! completion. Either way every byte is interpreted exactly once.

use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::sse::{SseFrame, complete_lines_len, looks_like_sse, parse_new_frames};
use crate::tag_filter::TagFilter;
use crate::tool_calls::ToolCallAssembler;
use crate::types::{StopReason, StreamEvent, Usage};
use crate::wire::{ChatChunk, WireMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Undecided,
    Streamed,
    Monolithic,
}

#[derive(Debug)]
pub struct ResponseSession {
    buffer: Vec<u8>,
    consumed: usize,
    kind: ResponseKind,
    visible_text: String,
    tool_calls: ToolCallAssembler,
    tool_calls_seen: bool,
    filter: TagFilter,
    usage_reported: bool,
    stop_reason: Option<StopReason>,
    stream_frames: usize,
    protocol_error: Option<String>,
    debug: bool,
}

impl ResponseSession {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            buffer: Vec::new(),
            consumed: 0,
            kind: ResponseKind::Undecided,
            visible_text: String::new(),
            tool_calls: ToolCallAssembler::new(),
            tool_calls_seen: false,
            filter: TagFilter::new(config.tool_block_markers.clone()),
            usage_reported: false,
            stop_reason: None,
            stream_frames: 0,
            protocol_error: None,
            debug: config.debug,
        }
    }

    pub fn kind(&self) -> ResponseKind {
        self.kind
    }

    pub fn received_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn consumed_len(&self) -> usize {
        self.consumed
    }

    pub fn visible_text(&self) -> &str {
        &self.visible_text
    }

    pub fn tool_calls_seen(&self) -> bool {
        self.tool_calls_seen
    }

    pub fn protocol_error(&self) -> Option<&str> {
        self.protocol_error.as_deref()
    }

    /// True once at least one SSE payload frame was interpreted.
    pub fn received_stream_content(&self) -> bool {
        self.kind == ResponseKind::Streamed && self.stream_frames > 0
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.buffer).into_owned()
    }

    /// Appends newly received bytes and interprets whatever became decidable.
    pub fn append(&mut self, chunk: &[u8], emit: &mut dyn FnMut(StreamEvent)) {
        if chunk.is_empty() {
            return;
        }
        self.buffer.extend_from_slice(chunk);
        self.process(emit);
    }

    /// Same as [`append`](Self::append) for transports that expose the whole
    /// body received so far. A view shorter than what was already seen is
    /// ignored.
    pub fn on_bytes_appended(&mut self, total: &[u8], emit: &mut dyn FnMut(StreamEvent)) {
        if total.len() < self.buffer.len() {
            warn!(
                received = self.buffer.len(),
                offered = total.len(),
                "ignoring response view shorter than the bytes already received"
            );
            return;
        }
        let new_bytes = &total[self.buffer.len()..];
        self.buffer.extend_from_slice(new_bytes);
        self.process(emit);
    }

    /// Interprets everything still unconsumed once the transport is done.
    /// `decode_document` gates the monolithic path: only a successful status
    /// turns a JSON body into content.
    pub fn complete(&mut self, decode_document: bool, emit: &mut dyn FnMut(StreamEvent)) {
        self.process(emit);
        match self.kind {
            ResponseKind::Streamed => {
                let tail = self.buffer[self.consumed..].to_vec();
                self.consumed = self.buffer.len();
                if !tail.is_empty() {
                    self.feed_frames(&String::from_utf8_lossy(&tail), emit);
                }
            }
            ResponseKind::Monolithic | ResponseKind::Undecided => {
                if decode_document {
                    self.decode_document(emit);
                }
            }
        }

        self.flush_visible(emit);
        if self.tool_calls.has_pending() {
            self.tool_calls.finalize_all(emit);
        }
        if let Some(reason) = self.stop_reason.take() {
            emit(StreamEvent::Stop { reason });
        }
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.consumed = 0;
        self.kind = ResponseKind::Undecided;
        self.visible_text.clear();
        self.tool_calls.clear();
        self.tool_calls_seen = false;
        self.filter.reset();
        self.usage_reported = false;
        self.stop_reason = None;
        self.stream_frames = 0;
        self.protocol_error = None;
    }

    fn process(&mut self, emit: &mut dyn FnMut(StreamEvent)) {
        if self.consumed >= self.buffer.len() {
            return;
        }
        if self.kind == ResponseKind::Undecided {
            self.classify();
        }
        if self.kind != ResponseKind::Streamed {
            return;
        }

        let delta = &self.buffer[self.consumed..];
        let complete_len = complete_lines_len(delta);
        if complete_len == 0 {
            return;
        }
        let complete = delta[..complete_len].to_vec();
        self.consumed += complete.len();
        self.feed_frames(&String::from_utf8_lossy(&complete), emit);
    }

    fn classify(&mut self) {
        let delta = &self.buffer[self.consumed..];
        let trimmed = delta.trim_ascii_start();
        if trimmed.is_empty() || (trimmed.len() < 5 && b"data:".starts_with(trimmed)) {
            return;
        }
        let streamed = std::str::from_utf8(&trimmed[..trimmed.len().min(5)])
            .map(looks_like_sse)
            .unwrap_or(false);
        let leading_whitespace = delta.len() - trimmed.len();
        if streamed {
            self.kind = ResponseKind::Streamed;
            self.consumed += leading_whitespace;
        } else {
            self.kind = ResponseKind::Monolithic;
        }
        info!(kind = ?self.kind, "classified response body");
    }

    fn feed_frames(&mut self, text: &str, emit: &mut dyn FnMut(StreamEvent)) {
        for frame in parse_new_frames(text) {
            match frame {
                SseFrame::Comment(comment) => {
                    if self.debug {
                        debug!(comment = %comment, "sse comment");
                    }
                }
                SseFrame::Data(payload) => {
                    self.stream_frames += 1;
                    self.handle_data(&payload, emit);
                }
                SseFrame::Terminator => {
                    self.stream_frames += 1;
                    if self.debug {
                        debug!("sse terminator");
                    }
                    self.flush_visible(emit);
                    self.tool_calls.finalize_all(emit);
                }
            }
        }
    }

    fn handle_data(&mut self, payload: &str, emit: &mut dyn FnMut(StreamEvent)) {
        if self.debug {
            debug!(payload = %payload, "sse data frame");
        }
        let chunk: ChatChunk = match serde_json::from_str(payload) {
            Ok(chunk) => chunk,
            Err(error) => {
                warn!("skipping undecodable stream frame: {error}");
                return;
            }
        };

        if let Some(message) = chunk.error_message() {
            self.fail(message, emit);
            return;
        }
        if let Some(usage) = chunk.usage.as_ref() {
            self.report_usage(usage.to_usage(), emit);
        }
        let Some(choice) = chunk.first_choice() else {
            return;
        };
        if let Some(reason) = choice.finish_reason.as_deref() {
            self.stop_reason = Some(StopReason::from_finish_reason(reason));
        }
        if let Some(delta) = choice.delta.as_ref() {
            self.apply_message(delta, false, emit);
        }
    }

    fn decode_document(&mut self, emit: &mut dyn FnMut(StreamEvent)) {
        let text = String::from_utf8_lossy(&self.buffer[self.consumed..]).into_owned();
        self.consumed = self.buffer.len();
        let document = text.trim();
        if document.is_empty() {
            return;
        }
        if self.debug {
            debug!(body = %document, "monolithic response");
        }

        let chunk: ChatChunk = match serde_json::from_str(document) {
            Ok(chunk) => chunk,
            Err(error) => {
                self.fail(format!("Invalid response JSON: {error}"), emit);
                return;
            }
        };
        if let Some(message) = chunk.error_message() {
            self.fail(message, emit);
            return;
        }
        if let Some(usage) = chunk.usage.as_ref() {
            self.report_usage(usage.to_usage(), emit);
        }
        let Some(choice) = chunk.first_choice() else {
            return;
        };
        if let Some(reason) = choice.finish_reason.as_deref() {
            self.stop_reason = Some(StopReason::from_finish_reason(reason));
        }
        if let Some(message) = choice.message.as_ref().or(choice.delta.as_ref()) {
            self.apply_message(message, true, emit);
        }
    }

    /// `positional` assigns missing tool-call indices from array position,
    /// which only makes sense when the whole list arrives at once.
    fn apply_message(
        &mut self,
        message: &WireMessage,
        positional: bool,
        emit: &mut dyn FnMut(StreamEvent),
    ) {
        if let Some(reasoning) = message.reasoning_content.as_deref() {
            if !reasoning.is_empty() {
                emit(StreamEvent::Reasoning {
                    text: reasoning.to_string(),
                });
            }
        }

        if let Some(deltas) = message.tool_calls.as_ref() {
            self.tool_calls_seen = true;
            if positional {
                for (position, delta) in deltas.iter().enumerate() {
                    let mut delta = delta.clone();
                    delta.index = delta.index.or(Some(position));
                    self.tool_calls.apply_delta(&delta, emit);
                }
            } else {
                self.tool_calls.apply_deltas(deltas, emit);
            }
        }

        if let Some(content) = message.content_text() {
            let visible = self.filter.filter(content);
            self.push_visible(visible, emit);
        }
    }

    fn flush_visible(&mut self, emit: &mut dyn FnMut(StreamEvent)) {
        let held = self.filter.flush();
        self.push_visible(held, emit);
    }

    fn push_visible(&mut self, text: String, emit: &mut dyn FnMut(StreamEvent)) {
        if text.is_empty() {
            return;
        }
        self.visible_text.push_str(&text);
        emit(StreamEvent::Content { text });
    }

    fn report_usage(&mut self, usage: Usage, emit: &mut dyn FnMut(StreamEvent)) {
        if self.usage_reported || usage.is_zero() {
            return;
        }
        self.usage_reported = true;
        emit(StreamEvent::Usage { usage });
    }

    fn fail(&mut self, message: String, emit: &mut dyn FnMut(StreamEvent)) {
        if let Some(first) = self.protocol_error.as_deref() {
            warn!(first = %first, "additional response error: {message}");
            return;
        }
        warn!("response reported an error: {message}");
        self.protocol_error = Some(message.clone());
        emit(StreamEvent::Error { message });
    }
}
