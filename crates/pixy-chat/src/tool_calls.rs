use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;
use tracing::{debug, warn};

use crate::types::{StreamEvent, ToolCallKind, ToolCallRecord};
use crate::wire::ToolCallDelta;

/// A tool call still receiving fragments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingToolCall {
    pub index: usize,
    pub id: String,
    pub name: String,
    pub argument_text: String,
}

impl PendingToolCall {
    fn new(index: usize) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    fn finalize(self) -> ToolCallRecord {
        let id = if self.id.is_empty() {
            synthesize_call_id(self.index)
        } else {
            self.id
        };
        let arguments = decode_arguments(&self.name, &self.argument_text);
        let kind = if self.name.is_empty() {
            ToolCallKind::Malformed
        } else {
            ToolCallKind::Completed
        };
        ToolCallRecord {
            index: self.index,
            id,
            name: self.name,
            raw_arguments: self.argument_text,
            arguments,
            kind,
        }
    }
}

/// Reassembles streamed tool-call fragments keyed by their stream index.
/// An index fires at most once per response; fragments arriving for an
/// index that was already finalized are dropped.
#[derive(Debug, Default)]
pub struct ToolCallAssembler {
    pending: BTreeMap<usize, PendingToolCall>,
    finalized: BTreeSet<usize>,
}

impl ToolCallAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn apply_deltas(&mut self, deltas: &[ToolCallDelta], emit: &mut dyn FnMut(StreamEvent)) {
        for delta in deltas {
            self.apply_delta(delta, emit);
        }
    }

    pub fn apply_delta(&mut self, delta: &ToolCallDelta, emit: &mut dyn FnMut(StreamEvent)) {
        let index = delta.index.unwrap_or(0);
        if self.finalized.contains(&index) {
            debug!(index, "ignoring fragment for an already finalized tool call");
            return;
        }
        let call = self
            .pending
            .entry(index)
            .or_insert_with(|| PendingToolCall::new(index));

        if let Some(id) = delta.id.as_deref() {
            if !id.is_empty() {
                call.id = id.to_string();
            }
        }
        if let Some(name) = delta.name() {
            if call.name.is_empty() && !name.is_empty() {
                call.name = name.to_string();
                emit(StreamEvent::ToolPreparing {
                    name: call.name.clone(),
                });
            }
        }
        if let Some(fragment) = delta.arguments() {
            call.argument_text.push_str(&fragment);
        }
    }

    /// Emits every pending call in ascending index order and clears the
    /// pending set. Returns how many records were emitted.
    pub fn finalize_all(&mut self, emit: &mut dyn FnMut(StreamEvent)) -> usize {
        let pending = std::mem::take(&mut self.pending);
        let count = pending.len();
        for (index, call) in pending {
            self.finalized.insert(index);
            let record = call.finalize();
            if record.is_malformed() {
                warn!(
                    index = record.index,
                    id = %record.id,
                    "tool call finished without a function name"
                );
            } else {
                debug!(index = record.index, name = %record.name, "tool call finalized");
            }
            emit(StreamEvent::ToolCall { call: record });
        }
        count
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.finalized.clear();
    }
}

fn decode_arguments(name: &str, text: &str) -> Value {
    if text.trim().is_empty() {
        return ToolCallRecord::empty_arguments();
    }
    serde_json::from_str::<Value>(text).unwrap_or_else(|error| {
        warn!(tool = name, "tool call arguments are not valid JSON: {error}");
        ToolCallRecord::empty_arguments()
    })
}

fn synthesize_call_id(index: usize) -> String {
    static SEQUENCE: AtomicU64 = AtomicU64::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_nanos())
        .unwrap_or(0);
    let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("call_{index}_{nanos}_{sequence}")
}
