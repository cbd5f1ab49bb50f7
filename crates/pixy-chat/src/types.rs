use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One conversation turn handed to the provider. Never mutated by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(rename = "toolCalls", default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRecord>,
    #[serde(
        rename = "toolCallId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCallRecord>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallKind {
    Completed,
    /// The stream never named the function. Still delivered so the caller
    /// can answer the model's tool-call slot.
    Malformed,
}

/// A finalized tool invocation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub index: usize,
    pub id: String,
    pub name: String,
    #[serde(rename = "rawArguments")]
    pub raw_arguments: String,
    pub arguments: Value,
    pub kind: ToolCallKind,
}

impl ToolCallRecord {
    pub fn is_malformed(&self) -> bool {
        self.kind == ToolCallKind::Malformed
    }

    pub(crate) fn empty_arguments() -> Value {
        Value::Object(Map::new())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(rename = "promptTokens")]
    pub prompt_tokens: u64,
    #[serde(rename = "completionTokens")]
    pub completion_tokens: u64,
    #[serde(rename = "cachedTokens", default)]
    pub cached_tokens: u64,
}

impl Usage {
    pub fn is_zero(&self) -> bool {
        self.prompt_tokens == 0 && self.completion_tokens == 0
    }

    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    #[serde(rename = "stop")]
    Stop,
    #[serde(rename = "length")]
    Length,
    #[serde(rename = "toolUse")]
    ToolUse,
    #[serde(rename = "contentFilter")]
    ContentFilter,
}

impl StopReason {
    pub(crate) fn from_finish_reason(reason: &str) -> Self {
        match reason {
            "length" => StopReason::Length,
            "function_call" | "tool_calls" => StopReason::ToolUse,
            "content_filter" => StopReason::ContentFilter,
            _ => StopReason::Stop,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failed,
    Cancelled,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        *self == Outcome::Success
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    /// Visible assistant text, already stripped of suppressed blocks.
    #[serde(rename = "content")]
    Content { text: String },
    #[serde(rename = "reasoning")]
    Reasoning { text: String },
    #[serde(rename = "tool_preparing")]
    ToolPreparing { name: String },
    #[serde(rename = "tool_call")]
    ToolCall { call: ToolCallRecord },
    #[serde(rename = "usage")]
    Usage { usage: Usage },
    #[serde(rename = "stop")]
    Stop { reason: StopReason },
    #[serde(rename = "error")]
    Error { message: String },
    #[serde(rename = "done")]
    Done { outcome: Outcome },
}

/// Everything one request produced, folded from its event stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    pub text: String,
    pub reasoning: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub usage: Option<Usage>,
    pub stop_reason: Option<StopReason>,
    pub errors: Vec<String>,
    pub outcome: Outcome,
}

impl Default for ChatResponse {
    fn default() -> Self {
        Self {
            text: String::new(),
            reasoning: String::new(),
            tool_calls: Vec::new(),
            usage: None,
            stop_reason: None,
            errors: Vec::new(),
            outcome: Outcome::Failed,
        }
    }
}

impl ChatResponse {
    pub(crate) fn absorb(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Content { text } => self.text.push_str(&text),
            StreamEvent::Reasoning { text } => self.reasoning.push_str(&text),
            StreamEvent::ToolPreparing { .. } => {}
            StreamEvent::ToolCall { call } => self.tool_calls.push(call),
            StreamEvent::Usage { usage } => self.usage = Some(usage),
            StreamEvent::Stop { reason } => self.stop_reason = Some(reason),
            StreamEvent::Error { message } => self.errors.push(message),
            StreamEvent::Done { outcome } => self.outcome = outcome,
        }
    }
}
