//! Streaming chat-completions client with incremental tool-call assembly.

mod client;
mod config;
mod error;
mod event_stream;
mod providers;
mod session;
mod sse;
mod tag_filter;
mod tool_calls;
mod transport;
mod types;
mod validation;
mod wire;

pub use client::ChatClient;
pub use config::{
    ChatSettings, ClientConfig, DEFAULT_BASE_URL, DEFAULT_PROVIDER, DEFAULT_REQUEST_TIMEOUT_MS,
    ProviderConfig, default_config_path, load_chat_settings, parse_chat_settings,
};
pub use error::{ChatError, ChatErrorCode};
pub use event_stream::ChatEventStream;
pub use providers::{ChatProvider, ChatProviderRef, OpenAiCompletionsProvider};
pub use session::{ResponseKind, ResponseSession};
pub use sse::{DONE_SENTINEL, SseFrame, complete_lines_len, parse_new_frames};
pub use tag_filter::{DEFAULT_TOOL_BLOCK_CLOSE, DEFAULT_TOOL_BLOCK_OPEN, TagFilter, TagMarkers};
pub use tool_calls::{PendingToolCall, ToolCallAssembler};
pub use transport::{HttpTransport, Transport, TransportEvent, TransportHandle, TransportRequest};
pub use types::{
    ChatResponse, Message, Outcome, Role, StopReason, StreamEvent, ToolCallKind, ToolCallRecord,
    ToolSpec, Usage,
};
pub use validation::{validate_tool_arguments, validate_tool_call};
pub use wire::{FunctionDelta, ToolCallDelta};
