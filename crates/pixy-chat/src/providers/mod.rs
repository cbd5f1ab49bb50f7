use std::sync::Arc;

use crate::error::ChatError;
use crate::transport::TransportRequest;
use crate::types::{Message, ToolSpec};

mod common;
mod openai_completions;

pub use openai_completions::OpenAiCompletionsProvider;

/// Provider-specific request construction and error translation.
pub trait ChatProvider: Send + Sync {
    /// Builds the transport request. An `Err` is a pre-flight failure
    /// (missing credential, bad configuration) and no I/O is attempted.
    fn build_request(
        &self,
        messages: &[Message],
        model_id: &str,
        tools: &[ToolSpec],
    ) -> Result<TransportRequest, ChatError>;

    /// Turns a non-success response into a user-facing message. `None`
    /// falls back to generic extraction from the body.
    fn translate_error(&self, _status: Option<u16>, _body: &str) -> Option<String> {
        None
    }
}

pub type ChatProviderRef = Arc<dyn ChatProvider>;
