use serde_json::{Value, json};
use tracing::info;

use super::ChatProvider;
use super::common::{join_url, resolve_api_key};
use crate::config::ProviderConfig;
use crate::error::{ChatError, ChatErrorCode};
use crate::transport::TransportRequest;
use crate::types::{Message, Role, ToolCallRecord, ToolSpec};

/// `POST <base_url>/chat/completions` with bearer authentication.
#[derive(Debug, Clone)]
pub struct OpenAiCompletionsProvider {
    config: ProviderConfig,
}

impl OpenAiCompletionsProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

impl ChatProvider for OpenAiCompletionsProvider {
    fn build_request(
        &self,
        messages: &[Message],
        model_id: &str,
        tools: &[ToolSpec],
    ) -> Result<TransportRequest, ChatError> {
        if self.config.base_url.trim().is_empty() {
            return Err(ChatError::new(
                ChatErrorCode::ProviderConfig,
                format!("Missing base URL for provider '{}'", self.config.provider),
            ));
        }
        if model_id.trim().is_empty() {
            return Err(ChatError::new(
                ChatErrorCode::ProviderConfig,
                "Missing model id",
            ));
        }
        let api_key = resolve_api_key(&self.config.provider, self.config.api_key.as_deref())?;

        let payload = build_openai_payload(&self.config, messages, model_id, tools);
        let url = join_url(&self.config.base_url, "chat/completions");
        info!(url = %url, model = model_id, messages = messages.len(), tools = tools.len(), "built chat completions request");

        let mut headers = vec![
            ("Authorization".to_string(), format!("Bearer {api_key}")),
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Accept".to_string(), "text/event-stream".to_string()),
        ];
        let mut extra = self.config.headers.iter().collect::<Vec<_>>();
        extra.sort();
        for (name, value) in extra {
            headers.push((name.clone(), value.clone()));
        }

        Ok(TransportRequest {
            url,
            headers,
            body: payload,
            timeout: None,
        })
    }
}

fn build_openai_payload(
    config: &ProviderConfig,
    messages: &[Message],
    model_id: &str,
    tools: &[ToolSpec],
) -> Value {
    let mut payload = json!({
        "model": model_id,
        "stream": true,
        "stream_options": { "include_usage": true },
        "messages": convert_messages(messages),
    });

    if let Some(max_tokens) = config.max_tokens {
        payload["max_tokens"] = json!(max_tokens);
    }
    if let Some(temperature) = config.temperature {
        payload["temperature"] = json!(temperature);
    }
    if !tools.is_empty() {
        payload["tools"] = convert_tools(tools);
    }

    payload
}

fn convert_messages(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|message| match message.role {
            Role::System => json!({
                "role": "system",
                "content": message.content,
            }),
            Role::User => json!({
                "role": "user",
                "content": message.content,
            }),
            Role::Assistant => {
                let mut assistant = json!({
                    "role": "assistant",
                    "content": if message.content.is_empty() { Value::Null } else { Value::String(message.content.clone()) },
                });
                if !message.tool_calls.is_empty() {
                    assistant["tool_calls"] =
                        Value::Array(message.tool_calls.iter().map(convert_tool_call).collect());
                }
                assistant
            }
            Role::Tool => json!({
                "role": "tool",
                "tool_call_id": message.tool_call_id.clone().unwrap_or_default(),
                "content": if message.content.is_empty() { "(no text result)" } else { message.content.as_str() },
            }),
        })
        .collect()
}

fn convert_tool_call(call: &ToolCallRecord) -> Value {
    let arguments = if call.raw_arguments.trim().is_empty() {
        call.arguments.to_string()
    } else {
        call.raw_arguments.clone()
    };
    json!({
        "id": call.id,
        "type": "function",
        "function": {
            "name": call.name,
            "arguments": arguments,
        }
    })
}

fn convert_tools(tools: &[ToolSpec]) -> Value {
    Value::Array(
        tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters,
                    }
                })
            })
            .collect(),
    )
}
