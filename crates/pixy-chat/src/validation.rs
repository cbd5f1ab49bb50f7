use jsonschema::JSONSchema;
use serde_json::{Value, json};

use crate::error::{ChatError, ChatErrorCode};
use crate::types::{ToolCallRecord, ToolSpec};

/// Checks a finalized call against the schema of the tool it names and
/// returns its decoded arguments.
pub fn validate_tool_call(tools: &[ToolSpec], call: &ToolCallRecord) -> Result<Value, ChatError> {
    if call.is_malformed() {
        return Err(ChatError::new(
            ChatErrorCode::ToolNotFound,
            "Tool call did not name a function",
        )
        .with_details(json!({
            "toolCallId": call.id,
            "rawArguments": call.raw_arguments,
        })));
    }

    let Some(tool) = tools.iter().find(|tool| tool.name == call.name) else {
        let available = tools
            .iter()
            .map(|tool| tool.name.clone())
            .collect::<Vec<_>>();
        return Err(ChatError::new(
            ChatErrorCode::ToolNotFound,
            format!("Tool '{}' not found", call.name),
        )
        .with_details(json!({
            "toolName": call.name,
            "availableTools": available,
        })));
    };

    validate_tool_arguments(tool, call)
}

pub fn validate_tool_arguments(tool: &ToolSpec, call: &ToolCallRecord) -> Result<Value, ChatError> {
    let compiled = JSONSchema::compile(&tool.parameters).map_err(|error| {
        ChatError::new(
            ChatErrorCode::SchemaInvalid,
            format!("Invalid JSON schema for tool '{}': {error}", tool.name),
        )
        .with_details(json!({
            "toolName": tool.name,
        }))
    })?;

    if let Err(errors) = compiled.validate(&call.arguments) {
        let validation_errors = errors
            .map(|error| {
                json!({
                    "path": error.instance_path.to_string(),
                    "message": error.to_string(),
                })
            })
            .collect::<Vec<_>>();

        return Err(ChatError::new(
            ChatErrorCode::ToolArgumentsInvalid,
            format!("Validation failed for tool '{}'", tool.name),
        )
        .with_details(json!({
            "toolName": tool.name,
            "toolCallId": call.id,
            "arguments": call.arguments,
            "rawArguments": call.raw_arguments,
            "validationErrors": validation_errors,
        })));
    }

    Ok(call.arguments.clone())
}
