use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatErrorCode {
    ToolNotFound,
    ToolArgumentsInvalid,
    SchemaInvalid,
    ProviderAuthMissing,
    ProviderConfig,
    ProviderHttp,
    ProviderTransport,
    ProviderProtocol,
    RuntimeUnavailable,
}

impl ChatErrorCode {
    /// Errors raised before any I/O is attempted.
    pub fn is_pre_flight(&self) -> bool {
        matches!(
            self,
            ChatErrorCode::ProviderAuthMissing
                | ChatErrorCode::ProviderConfig
                | ChatErrorCode::RuntimeUnavailable
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatError {
    pub code: ChatErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ChatError {
    pub fn new(code: ChatErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn as_compact_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                "{{\"code\":\"provider_protocol\",\"message\":\"{}\"}}",
                self.message.replace('\"', "\\\"")
            )
        })
    }
}

impl Display for ChatError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for ChatError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn compact_json_uses_snake_case_codes_and_skips_empty_details() {
        let error = ChatError::new(ChatErrorCode::ProviderAuthMissing, "no key");
        assert_eq!(
            error.as_compact_json(),
            r#"{"code":"provider_auth_missing","message":"no key"}"#
        );

        let detailed = error.with_details(json!({ "provider": "openai" }));
        assert!(detailed.as_compact_json().contains("\"details\""));
    }

    #[test]
    fn pre_flight_codes_are_distinguished_from_runtime_failures() {
        assert!(ChatErrorCode::ProviderAuthMissing.is_pre_flight());
        assert!(ChatErrorCode::RuntimeUnavailable.is_pre_flight());
        assert!(!ChatErrorCode::ProviderTransport.is_pre_flight());
        assert!(!ChatErrorCode::ProviderHttp.is_pre_flight());
    }
}
