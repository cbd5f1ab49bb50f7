use std::env;

use crate::error::{ChatError, ChatErrorCode};

pub(super) fn join_url(base_url: &str, path: &str) -> String {
    if base_url.ends_with('/') {
        format!("{base_url}{path}")
    } else {
        format!("{base_url}/{path}")
    }
}

/// Explicit key first, then `<PROVIDER>_API_KEY`, then `OPENAI_API_KEY`.
pub(super) fn resolve_api_key(provider: &str, explicit: Option<&str>) -> Result<String, ChatError> {
    if let Some(api_key) = explicit.filter(|value| !value.trim().is_empty()) {
        return Ok(api_key.to_string());
    }

    let provider_env = provider_env_var(provider);
    if let Ok(value) = env::var(&provider_env) {
        if !value.trim().is_empty() {
            return Ok(value);
        }
    }

    if let Ok(value) = env::var("OPENAI_API_KEY") {
        if !value.trim().is_empty() {
            return Ok(value);
        }
    }

    Err(ChatError::new(
        ChatErrorCode::ProviderAuthMissing,
        format!(
            "Missing API key for provider '{provider}'. Set `api_key` in the provider config or export {provider_env} / OPENAI_API_KEY."
        ),
    ))
}

fn provider_env_var(provider: &str) -> String {
    format!("{}_API_KEY", provider.to_uppercase().replace('-', "_"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_handles_trailing_slash() {
        assert_eq!(
            join_url("https://api.openai.com/v1", "chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            join_url("https://api.openai.com/v1/", "chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn explicit_key_wins_over_environment() {
        let key = resolve_api_key("pixy-chat-test-explicit", Some("sk-explicit"))
            .expect("explicit key resolves");
        assert_eq!(key, "sk-explicit");
    }

    #[test]
    fn provider_env_var_is_upper_snake_case() {
        assert_eq!(provider_env_var("open-router"), "OPEN_ROUTER_API_KEY");
    }
}
