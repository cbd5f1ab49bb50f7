use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::tag_filter::TagMarkers;

pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 120_000;
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_PROVIDER: &str = "openai";
const DEFAULT_CONF_DIR_NAME: &str = ".pixy";

/// Settings handed to [`ChatClient`](crate::ChatClient) at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Logs every frame and response body at `debug` level.
    pub debug: bool,
    pub request_timeout: Option<Duration>,
    pub tool_block_markers: TagMarkers,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            debug: false,
            request_timeout: Some(Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS)),
            tool_block_markers: TagMarkers::tool_call_block(),
        }
    }
}

/// Connection settings for an OpenAI-compatible endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    pub provider: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub headers: HashMap<String, String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: DEFAULT_PROVIDER.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            headers: HashMap::new(),
            temperature: None,
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChatSettings {
    pub client: ClientConfig,
    pub provider: ProviderConfig,
    pub model: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct PixyChatTomlFile {
    #[serde(default)]
    chat: PixyChatTomlChat,
    #[serde(default)]
    provider: PixyChatTomlProvider,
}

#[derive(Debug, Deserialize, Default)]
struct PixyChatTomlChat {
    #[serde(default)]
    debug: Option<bool>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    request_timeout_ms: Option<u64>,
    #[serde(default)]
    tool_block_open: Option<String>,
    #[serde(default)]
    tool_block_close: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct PixyChatTomlProvider {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    temperature: Option<f64>,
    #[serde(default)]
    max_tokens: Option<u32>,
    #[serde(default)]
    headers: HashMap<String, String>,
}

pub fn default_config_path() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_CONF_DIR_NAME)
        .join("chat.toml")
}

pub fn load_chat_settings(path: &Path) -> Result<ChatSettings, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|error| format!("read {} failed: {error}", path.display()))?;
    parse_chat_settings(&content)
}

pub fn parse_chat_settings(content: &str) -> Result<ChatSettings, String> {
    let parsed: PixyChatTomlFile =
        toml::from_str(content).map_err(|error| format!("parse chat.toml failed: {error}"))?;

    let defaults = ClientConfig::default();
    let request_timeout = match parsed.chat.request_timeout_ms {
        Some(0) => None,
        Some(millis) => Some(Duration::from_millis(millis)),
        None => defaults.request_timeout,
    };
    let tool_block_markers = match (parsed.chat.tool_block_open, parsed.chat.tool_block_close) {
        (None, None) => defaults.tool_block_markers,
        (Some(open), Some(close)) => {
            if open.is_empty() || close.is_empty() {
                return Err("chat.tool_block_open/close must not be empty".to_string());
            }
            TagMarkers::new(open, close)
        }
        _ => {
            return Err(
                "chat.tool_block_open and chat.tool_block_close must be set together".to_string(),
            );
        }
    };

    let provider_defaults = ProviderConfig::default();
    let provider = ProviderConfig {
        provider: non_empty(parsed.provider.name).unwrap_or(provider_defaults.provider),
        base_url: non_empty(parsed.provider.base_url).unwrap_or(provider_defaults.base_url),
        api_key: non_empty(parsed.provider.api_key),
        headers: parsed.provider.headers,
        temperature: parsed.provider.temperature,
        max_tokens: parsed.provider.max_tokens,
    };

    Ok(ChatSettings {
        client: ClientConfig {
            debug: parsed.chat.debug.unwrap_or(defaults.debug),
            request_timeout,
            tool_block_markers,
        },
        provider,
        model: non_empty(parsed.chat.model),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let settings = parse_chat_settings("").expect("parse empty config");
        assert_eq!(settings.client, ClientConfig::default());
        assert_eq!(settings.provider, ProviderConfig::default());
        assert_eq!(settings.model, None);
    }

    #[test]
    fn full_document_is_applied() {
        let settings = parse_chat_settings(
            r#"
[chat]
debug = true
model = "gpt-4o-mini"
request_timeout_ms = 5000
tool_block_open = "<function_call>"
tool_block_close = "</function_call>"

[provider]
name = "deepseek"
base_url = "http://127.0.0.1:8080/v1"
api_key = " sk-test "
temperature = 0.2
max_tokens = 256

[provider.headers]
"X-Trace" = "1"
"#,
        )
        .expect("parse config");

        assert!(settings.client.debug);
        assert_eq!(settings.client.request_timeout, Some(Duration::from_secs(5)));
        assert_eq!(
            settings.client.tool_block_markers,
            TagMarkers::new("<function_call>", "</function_call>")
        );
        assert_eq!(settings.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(settings.provider.provider, "deepseek");
        assert_eq!(settings.provider.base_url, "http://127.0.0.1:8080/v1");
        assert_eq!(settings.provider.api_key.as_deref(), Some("sk-test"));
        assert_eq!(settings.provider.temperature, Some(0.2));
        assert_eq!(settings.provider.max_tokens, Some(256));
        assert_eq!(
            settings.provider.headers.get("X-Trace").map(String::as_str),
            Some("1")
        );
    }

    #[test]
    fn zero_timeout_disables_the_bound() {
        let settings =
            parse_chat_settings("[chat]\nrequest_timeout_ms = 0\n").expect("parse config");
        assert_eq!(settings.client.request_timeout, None);
    }

    #[test]
    fn half_configured_markers_are_rejected() {
        let error = parse_chat_settings("[chat]\ntool_block_open = \"<x>\"\n")
            .expect_err("unpaired marker should fail");
        assert!(error.contains("set together"));
    }

    #[test]
    fn invalid_toml_reports_parse_error() {
        let error = parse_chat_settings("[chat\n").expect_err("invalid toml should fail");
        assert!(error.starts_with("parse chat.toml failed"));
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("chat.toml");
        std::fs::write(&path, "[chat]\nmodel = \"m\"\n").expect("write config");

        let settings = load_chat_settings(&path).expect("load config");
        assert_eq!(settings.model.as_deref(), Some("m"));

        let missing = load_chat_settings(&dir.path().join("missing.toml"));
        assert!(missing.is_err());
    }
}
