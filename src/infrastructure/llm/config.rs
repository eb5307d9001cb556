//! LLM Configuration

use serde::{Deserialize, Serialize};

use crate::application::errors::ConfigError;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// LLM Configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct LLMConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    /// Route API traffic through this proxy
    pub proxy_url: Option<String>,
    pub request_timeout_seconds: u64,
    pub system_prompt: Option<String>,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            proxy_url: None,
            request_timeout_seconds: 10,
            system_prompt: None,
        }
    }
}

impl LLMConfig {
    /// Apply environment overrides
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.api_key = Some(key);
        }
        if let Ok(model) = std::env::var("OPENAI_MODEL") {
            self.model = model;
        }
        if let Ok(proxy) = std::env::var("OPENAI_PROXY_URL") {
            self.proxy_url = Some(proxy);
        }
        if let Ok(prompt) = std::env::var("LLM_SYSTEM_PROMPT") {
            self.system_prompt = Some(prompt);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(proxy) = &self.proxy_url {
            reqwest::Proxy::all(proxy.as_str())
                .map_err(|e| ConfigError::InvalidValue(format!("llm.proxy-url: {}", e)))?;
        }
        if self.request_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "llm.request-timeout-seconds must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
