//! OpenAI Provider - Chat completions API

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::infrastructure::llm::{LLMConfig, LLMError, LLMMessage, LLMResponse, LLMResult, LLMUsage, LLM};

/// OpenAI provider
pub struct OpenAiProvider {
    api_key: String,
    client: Client,
    base_url: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(config: &LLMConfig) -> LLMResult<Self> {
        let api_key = config.api_key.clone().ok_or(LLMError::MissingApiKey)?;

        let mut builder = Client::builder().timeout(Duration::from_secs(config.request_timeout_seconds));
        if let Some(proxy) = &config.proxy_url {
            let proxy = reqwest::Proxy::all(proxy.as_str())
                .map_err(|e| LLMError::ConfigError(format!("invalid proxy url: {}", e)))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| LLMError::ConfigError(e.to_string()))?;

        Ok(Self {
            api_key,
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

/// API request structure
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<LLMMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<&'a str>,
}

/// API response structure
#[derive(Deserialize, Debug)]
struct ChatResponse {
    model: String,
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl From<ChatResponse> for LLMResponse {
    fn from(response: ChatResponse) -> Self {
        let choice = response.choices.into_iter().next();
        Self {
            content: choice.as_ref().map(|c| c.message.content.clone().unwrap_or_default()),
            model: response.model,
            usage: response.usage.map(|u| LLMUsage {
                prompt_tokens: Some(u.prompt_tokens),
                completion_tokens: Some(u.completion_tokens),
                total_tokens: Some(u.total_tokens),
            }),
            finish_reason: choice.and_then(|c| c.finish_reason),
        }
    }
}

fn map_send_error(e: reqwest::Error) -> LLMError {
    if e.is_timeout() {
        LLMError::Timeout
    } else {
        LLMError::NetworkError(e.to_string())
    }
}

#[async_trait]
impl LLM for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn chat(
        &self,
        user: &str,
        messages: Vec<LLMMessage>,
        model: Option<&str>,
    ) -> LLMResult<LLMResponse> {
        let request = ChatRequest {
            model: model.unwrap_or(&self.model),
            messages,
            user: (!user.is_empty()).then_some(user),
        };

        let response = self.client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(LLMError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LLMError::ApiError(format!("status: {}, body: {}", status, body)));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| if e.is_timeout() { LLMError::Timeout } else { LLMError::ParseError(e.to_string()) })?;

        Ok(chat_response.into())
    }
}
