//! Chat service - admission-gated language model requests

use std::sync::Arc;

use crate::domain::ratelimit::{AdmissionContext, RateLimiter};
use crate::infrastructure::llm::{LLMError, LLMMessage, LLM};

pub const TOO_MANY_REQUESTS_REPLY: &str = "Too many requests to the model, please try again later :(";
pub const NO_CHOICE_REPLY: &str = "No answers available :(";
pub const EMPTY_USER_REPLY: &str = "Cannot send a request for a user without a username";
pub const EMPTY_MESSAGE_REPLY: &str = "Please send a non-empty message";
pub const TIMEOUT_REPLY: &str = "The model took too long to answer";

/// Forwards user text to the model once the rate limiter admits it
pub struct ChatService {
    llm: Arc<dyn LLM>,
    limiter: RateLimiter,
    system_prompt: Option<String>,
}

impl ChatService {
    pub fn new(llm: Arc<dyn LLM>, limiter: RateLimiter) -> Self {
        Self {
            llm,
            limiter,
            system_prompt: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: Option<String>) -> Self {
        self.system_prompt = prompt;
        self
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Ask the model to answer `content` on behalf of `user`.
    ///
    /// Expected refusals (missing user, empty text, rate limit, slow model,
    /// no choices) come back as reply text. Only unexpected provider
    /// failures are errors. An admitted request counts against the limits
    /// even if it then fails.
    pub async fn complete(&self, ctx: &AdmissionContext, user: &str, content: &str) -> Result<String, LLMError> {
        if user.is_empty() {
            return Ok(EMPTY_USER_REPLY.to_string());
        }
        let content = content.trim();
        if content.is_empty() {
            return Ok(EMPTY_MESSAGE_REPLY.to_string());
        }
        if !self.limiter.allow(ctx, user).await {
            return Ok(TOO_MANY_REQUESTS_REPLY.to_string());
        }

        tracing::info!(user, provider = self.llm.name(), "complete chat");

        let mut messages = Vec::with_capacity(2);
        if let Some(prompt) = &self.system_prompt {
            messages.push(LLMMessage::system(prompt.clone()));
        }
        messages.push(LLMMessage::user(content));

        match self.llm.chat(user, messages, None).await {
            Ok(response) => Ok(response.content.unwrap_or_else(|| NO_CHOICE_REPLY.to_string())),
            Err(LLMError::Timeout) => {
                tracing::error!(user, "chat completion timed out");
                Ok(TIMEOUT_REPLY.to_string())
            }
            Err(e) => {
                tracing::error!(user, "chat completion failed: {}", e);
                Err(e)
            }
        }
    }
}
