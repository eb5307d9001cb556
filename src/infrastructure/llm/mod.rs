//! LLM integration - Chat completion providers

pub mod traits;
pub mod config;
pub mod providers;

pub use traits::{LLM, LLMMessage, LLMResponse, LLMError, LLMResult, LLMUsage};
pub use config::LLMConfig;
pub use providers::OpenAiProvider;
