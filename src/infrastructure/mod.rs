//! Infrastructure layer - External concerns
//! 
//! This layer contains:
//! - Config: Configuration loading
//! - LLM: Language model providers
//! - Adapters: Platform integrations (Telegram, console)

pub mod config;
pub mod llm;
pub mod adapters;
