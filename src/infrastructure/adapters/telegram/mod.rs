//! Telegram adapter

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use crate::application::errors::BotError;
use crate::application::messaging::MessageParser;
use crate::domain::entities::{self, Command};
use crate::domain::traits::{Bot, BotInfo};

/// Telegram API base URL
const API_BASE: &str = "https://api.telegram.org";

/// Slack on top of the long-poll timeout before the HTTP request gives up
const POLL_GRACE: Duration = Duration::from_secs(10);

/// Telegram update type
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Message {
    pub message_id: i64,
    /// Unix time in seconds
    #[serde(default)]
    pub date: i64,
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct User {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Chat {
    pub id: i64,
}

/// Envelope of every Bot API response
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

impl From<User> for entities::User {
    fn from(user: User) -> Self {
        let mut converted = entities::User::new(user.id.to_string());
        converted.username = user.username;
        converted.first_name = user.first_name;
        converted
    }
}

/// Telegram bot adapter using long polling
pub struct TelegramAdapter {
    token: String,
    client: Client,
    parser: MessageParser,
    info: RwLock<BotInfo>,
    offset: AtomicI64,
    poll_timeout: Duration,
    debug: bool,
}

impl TelegramAdapter {
    pub fn new(token: impl Into<String>, prefix: &str, poll_timeout: Duration) -> Result<Self, BotError> {
        let client = Client::builder()
            .timeout(poll_timeout + POLL_GRACE)
            .build()
            .map_err(|e| BotError::Network(e.to_string()))?;

        Ok(Self {
            token: token.into(),
            client,
            parser: MessageParser::new(prefix),
            info: RwLock::new(BotInfo {
                id: "unknown".to_string(),
                name: "ole-bot".to_string(),
                username: "ole_bot".to_string(),
            }),
            offset: AtomicI64::new(0),
            poll_timeout,
            debug: false,
        })
    }

    /// Log every raw update received
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Get the API URL for a method
    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", API_BASE, self.token, method)
    }

    /// Call a Bot API method and unwrap its response envelope
    async fn call<R: Serialize + ?Sized, T: DeserializeOwned>(&self, method: &str, request: &R) -> Result<T, BotError> {
        let response = self.client
            .post(self.api_url(method))
            .json(request)
            .send()
            .await
            .map_err(|e| BotError::Network(e.to_string()))?;

        let status = response.status();
        let data: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| BotError::Parse(e.to_string()))?;

        if !data.ok {
            let description = data.description.unwrap_or_else(|| status.to_string());
            if status == reqwest::StatusCode::UNAUTHORIZED {
                return Err(BotError::Auth(description));
            }
            return Err(BotError::Network(format!("Telegram API error in {}: {}", method, description)));
        }

        data.result
            .ok_or_else(|| BotError::Parse(format!("{} returned no result", method)))
    }

    /// Fetch bot info from Telegram API
    pub async fn fetch_bot_info(&self) -> Result<BotInfo, BotError> {
        #[derive(Deserialize)]
        struct BotInfoResponse {
            id: i64,
            first_name: String,
            username: String,
        }

        let me: BotInfoResponse = self.call("getMe", &serde_json::json!({})).await?;
        let info = BotInfo {
            id: me.id.to_string(),
            name: me.first_name,
            username: me.username,
        };
        *self.info.write().unwrap_or_else(PoisonError::into_inner) = info.clone();
        Ok(info)
    }

    /// Get updates from Telegram using getUpdates API
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, BotError> {
        #[derive(Serialize)]
        struct GetUpdatesRequest {
            offset: i64,
            timeout: u64,
            allowed_updates: Vec<&'static str>,
        }

        let request = GetUpdatesRequest {
            offset,
            timeout: self.poll_timeout.as_secs(),
            allowed_updates: vec!["message"],
        };

        self.call("getUpdates", &request).await
    }

    /// Get the next update offset
    pub fn get_next_offset(updates: &[Update]) -> Option<i64> {
        updates.iter().map(|u| u.update_id + 1).max()
    }

    /// Convert a Telegram message into a parsed domain message
    fn to_message(&self, message: Message) -> Option<entities::Message> {
        let text = message.text?;
        let mut parsed = self
            .parser
            .parse(message.chat.id.to_string(), text, message.from.map(Into::into))
            .with_id(message.message_id.to_string())
            .with_platform("telegram");
        if message.date > 0 {
            if let Some(sent_at) = chrono::DateTime::from_timestamp(message.date, 0) {
                parsed = parsed.with_timestamp(sent_at);
            }
        }
        Some(parsed)
    }

    /// Register the command menu with Telegram
    pub async fn register_commands(&self, commands: &[Command]) -> Result<(), BotError> {
        #[derive(Serialize)]
        struct BotCommand<'a> {
            command: &'a str,
            description: &'a str,
        }

        #[derive(Serialize)]
        struct SetMyCommandsRequest<'a> {
            commands: Vec<BotCommand<'a>>,
        }

        let request = SetMyCommandsRequest {
            commands: commands
                .iter()
                .map(|c| BotCommand {
                    command: c.as_str(),
                    description: c.description(),
                })
                .collect(),
        };

        let _: bool = self.call("setMyCommands", &request).await?;
        tracing::info!("Registered {} bot commands with Telegram", commands.len());
        Ok(())
    }
}

#[async_trait]
impl Bot for TelegramAdapter {
    async fn start(&self) -> Result<(), BotError> {
        let info = self.fetch_bot_info().await?;
        tracing::info!("Authorized on account @{}", info.username);
        Ok(())
    }

    async fn receive(&self) -> Result<Vec<entities::Message>, BotError> {
        let updates = self.get_updates(self.offset.load(Ordering::Acquire)).await?;
        if self.debug && !updates.is_empty() {
            tracing::info!("Raw updates: {:?}", updates);
        }
        if let Some(next) = Self::get_next_offset(&updates) {
            self.offset.store(next, Ordering::Release);
        }

        let mut messages = Vec::with_capacity(updates.len());
        for update in updates {
            match update.message {
                Some(message) => messages.extend(self.to_message(message)),
                None => tracing::warn!(update_id = update.update_id, "got update without a message"),
            }
        }
        Ok(messages)
    }

    async fn send_message(&self, chat_id: &str, text: &str, reply_to: Option<&str>) -> Result<String, BotError> {
        #[derive(Serialize)]
        struct SendMessageRequest<'a> {
            chat_id: &'a str,
            text: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            reply_to_message_id: Option<i64>,
        }

        #[derive(Deserialize)]
        struct MessageResult {
            message_id: i64,
        }

        tracing::debug!("Sending to {}: {}", chat_id, text);
        let request = SendMessageRequest {
            chat_id,
            text,
            reply_to_message_id: reply_to.and_then(|id| id.parse().ok()),
        };

        let result: MessageResult = self.call("sendMessage", &request).await?;
        Ok(result.message_id.to_string())
    }

    fn bot_info(&self) -> BotInfo {
        self.info.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Content;

    fn adapter() -> TelegramAdapter {
        TelegramAdapter::new("123:abc", "/", Duration::from_secs(60)).unwrap()
    }

    #[test]
    fn test_api_url() {
        assert_eq!(adapter().api_url("getMe"), "https://api.telegram.org/bot123:abc/getMe");
    }

    #[test]
    fn test_next_offset() {
        let raw = r#"[{"update_id": 7}, {"update_id": 9, "message": {"message_id": 1, "chat": {"id": 5}, "text": "/help"}}]"#;
        let updates: Vec<Update> = serde_json::from_str(raw).unwrap();

        assert_eq!(TelegramAdapter::get_next_offset(&updates), Some(10));
        assert_eq!(TelegramAdapter::get_next_offset(&[]), None);
    }

    #[test]
    fn test_to_message_parses_command_and_sender() {
        let raw = r#"{
            "message_id": 42,
            "date": 1700000000,
            "from": {"id": 7, "username": "olef", "first_name": "Ole"},
            "chat": {"id": -100},
            "text": "/gpt_message@ole_bot how are you"
        }"#;
        let message: Message = serde_json::from_str(raw).unwrap();
        let parsed = adapter().to_message(message).unwrap();

        assert_eq!(parsed.id, "42");
        assert_eq!(parsed.chat_id, "-100");
        assert_eq!(parsed.identity(), "olef");
        assert_eq!(parsed.timestamp.timestamp(), 1_700_000_000);
        assert_eq!(
            parsed.content,
            Content::Command {
                name: "gpt_message".to_string(),
                mention: Some("ole_bot".to_string()),
                arguments: "how are you".to_string(),
            }
        );
    }

    #[test]
    fn test_messages_without_text_are_skipped() {
        let raw = r#"{"message_id": 1, "chat": {"id": 5}}"#;
        let message: Message = serde_json::from_str(raw).unwrap();

        assert!(adapter().to_message(message).is_none());
    }

    #[test]
    fn test_error_envelope() {
        let raw = r#"{"ok": false, "description": "Unauthorized"}"#;
        let response: ApiResponse<bool> = serde_json::from_str(raw).unwrap();

        assert!(!response.ok);
        assert_eq!(response.description.as_deref(), Some("Unauthorized"));
        assert!(response.result.is_none());
    }
}
