use async_trait::async_trait;
use crate::domain::entities::Message;
use crate::application::errors::BotError;

/// Bot trait - abstraction for messaging platform adapters
#[async_trait]
pub trait Bot: Send + Sync {
    /// Authenticate against the platform and fetch bot info
    async fn start(&self) -> Result<(), BotError>;

    /// Wait for the next batch of inbound messages.
    ///
    /// An empty batch means the poll timed out. `BotError::Disconnected`
    /// means no further messages will arrive.
    async fn receive(&self) -> Result<Vec<Message>, BotError>;

    /// Send a message to a chat, optionally as a reply to `reply_to`
    async fn send_message(&self, chat_id: &str, text: &str, reply_to: Option<&str>) -> Result<String, BotError>;

    /// Get bot info
    fn bot_info(&self) -> BotInfo;
}

/// Bot information
#[derive(Debug, Clone)]
pub struct BotInfo {
    pub id: String,
    pub name: String,
    pub username: String,
}

impl BotInfo {
    /// Whether a `/command@mention` suffix addresses this bot.
    pub fn is_addressed(&self, mention: Option<&str>) -> bool {
        mention.map_or(true, |m| m.eq_ignore_ascii_case(&self.username))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_addressed() {
        let info = BotInfo {
            id: "1".to_string(),
            name: "ole-bot".to_string(),
            username: "ole_bot".to_string(),
        };

        assert!(info.is_addressed(None));
        assert!(info.is_addressed(Some("Ole_Bot")));
        assert!(!info.is_addressed(Some("other_bot")));
    }
}
