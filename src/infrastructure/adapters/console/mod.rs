//! Console adapter for development/testing

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

use crate::application::errors::BotError;
use crate::application::messaging::MessageParser;
use crate::domain::entities::{Message, User};
use crate::domain::traits::{Bot, BotInfo};

const CONSOLE_CHAT: &str = "console";

/// Console bot adapter for local development.
///
/// Every line read from stdin is one message from `user`.
pub struct ConsoleAdapter {
    info: BotInfo,
    user: User,
    parser: MessageParser,
    lines: Mutex<Lines<BufReader<Stdin>>>,
}

impl ConsoleAdapter {
    pub fn new(prefix: &str, username: impl Into<String>) -> Self {
        let username = username.into();
        Self {
            info: BotInfo {
                id: "console".to_string(),
                name: "ole-bot".to_string(),
                username: "console".to_string(),
            },
            user: User::new(username.clone()).with_username(username),
            parser: MessageParser::new(prefix),
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }
}

#[async_trait]
impl Bot for ConsoleAdapter {
    async fn start(&self) -> Result<(), BotError> {
        tracing::info!("Starting console bot (dev mode) as @{}", self.user.identity());
        Ok(())
    }

    async fn receive(&self) -> Result<Vec<Message>, BotError> {
        let line = self
            .lines
            .lock()
            .await
            .next_line()
            .await
            .map_err(|e| BotError::Internal(format!("Failed to read stdin: {}", e)))?;

        match line {
            Some(text) => Ok(vec![self
                .parser
                .parse(CONSOLE_CHAT, text, Some(self.user.clone()))
                .with_platform("console")]),
            None => Err(BotError::Disconnected),
        }
    }

    async fn send_message(&self, _chat_id: &str, text: &str, _reply_to: Option<&str>) -> Result<String, BotError> {
        println!("[BOT] {}", text);
        Ok("console_msg".to_string())
    }

    fn bot_info(&self) -> BotInfo {
        self.info.clone()
    }
}
