use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::application::errors::BotError;
use crate::application::messaging::EventDispatcher;
use crate::domain::entities::{Content, Message};
use crate::domain::traits::Bot;

const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Service for receiving messages and sending replies
pub struct MessageService<B: Bot> {
    bot: B,
    dispatcher: Arc<EventDispatcher>,
}

impl<B: Bot> MessageService<B> {
    pub fn new(bot: B, dispatcher: Arc<EventDispatcher>) -> Self {
        Self { bot, dispatcher }
    }

    pub fn bot(&self) -> &B {
        &self.bot
    }

    /// Receive and answer messages until `shutdown` fires or the platform
    /// disconnects.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), BotError> {
        self.bot.start().await?;
        tracing::info!("Bot started: @{}", self.bot.bot_info().username);

        loop {
            let received = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                received = self.bot.receive() => received,
            };

            match received {
                Ok(messages) => {
                    for message in messages {
                        self.process(&message).await;
                    }
                }
                Err(BotError::Disconnected) => {
                    tracing::info!("Platform connection closed");
                    break;
                }
                Err(e) => {
                    tracing::error!("Failed to get updates: {}", e);
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(RETRY_DELAY) => {}
                    }
                }
            }
        }

        tracing::info!("Stopped receiving updates");
        Ok(())
    }

    /// Dispatch one message and send its reply, if any
    pub async fn process(&self, message: &Message) -> Option<String> {
        if let Content::Command { mention, .. } = &message.content {
            if !self.bot.bot_info().is_addressed(mention.as_deref()) {
                tracing::debug!("Ignoring command addressed to @{:?}", mention);
                return None;
            }
        }

        let sender = message.sender.as_ref().map(|u| u.display_name()).unwrap_or_default();
        tracing::info!(chat_id = %message.chat_id, "[{}] {:?}", sender, message.content);

        let reply = self.dispatcher.dispatch(message).await;
        if reply.is_empty() {
            return None;
        }

        match self.bot.send_message(&message.chat_id, &reply, Some(&message.id)).await {
            Ok(_) => {
                let latency = chrono::Utc::now() - message.timestamp;
                tracing::debug!(chat_id = %message.chat_id, latency_ms = latency.num_milliseconds(), "reply sent");
            }
            Err(e) => tracing::error!("Failed to send message to chat {}: {}", message.chat_id, e),
        }
        Some(reply)
    }
}
