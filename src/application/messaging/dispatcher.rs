//! Event dispatcher - Resolves commands and produces replies

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::application::errors::ResolverError;
use crate::application::services::ChatService;
use crate::domain::entities::{Command, Content, Message};
use crate::domain::ratelimit::AdmissionContext;
use crate::domain::resolver::{CommandResolver, Resolution};
use crate::infrastructure::llm::LLMError;

pub const HELLO_REPLY: &str = "Well, hello there.";
pub const UNEXPECTED_COMMAND_REPLY: &str = "I don't understand this command :(";
pub const CHAT_DISABLED_REPLY: &str = "The language model is not configured";

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

fn clarify_command_reply(candidates: &[Command]) -> String {
    let similar: Vec<String> = candidates.iter().map(Command::slash).collect();
    format!("Perhaps you meant one of these: {}", similar.join(", "))
}

fn help_reply(commands: &[Command]) -> String {
    let list: Vec<String> = commands.iter().map(Command::slash).collect();
    format!("Available commands:\n{}", list.join("\n"))
}

fn chat_error_reply(err: &LLMError) -> String {
    format!("Failed to send the message\n({})", err)
}

/// Routes parsed messages to command handlers.
///
/// Commands are looked up through a [`CommandResolver`], so typos get a
/// list of suggestions instead of a silent failure.
pub struct EventDispatcher {
    resolver: CommandResolver,
    help: String,
    about: String,
    chat: Option<ChatService>,
    timeout: Duration,
    shutdown: CancellationToken,
}

impl EventDispatcher {
    /// Build the dispatcher and its command index. Fails only when the
    /// index cannot be built.
    pub fn new(commands: Vec<Command>) -> Result<Self, ResolverError> {
        let help = help_reply(&commands);
        let resolver = CommandResolver::new(commands)?;

        Ok(Self {
            resolver,
            help,
            about: String::new(),
            chat: None,
            timeout: DEFAULT_TIMEOUT,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn with_about(mut self, about: impl Into<String>) -> Self {
        self.about = about.into();
        self
    }

    pub fn with_chat(mut self, chat: ChatService) -> Self {
        self.chat = Some(chat);
        self
    }

    /// Deadline for admitting a single message
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Pending admission waits end when `shutdown` fires
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn resolver(&self) -> &CommandResolver {
        &self.resolver
    }

    pub fn chat(&self) -> Option<&ChatService> {
        self.chat.as_ref()
    }

    /// Produce the reply to `message`; empty for anything but commands.
    pub async fn dispatch(&self, message: &Message) -> String {
        let Content::Command { name, arguments, .. } = &message.content else {
            return String::new();
        };

        let ctx = AdmissionContext::new(self.shutdown.child_token()).with_timeout(self.timeout);
        self.handle_command(&ctx, message.identity(), name, arguments).await
    }

    async fn handle_command(&self, ctx: &AdmissionContext, user: &str, name: &str, arguments: &str) -> String {
        let resolution = self.resolver.resolve(name);
        let Some(command) = resolution.command() else {
            return Self::inexact_reply(&resolution);
        };

        match command.as_str() {
            Command::HELLO => HELLO_REPLY.to_string(),
            Command::ABOUT => self.about.clone(),
            Command::HELP => self.help.clone(),
            Command::GPT_MESSAGE => match &self.chat {
                Some(chat) => chat
                    .complete(ctx, user, arguments)
                    .await
                    .unwrap_or_else(|e| chat_error_reply(&e)),
                None => CHAT_DISABLED_REPLY.to_string(),
            },
            other => {
                tracing::debug!("No handler for command /{}", other);
                String::new()
            }
        }
    }

    fn inexact_reply(resolution: &Resolution) -> String {
        if resolution.is_empty() {
            UNEXPECTED_COMMAND_REPLY.to_string()
        } else {
            clarify_command_reply(&resolution.candidates)
        }
    }
}
