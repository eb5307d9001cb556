//! Message parser - Parses raw messages into structured messages

use once_cell::sync::Lazy;
use regex_lite::Regex;

use crate::domain::entities::{Content, Message, User};

/// `name[@mention] [arguments]`, after the prefix is removed
static COMMAND_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^([^\s@]*)(?:@(\S*))?(?:\s+(.*))?$").expect("command pattern is valid")
});

/// Parses incoming messages into structured Message objects
pub struct MessageParser {
    command_prefix: String,
}

impl MessageParser {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            command_prefix: prefix.into(),
        }
    }

    /// Parse a text message
    pub fn parse(&self, chat_id: impl Into<String>, text: impl Into<String>, sender: Option<User>) -> Message {
        let text = text.into();

        let content = match text.strip_prefix(self.command_prefix.as_str()) {
            Some(rest) => Self::parse_command(rest),
            None if text.trim().is_empty() => Content::Empty,
            None => Content::Text(text),
        };

        Message::new(chat_id, content).with_sender_opt(sender)
    }

    /// Split `name@mention arguments` into its parts
    fn parse_command(rest: &str) -> Content {
        let Some(caps) = COMMAND_RE.captures(rest) else {
            return Content::Text(rest.to_string());
        };

        let name = caps.get(1).map_or("", |m| m.as_str()).to_string();
        let mention = caps
            .get(2)
            .map(|m| m.as_str())
            .filter(|m| !m.is_empty())
            .map(str::to_string);
        let arguments = caps.get(3).map_or("", |m| m.as_str()).to_string();

        Content::Command { name, mention, arguments }
    }
}
