use std::fmt;

/// A bot command token.
///
/// Commands are opaque, immutable strings compared by exact value. The
/// built-in set is fixed at compile time, see [`Command::builtin`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Command(String);

impl Command {
    pub const HELLO: &'static str = "hello";
    pub const ABOUT: &'static str = "about";
    pub const HELP: &'static str = "help";
    pub const GPT_MESSAGE: &'static str = "gpt_message";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The commands this bot understands, in menu order.
    pub fn builtin() -> Vec<Command> {
        [Self::HELLO, Self::ABOUT, Self::HELP, Self::GPT_MESSAGE]
            .into_iter()
            .map(Command::new)
            .collect()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short menu description; empty for commands outside the built-in set.
    pub fn description(&self) -> &'static str {
        match self.as_str() {
            Self::HELLO => "Say hello",
            Self::ABOUT => "Who to contact about the bot",
            Self::HELP => "List available commands",
            Self::GPT_MESSAGE => "Ask the language model a question",
            _ => "",
        }
    }

    /// Menu form of the command, e.g. `/help`.
    pub fn slash(&self) -> String {
        format!("/{}", self.0)
    }
}

impl AsRef<str> for Command {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for Command {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Command {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_commands_are_distinct() {
        let mut commands = Command::builtin();
        let len = commands.len();
        commands.sort();
        commands.dedup();
        assert_eq!(commands.len(), len);
    }

    #[test]
    fn test_slash_form() {
        assert_eq!(Command::new("help").slash(), "/help");
        assert_eq!(Command::new(Command::GPT_MESSAGE), "gpt_message");
    }
}
