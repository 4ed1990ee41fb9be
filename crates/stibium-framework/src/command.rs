//! Prefix commands.
//!
//! A [`CommandHandler`] reacts to messages of the form
//! `<prefix>[ ]<command>[ <args>]`, matched case-insensitively. The pattern is
//! compiled in `setup`, once the owning bot's prefix is known.
//!
//! # Example
//!
//! ```rust,ignore
//! use stibium_framework::{Command, CommandHandler};
//!
//! // "%echo hello world" replies "hello world"
//! bot.register(CommandHandler::new("echo", |cmd: Command, bot: Bot| async move {
//!     bot.reply(&cmd.message, &cmd.args).await?;
//!     Ok(())
//! }))
//! .await?;
//! ```

use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use stibium_core::{Bot, Event, EventKind, Handler, HandlerResult, Message};
use tracing::{debug, trace};

use crate::action::{Action, action};

/// A matched command invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// The message that invoked the command.
    pub message: Message,
    /// Text following the command name; empty when none.
    pub args: String,
}

/// Handler for prefix commands.
pub struct CommandHandler {
    command: String,
    wait: bool,
    timeout: Option<Duration>,
    pattern: OnceLock<Regex>,
    action: Action<Command>,
}

impl CommandHandler {
    /// Creates a handler for `command`.
    pub fn new<F, Fut>(command: impl Into<String>, f: F) -> Self
    where
        F: Fn(Command, Bot) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<()>> + Send + 'static,
    {
        Self {
            command: command.into(),
            wait: false,
            timeout: None,
            pattern: OnceLock::new(),
            action: action(f),
        }
    }

    /// Replies with the "please wait" notice before running the action.
    pub fn wait(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }

    /// Unregisters the command automatically after `lifetime`.
    pub fn with_timeout(mut self, lifetime: Duration) -> Self {
        self.timeout = Some(lifetime);
        self
    }

    /// Returns the command name.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Returns the argument text if `text` invokes this command.
    ///
    /// Fails if the handler has not been set up yet.
    pub fn parse(&self, text: &str) -> HandlerResult<Option<String>> {
        let pattern = self.pattern.get().ok_or_else(|| {
            anyhow::anyhow!("command {} was checked before setup", self.command)
        })?;
        Ok(pattern.captures(text).map(|caps| {
            caps.name("args")
                .map_or_else(String::new, |args| args.as_str().to_string())
        }))
    }
}

#[async_trait]
impl Handler for CommandHandler {
    fn name(&self) -> String {
        format!("CommandHandler({})", self.command)
    }

    fn event_kind(&self) -> Option<EventKind> {
        Some(EventKind::Message)
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    async fn setup(&self, bot: &Bot) -> HandlerResult<()> {
        let source = format!(
            r"^{}\s?{}($|\s(?P<args>.+))$",
            regex::escape(bot.prefix()),
            regex::escape(&self.command)
        );
        let pattern = RegexBuilder::new(&source)
            .case_insensitive(true)
            .dot_matches_new_line(true)
            .build()?;
        trace!(command = %self.command, pattern = %source, "Command pattern compiled");
        // A handler registered with several bots keeps the first prefix.
        let _ = self.pattern.set(pattern);
        Ok(())
    }

    async fn check(&self, event: &Event, _bot: &Bot) -> HandlerResult<bool> {
        let Some(text) = event.as_message().and_then(|m| m.text.as_deref()) else {
            return Ok(false);
        };
        Ok(self.parse(text)?.is_some())
    }

    async fn execute(&self, event: &Event, bot: &Bot) -> HandlerResult<()> {
        let Some(message) = event.as_message() else {
            return Ok(());
        };
        let text = message.text.as_deref().unwrap_or_default();
        let args = self.parse(text)?.unwrap_or_default();
        debug!(command = %self.command, args = %args, "Running command");

        if self.wait {
            bot.reply(message, &bot.notices().please_wait).await?;
        }

        let command = Command {
            message: message.clone(),
            args,
        };
        (self.action)(command, bot.clone()).await
    }
}

impl std::fmt::Debug for CommandHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandHandler")
            .field("command", &self.command)
            .field("wait", &self.wait)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use stibium_core::testing::MockPlatform;
    use stibium_core::{BotOptions, Thread};

    fn bot(prefix: &str) -> Bot {
        Bot::new(
            Arc::new(MockPlatform::new()),
            BotOptions::new("test").prefix(prefix),
        )
    }

    fn ready(command: &str, prefix: &str) -> (CommandHandler, Bot) {
        let handler = CommandHandler::new(command, |_, _| async { Ok(()) });
        let bot = bot(prefix);
        tokio_test::block_on(handler.setup(&bot)).unwrap();
        (handler, bot)
    }

    fn args(handler: &CommandHandler, text: &str) -> Option<String> {
        handler.parse(text).unwrap()
    }

    #[test]
    fn test_parse_before_setup_fails() {
        let handler = CommandHandler::new("echo", |_, _| async { Ok(()) });
        assert!(handler.parse("%echo").is_err());
    }

    #[test]
    fn test_command_with_args() {
        let (handler, _) = ready("echo", "%");
        assert_eq!(args(&handler, "%echo hello world").as_deref(), Some("hello world"));
        assert_eq!(args(&handler, "% echo hello").as_deref(), Some("hello"));
    }

    #[test]
    fn test_command_without_args_is_empty_string() {
        let (handler, _) = ready("echo", "%");
        assert_eq!(args(&handler, "%echo").as_deref(), Some(""));
    }

    #[test]
    fn test_command_is_case_insensitive() {
        let (handler, _) = ready("echo", "%");
        assert_eq!(args(&handler, "%ECHO Loud").as_deref(), Some("Loud"));
    }

    #[test]
    fn test_non_matching_text() {
        let (handler, _) = ready("echo", "%");
        assert_eq!(args(&handler, "%echoes"), None);
        assert_eq!(args(&handler, "echo hi"), None);
        assert_eq!(args(&handler, "!echo hi"), None);
        assert_eq!(args(&handler, "say %echo hi"), None);
    }

    #[test]
    fn test_prefix_is_literal() {
        let (handler, _) = ready("help", ".");
        assert_eq!(args(&handler, ".help").as_deref(), Some(""));
        assert_eq!(args(&handler, "xhelp"), None);
    }

    #[test]
    fn test_args_may_span_lines() {
        let (handler, _) = ready("note", "!");
        assert_eq!(
            args(&handler, "!note first\nsecond").as_deref(),
            Some("first\nsecond")
        );
    }

    #[test]
    fn test_check_ignores_textless_messages() {
        let (handler, bot) = ready("echo", "%");
        let event = Event::message(Message::new("m1", "U1", Thread::user("U1")));
        assert!(!tokio_test::block_on(handler.check(&event, &bot)).unwrap());
    }
}
