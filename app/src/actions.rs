//! Chat commands and custom actions.
//!
//! The concrete effects (scene switches, hardware triggers, ...) live behind
//! [`ChatActions`]; this crate ships [`LoggingChatActions`], which records
//! what would run.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// A command parsed out of a chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatCommand {
    /// Command word following the symbol.
    pub command: String,
    /// Remaining words.
    pub args: Vec<String>,
}

impl fmt::Display for ChatCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Extracts the command following the first `symbol` in `message`.
///
/// The command runs up to the next occurrence of `symbol` (or the end of the
/// message); its first word is the command, the rest are arguments.
/// `"hey !brb back soon"` with `"!"` gives `brb ["back", "soon"]`.
#[must_use]
pub fn parse_command(message: &str, symbol: &str) -> Option<ChatCommand> {
    if symbol.is_empty() {
        return None;
    }
    let after = message.split(symbol).nth(1)?;
    let mut words = after.split_whitespace();
    let command = words.next()?.to_string();
    Some(ChatCommand {
        command,
        args: words.map(str::to_string).collect(),
    })
}

/// Errors from running a chat action.
#[derive(Error, Debug)]
pub enum ActionError {
    /// The command is not known.
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// The action ran and failed.
    #[error("Action failed: {0}")]
    Failed(String),
}

/// Executes chat-driven actions.
pub trait ChatActions: Send + Sync {
    /// Runs an admin command issued by `user`.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError`] if the command is unknown or fails.
    fn run_command<'a>(
        &'a self,
        user: &'a str,
        command: &'a ChatCommand,
    ) -> Pin<Box<dyn Future<Output = Result<(), ActionError>> + Send + 'a>>;

    /// Runs the custom action `action` that `user` triggered with `trigger`.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError`] if the action fails.
    fn run_custom_action<'a>(
        &'a self,
        user: &'a str,
        trigger: &'a str,
        action: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), ActionError>> + Send + 'a>>;
}

/// Logs every action instead of performing it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingChatActions;

impl ChatActions for LoggingChatActions {
    fn run_command<'a>(
        &'a self,
        user: &'a str,
        command: &'a ChatCommand,
    ) -> Pin<Box<dyn Future<Output = Result<(), ActionError>> + Send + 'a>> {
        Box::pin(async move {
            tracing::info!(user, command = %command.command, args = ?command.args, "Admin command");
            Ok(())
        })
    }

    fn run_custom_action<'a>(
        &'a self,
        user: &'a str,
        trigger: &'a str,
        action: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), ActionError>> + Send + 'a>> {
        Box::pin(async move {
            tracing::info!(user, trigger, action, "Custom action");
            Ok(())
        })
    }
}
