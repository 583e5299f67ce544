use super::username;
use crate::actions::{ChatActions, parse_command};
use crate::context::AppContext;
use serde_json::Value;
use showrunner_core::{CacheSnapshots, EventHandler, HandlerError};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Admin commands and per-user custom actions from chat.
///
/// - with the command parser on, a message from an admin containing the
///   command symbol runs the parsed command
/// - with custom actions on, every trigger phrase of the sender found in the
///   message runs its mapped action
pub struct ChatMessageHandler {
    actions: Arc<dyn ChatActions>,
    command_symbol: String,
    commands_enabled: bool,
    custom_actions_enabled: bool,
}

impl std::fmt::Debug for ChatMessageHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatMessageHandler")
            .field("command_symbol", &self.command_symbol)
            .field("commands_enabled", &self.commands_enabled)
            .field("custom_actions_enabled", &self.custom_actions_enabled)
            .finish_non_exhaustive()
    }
}

impl ChatMessageHandler {
    /// Creates the handler from the shared context.
    #[must_use]
    pub fn new(ctx: &AppContext) -> Self {
        Self {
            actions: Arc::clone(&ctx.actions),
            command_symbol: ctx.config.general.command_symbol.clone(),
            commands_enabled: ctx.config.components.command_parser,
            custom_actions_enabled: ctx.config.components.custom_actions,
        }
    }

    async fn react(&self, payload: &Value, caches: &CacheSnapshots) -> Result<bool, HandlerError> {
        let user = username(payload)
            .ok_or_else(|| HandlerError::InvalidPayload("missing `user.username`".to_string()))?;
        let text = payload
            .get("message")
            .and_then(|m| m.get("message"))
            .and_then(Value::as_str)
            .unwrap_or_default();

        if self.commands_enabled && caches.is_admin(user) {
            if let Some(command) = parse_command(text, &self.command_symbol) {
                tracing::info!(user, command = %command, "Running admin command");
                self.actions
                    .run_command(user, &command)
                    .await
                    .map_err(|e| HandlerError::Collaborator(e.to_string()))?;
            }
        }

        if self.custom_actions_enabled {
            if let Some(triggers) = caches.actions_for(user) {
                for (trigger, action) in triggers.iter().filter(|(trigger, _)| text.contains(trigger.as_str())) {
                    self.actions
                        .run_custom_action(user, trigger, action)
                        .await
                        .map_err(|e| HandlerError::Collaborator(e.to_string()))?;
                }
            }
        }

        Ok(true)
    }
}

impl EventHandler for ChatMessageHandler {
    fn handle<'a>(
        &'a self,
        payload: &'a Value,
        caches: &'a CacheSnapshots,
    ) -> Pin<Box<dyn Future<Output = Result<bool, HandlerError>> + Send + 'a>> {
        Box::pin(self.react(payload, caches))
    }
}
