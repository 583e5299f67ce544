//! Event handlers and the dispatch table wiring them to event kinds.
//!
//! Every [`EventKind`] gets a handler. Kinds with a feature behind them get
//! the feature handler when its component is active; everything else gets a
//! [`LogEvent`] handler that records the event and succeeds.

mod chat;
mod log_event;
mod tip;
mod user_enter;

pub use chat::ChatMessageHandler;
pub use log_event::LogEvent;
pub use tip::TipHandler;
pub use user_enter::VipAudioHandler;

use crate::context::AppContext;
use serde_json::Value;
use showrunner_core::{EventHandler, EventKind};
use showrunner_runtime::DispatchTable;
use std::sync::Arc;

/// `payload.user.username`, when present.
pub(crate) fn username(payload: &Value) -> Option<&str> {
    payload.get("user")?.get("username")?.as_str()
}

/// Builds the dispatch table for the active components.
#[must_use]
pub fn dispatch_table(ctx: &AppContext) -> DispatchTable {
    let components = ctx.config.components;
    let mut table = DispatchTable::new();

    for kind in EventKind::ALL {
        let handler: Arc<dyn EventHandler> = match kind {
            EventKind::Tip if components.chat_auto_dj => Arc::new(TipHandler::new(ctx)),
            EventKind::UserEnter if components.vip_audio => Arc::new(VipAudioHandler::new(ctx)),
            EventKind::ChatMessage if components.command_parser || components.custom_actions => {
                Arc::new(ChatMessageHandler::new(ctx))
            },
            kind => Arc::new(LogEvent::new(kind)),
        };
        table.register(kind, handler);
    }

    table
}
