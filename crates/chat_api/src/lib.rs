//! Chat front end for the turn coordinator: text commands in, rendered
//! replies out.

pub mod commands;
pub mod render;

use serde::{Deserialize, Serialize};
use shared::{
    domain::{Participant, ScopeId},
    protocol::{Notification, QueueListing},
};
use tracing::debug;
use turns::TurnCoordinator;

pub use commands::{parse_command, ChatCommand, CommandError};
pub use render::{render_notification, render_queue};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatReply {
    pub notifications: Vec<Notification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<QueueListing>,
    pub lines: Vec<String>,
    pub buttons: Vec<Vec<String>>,
}

#[derive(Clone)]
pub struct ChatContext {
    pub coordinator: TurnCoordinator,
}

impl ChatContext {
    pub fn new(coordinator: TurnCoordinator) -> Self {
        Self { coordinator }
    }

    /// Runs the command in `text` on behalf of `sender`.
    pub fn handle_message(
        &self,
        scope: ScopeId,
        sender: Participant,
        text: &str,
    ) -> Result<ChatReply, CommandError> {
        let command = parse_command(text)?;
        debug!(scope_id = %scope, participant_id = %sender.id, ?command, "chat command");
        Ok(self.execute(scope, sender, command))
    }

    pub fn execute(&self, scope: ScopeId, sender: Participant, command: ChatCommand) -> ChatReply {
        let remove_enabled = self.coordinator.remove_enabled();
        let mut reply = ChatReply {
            buttons: render::command_buttons(remove_enabled),
            ..ChatReply::default()
        };

        match command {
            ChatCommand::Help => reply.lines.push(render::help_text(remove_enabled)),
            ChatCommand::RemoveUsage => reply.lines.push(render::remove_usage(remove_enabled)),
            ChatCommand::Queue => {
                let listing = self.coordinator.list_queue(scope);
                reply.lines.push(render_queue(&listing));
                reply.queue = Some(listing);
            }
            ChatCommand::Join => reply.notifications = self.coordinator.join(scope, sender),
            ChatCommand::Stop => reply.notifications = self.coordinator.stop(scope, sender.id),
            ChatCommand::Remove { position } => {
                reply.notifications = self.coordinator.remove_at(scope, position)
            }
        }

        reply
            .lines
            .extend(reply.notifications.iter().map(render_notification));
        if render::shows_queue_after(command, &reply.notifications) {
            let listing = self.coordinator.list_queue(scope);
            reply.lines.push(render_queue(&listing));
            reply.queue = Some(listing);
        }
        reply
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
