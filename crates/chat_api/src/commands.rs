use shared::error::{ApiError, ErrorCode};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatCommand {
    Help,
    Join,
    Stop,
    Queue,
    Remove { position: usize },
    /// `/remove` without a position, as sent by the keyboard button.
    RemoveUsage,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("message does not contain a command")]
    NotACommand,
    #[error("unknown command /{0}, send /help for the list of commands")]
    UnknownCommand(String),
    #[error("/{command} {reason}")]
    InvalidArgument {
        command: &'static str,
        reason: &'static str,
    },
}

impl From<CommandError> for ApiError {
    fn from(err: CommandError) -> Self {
        let code = match err {
            CommandError::NotACommand => ErrorCode::NotACommand,
            CommandError::UnknownCommand(_) => ErrorCode::UnknownCommand,
            CommandError::InvalidArgument { .. } => ErrorCode::Validation,
        };
        ApiError::new(code, err.to_string())
    }
}

/// Parses the first `/command` in a chat message.
///
/// Reply-keyboard buttons send their whole label ("Join the queue /join"), so
/// the command does not have to start the message. A `@botname` suffix on the
/// command word is ignored.
pub fn parse_command(text: &str) -> Result<ChatCommand, CommandError> {
    let mut words = text.split_whitespace();
    let word = words
        .by_ref()
        .find_map(|word| word.strip_prefix('/'))
        .ok_or(CommandError::NotACommand)?;
    let name = word.split('@').next().unwrap_or_default().to_lowercase();

    match name.as_str() {
        "start" | "help" => Ok(ChatCommand::Help),
        "join" => Ok(ChatCommand::Join),
        "stoptime" | "stop" => Ok(ChatCommand::Stop),
        "queue" => Ok(ChatCommand::Queue),
        "remove" => {
            let Some(arg) = words.next() else {
                return Ok(ChatCommand::RemoveUsage);
            };
            match arg.parse::<usize>() {
                Ok(position) if position > 0 => Ok(ChatCommand::Remove { position }),
                _ => Err(CommandError::InvalidArgument {
                    command: "remove",
                    reason: "position must be a positive number",
                }),
            }
        }
        "" => Err(CommandError::NotACommand),
        _ => Err(CommandError::UnknownCommand(name)),
    }
}

#[cfg(test)]
#[path = "tests/commands_tests.rs"]
mod tests;
