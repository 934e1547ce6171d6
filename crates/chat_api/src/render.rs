use chrono::{DateTime, Utc};
use shared::protocol::{Notification, QueueListing};

use crate::commands::ChatCommand;

const TIME_FORMAT: &str = "%H:%M:%S";

pub const HELP_TEXT: &str = "Available commands:\n\
/join - Join the queue\n\
/stoptime - End your turn (only the current holder)\n\
/queue - Show the queue\n\
/help - Show available commands";

pub const REMOVE_HELP_LINE: &str = "/remove <n> - Remove the participant at position n";

/// Reply-keyboard buttons, one row per slice.
pub fn command_buttons(remove_enabled: bool) -> Vec<Vec<String>> {
    let mut rows = vec![
        vec!["Join the queue /join".to_string(), "End turn /stoptime".to_string()],
        vec!["Show the queue /queue".to_string()],
        vec!["Help /help".to_string()],
    ];
    if remove_enabled {
        rows[1].push("Remove from queue /remove".to_string());
    }
    rows
}

pub fn help_text(remove_enabled: bool) -> String {
    if remove_enabled {
        format!("{HELP_TEXT}\n{REMOVE_HELP_LINE}")
    } else {
        HELP_TEXT.to_string()
    }
}

/// Reply to a bare `/remove`.
pub fn remove_usage(remove_enabled: bool) -> String {
    if remove_enabled {
        format!("Usage: {REMOVE_HELP_LINE}")
    } else {
        render_notification(&Notification::RemoveDisabled)
    }
}

fn clock(at: &DateTime<Utc>) -> String {
    at.format(TIME_FORMAT).to_string()
}

pub fn render_notification(notification: &Notification) -> String {
    match notification {
        Notification::JoinedQueue {
            participant,
            position,
        } => format!("{participant} joined the queue at position {position}."),
        Notification::AlreadyQueued { .. } => "You are already in the queue.".to_string(),
        Notification::TurnStarted {
            holder,
            started_at,
            deadline,
            next_holder,
        } => {
            let next = match next_holder {
                Some(next) => format!("Next in queue: {next}"),
                None => "The queue is empty.".to_string(),
            };
            format!(
                "{holder} started their turn.\nWindow: {} - {}\n{next}",
                clock(started_at),
                clock(deadline)
            )
        }
        Notification::TurnStopped { stopped_by, .. } => format!("{stopped_by} ended their turn."),
        Notification::TurnExpired { holder } => format!("{holder}, your time is up."),
        Notification::QueueEmptyOnAdvance => "The queue is empty.".to_string(),
        Notification::NotOwner { .. } => {
            "Only the participant holding the turn can end it.".to_string()
        }
        Notification::NoActiveTurn => "No turn is running right now.".to_string(),
        Notification::InvalidPosition {
            requested_position,
            queue_length,
        } => format!(
            "Position {requested_position} is not in the queue (it has {queue_length} entries)."
        ),
        Notification::RemovedFromQueue { removed } => {
            format!("{removed} was removed from the queue.")
        }
        Notification::RemoveDisabled => "Removing from the queue is disabled.".to_string(),
    }
}

pub fn render_queue(listing: &QueueListing) -> String {
    match listing {
        QueueListing::Empty => "The queue is currently empty.".to_string(),
        QueueListing::Entries(entries) => {
            let mut text = String::from("Current queue:");
            for (index, participant) in entries.iter().enumerate() {
                text.push_str(&format!("\n{}. {participant}", index + 1));
            }
            text
        }
    }
}

/// Whether a command's reply is worth following with the queue listing.
pub fn shows_queue_after(command: ChatCommand, notifications: &[Notification]) -> bool {
    command == ChatCommand::Join
        && notifications
            .iter()
            .any(|n| matches!(n, Notification::JoinedQueue { .. }))
}

#[cfg(test)]
#[path = "tests/render_tests.rs"]
mod tests;
