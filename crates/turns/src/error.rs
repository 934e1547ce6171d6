use shared::{
    domain::{Participant, ParticipantId},
    protocol::Notification,
};
use thiserror::Error;

/// Recoverable outcomes reported by the queue and the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TurnError {
    #[error("{0} is already queued or holding the turn")]
    AlreadyQueued(Participant),
    #[error("participant {requester} does not hold the turn (held by {holder})")]
    NotOwner {
        requester: ParticipantId,
        holder: Participant,
    },
    #[error("no turn is active")]
    NoActiveTurn,
    #[error("a turn is already active")]
    AlreadyActive,
    #[error("position {requested} is outside the queue of length {len}")]
    InvalidPosition { requested: usize, len: usize },
    #[error("queue is empty")]
    Empty,
}

impl TurnError {
    /// The notification a front end shows for this outcome.
    ///
    /// `AlreadyActive` has none: advancing checks for an idle scope before it
    /// starts a turn, so it never surfaces from a command.
    pub fn into_notification(self) -> Option<Notification> {
        match self {
            Self::AlreadyQueued(participant) => Some(Notification::AlreadyQueued { participant }),
            Self::NotOwner { requester, holder } => Some(Notification::NotOwner {
                requester,
                current_holder: holder,
            }),
            Self::NoActiveTurn => Some(Notification::NoActiveTurn),
            Self::InvalidPosition { requested, len } => Some(Notification::InvalidPosition {
                requested_position: requested,
                queue_length: len,
            }),
            Self::Empty => Some(Notification::QueueEmptyOnAdvance),
            Self::AlreadyActive => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum TimerError {
    #[error("timers need a running tokio runtime")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}
