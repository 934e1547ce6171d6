use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Participant, ParticipantId, ScopeId, TurnId};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TurnSnapshot {
    pub turn_id: TurnId,
    pub holder: Participant,
    pub started_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}

/// Queue contents for display. An empty queue is reported explicitly rather
/// than as an empty list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum QueueListing {
    Empty,
    Entries(Vec<Participant>),
}

impl QueueListing {
    pub fn from_entries(entries: Vec<Participant>) -> Self {
        if entries.is_empty() {
            Self::Empty
        } else {
            Self::Entries(entries)
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Entries(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// Outbound events, one per triggering outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Notification {
    JoinedQueue {
        participant: Participant,
        position: usize,
    },
    AlreadyQueued {
        participant: Participant,
    },
    TurnStarted {
        holder: Participant,
        started_at: DateTime<Utc>,
        deadline: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        next_holder: Option<Participant>,
    },
    TurnStopped {
        stopped_by: Participant,
        previous_holder: Participant,
    },
    TurnExpired {
        holder: Participant,
    },
    QueueEmptyOnAdvance,
    NotOwner {
        requester: ParticipantId,
        current_holder: Participant,
    },
    NoActiveTurn,
    InvalidPosition {
        requested_position: usize,
        queue_length: usize,
    },
    RemovedFromQueue {
        removed: Participant,
    },
    RemoveDisabled,
}

/// A notification as published on the event bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScopedNotification {
    pub scope_id: ScopeId,
    pub emitted_at: DateTime<Utc>,
    pub notification: Notification,
}
