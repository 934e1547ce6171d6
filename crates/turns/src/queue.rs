use std::collections::VecDeque;

use shared::domain::{Participant, ParticipantId};

use crate::error::TurnError;

/// FIFO membership of one scope. Positions are 1-based.
#[derive(Debug, Default, Clone)]
pub struct QueueStore {
    entries: VecDeque<Participant>,
}

impl QueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `participant` and returns its position.
    pub fn join(&mut self, participant: Participant) -> Result<usize, TurnError> {
        if self.contains(participant.id) {
            return Err(TurnError::AlreadyQueued(participant));
        }
        self.entries.push_back(participant);
        Ok(self.entries.len())
    }

    pub fn remove_at(&mut self, position: usize) -> Result<Participant, TurnError> {
        let invalid = TurnError::InvalidPosition {
            requested: position,
            len: self.entries.len(),
        };
        let index = position.checked_sub(1).ok_or(invalid.clone())?;
        self.entries.remove(index).ok_or(invalid)
    }

    pub fn pop_front(&mut self) -> Result<Participant, TurnError> {
        self.entries.pop_front().ok_or(TurnError::Empty)
    }

    pub fn peek_front(&self) -> Result<&Participant, TurnError> {
        self.entries.front().ok_or(TurnError::Empty)
    }

    pub fn snapshot(&self) -> Vec<Participant> {
        self.entries.iter().cloned().collect()
    }

    pub fn contains(&self, id: ParticipantId) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[path = "tests/queue_tests.rs"]
mod tests;
