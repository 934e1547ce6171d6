use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use chrono::{DateTime, TimeDelta, Utc};
use shared::{
    domain::{Participant, ParticipantId, TurnId},
    protocol::TurnSnapshot,
};
use tracing::debug;

use crate::{
    error::TurnError,
    timer::{CancellationToken, TimerService},
};

pub const DEFAULT_TURN_DURATION: Duration = Duration::from_secs(10 * 60);

#[derive(Debug)]
struct ActiveTurn {
    id: TurnId,
    holder: Participant,
    started_at: DateTime<Utc>,
    deadline: DateTime<Utc>,
    expiry: CancellationToken,
}

impl ActiveTurn {
    fn snapshot(&self) -> TurnSnapshot {
        TurnSnapshot {
            turn_id: self.id,
            holder: self.holder.clone(),
            started_at: self.started_at,
            deadline: self.deadline,
        }
    }
}

/// Turn state of one scope: idle, or one live turn with its pending expiry.
#[derive(Debug, Default)]
pub struct TurnSlot {
    active: Option<ActiveTurn>,
}

impl TurnSlot {
    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    pub fn holder(&self) -> Option<&Participant> {
        self.active.as_ref().map(|turn| &turn.holder)
    }
}

/// Starts, stops and expires turns. Expiry tokens live in the [`TurnSlot`]
/// and are only ever touched from here.
#[derive(Debug)]
pub struct TurnScheduler {
    duration: Duration,
    deadline_offset: TimeDelta,
    timers: TimerService,
    next_turn_id: AtomicU64,
}

impl TurnScheduler {
    pub fn new(duration: Duration, timers: TimerService) -> Self {
        Self {
            duration,
            deadline_offset: TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX),
            timers,
            next_turn_id: AtomicU64::new(1),
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Hands the turn to `holder` and arms its expiry. `on_expire` receives
    /// the id of the turn it was armed for.
    pub fn start<F>(
        &self,
        slot: &mut TurnSlot,
        holder: Participant,
        on_expire: F,
    ) -> Result<TurnSnapshot, TurnError>
    where
        F: FnOnce(TurnId) + Send + 'static,
    {
        if slot.active.is_some() {
            return Err(TurnError::AlreadyActive);
        }

        let id = TurnId(self.next_turn_id.fetch_add(1, Ordering::Relaxed));
        let started_at = Utc::now();
        let deadline = started_at
            .checked_add_signed(self.deadline_offset)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let expiry = self.timers.schedule(self.duration, move || on_expire(id));

        let turn = ActiveTurn {
            id,
            holder,
            started_at,
            deadline,
            expiry,
        };
        let snapshot = turn.snapshot();
        slot.active = Some(turn);
        Ok(snapshot)
    }

    /// Ends the live turn on behalf of its holder and returns that holder.
    pub fn stop(
        &self,
        slot: &mut TurnSlot,
        requester: ParticipantId,
    ) -> Result<Participant, TurnError> {
        let turn = slot.active.as_ref().ok_or(TurnError::NoActiveTurn)?;
        if turn.holder.id != requester {
            return Err(TurnError::NotOwner {
                requester,
                holder: turn.holder.clone(),
            });
        }

        let turn = slot.active.take().ok_or(TurnError::NoActiveTurn)?;
        if !self.timers.cancel(&turn.expiry) {
            debug!(turn_id = turn.id.0, "expiry already fired; stop takes precedence");
        }
        Ok(turn.holder)
    }

    /// Clears the slot if it still holds turn `id`. A turn that was stopped,
    /// or replaced by a later one, makes this a no-op.
    pub fn expire(&self, slot: &mut TurnSlot, id: TurnId) -> Option<Participant> {
        match &slot.active {
            Some(turn) if turn.id == id && !turn.expiry.is_cancelled() => {
                slot.active.take().map(|turn| turn.holder)
            }
            _ => None,
        }
    }

    pub fn query(&self, slot: &TurnSlot) -> Option<TurnSnapshot> {
        slot.active.as_ref().map(ActiveTurn::snapshot)
    }
}

#[cfg(test)]
#[path = "tests/scheduler_tests.rs"]
mod tests;
