use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use chrono::Utc;
use shared::{
    domain::{Participant, ParticipantId, ScopeId, TurnId},
    protocol::{Notification, QueueListing, ScopedNotification, TurnSnapshot},
};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::{
    error::TurnError,
    registry::{lock_scope, ScopeCell, ScopeRegistry, ScopeState},
    scheduler::{TurnScheduler, DEFAULT_TURN_DURATION},
    timer::TimerService,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub turn_duration: Duration,
    pub remove_enabled: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            turn_duration: DEFAULT_TURN_DURATION,
            remove_enabled: true,
        }
    }
}

struct CoordinatorInner {
    scopes: ScopeRegistry,
    scheduler: TurnScheduler,
    remove_enabled: bool,
    events: broadcast::Sender<ScopedNotification>,
}

/// Entry point for every queue and turn operation.
///
/// Each call runs as one critical section on its scope and returns the
/// notifications it produced. The same notifications, and those produced by
/// turn expiry, are published on the event channel in the order they happened.
#[derive(Clone)]
pub struct TurnCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl TurnCoordinator {
    pub fn new(
        config: CoordinatorConfig,
        timers: TimerService,
        events: broadcast::Sender<ScopedNotification>,
    ) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                scopes: ScopeRegistry::new(),
                scheduler: TurnScheduler::new(config.turn_duration, timers),
                remove_enabled: config.remove_enabled,
                events,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScopedNotification> {
        self.inner.events.subscribe()
    }

    pub fn turn_duration(&self) -> Duration {
        self.inner.scheduler.duration()
    }

    pub fn remove_enabled(&self) -> bool {
        self.inner.remove_enabled
    }

    /// The only operation that creates a scope's state.
    pub fn join(&self, scope: ScopeId, participant: Participant) -> Vec<Notification> {
        let cell = self.inner.scopes.cell(scope);
        self.with_scope(scope, cell, |state| {
            let mut out = Vec::new();
            let holds_turn = state.turn.holder().is_some_and(|h| *h == participant);
            let joined = if holds_turn {
                Err(TurnError::AlreadyQueued(participant.clone()))
            } else {
                state.queue.join(participant.clone())
            };

            match joined {
                Ok(position) => {
                    info!(scope_id = %scope, participant_id = %participant.id, position, "joined queue");
                    out.push(Notification::JoinedQueue {
                        participant,
                        position,
                    });
                    if state.turn.is_idle() {
                        self.advance(scope, state, &mut out, false);
                    }
                }
                Err(err) => {
                    debug!(scope_id = %scope, participant_id = %participant.id, %err, "join rejected");
                    out.extend(err.into_notification());
                }
            }

            self.publish(scope, &out);
            out
        })
    }

    pub fn stop(&self, scope: ScopeId, requester: ParticipantId) -> Vec<Notification> {
        let Some(cell) = self.inner.scopes.existing(scope) else {
            debug!(scope_id = %scope, participant_id = %requester, "stop on unknown scope");
            let out = vec![Notification::NoActiveTurn];
            self.publish(scope, &out);
            return out;
        };

        self.with_scope(scope, cell, |state| {
            let mut out = Vec::new();
            match self.inner.scheduler.stop(&mut state.turn, requester) {
                Ok(previous_holder) => {
                    info!(scope_id = %scope, participant_id = %requester, "turn stopped");
                    out.push(Notification::TurnStopped {
                        stopped_by: previous_holder.clone(),
                        previous_holder,
                    });
                    self.advance(scope, state, &mut out, true);
                }
                Err(err) => {
                    debug!(scope_id = %scope, participant_id = %requester, %err, "stop rejected");
                    out.extend(err.into_notification());
                }
            }

            self.publish(scope, &out);
            out
        })
    }

    /// Removes the participant at 1-based `position` from the queue. The live
    /// turn is never affected.
    pub fn remove_at(&self, scope: ScopeId, position: usize) -> Vec<Notification> {
        if !self.inner.remove_enabled {
            let out = vec![Notification::RemoveDisabled];
            self.publish(scope, &out);
            return out;
        }

        let Some(cell) = self.inner.scopes.existing(scope) else {
            debug!(scope_id = %scope, position, "remove on unknown scope");
            let out: Vec<_> = TurnError::InvalidPosition {
                requested: position,
                len: 0,
            }
            .into_notification()
            .into_iter()
            .collect();
            self.publish(scope, &out);
            return out;
        };

        self.with_scope(scope, cell, |state| {
            let out = match state.queue.remove_at(position) {
                Ok(removed) => {
                    info!(scope_id = %scope, participant_id = %removed.id, position, "removed from queue");
                    vec![Notification::RemovedFromQueue { removed }]
                }
                Err(err) => {
                    debug!(scope_id = %scope, position, %err, "remove rejected");
                    err.into_notification().into_iter().collect()
                }
            };

            self.publish(scope, &out);
            out
        })
    }

    pub fn list_queue(&self, scope: ScopeId) -> QueueListing {
        let Some(cell) = self.inner.scopes.existing(scope) else {
            return QueueListing::Empty;
        };
        let state = lock_scope(&cell);
        QueueListing::from_entries(state.queue.snapshot())
    }

    pub fn current_turn(&self, scope: ScopeId) -> Option<TurnSnapshot> {
        let cell = self.inner.scopes.existing(scope)?;
        let state = lock_scope(&cell);
        self.inner.scheduler.query(&state.turn)
    }

    fn handle_expiry(&self, scope: ScopeId, turn_id: TurnId) {
        let Some(cell) = self.inner.scopes.existing(scope) else {
            debug!(scope_id = %scope, turn_id = turn_id.0, "scope already released; ignoring expiry");
            return;
        };

        self.with_scope(scope, cell, |state| {
            let Some(holder) = self.inner.scheduler.expire(&mut state.turn, turn_id) else {
                debug!(scope_id = %scope, turn_id = turn_id.0, "turn already ended; ignoring expiry");
                return;
            };

            info!(scope_id = %scope, participant_id = %holder.id, turn_id = turn_id.0, "turn expired");
            let mut out = vec![Notification::TurnExpired { holder }];
            self.advance(scope, state, &mut out, true);
            self.publish(scope, &out);
        });
    }

    /// Runs `f` as the scope's critical section, then forgets the scope if it
    /// was left with no turn and no queue.
    fn with_scope<R>(
        &self,
        scope: ScopeId,
        cell: ScopeCell,
        f: impl FnOnce(&mut ScopeState) -> R,
    ) -> R {
        let (result, vacant) = {
            let mut state = lock_scope(&cell);
            let result = f(&mut state);
            (result, state.is_vacant())
        };
        drop(cell);
        if vacant && self.inner.scopes.evict_if_vacant(scope) {
            debug!(scope_id = %scope, "released vacant scope");
        }
        result
    }

    /// Promotes the head of the queue when no turn is live. `after_turn_end`
    /// reports an empty queue, which a join never needs to.
    fn advance(
        &self,
        scope: ScopeId,
        state: &mut ScopeState,
        out: &mut Vec<Notification>,
        after_turn_end: bool,
    ) {
        if !state.turn.is_idle() {
            return;
        }

        let holder = match state.queue.pop_front() {
            Ok(holder) => holder,
            Err(err) => {
                if after_turn_end {
                    out.extend(err.into_notification());
                }
                return;
            }
        };

        let expiry = Arc::downgrade(&self.inner);
        let on_expire = move |turn_id| Self::expire_from_timer(expiry, scope, turn_id);
        match self.inner.scheduler.start(&mut state.turn, holder, on_expire) {
            Ok(turn) => {
                info!(
                    scope_id = %scope,
                    participant_id = %turn.holder.id,
                    turn_id = turn.turn_id.0,
                    deadline = %turn.deadline,
                    "turn started"
                );
                out.push(Notification::TurnStarted {
                    holder: turn.holder,
                    started_at: turn.started_at,
                    deadline: turn.deadline,
                    next_holder: state.queue.peek_front().ok().cloned(),
                });
            }
            Err(err) => out.extend(err.into_notification()),
        }
    }

    fn expire_from_timer(inner: Weak<CoordinatorInner>, scope: ScopeId, turn_id: TurnId) {
        if let Some(inner) = inner.upgrade() {
            Self { inner }.handle_expiry(scope, turn_id);
        }
    }

    fn publish(&self, scope: ScopeId, notifications: &[Notification]) {
        let emitted_at = Utc::now();
        for notification in notifications {
            // No subscribers is fine; delivery is the front end's concern.
            let _ = self.inner.events.send(ScopedNotification {
                scope_id: scope,
                emitted_at,
                notification: notification.clone(),
            });
        }
    }
}

#[cfg(test)]
#[path = "tests/coordinator_tests.rs"]
mod tests;
