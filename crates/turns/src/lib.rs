//! Per-scope turn queues with timed turns.
//!
//! Participants join a scope's FIFO queue, the head of the queue holds a
//! time-boxed turn, and the turn ends when its holder stops it or when it
//! expires. Either way the next participant is promoted automatically.

pub mod coordinator;
pub mod error;
pub mod queue;
pub mod registry;
pub mod scheduler;
pub mod timer;

pub use coordinator::{CoordinatorConfig, TurnCoordinator};
pub use error::{TimerError, TurnError};
pub use queue::QueueStore;
pub use registry::{ScopeRegistry, ScopeState};
pub use scheduler::{TurnScheduler, TurnSlot, DEFAULT_TURN_DURATION};
pub use timer::{CancellationToken, TimerService};
