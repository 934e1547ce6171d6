use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock},
};

use shared::domain::ScopeId;

use crate::{queue::QueueStore, scheduler::TurnSlot};

/// Everything one scope owns; always accessed under its own mutex.
#[derive(Debug, Default)]
pub struct ScopeState {
    pub queue: QueueStore,
    pub turn: TurnSlot,
}

impl ScopeState {
    /// No live turn and nobody waiting; the scope can be forgotten.
    pub fn is_vacant(&self) -> bool {
        self.turn.is_idle() && self.queue.is_empty()
    }
}

pub type ScopeCell = Arc<Mutex<ScopeState>>;

/// Per-scope state cells. The map lock only guards lookup, insertion and
/// eviction, so work on one scope never waits for another scope's critical
/// section.
///
/// Cells are only cloned out of the map while its lock is held, which is what
/// lets [`ScopeRegistry::evict_if_vacant`] trust the reference count.
#[derive(Debug, Default)]
pub struct ScopeRegistry {
    cells: RwLock<HashMap<ScopeId, ScopeCell>>,
}

impl ScopeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cell(&self, scope: ScopeId) -> ScopeCell {
        if let Some(cell) = self.existing(scope) {
            return cell;
        }
        let mut cells = self.cells.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(cells.entry(scope).or_default())
    }

    pub fn existing(&self, scope: ScopeId) -> Option<ScopeCell> {
        self.cells
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&scope)
            .cloned()
    }

    /// Drops the scope's cell if it is vacant and nobody outside the map holds
    /// it. Callers must release their own clone first.
    pub fn evict_if_vacant(&self, scope: ScopeId) -> bool {
        let mut cells = self.cells.write().unwrap_or_else(PoisonError::into_inner);
        let Some(cell) = cells.get(&scope) else {
            return false;
        };
        if Arc::strong_count(cell) != 1 || !lock_scope(cell).is_vacant() {
            return false;
        }
        cells.remove(&scope);
        true
    }

    pub fn len(&self) -> usize {
        self.cells.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Every mutation of [`ScopeState`] completes before the guard drops, so a
/// panic elsewhere never leaves a half-applied change behind.
pub fn lock_scope(cell: &ScopeCell) -> MutexGuard<'_, ScopeState> {
    cell.lock().unwrap_or_else(PoisonError::into_inner)
}
