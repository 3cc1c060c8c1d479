///
/// Level table: a fixed-size sequence of per-level priority queues.
///
/// Position `L` holds every queued reaction whose level equals `L`.
/// Allocated once at scheduler construction; `executing_q` (tracked by
/// the scheduler, not here) is always one of these entries, referenced
/// by index rather than by a second owning pointer.
///

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::pqueue::ReactionHeap;
use crate::reaction::Reaction;

pub struct LevelTable {
    levels: Vec<Mutex<ReactionHeap>>,
}

impl LevelTable {
    pub fn new(max_level: usize) -> Self {
        let mut levels = Vec::with_capacity(max_level + 1);
        levels.resize_with(max_level + 1, || Mutex::new(ReactionHeap::new()));
        Self { levels }
    }

    pub fn max_level(&self) -> usize {
        self.levels.len() - 1
    }

    pub fn insert(&self, level: usize, reaction: Arc<Reaction>) {
        self.levels[level].lock().unwrap().insert(reaction);
    }

    pub fn pop(&self, level: usize) -> Option<Arc<Reaction>> {
        self.levels[level].lock().unwrap().pop()
    }

    pub fn len_at(&self, level: usize) -> usize {
        self.levels[level].lock().unwrap().len()
    }

    pub fn is_empty_at(&self, level: usize) -> bool {
        self.levels[level].lock().unwrap().is_empty()
    }

    pub fn verify_order_at(&self, level: usize) -> bool {
        self.levels[level].lock().unwrap().verify_order()
    }

    /// Scan forward from `from` for the smallest non-empty level.
    pub fn find_non_empty_from(&self, from: usize) -> Option<usize> {
        (from..self.levels.len()).find(|&l| !self.is_empty_at(l))
    }
}

/// The level currently being drained by workers, tracked separately
/// from `LevelTable` since it is mutated only by the coordinator while
/// every worker is idle.
pub struct ExecutingLevel(AtomicUsize);

impl ExecutingLevel {
    pub fn new() -> Self {
        Self(AtomicUsize::new(0))
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self, level: usize) {
        self.0.store(level, Ordering::SeqCst);
    }
}

impl Default for ExecutingLevel {
    fn default() -> Self {
        Self::new()
    }
}
