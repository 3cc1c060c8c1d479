///
/// Priority queue: a min-heap over reactions keyed by `Index`.
///
/// Pops smallest level first, ties broken by smallest deadline, further
/// ties broken by insertion order (`seq`) so that reactions sharing an
/// index behave FIFO rather than arbitrarily. `std::collections::BinaryHeap`
/// is a max-heap, so entries are wrapped in `Reverse` to get ascending
/// pop order. The queue does not own reaction bodies; it holds `Arc`
/// handles whose lifetime is managed by the level table and the
/// scheduler's trigger/done bookkeeping.
///

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::reaction::Reaction;

static NEXT_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Clone)]
struct HeapEntry(Arc<Reaction>);

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.0.index() == other.0.index()
            && self.0.seq.load(Ordering::SeqCst) == other.0.seq.load(Ordering::SeqCst)
    }
}
impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0
            .index()
            .cmp(&other.0.index())
            .then_with(|| self.0.seq.load(Ordering::SeqCst).cmp(&other.0.seq.load(Ordering::SeqCst)))
    }
}

#[derive(Default)]
pub struct ReactionHeap {
    heap: BinaryHeap<Reverse<HeapEntry>>,
}

impl ReactionHeap {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
        }
    }

    /// Insert a reaction, stamping it with a fresh sequence number so
    /// that reactions sharing an `Index` pop in trigger order.
    pub fn insert(&mut self, reaction: Arc<Reaction>) {
        reaction.seq.store(NEXT_SEQ.fetch_add(1, Ordering::SeqCst), Ordering::SeqCst);
        self.heap.push(Reverse(HeapEntry(reaction)));
    }

    pub fn pop(&mut self) -> Option<Arc<Reaction>> {
        self.heap.pop().map(|Reverse(HeapEntry(r))| r)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Non-destructive check that popping this heap would yield a
    /// non-decreasing `Index` sequence. Exercised by the federated
    /// same-level trigger test, which must hold even while an insert
    /// races a concurrent pop under the executing-queue mutex.
    pub fn verify_order(&self) -> bool {
        let mut clone: Vec<HeapEntry> = self.heap.iter().map(|Reverse(e)| e.clone()).collect();
        clone.sort_by(|a, b| a.cmp(b));
        clone.windows(2).all(|w| w[0].cmp(&w[1]) != std::cmp::Ordering::Greater)
    }
}
