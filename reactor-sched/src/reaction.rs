///
/// Reactions: the scheduler's unit of work.
///
/// A reaction carries a composite `Index` (level, then deadline,
/// lexicographically) that determines drain order, an atomic `status`
/// guarding the inactive/queued/running state machine, and the body to
/// run. The scheduler owns only the status transitions; the body is an
/// opaque closure standing in for externally-generated reaction code.
///

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Mutex;

pub type Level = usize;
pub type Deadline = u64;

/// Composite scheduling key: smaller level drains first; within a
/// level, smaller deadline drains first. This is a genuine tuple
/// comparison rather than a bit-packed integer — the packing in the
/// original design is an optimization, not part of the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Index {
    pub level: Level,
    pub deadline: Deadline,
}

impl Index {
    pub fn new(level: Level, deadline: Deadline) -> Self {
        Self { level, deadline }
    }
}

/// Reaction lifecycle. `Running` is reserved for instrumentation (the
/// worker loop's tracing span) — the scheduler itself only ever
/// transitions `Inactive <-> Queued`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionStatus {
    Inactive,
    Queued,
    Running,
}

impl ReactionStatus {
    fn to_u8(self) -> u8 {
        match self {
            ReactionStatus::Inactive => 0,
            ReactionStatus::Queued => 1,
            ReactionStatus::Running => 2,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => ReactionStatus::Inactive,
            1 => ReactionStatus::Queued,
            2 => ReactionStatus::Running,
            other => unreachable!("invalid reaction status byte {other}"),
        }
    }
}

/// The behavior a reaction executes. Boxed and `Send` since it may run
/// on any worker thread; guarded by its own mutex rather than a
/// scheduler lock (the status CAS already guarantees at most one
/// worker executes a given reaction at a time, so contention here is
/// never observed in practice).
pub type ReactionBody = Mutex<Box<dyn FnMut() + Send>>;

pub struct Reaction {
    pub id: u64,
    level: Level,
    deadline: AtomicU64,
    status: AtomicU8,
    /// Heap-internal tie-break for reactions sharing an `Index`; assigned
    /// by the priority queue on insert, mirroring the external
    /// `get_pos`/`set_pos` hooks the original design routes through.
    pub(crate) seq: AtomicU64,
    body: ReactionBody,
}

impl Reaction {
    pub fn new(id: u64, level: Level, deadline: Deadline, body: impl FnMut() + Send + 'static) -> Self {
        Self {
            id,
            level,
            deadline: AtomicU64::new(deadline),
            status: AtomicU8::new(ReactionStatus::Inactive.to_u8()),
            seq: AtomicU64::new(0),
            body: Mutex::new(Box::new(body)),
        }
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn deadline(&self) -> Deadline {
        self.deadline.load(Ordering::SeqCst)
    }

    pub fn set_deadline(&self, deadline: Deadline) {
        self.deadline.store(deadline, Ordering::SeqCst);
    }

    pub fn index(&self) -> Index {
        Index::new(self.level, self.deadline())
    }

    pub fn status(&self) -> ReactionStatus {
        ReactionStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    /// The choke point preventing double-enqueue under concurrent
    /// triggers: succeeds only if the reaction is currently `Inactive`.
    pub fn try_mark_queued(&self) -> bool {
        self.status
            .compare_exchange(
                ReactionStatus::Inactive.to_u8(),
                ReactionStatus::Queued.to_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// Returns the actual status on failure so the caller can report a
    /// precise invariant-violation diagnostic.
    pub fn try_mark_inactive(&self) -> Result<(), ReactionStatus> {
        self.status
            .compare_exchange(
                ReactionStatus::Queued.to_u8(),
                ReactionStatus::Inactive.to_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map(|_| ())
            .map_err(ReactionStatus::from_u8)
    }

    /// Execute the reaction body, catching a panic so one bad reaction
    /// cannot take the whole worker pool down with it.
    pub fn execute(&self) -> std::thread::Result<()> {
        let mut guard = self.body.lock().unwrap();
        let body: &mut (dyn FnMut() + Send) = &mut **guard;
        panic::catch_unwind(AssertUnwindSafe(|| body()))
    }
}

impl fmt::Debug for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reaction")
            .field("id", &self.id)
            .field("index", &self.index())
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI64;
    use std::sync::Arc;

    #[test]
    fn test_index_orders_level_then_deadline() {
        let a = Index::new(0, 100);
        let b = Index::new(0, 50);
        let c = Index::new(1, 0);
        assert!(b < a);
        assert!(a < c);
    }

    #[test]
    fn test_cas_guards_double_enqueue() {
        let r = Reaction::new(1, 0, 0, || {});
        assert!(r.try_mark_queued());
        assert!(!r.try_mark_queued(), "second trigger must not re-queue");
        assert_eq!(r.try_mark_inactive(), Ok(()));
        assert!(r.try_mark_queued(), "reaction is triggerable again once inactive");
    }

    #[test]
    fn test_try_mark_inactive_reports_actual_status() {
        let r = Reaction::new(1, 0, 0, || {});
        let err = r.try_mark_inactive().unwrap_err();
        assert_eq!(err, ReactionStatus::Inactive);
    }

    #[test]
    fn test_execute_runs_body_exactly_once() {
        let counter = Arc::new(AtomicI64::new(0));
        let c = Arc::clone(&counter);
        let r = Reaction::new(1, 0, 0, move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        r.execute().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_execute_catches_panic() {
        let r = Reaction::new(1, 0, 0, || panic!("boom"));
        let result = r.execute();
        assert!(result.is_err());
    }
}
