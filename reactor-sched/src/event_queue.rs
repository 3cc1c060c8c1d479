///
/// Event queue and tag advance.
///
/// The reactor AST / topology and the real event queue are external
/// collaborators the hard core depends on but does not define (see the
/// crate's top-level docs). This module supplies a minimal, genuinely
/// testable default: a binary heap of `(Tag, ReactionTemplate)` pairs
/// and a `TagSource` implementation that pops every event due at the
/// next tag and instantiates a reaction per template. Anyone wiring in
/// a real reactor topology swaps this out behind the `TagSource` trait.
///

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::primitives::{sleep_until, CancelToken, Clock};
use crate::reaction::{Deadline, Level, Reaction};
use crate::tag::Tag;

/// A reaction not yet instantiated: the template an event carries until
/// its tag comes due.
pub struct ReactionTemplate {
    pub level: Level,
    pub deadline: Deadline,
    pub body: Arc<dyn Fn() + Send + Sync>,
}

impl ReactionTemplate {
    pub fn new(level: Level, deadline: Deadline, body: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            level,
            deadline,
            body: Arc::new(body),
        }
    }
}

struct Event {
    tag: Tag,
    template: ReactionTemplate,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.tag == other.tag
    }
}
impl Eq for Event {}
impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Event {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.tag.cmp(&other.tag)
    }
}

/// Mutable tag state threaded through `next_tag_locked`, held under the
/// scheduler's global mutex for the duration of the call.
pub struct TagState {
    pub current_tag: Tag,
}

/// The external collaborator the scheduler calls into while holding
/// the global mutex to advance logical time and repopulate the level
/// table. `logical_tag_complete` is the federated-mode RTI hook; it is
/// a no-op by default. `cancel` lets the scheduler break a `TagSource`
/// out of a physical-time wait during `shutdown`; also a no-op by
/// default for sources that never block.
pub trait TagSource: Send + Sync {
    fn next_tag_locked(&self, state: &mut TagState) -> Vec<Arc<Reaction>>;

    fn logical_tag_complete(&self, _tag: Tag) {}

    fn cancel(&self) {}
}

pub struct EventQueue {
    events: Mutex<BinaryHeap<Reverse<Event>>>,
    next_id: AtomicU64,
    clock: Clock,
    cancel_token: CancelToken,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(BinaryHeap::new()),
            next_id: AtomicU64::new(1),
            clock: Clock::new(),
            cancel_token: CancelToken::new(),
        }
    }

    pub fn schedule(&self, tag: Tag, template: ReactionTemplate) {
        self.events.lock().unwrap().push(Reverse(Event { tag, template }));
    }

    fn alloc_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TagSource for EventQueue {
    /// Pops every event due at the smallest pending tag, first blocking
    /// the coordinator (per §5's "suspension points") until physical
    /// time reaches that tag's `logical_time_ns`, so a tag scheduled far
    /// in the future doesn't fire the moment it becomes the queue's
    /// minimum. A `cancel()` call (issued by `Scheduler::shutdown`)
    /// cuts the wait short and yields an empty batch instead.
    fn next_tag_locked(&self, state: &mut TagState) -> Vec<Arc<Reaction>> {
        let due_tag = {
            let events = self.events.lock().unwrap();
            match events.peek() {
                Some(Reverse(next)) => next.tag,
                None => return Vec::new(),
            }
        };

        sleep_until(self.clock.deadline_for(due_tag.logical_time_ns), &self.cancel_token);
        if self.cancel_token.is_cancelled() {
            return Vec::new();
        }

        let mut events = self.events.lock().unwrap();
        state.current_tag = due_tag;
        let mut due = Vec::new();
        while let Some(Reverse(event)) = events.peek() {
            if event.tag != due_tag {
                break;
            }
            let Reverse(event) = events.pop().unwrap();
            due.push(event.template);
        }
        drop(events);

        due.into_iter()
            .map(|template| {
                let id = self.alloc_id();
                let body = Arc::clone(&template.body);
                Arc::new(Reaction::new(id, template.level, template.deadline, move || {
                    (body)();
                }))
            })
            .collect()
    }

    fn cancel(&self) {
        self.cancel_token.cancel();
    }
}
