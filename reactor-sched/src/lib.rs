//!
//! reactor-sched - Global earliest-deadline-first scheduler
//!
//! The multithreaded runtime scheduler for a deterministic
//! reactor-oriented execution model. Reactors are composed of
//! reactions — side-effecting units — that fire at discrete logical
//! tags (a totally ordered notion of time). This crate executes every
//! reaction triggered at the current tag, in an order consistent with
//! a statically computed precedence relation (the reaction's *level*),
//! across a fixed pool of worker threads, then advances to the next
//! tag until a configured stop tag is reached.
//!
//! ## Core pieces
//!
//! - [`Scheduler`] — the scheduler itself: `trigger`, `get_ready_reaction`,
//!   `done_with_reaction`, the idle-worker coordination protocol, and
//!   tag advance.
//! - [`Reaction`] — the unit of work, carrying a level/deadline `Index`
//!   and an atomic `Inactive`/`Queued`/`Running` status.
//! - [`EventQueue`] and [`TagSource`] — the minimal external collaborator
//!   that pops due events and repopulates the level table; swappable
//!   for a real reactor topology.
//! - [`SchedulerConfig`] — worker count, max level, federated mode, stop tag.
//!
//! ## Example
//!
//! ```
//! use reactor_sched::{EventQueue, ReactionTemplate, Scheduler, SchedulerConfig, Tag};
//!
//! let queue = EventQueue::new();
//! queue.schedule(Tag::new(0, 0), ReactionTemplate::new(0, 0, || {
//!     println!("hello at tag zero");
//! }));
//!
//! let config = SchedulerConfig::builder()
//!     .num_workers(2)
//!     .max_level(0)
//!     .stop_tag(Tag::new(0, 0))
//!     .build();
//! let scheduler = Scheduler::new(config, Box::new(queue)).unwrap();
//! let handles = scheduler.run();
//! std::thread::sleep(std::time::Duration::from_millis(100));
//! scheduler.shutdown();
//! scheduler.join_all(handles);
//! ```
//!
//! ## Platform support
//!
//! Native OS threads only (`std::thread`, `std::sync`). No wire
//! protocol, no file format, no CLI.
//!

pub mod config;
pub mod errors;
pub mod event_queue;
pub mod level_table;
pub mod pqueue;
pub mod primitives;
pub mod reaction;
pub mod scheduler;
pub mod tag;
pub mod worker;

pub use config::{SchedulerConfig, SchedulerConfigBuilder};
pub use errors::SchedulerError;
pub use event_queue::{EventQueue, ReactionTemplate, TagSource, TagState};
pub use primitives::{CancelToken, Clock, Semaphore, WaitOutcome};
pub use reaction::{Deadline, Index, Level, Reaction, ReactionStatus};
pub use scheduler::{Scheduler, SchedulerState, WorkerId};
pub use tag::{compare_tags, Tag};
