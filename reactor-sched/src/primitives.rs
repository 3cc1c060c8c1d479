///
/// Platform synchronization primitives.
///
/// A minimal surface, semantically equivalent across operating systems:
/// a counting semaphore (std has none), a monotonic clock relative to
/// process start, and a bounded sleep that only returns early on explicit
/// cancellation. Mutexes, condition variables, and atomics are used
/// directly from `std::sync` elsewhere in this crate — there is nothing
/// to add on top of them.
///

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Outcome of a timed wait. Timeout is a normal signal, not an error —
/// the caller decides what it means (e.g. "physical time has caught up").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Signaled,
    TimedOut,
}

/// A counting semaphore: `release(n)` adds permits and wakes up to `n`
/// waiters, `acquire` blocks until a permit is available.
pub struct Semaphore {
    count: Mutex<usize>,
    condvar: Condvar,
}

impl Semaphore {
    pub fn new(initial: usize) -> Self {
        Self {
            count: Mutex::new(initial),
            condvar: Condvar::new(),
        }
    }

    pub fn acquire(&self) {
        let mut count = self.count.lock().unwrap();
        while *count == 0 {
            count = self.condvar.wait(count).unwrap();
        }
        *count -= 1;
    }

    /// Acquire with an absolute deadline. Returns `TimedOut` if the
    /// deadline passes with no permit available; spurious wakeups are
    /// handled internally by re-checking the predicate.
    pub fn acquire_timeout(&self, deadline: Instant) -> WaitOutcome {
        let mut count = self.count.lock().unwrap();
        loop {
            if *count > 0 {
                *count -= 1;
                return WaitOutcome::Signaled;
            }
            let now = Instant::now();
            if now >= deadline {
                return WaitOutcome::TimedOut;
            }
            let (guard, timeout_result) =
                self.condvar.wait_timeout(count, deadline - now).unwrap();
            count = guard;
            if timeout_result.timed_out() && *count == 0 {
                return WaitOutcome::TimedOut;
            }
        }
    }

    /// Release `n` permits, waking up to `n` waiters.
    pub fn release(&self, n: usize) {
        if n == 0 {
            return;
        }
        let mut count = self.count.lock().unwrap();
        *count += n;
        drop(count);
        if n == 1 {
            self.condvar.notify_one();
        } else {
            self.condvar.notify_all();
        }
    }

    pub fn available(&self) -> usize {
        *self.count.lock().unwrap()
    }
}

/// Monotonic clock, relative to the first call to `now_ns` in this
/// process (there is no requirement that it track wall-clock time, only
/// that it never decreases).
pub struct Clock {
    origin: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn now_ns(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }

    /// The `Instant` at which `now_ns()` would read `ns`, for passing to
    /// `sleep_until` when throttling on a logical tag's time component.
    pub fn deadline_for(&self, ns: u64) -> Instant {
        self.origin + Duration::from_nanos(ns)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// A cooperative cancellation flag threaded through bounded sleeps.
#[derive(Default)]
pub struct CancelToken(AtomicBool);

impl CancelToken {
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Sleep until at least `deadline` has passed, re-sleeping any remaining
/// duration if the OS wakes the thread early for reasons other than
/// cancellation (the only early-return contract this primitive honors).
pub fn sleep_until(deadline: Instant, cancel: &CancelToken) {
    loop {
        if cancel.is_cancelled() {
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        std::thread::sleep(deadline - now);
    }
}

pub fn sleep_for(duration: Duration, cancel: &CancelToken) {
    sleep_until(Instant::now() + duration, cancel);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_semaphore_basic_acquire_release() {
        let sem = Semaphore::new(0);
        assert_eq!(sem.available(), 0);
        sem.release(2);
        assert_eq!(sem.available(), 2);
        sem.acquire();
        assert_eq!(sem.available(), 1);
        sem.acquire();
        assert_eq!(sem.available(), 0);
    }

    #[test]
    fn test_semaphore_wakes_blocked_waiter() {
        let sem = Arc::new(Semaphore::new(0));
        let sem2 = Arc::clone(&sem);
        let handle = thread::spawn(move || {
            sem2.acquire();
        });
        thread::sleep(Duration::from_millis(20));
        sem.release(1);
        handle.join().unwrap();
    }

    #[test]
    fn test_semaphore_timeout() {
        let sem = Semaphore::new(0);
        let outcome = sem.acquire_timeout(Instant::now() + Duration::from_millis(20));
        assert_eq!(outcome, WaitOutcome::TimedOut);
    }

    #[test]
    fn test_semaphore_timeout_signaled() {
        let sem = Arc::new(Semaphore::new(0));
        let sem2 = Arc::clone(&sem);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            sem2.release(1);
        });
        let outcome = sem.acquire_timeout(Instant::now() + Duration::from_secs(5));
        assert_eq!(outcome, WaitOutcome::Signaled);
    }

    #[test]
    fn test_clock_is_monotonic() {
        let clock = Clock::new();
        let a = clock.now_ns();
        let b = clock.now_ns();
        assert!(b >= a);
    }

    #[test]
    fn test_clock_deadline_for_is_in_the_future_for_a_nonzero_offset() {
        let clock = Clock::new();
        let before = Instant::now();
        let deadline = clock.deadline_for(1_000_000);
        assert!(deadline > before);
    }

    #[test]
    fn test_sleep_until_respects_deadline() {
        let cancel = CancelToken::new();
        let deadline = Instant::now() + Duration::from_millis(15);
        let start = Instant::now();
        sleep_until(deadline, &cancel);
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn test_sleep_until_cancellation() {
        let cancel = Arc::new(CancelToken::new());
        let cancel2 = Arc::clone(&cancel);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(5));
            cancel2.cancel();
        });
        let start = Instant::now();
        sleep_until(Instant::now() + Duration::from_secs(5), &cancel);
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
