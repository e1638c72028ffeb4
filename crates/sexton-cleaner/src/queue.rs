//! Boundary between the reclaimer and the cleaner worker
//!
//! The reclaimer pushes registrations whose targets died; the worker is the
//! only consumer and pulls them with a bounded wait.

use crate::registration::Registration;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// A thread-safe source of dead registrations.
///
/// Implementations must eventually deliver every registration handed to
/// [`enqueue`](ReclamationQueue::enqueue). Ordering carries no meaning, and a
/// registration that was already cleaned explicitly may still be delivered;
/// the worker ignores it.
pub trait ReclamationQueue: Send + Sync {
    /// Hand over a registration whose target became unreachable
    fn enqueue(&self, registration: Arc<Registration>);

    /// Wait up to `timeout` for the next registration
    fn poll(&self, timeout: Duration) -> Option<Arc<Registration>>;
}

/// FIFO [`ReclamationQueue`] backed by a mutex-guarded deque and a condvar
#[derive(Default)]
pub struct BlockingQueue {
    items: Mutex<VecDeque<Arc<Registration>>>,
    available: Condvar,
}

impl BlockingQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registrations waiting for the worker
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no registration is waiting
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Arc<Registration>>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ReclamationQueue for BlockingQueue {
    fn enqueue(&self, registration: Arc<Registration>) {
        self.lock().push_back(registration);
        self.available.notify_one();
    }

    fn poll(&self, timeout: Duration) -> Option<Arc<Registration>> {
        let deadline = Instant::now() + timeout;
        let mut items = self.lock();
        loop {
            if let Some(registration) = items.pop_front() {
                return Some(registration);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            // Spurious wakeups just go around the loop again
            items = self
                .available
                .wait_timeout(items, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

impl fmt::Debug for BlockingQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingQueue")
            .field("len", &self.len())
            .finish()
    }
}
