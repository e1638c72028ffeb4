//! Reference-counted handles that report their own death
//!
//! Rust frees objects deterministically, so reachability is the strong count
//! of a shared handle. [`Tracked<T>`] is that handle: when its last clone
//! drops, every pending registration watching it is pushed onto the queue it
//! was armed with. Other reclaimers plug in by implementing [`Trackable`].

use crate::queue::ReclamationQueue;
use crate::registration::{PhantomRef, Registration};
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Mutex, PoisonError};

/// Something a cleaner can watch for death
pub trait Trackable {
    /// Liveness-only back reference to the object
    fn phantom(&self) -> PhantomRef;

    /// Arrange for `registration` to be enqueued on `queue` once the object dies
    fn watch(&self, registration: Arc<Registration>, queue: Arc<dyn ReclamationQueue>);
}

struct Watch {
    registration: Arc<Registration>,
    queue: Arc<dyn ReclamationQueue>,
}

#[derive(Default)]
struct Watchers {
    watches: Mutex<Vec<Watch>>,
}

impl Drop for Watchers {
    fn drop(&mut self) {
        let watches = std::mem::take(
            self.watches
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for watch in watches {
            if watch.registration.is_pending() {
                watch.queue.enqueue(watch.registration);
            }
        }
    }
}

struct TrackedInner<T> {
    value: T,
    watchers: Watchers,
}

/// A shared, cloneable handle whose death notifies the cleaners watching it.
///
/// Behaves like an `Arc<T>`: clones share one value and dereference to it.
/// The value is dropped when the last clone goes away, and at that moment
/// every [`PhantomRef`] to it already reports the target as dead.
///
/// # Examples
///
/// ```
/// use sexton_cleaner::Tracked;
///
/// let buffer = Tracked::new(vec![0u8; 16]);
/// let shared = buffer.clone();
/// assert_eq!(shared.len(), 16);
/// assert!(Tracked::ptr_eq(&buffer, &shared));
/// ```
pub struct Tracked<T> {
    inner: Arc<TrackedInner<T>>,
}

impl<T> Tracked<T> {
    /// Wrap `value` in a new tracked handle
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(TrackedInner {
                value,
                watchers: Watchers::default(),
            }),
        }
    }

    /// Whether both handles share the same value
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Arc::ptr_eq(&this.inner, &other.inner)
    }

    /// Number of live handles to the value
    pub fn strong_count(this: &Self) -> usize {
        Arc::strong_count(&this.inner)
    }

    /// Number of registrations still waiting on this value's death
    pub fn pending_watches(this: &Self) -> usize {
        this.inner
            .watchers
            .watches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|watch| watch.registration.is_pending())
            .count()
    }
}

impl<T> Clone for Tracked<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Deref for Tracked<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner.value
    }
}

impl<T: fmt::Debug> fmt::Debug for Tracked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Tracked").field(&self.inner.value).finish()
    }
}

impl<T: Send + Sync + 'static> Trackable for Tracked<T> {
    fn phantom(&self) -> PhantomRef {
        PhantomRef::new(&self.inner)
    }

    fn watch(&self, registration: Arc<Registration>, queue: Arc<dyn ReclamationQueue>) {
        let mut watches = self
            .inner
            .watchers
            .watches
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Early-cleaned registrations no longer need a death notice
        watches.retain(|watch| watch.registration.is_pending());
        watches.push(Watch {
            registration,
            queue,
        });
    }
}
