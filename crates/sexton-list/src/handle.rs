//! Handles that locate an entry inside a [`TrackingList`](crate::TrackingList)

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Owner id of a locator that is not in any list
pub(crate) const DETACHED: usize = 0;

/// Shared position record for one entry.
///
/// `segment` and `index` are only read and written while the owning list's
/// mutex is held, so relaxed ordering is enough for them. `owner` is also read
/// without the lock by [`ListHandle::is_attached`].
#[derive(Debug)]
pub(crate) struct Locator {
    owner: AtomicUsize,
    segment: AtomicUsize,
    index: AtomicUsize,
}

impl Locator {
    fn new() -> Self {
        Self {
            owner: AtomicUsize::new(DETACHED),
            segment: AtomicUsize::new(0),
            index: AtomicUsize::new(0),
        }
    }

    pub(crate) fn owner(&self) -> usize {
        self.owner.load(Ordering::Acquire)
    }

    /// Claim this locator for the list `owner`. Fails if it is already attached.
    pub(crate) fn claim(&self, owner: usize) -> bool {
        self.owner
            .compare_exchange(DETACHED, owner, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn position(&self) -> (usize, usize) {
        (
            self.segment.load(Ordering::Relaxed),
            self.index.load(Ordering::Relaxed),
        )
    }

    pub(crate) fn relocate(&self, segment: usize, index: usize) {
        self.segment.store(segment, Ordering::Relaxed);
        self.index.store(index, Ordering::Relaxed);
    }

    pub(crate) fn detach(&self) {
        self.owner.store(DETACHED, Ordering::Release);
    }
}

/// Opaque handle to one entry of a [`TrackingList`](crate::TrackingList).
///
/// The handle follows its entry when the list moves it between slots, which
/// is what makes removal O(1). Clones of a handle refer to the same entry.
#[derive(Debug, Clone)]
pub struct ListHandle {
    locator: Arc<Locator>,
}

impl ListHandle {
    /// Create a handle that is not attached to any list yet
    pub fn new() -> Self {
        Self {
            locator: Arc::new(Locator::new()),
        }
    }

    /// Whether the entry is currently stored in a list
    ///
    /// Read without the list lock, so a concurrent insert or remove may not be
    /// reflected yet.
    pub fn is_attached(&self) -> bool {
        self.locator.owner() != DETACHED
    }

    /// Whether two handles refer to the same entry
    pub fn same_entry(&self, other: &ListHandle) -> bool {
        Arc::ptr_eq(&self.locator, &other.locator)
    }

    pub(crate) fn locator(&self) -> &Arc<Locator> {
        &self.locator
    }
}

impl Default for ListHandle {
    fn default() -> Self {
        Self::new()
    }
}
