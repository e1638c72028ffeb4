//! Segmented tracking list with O(1) removal by handle

use crate::handle::{ListHandle, Locator, DETACHED};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Number of entries held by one segment
pub const NODE_CAPACITY: usize = 64;

/// Source of list ids; 0 is reserved for detached handles
static NEXT_LIST_ID: AtomicUsize = AtomicUsize::new(1);

struct Entry<T> {
    value: T,
    locator: Arc<Locator>,
}

/// Segments guarded by the list mutex.
///
/// The last segment is the head. Every segment below the head is full.
struct Chain<T> {
    segments: Vec<Vec<Entry<T>>>,
    /// At most one emptied segment kept for the next overflow
    spare: Option<Vec<Entry<T>>>,
    allocated: usize,
    len: usize,
}

impl<T> Chain<T> {
    fn new() -> Self {
        Self {
            segments: vec![Vec::with_capacity(NODE_CAPACITY)],
            spare: None,
            allocated: 1,
            len: 0,
        }
    }

    fn head(&self) -> usize {
        self.segments.len() - 1
    }

    fn push(&mut self, locator: Arc<Locator>, value: T) {
        if self.segments[self.head()].len() == NODE_CAPACITY {
            let segment = match self.spare.take() {
                Some(segment) => segment,
                None => {
                    self.allocated += 1;
                    Vec::with_capacity(NODE_CAPACITY)
                }
            };
            self.segments.push(segment);
        }

        let head = self.head();
        locator.relocate(head, self.segments[head].len());
        self.segments[head].push(Entry { value, locator });
        self.len += 1;
    }

    fn take(&mut self, locator: &Arc<Locator>) -> Option<T> {
        let (segment, index) = locator.position();
        let head = self.head();

        let in_place = segment <= head
            && self.segments[segment]
                .get(index)
                .is_some_and(|entry| Arc::ptr_eq(&entry.locator, locator));
        if !in_place {
            debug_assert!(
                false,
                "tracking list handle points at ({segment}, {index}) which holds another entry"
            );
            return None;
        }

        let removed = if segment == head {
            let removed = self.segments[head].swap_remove(index);
            if let Some(moved) = self.segments[head].get(index) {
                moved.locator.relocate(head, index);
            }
            removed
        } else {
            let last = self.segments[head]
                .pop()
                .expect("head segment is never empty while older segments exist");
            last.locator.relocate(segment, index);
            std::mem::replace(&mut self.segments[segment][index], last)
        };

        removed.locator.detach();
        self.len -= 1;

        if head > 0 && self.segments[head].is_empty() {
            // Promote the next (full) segment; keep the emptied one around
            if let Some(emptied) = self.segments.pop() {
                if self.spare.is_none() {
                    self.spare = Some(emptied);
                }
            }
        }

        Some(removed.value)
    }
}

impl<T> Drop for Chain<T> {
    fn drop(&mut self) {
        for entry in self.segments.iter().flatten() {
            entry.locator.detach();
        }
    }
}

/// A thread-safe collection of live entries supporting O(1) insert and O(1)
/// removal through the [`ListHandle`] returned at insertion.
///
/// Entries are stored in fixed-size segments of [`NODE_CAPACITY`]. Removal
/// swaps the victim with the last entry of the head segment, so only the head
/// is ever partially filled. An emptied head is cached and reused, which keeps
/// segment allocation bounded when the size oscillates around a segment edge.
///
/// # Examples
///
/// ```
/// use sexton_list::TrackingList;
///
/// let list = TrackingList::new();
/// let a = list.insert("a");
/// let b = list.insert("b");
///
/// assert!(list.remove(&a));
/// assert!(!list.remove(&a));
/// assert_eq!(list.take(&b), Some("b"));
/// assert!(list.is_empty());
/// ```
pub struct TrackingList<T> {
    id: usize,
    chain: Mutex<Chain<T>>,
}

impl<T> TrackingList<T> {
    /// Create an empty list with a single segment
    pub fn new() -> Self {
        Self {
            id: NEXT_LIST_ID.fetch_add(1, Ordering::Relaxed),
            chain: Mutex::new(Chain::new()),
        }
    }

    /// Insert a value and return the handle that removes it
    pub fn insert(&self, value: T) -> ListHandle {
        let handle = ListHandle::new();
        let claimed = handle.locator().claim(self.id);
        debug_assert!(claimed, "fresh handle is always detached");
        self.lock().push(Arc::clone(handle.locator()), value);
        handle
    }

    /// Insert a value under a handle created beforehand with [`ListHandle::new`].
    ///
    /// This lets an entry keep its own handle before it is inserted. Returns the
    /// value back if the handle is already attached to a list.
    pub fn attach(&self, handle: &ListHandle, value: T) -> Result<(), T> {
        let mut chain = self.lock();
        if !handle.locator().claim(self.id) {
            return Err(value);
        }
        chain.push(Arc::clone(handle.locator()), value);
        Ok(())
    }

    /// Remove the entry behind `handle`, returning its value.
    ///
    /// Returns `None` if the entry was already removed.
    pub fn take(&self, handle: &ListHandle) -> Option<T> {
        let mut chain = self.lock();
        match handle.locator().owner() {
            DETACHED => None,
            owner if owner == self.id => chain.take(handle.locator()),
            _ => {
                debug_assert!(false, "handle belongs to another tracking list");
                None
            }
        }
    }

    /// Remove the entry behind `handle`.
    ///
    /// Returns `false` if it was already removed; removing twice is a no-op.
    pub fn remove(&self, handle: &ListHandle) -> bool {
        self.take(handle).is_some()
    }

    /// Whether the list holds no entries. Only the head segment is inspected.
    pub fn is_empty(&self) -> bool {
        let chain = self.lock();
        chain.segments[chain.head()].is_empty()
    }

    /// Number of entries in the list
    pub fn len(&self) -> usize {
        self.lock().len
    }

    /// Number of segments currently in the chain, excluding the spare
    pub fn segment_count(&self) -> usize {
        self.lock().segments.len()
    }

    /// Number of segments allocated over the lifetime of the list
    pub fn allocated_segments(&self) -> usize {
        self.lock().allocated
    }

    fn lock(&self) -> MutexGuard<'_, Chain<T>> {
        // Mutations validate the handle before touching the chain
        self.chain.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for TrackingList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for TrackingList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let chain = self.lock();
        f.debug_struct("TrackingList")
            .field("id", &self.id)
            .field("len", &chain.len)
            .field("segments", &chain.segments.len())
            .field("spare", &chain.spare.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn test_new_list_is_empty() {
        let list: TrackingList<u32> = TrackingList::new();
        assert!(list.is_empty());
        assert_eq!(list.len(), 0);
        assert_eq!(list.segment_count(), 1);
        assert_eq!(list.allocated_segments(), 1);
    }

    #[test]
    fn test_insert_and_remove() {
        let list = TrackingList::new();
        let handle = list.insert(42);

        assert!(handle.is_attached());
        assert!(!list.is_empty());
        assert_eq!(list.len(), 1);

        assert!(list.remove(&handle));
        assert!(!handle.is_attached());
        assert!(list.is_empty());
    }

    #[test]
    fn test_double_remove_returns_false() {
        let list = TrackingList::new();
        let handle = list.insert("x");
        let _other = list.insert("y");

        assert!(list.remove(&handle));
        assert!(!list.remove(&handle));
        assert!(list.take(&handle).is_none());
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_take_returns_value() {
        let list = TrackingList::new();
        let a = list.insert(String::from("a"));
        let b = list.insert(String::from("b"));
        let c = list.insert(String::from("c"));

        assert_eq!(list.take(&a).as_deref(), Some("a"));
        assert_eq!(list.take(&c).as_deref(), Some("c"));
        assert_eq!(list.take(&b).as_deref(), Some("b"));
        assert!(list.is_empty());
    }

    #[test]
    fn test_attach_prepared_handle() {
        let list = TrackingList::new();
        let handle = ListHandle::new();

        assert!(list.attach(&handle, 5).is_ok());
        assert_eq!(list.attach(&handle, 6), Err(6));
        assert_eq!(list.len(), 1);

        assert_eq!(list.take(&handle), Some(5));
        // Detached again, so it can be reused
        assert!(list.attach(&handle, 7).is_ok());
        assert_eq!(list.take(&handle), Some(7));
    }

    #[test]
    fn test_remove_from_full_segment_swaps_with_head() {
        let list = TrackingList::new();
        let count = NODE_CAPACITY * 2 + 5;
        let handles: Vec<_> = (0..count).map(|i| list.insert(i)).collect();
        assert_eq!(list.segment_count(), 3);

        // Entry in the oldest, full segment
        assert_eq!(list.take(&handles[3]), Some(3));
        assert_eq!(list.len(), count - 1);

        for (i, handle) in handles.iter().enumerate() {
            if i == 3 {
                continue;
            }
            assert_eq!(list.take(handle), Some(i), "entry {} lost its position", i);
        }
        assert!(list.is_empty());
        assert_eq!(list.segment_count(), 1);
    }

    #[test]
    fn test_head_promotion_caches_spare() {
        let list = TrackingList::new();
        let handles: Vec<_> = (0..=NODE_CAPACITY).map(|i| list.insert(i)).collect();
        assert_eq!(list.segment_count(), 2);
        assert_eq!(list.allocated_segments(), 2);

        // Emptying the head promotes the full segment underneath
        assert!(list.remove(&handles[NODE_CAPACITY]));
        assert_eq!(list.segment_count(), 1);
        assert!(!list.is_empty());

        // The cached segment is reused instead of allocating
        let again = list.insert(999);
        assert_eq!(list.segment_count(), 2);
        assert_eq!(list.allocated_segments(), 2);
        assert_eq!(list.take(&again), Some(999));
    }

    #[test]
    fn test_bounded_allocation_under_oscillation() {
        let list = TrackingList::new();
        let base: Vec<_> = (0..NODE_CAPACITY - 1).map(|i| list.insert(i)).collect();
        let initial = list.allocated_segments();

        for round in 0..10_000 {
            let a = list.insert(round);
            let b = list.insert(round);
            let c = list.insert(round);
            assert!(list.remove(&b));
            assert!(list.remove(&a));
            assert!(list.remove(&c));
        }

        assert!(list.allocated_segments() <= initial + 2);
        assert_eq!(list.len(), base.len());
        for handle in &base {
            assert!(list.remove(handle));
        }
        assert!(list.is_empty());
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "another tracking list"))]
    fn test_foreign_handle_is_rejected() {
        let first = TrackingList::new();
        let second: TrackingList<i32> = TrackingList::new();
        let handle = first.insert(1);

        assert!(!second.remove(&handle));
        assert_eq!(first.len(), 1);
    }

    #[test]
    fn test_drop_detaches_handles() {
        let list = TrackingList::new();
        let handles: Vec<_> = (0..NODE_CAPACITY + 3).map(|i| list.insert(i)).collect();
        drop(list);
        assert!(handles.iter().all(|handle| !handle.is_attached()));
    }

    #[test]
    fn test_concurrent_insert_remove() {
        let list = Arc::new(TrackingList::new());
        let keep: Vec<_> = (0..100).map(|i| list.insert(i)).collect();

        let workers: Vec<_> = (0..8)
            .map(|t| {
                let list = Arc::clone(&list);
                thread::spawn(move || {
                    for i in 0..1_000 {
                        let handle = list.insert(10_000 + t * 1_000 + i);
                        assert!(list.remove(&handle));
                        assert!(!list.remove(&handle));
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(list.len(), 100);
        let values: HashSet<_> = keep.iter().filter_map(|h| list.take(h)).collect();
        assert_eq!(values, (0..100).collect());
        assert!(list.is_empty());
    }
}
