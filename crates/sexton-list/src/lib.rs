//! Sexton Tracking List
//!
//! A segmented, slab-backed collection of live registrations with O(1) insert
//! and O(1) removal by handle.
//!
//! ## Layout
//!
//! Entries live in fixed-size segments of [`NODE_CAPACITY`] slots. The newest
//! segment is the *head* and is the only one allowed to be partially filled:
//!
//! - **Insert** appends to the head, opening a new segment when it is full
//! - **Remove** swaps the victim with the head's last entry, updates the moved
//!   entry's [`ListHandle`], then shrinks the head
//! - **Promotion**: an emptied head is dropped from the chain and cached as the
//!   single spare, so a size oscillating around a segment edge stops allocating
//!
//! Every operation takes the list's mutex for a constant-time critical section.
//!
//! ## Example
//!
//! ```
//! use sexton_list::{ListHandle, TrackingList};
//!
//! let list = TrackingList::new();
//!
//! // Handles can be created before insertion and stored inside the entry
//! let handle = ListHandle::new();
//! list.attach(&handle, "pending").unwrap();
//! assert!(handle.is_attached());
//!
//! assert!(list.remove(&handle));
//! assert!(!list.remove(&handle)); // second removal is a no-op
//! assert!(list.is_empty());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod handle;
pub mod list;

// Re-exports for convenience
pub use handle::ListHandle;
pub use list::{TrackingList, NODE_CAPACITY};
