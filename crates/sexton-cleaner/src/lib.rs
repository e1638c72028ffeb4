//! Sexton Cleaner
//!
//! Deferred resource reclamation: run an action once an object becomes
//! unreachable, at most once, without keeping the object alive.
//!
//! # Overview
//!
//! - **Registration**: pairs a liveness-only [`PhantomRef`] to the object with
//!   a cleanup action; moves from `Pending` to `Cleaned` exactly once
//! - **Tracking list**: every pending registration lives in a segmented
//!   [`sexton_list::TrackingList`] until it is cleaned
//! - **Reclamation queue**: the reclaimer pushes registrations whose object
//!   died; the worker pulls them with a bounded wait
//! - **Worker**: one background thread per [`Cleaner`] that runs actions and
//!   survives actions that panic
//!
//! # Reclaimers
//!
//! Objects are tracked through the [`Trackable`] trait. The bundled
//! implementation is [`Tracked<T>`], a shared handle whose last drop enqueues
//! its registrations. Any other liveness source can implement [`Trackable`]
//! and feed its own [`ReclamationQueue`] via [`Cleaner::with_queue`].
//!
//! # Usage
//!
//! ## Reclamation-triggered cleanup
//!
//! ```
//! use sexton_cleaner::{Cleaner, CleanerConfig, Tracked};
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cleaner = Cleaner::create(CleanerConfig::responsive())?;
//! let released = Arc::new(AtomicBool::new(false));
//!
//! let handle = Tracked::new(vec![0u8; 4096]);
//! let flag = Arc::clone(&released);
//! cleaner.register(&handle, move || flag.store(true, Ordering::SeqCst))?;
//!
//! drop(handle);
//! cleaner.shutdown();
//! assert!(cleaner.await_termination(Duration::from_secs(5)));
//! assert!(released.load(Ordering::SeqCst));
//! # Ok(())
//! # }
//! ```
//!
//! ## Explicit cleanup
//!
//! ```
//! use sexton_cleaner::{Cleaner, CleanerConfig, Tracked};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cleaner = Cleaner::new(CleanerConfig::default())?;
//! let file = Tracked::new("scratch.tmp");
//! let cleanable = cleaner.register(&file, || println!("removing scratch file"))?;
//!
//! assert!(cleanable.clean()); // runs now, on this thread
//! assert!(!cleanable.clean()); // never twice
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! The worker can be configured via TOML:
//!
//! ```toml
//! thread_name = "sexton-cleaner"
//! poll_timeout_ms = 60000
//! stack_size = 262144
//! ```
//!
//! # Failure handling
//!
//! A panicking action is caught with `catch_unwind`, logged through `tracing`
//! and counted in [`MetricsSnapshot::action_panics`]. Neither the worker nor
//! the caller of [`Cleanable::clean`] sees the panic. Builds using
//! `panic = "abort"` cannot contain it.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod cleaner;
mod config;
mod error;
mod metrics;
mod queue;
mod registration;
mod tracked;
mod worker;

pub use cleaner::{common, Cleaner};
pub use config::{CleanerConfig, ConfigError};
pub use error::CleanerError;
pub use metrics::MetricsSnapshot;
pub use queue::{BlockingQueue, ReclamationQueue};
pub use registration::{Cleanable, CleanupState, PhantomRef, Registration};
pub use tracked::{Trackable, Tracked};
