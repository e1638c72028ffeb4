//! Registrations: one tracked object paired with its cleanup action
//!
//! A [`Registration`] starts [`Pending`](CleanupState::Pending) and moves to
//! [`Cleaned`](CleanupState::Cleaned) exactly once. Two paths race for that
//! transition: the owner calling [`Cleanable::clean`], and the worker after
//! the reclaimer reported the target dead. A compare-and-swap picks the winner;
//! only the winner leaves the tracking list and runs the action.

use crate::cleaner::Shared;
use crate::metrics::CleanTrigger;
use sexton_list::ListHandle;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Boxed cleanup action
pub(crate) type Action = Box<dyn FnOnce() + Send + 'static>;

const PENDING: u8 = 0;
const CLEANED: u8 = 1;

/// Lifecycle of a registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CleanupState {
    /// Tracked, action not run yet
    Pending,
    /// Action ran (or was claimed to run); terminal
    Cleaned,
}

/// Result of one attempt to clean a registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CleanOutcome {
    /// This call won the transition and the action returned normally
    Ran,
    /// This call won the transition and the action panicked
    Panicked,
    /// Another call had already cleaned the registration
    AlreadyCleaned,
}

/// Liveness-only back reference to a tracked object.
///
/// It answers whether the target is still alive and whether two references
/// point at the same target. It never hands out the target itself, so the
/// tracking machinery cannot resurrect an object that is being torn down.
#[derive(Clone)]
pub struct PhantomRef {
    target: Weak<dyn Any + Send + Sync>,
}

impl PhantomRef {
    /// Create a back reference to the value behind `target`
    pub fn new<T: Any + Send + Sync>(target: &Arc<T>) -> Self {
        let target: Weak<T> = Arc::downgrade(target);
        Self { target }
    }

    /// Whether any strong handle to the target remains
    pub fn is_alive(&self) -> bool {
        self.target.strong_count() > 0
    }

    /// Whether both references track the same object
    pub fn same_target(&self, other: &PhantomRef) -> bool {
        Weak::ptr_eq(&self.target, &other.target)
    }
}

impl fmt::Debug for PhantomRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhantomRef")
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// The record pairing a tracked object with its cleanup action.
///
/// Registrations are created by [`Cleaner::register`](crate::Cleaner::register)
/// and travel through the [`ReclamationQueue`](crate::ReclamationQueue) once
/// their target dies. Callers interact with them through [`Cleanable`].
pub struct Registration {
    id: u64,
    state: AtomicU8,
    target: PhantomRef,
    action: Mutex<Option<Action>>,
    position: ListHandle,
    owner: Weak<Shared>,
}

impl Registration {
    pub(crate) fn new(id: u64, target: PhantomRef, action: Action, owner: Weak<Shared>) -> Self {
        Self {
            id,
            state: AtomicU8::new(PENDING),
            target,
            action: Mutex::new(Some(action)),
            position: ListHandle::new(),
            owner,
        }
    }

    /// Identifier, unique within the owning cleaner
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current lifecycle state
    pub fn state(&self) -> CleanupState {
        match self.state.load(Ordering::Acquire) {
            PENDING => CleanupState::Pending,
            _ => CleanupState::Cleaned,
        }
    }

    /// Whether the action has not been claimed yet
    pub fn is_pending(&self) -> bool {
        self.state() == CleanupState::Pending
    }

    /// Back reference to the tracked object
    pub fn target(&self) -> &PhantomRef {
        &self.target
    }

    pub(crate) fn position(&self) -> &ListHandle {
        &self.position
    }

    /// Pending -> Cleaned; true only for the single caller that wins
    fn try_transition_to_cleaned(&self) -> bool {
        self.state
            .compare_exchange(PENDING, CLEANED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Clean this registration if nobody has yet.
    ///
    /// The winner leaves the tracking list and runs the action on the current
    /// thread. A panicking action is caught and logged here, so neither the
    /// worker nor an explicit caller ever sees it.
    pub(crate) fn clean(&self, trigger: CleanTrigger) -> CleanOutcome {
        if !self.try_transition_to_cleaned() {
            return CleanOutcome::AlreadyCleaned;
        }

        let owner = self.owner.upgrade();
        if let Some(shared) = &owner {
            let removed = shared.list.remove(&self.position);
            debug_assert!(
                removed,
                "pending registration {} missing from its tracking list",
                self.id
            );
        }

        let action = self
            .action
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let outcome = match action.map(|action| panic::catch_unwind(AssertUnwindSafe(action))) {
            Some(Err(payload)) => {
                tracing::warn!(
                    "Cleanup action for registration {} panicked: {}",
                    self.id,
                    panic_message(payload.as_ref())
                );
                CleanOutcome::Panicked
            }
            Some(Ok(())) | None => CleanOutcome::Ran,
        };

        tracing::debug!("Registration {} cleaned ({:?})", self.id, trigger);
        if let Some(shared) = owner {
            shared
                .metrics
                .record_clean(trigger, outcome == CleanOutcome::Panicked);
        }
        outcome
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("target", &self.target)
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Caller-facing handle to a registration.
///
/// Dropping a `Cleanable` does not cancel anything: the action still runs
/// once the target is reclaimed. Clones share the same registration.
#[derive(Clone)]
pub struct Cleanable {
    registration: Arc<Registration>,
}

impl Cleanable {
    pub(crate) fn new(registration: Arc<Registration>) -> Self {
        Self { registration }
    }

    /// Run the cleanup action now, on this thread, unless it already ran.
    ///
    /// Safe to call any number of times and concurrently with the background
    /// worker; the action runs exactly once overall. Returns `true` if this
    /// call ran it. A panic from the action is caught and logged.
    pub fn clean(&self) -> bool {
        self.registration.clean(CleanTrigger::Explicit) != CleanOutcome::AlreadyCleaned
    }

    /// Current lifecycle state
    pub fn state(&self) -> CleanupState {
        self.registration.state()
    }

    /// Whether the action has already been claimed
    pub fn is_cleaned(&self) -> bool {
        self.state() == CleanupState::Cleaned
    }

    /// Identifier, unique within the owning cleaner
    pub fn id(&self) -> u64 {
        self.registration.id()
    }

    /// Back reference to the tracked object
    pub fn target(&self) -> &PhantomRef {
        self.registration.target()
    }

    #[cfg(test)]
    pub(crate) fn registration(&self) -> &Arc<Registration> {
        &self.registration
    }
}

impl fmt::Debug for Cleanable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Cleanable").field(&self.registration).finish()
    }
}
