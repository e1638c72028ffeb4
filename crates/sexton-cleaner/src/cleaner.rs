//! The cleaner service: registration facade and worker lifecycle

use crate::config::CleanerConfig;
use crate::error::CleanerError;
use crate::metrics::{CleanerMetrics, MetricsSnapshot};
use crate::queue::{BlockingQueue, ReclamationQueue};
use crate::registration::{Action, Cleanable, Registration};
use crate::tracked::{Trackable, Tracked};
use crate::worker::CleanerWorker;
use sexton_list::TrackingList;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock, PoisonError, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// State shared by a cleaner, its registrations and its worker thread
pub(crate) struct Shared {
    pub(crate) list: TrackingList<Arc<Registration>>,
    pub(crate) queue: Arc<dyn ReclamationQueue>,
    pub(crate) metrics: CleanerMetrics,
    next_id: AtomicU64,
    terminated: Mutex<bool>,
    terminated_signal: Condvar,
}

impl Shared {
    pub(crate) fn new(queue: Arc<dyn ReclamationQueue>) -> Self {
        Self {
            list: TrackingList::new(),
            queue,
            metrics: CleanerMetrics::default(),
            next_id: AtomicU64::new(0),
            terminated: Mutex::new(false),
            terminated_signal: Condvar::new(),
        }
    }

    /// Create a registration, put it in the list, then arm tracking on `target`
    pub(crate) fn register<R>(self: &Arc<Self>, target: &R, action: Action) -> Cleanable
    where
        R: Trackable + ?Sized,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let registration = Arc::new(Registration::new(
            id,
            target.phantom(),
            action,
            Arc::downgrade(self),
        ));

        let attached = self
            .list
            .attach(registration.position(), Arc::clone(&registration))
            .is_ok();
        debug_assert!(attached, "new registration {} was already in a list", id);

        target.watch(Arc::clone(&registration), Arc::clone(&self.queue));
        self.metrics.record_registration();
        tracing::debug!("Registered cleanup action {}", id);

        Cleanable::new(registration)
    }

    pub(crate) fn mark_terminated(&self) {
        *self.terminated.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.terminated_signal.notify_all();
    }

    pub(crate) fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut terminated = self.terminated.lock().unwrap_or_else(PoisonError::into_inner);
        while !*terminated {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            terminated = self
                .terminated_signal
                .wait_timeout(terminated, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

/// Deferred cleanup service.
///
/// Register an object together with an action, and the action runs once on
/// the cleaner's worker thread after the object becomes unreachable, or
/// earlier on the caller's thread through [`Cleanable::clean`]. Each action
/// runs at most once, and registering never keeps the object alive.
///
/// The worker stays alive for as long as the cleaner does, through a
/// keepalive registration on a private sentinel. [`shutdown`](Cleaner::shutdown)
/// (or dropping the cleaner) releases it; the worker then exits as soon as
/// every remaining registration has been cleaned. Dropping a cleaner that was
/// never started starts its worker if registrations are still pending.
///
/// # Caller obligation
///
/// An action must not capture a handle to its own target. The target would
/// then reference itself through its registration and never die.
///
/// # Examples
///
/// ```
/// use sexton_cleaner::{Cleaner, CleanerConfig, Tracked};
/// use std::sync::mpsc;
/// use std::time::Duration;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let cleaner = Cleaner::create(CleanerConfig::responsive())?;
/// let (tx, rx) = mpsc::channel();
///
/// let socket = Tracked::new("fd 7");
/// let fd = *socket;
/// cleaner.register(&socket, move || tx.send(fd).unwrap())?;
///
/// drop(socket);
/// assert_eq!(rx.recv_timeout(Duration::from_secs(5))?, "fd 7");
/// # Ok(())
/// # }
/// ```
pub struct Cleaner {
    shared: Arc<Shared>,
    config: CleanerConfig,
    /// `None` once shut down; dropping the sentinel wakes the worker
    keepalive: RwLock<Option<Tracked<()>>>,
    keepalive_registration: Cleanable,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Cleaner {
    /// Create a cleaner with its own [`BlockingQueue`]. The worker is not
    /// started yet.
    pub fn new(config: CleanerConfig) -> Result<Self, CleanerError> {
        Self::with_queue(config, Arc::new(BlockingQueue::new()))
    }

    /// Create a cleaner that consumes reclaimed registrations from `queue`
    pub fn with_queue(
        config: CleanerConfig,
        queue: Arc<dyn ReclamationQueue>,
    ) -> Result<Self, CleanerError> {
        config.validate()?;

        let shared = Arc::new(Shared::new(queue));
        let sentinel = Tracked::new(());
        let keepalive_registration = shared.register(&sentinel, Box::new(|| {}));

        Ok(Self {
            shared,
            config,
            keepalive: RwLock::new(Some(sentinel)),
            keepalive_registration,
            worker: Mutex::new(None),
        })
    }

    /// Create a cleaner and start its worker
    pub fn create(config: CleanerConfig) -> Result<Self, CleanerError> {
        let cleaner = Self::new(config)?;
        cleaner.start()?;
        Ok(cleaner)
    }

    /// Spawn the worker thread.
    ///
    /// # Errors
    ///
    /// [`CleanerError::AlreadyStarted`] on a second call, and
    /// [`CleanerError::ThreadSpawn`] if the OS refuses the thread, in which
    /// case `start` may be retried.
    pub fn start(&self) -> Result<(), CleanerError> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.is_some() {
            return Err(CleanerError::AlreadyStarted);
        }

        match CleanerWorker::spawn(Arc::clone(&self.shared), &self.config) {
            Ok(handle) => {
                *worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    "Failed to spawn cleaner worker '{}': {}",
                    self.config.thread_name,
                    e
                );
                Err(CleanerError::ThreadSpawn(e))
            }
        }
    }

    /// Register `action` to run once `target` becomes unreachable.
    ///
    /// The returned [`Cleanable`] can run the action early. Dropping it does
    /// not cancel the registration.
    ///
    /// # Errors
    ///
    /// [`CleanerError::ShutDown`] after [`shutdown`](Cleaner::shutdown).
    pub fn register<R, F>(&self, target: &R, action: F) -> Result<Cleanable, CleanerError>
    where
        R: Trackable + ?Sized,
        F: FnOnce() + Send + 'static,
    {
        // Held across the insert so shutdown cannot slip in between
        let keepalive = self.keepalive.read().unwrap_or_else(PoisonError::into_inner);
        if keepalive.is_none() {
            return Err(CleanerError::ShutDown);
        }
        Ok(self.shared.register(target, Box::new(action)))
    }

    /// Stop accepting registrations and let the worker exit once every pending
    /// registration has been cleaned. Idempotent.
    pub fn shutdown(&self) {
        let sentinel = self
            .keepalive
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(sentinel) = sentinel {
            tracing::info!("Cleaner shutting down ({} registrations pending)", self.pending());
            // Reclaims the keepalive registration through the normal path
            drop(sentinel);
        }
    }

    /// Whether [`shutdown`](Cleaner::shutdown) has been called
    pub fn is_shut_down(&self) -> bool {
        self.keepalive
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Number of caller registrations not cleaned yet
    pub fn pending(&self) -> usize {
        let keepalive = usize::from(!self.keepalive_registration.is_cleaned());
        self.shared.list.len().saturating_sub(keepalive)
    }

    /// Whether the worker thread has been started and has not exited
    pub fn is_worker_running(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Wait up to `timeout` for the worker to exit.
    ///
    /// Returns `false` on timeout, and immediately if the worker was never
    /// started.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let started = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();
        started && self.shared.await_termination(timeout)
    }

    /// Snapshot of this cleaner's counters
    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Configuration this cleaner was built with
    pub fn config(&self) -> &CleanerConfig {
        &self.config
    }
}

impl Drop for Cleaner {
    fn drop(&mut self) {
        self.shutdown();

        let started = self
            .worker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();
        let pending = self.pending();
        // Nobody else would ever poll the queue
        if !started && pending > 0 {
            tracing::debug!(
                "Starting worker to drain {} registrations of a dropped cleaner",
                pending
            );
            if let Err(e) = self.start() {
                tracing::warn!(
                    "Dropped cleaner could not drain {} registrations: {}",
                    pending,
                    e
                );
            }
        }
    }
}

impl fmt::Debug for Cleaner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cleaner")
            .field("thread_name", &self.config.thread_name)
            .field("pending", &self.pending())
            .field("shut_down", &self.is_shut_down())
            .field("worker_running", &self.is_worker_running())
            .finish()
    }
}

static COMMON: OnceLock<Cleaner> = OnceLock::new();

/// Process-wide cleaner for components that do not need their own thread.
///
/// Created and started on first use with the default configuration and the
/// thread name `sexton-common-cleaner`. It is never shut down.
pub fn common() -> Result<&'static Cleaner, CleanerError> {
    if let Some(cleaner) = COMMON.get() {
        return Ok(cleaner);
    }

    let cleaner = Cleaner::create(CleanerConfig {
        thread_name: "sexton-common-cleaner".to_string(),
        ..CleanerConfig::default()
    })?;
    // A racing initializer may win; ours is then dropped and shuts itself down
    Ok(COMMON.get_or_init(move || cleaner))
}
