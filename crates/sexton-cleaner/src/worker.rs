//! Background worker that drains the reclamation queue

use crate::cleaner::Shared;
use crate::config::CleanerConfig;
use crate::metrics::CleanTrigger;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// The loop run on a cleaner's dedicated thread.
///
/// It keeps polling while the tracking list holds any registration, and exits
/// once the list is empty. The bounded poll guarantees that emptiness is
/// re-checked at least once per timeout even when nothing is reclaimed.
pub(crate) struct CleanerWorker {
    shared: Arc<Shared>,
    poll_timeout: Duration,
}

/// Signals termination even if the loop unwinds
struct TerminationGuard<'a>(&'a Shared);

impl Drop for TerminationGuard<'_> {
    fn drop(&mut self) {
        self.0.mark_terminated();
    }
}

impl CleanerWorker {
    pub(crate) fn new(shared: Arc<Shared>, poll_timeout: Duration) -> Self {
        Self {
            shared,
            poll_timeout,
        }
    }

    /// Spawn the worker on a thread configured from `config`
    pub(crate) fn spawn(shared: Arc<Shared>, config: &CleanerConfig) -> io::Result<JoinHandle<()>> {
        let mut builder = thread::Builder::new().name(config.thread_name.clone());
        if let Some(size) = config.stack_size {
            builder = builder.stack_size(size);
        }
        let worker = Self::new(shared, config.poll_timeout());
        builder.spawn(move || worker.run())
    }

    /// Run until every registration has been cleaned
    pub(crate) fn run(self) {
        let _guard = TerminationGuard(&self.shared);

        tracing::info!(
            "Cleaner worker started (poll timeout: {:?}, pending: {})",
            self.poll_timeout,
            self.shared.list.len()
        );

        while !self.shared.list.is_empty() {
            self.step();
        }

        let metrics = self.shared.metrics.snapshot();
        tracing::info!("Cleaner worker stopped. Final metrics:\n{}", metrics.summary());
    }

    /// One bounded poll; cleans the delivered registration if any
    fn step(&self) {
        match self.shared.queue.poll(self.poll_timeout) {
            Some(registration) => {
                self.shared.metrics.record_poll(false);
                // Loses quietly if the owner already cleaned it explicitly
                registration.clean(CleanTrigger::Reclaimed);
            }
            None => {
                self.shared.metrics.record_poll(true);
                tracing::trace!(
                    "Cleaner worker idle, {} registrations pending",
                    self.shared.list.len()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{BlockingQueue, ReclamationQueue};
    use crate::registration::CleanupState;
    use crate::tracked::Tracked;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    fn shared() -> Arc<Shared> {
        let queue: Arc<dyn ReclamationQueue> = Arc::new(BlockingQueue::new());
        Arc::new(Shared::new(queue))
    }

    #[test]
    fn test_run_returns_when_list_empty() {
        let shared = shared();
        let started = Instant::now();
        CleanerWorker::new(Arc::clone(&shared), Duration::from_secs(30)).run();

        assert!(started.elapsed() < Duration::from_secs(30));
        assert!(shared.await_termination(Duration::ZERO));
        assert_eq!(shared.metrics.snapshot().polls, 0);
    }

    #[test]
    fn test_step_cleans_reclaimed_registration() {
        let shared = shared();
        let runs = Arc::new(AtomicUsize::new(0));
        let target = Tracked::new(1u8);
        let counter = Arc::clone(&runs);
        let cleanable = shared.register(
            &target,
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        drop(target);
        let worker = CleanerWorker::new(Arc::clone(&shared), Duration::from_millis(50));
        worker.step();

        assert_eq!(cleanable.state(), CleanupState::Cleaned);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(shared.list.is_empty());

        let metrics = shared.metrics.snapshot();
        assert_eq!(metrics.cleaned_by_reclaimer, 1);
        assert_eq!(metrics.polls, 1);
        assert_eq!(metrics.idle_polls, 0);
    }

    #[test]
    fn test_step_ignores_already_cleaned() {
        let shared = shared();
        let runs = Arc::new(AtomicUsize::new(0));
        let target = Tracked::new(());
        let counter = Arc::clone(&runs);
        let cleanable = shared.register(
            &target,
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert!(cleanable.clean());
        // Delivered anyway, e.g. by a reclaimer that does not filter
        let worker = CleanerWorker::new(Arc::clone(&shared), Duration::from_millis(50));
        let registration = Arc::clone(cleanable.registration());
        shared.queue.enqueue(registration);
        worker.step();

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        let metrics = shared.metrics.snapshot();
        assert_eq!(metrics.cleaned_explicitly, 1);
        assert_eq!(metrics.cleaned_by_reclaimer, 0);
    }

    #[test]
    fn test_idle_step_times_out() {
        let shared = shared();
        let target = Tracked::new(());
        let _cleanable = shared.register(&target, Box::new(|| {}));

        let worker = CleanerWorker::new(Arc::clone(&shared), Duration::from_millis(20));
        worker.step();

        let metrics = shared.metrics.snapshot();
        assert_eq!(metrics.idle_polls, 1);
        assert_eq!(shared.list.len(), 1);
    }

    #[test]
    fn test_spawned_worker_drains_and_exits() {
        let shared = shared();
        let targets: Vec<_> = (0..10).map(Tracked::new).collect();
        let cleanables: Vec<_> = targets
            .iter()
            .map(|target| shared.register(target, Box::new(|| {})))
            .collect();

        let config = CleanerConfig {
            thread_name: "worker-test".to_string(),
            poll_timeout_ms: 20,
            stack_size: None,
        };
        let handle = CleanerWorker::spawn(Arc::clone(&shared), &config).unwrap();
        assert_eq!(handle.thread().name(), Some("worker-test"));

        drop(targets);
        assert!(shared.await_termination(Duration::from_secs(5)));
        handle.join().unwrap();
        assert!(cleanables.iter().all(|c| c.state() == CleanupState::Cleaned));
    }
}
