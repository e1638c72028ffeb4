//! Metrics collection for Cleaner operations

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Which path won the race to clean a registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CleanTrigger {
    /// `Cleanable::clean()` on a caller thread
    Explicit,
    /// The worker, after the reclaimer enqueued the registration
    Reclaimed,
}

/// Live counters shared by a cleaner, its registrations and its worker
#[derive(Debug, Default)]
pub(crate) struct CleanerMetrics {
    registered: AtomicU64,
    cleaned_explicitly: AtomicU64,
    cleaned_by_reclaimer: AtomicU64,
    action_panics: AtomicU64,
    polls: AtomicU64,
    idle_polls: AtomicU64,
}

impl CleanerMetrics {
    pub(crate) fn record_registration(&self) {
        self.registered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_clean(&self, trigger: CleanTrigger, panicked: bool) {
        let counter = match trigger {
            CleanTrigger::Explicit => &self.cleaned_explicitly,
            CleanTrigger::Reclaimed => &self.cleaned_by_reclaimer,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        if panicked {
            self.action_panics.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_poll(&self, idle: bool) {
        self.polls.fetch_add(1, Ordering::Relaxed);
        if idle {
            self.idle_polls.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            registered: self.registered.load(Ordering::Relaxed),
            cleaned_explicitly: self.cleaned_explicitly.load(Ordering::Relaxed),
            cleaned_by_reclaimer: self.cleaned_by_reclaimer.load(Ordering::Relaxed),
            action_panics: self.action_panics.load(Ordering::Relaxed),
            polls: self.polls.load(Ordering::Relaxed),
            idle_polls: self.idle_polls.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of a cleaner's counters
///
/// The keepalive registration a cleaner holds on itself is counted like any
/// other registration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Registrations accepted
    pub registered: u64,

    /// Registrations cleaned through `Cleanable::clean()`
    pub cleaned_explicitly: u64,

    /// Registrations cleaned by the worker after reclamation
    pub cleaned_by_reclaimer: u64,

    /// Actions that panicked (on either path)
    pub action_panics: u64,

    /// Queue polls performed by the worker
    pub polls: u64,

    /// Polls that timed out without a registration
    pub idle_polls: u64,
}

impl MetricsSnapshot {
    /// Total registrations cleaned on either path
    pub fn total_cleaned(&self) -> u64 {
        self.cleaned_explicitly + self.cleaned_by_reclaimer
    }

    /// Registrations accepted but not cleaned yet
    pub fn pending(&self) -> u64 {
        self.registered.saturating_sub(self.total_cleaned())
    }

    /// Generate a summary report of metrics
    pub fn summary(&self) -> String {
        let lines = [
            "Cleaner Metrics Summary".to_string(),
            "=======================".to_string(),
            format!("Registered: {}", self.registered),
            format!("Pending: {}", self.pending()),
            format!(
                "Cleaned: {} (explicit: {}, reclaimed: {})",
                self.total_cleaned(),
                self.cleaned_explicitly,
                self.cleaned_by_reclaimer
            ),
            format!("Action panics: {}", self.action_panics),
            format!("Worker polls: {} ({} idle)", self.polls, self.idle_polls),
        ];
        lines.join("\n")
    }
}
