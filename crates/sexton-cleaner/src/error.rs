//! Error types for Cleaner operations

use crate::config::ConfigError;
use thiserror::Error;

/// Errors that can occur during Cleaner operations
///
/// Failures inside cleanup actions are never reported here; they are caught
/// and logged where the action runs.
#[derive(Error, Debug)]
pub enum CleanerError {
    /// The worker thread could not be spawned
    #[error("Failed to spawn cleaner worker thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),

    /// `start()` was called on a cleaner whose worker is already running
    #[error("Cleaner worker already started")]
    AlreadyStarted,

    /// The cleaner was shut down and accepts no new registrations
    #[error("Cleaner has been shut down")]
    ShutDown,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}
