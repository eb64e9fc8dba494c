//! Error types for the Timebox engine.
//!
//! Each concern owns a focused error enum next to its code; [`TimeboxError`]
//! wraps them for callers that drive the whole engine.

use thiserror::Error;

use crate::config::ConfigError;
use crate::engine::EngineError;
use crate::persistence::PersistenceError;
use crate::store::StoreError;

/// Errors that can occur while running the engine.
#[derive(Error, Debug)]
pub enum TimeboxError {
    /// Configuration-related error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Reading or writing the persisted collection failed.
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// A store operation was rejected.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The engine task could not be reached.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

/// A specialized `Result` type for engine operations.
pub type Result<T> = std::result::Result<T, TimeboxError>;
