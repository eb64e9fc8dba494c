//! Timebox - expiring and recurring todo engine.
//!
//! This crate tracks todos that may be timeless, time-boxed (expire a number
//! of minutes after creation), scheduled for a future instant, and/or
//! recurring daily, weekly or monthly.
//!
//! # Overview
//!
//! A ticker re-evaluates every todo once per second. When a todo reaches its
//! due point it is marked expired, a notification is dispatched exactly once,
//! and a recurring todo spawns its next occurrence.
//!
//! # Modules
//!
//! - [`types`]: Todo and recurrence rule types
//! - [`clock`]: Swappable wall-clock source
//! - [`ids`]: Identifier generation
//! - [`evaluator`]: Expiration evaluation and countdown helpers
//! - [`recurrence`]: Next-occurrence generation
//! - [`notification`]: Notification capability and deduplicating dispatcher
//! - [`store`]: The in-memory collection and its reconciliation pass
//! - [`persistence`]: Load-all / save-all storage
//! - [`engine`]: Tick-driven engine task with start/stop lifecycle
//! - [`views`]: Read-only projections for listing
//! - [`config`]: Configuration from environment variables
//! - [`error`]: Error types

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod ids;
pub mod notification;
pub mod persistence;
pub mod recurrence;
pub mod store;
pub mod types;
pub mod views;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use engine::{Engine, EngineError, EngineHandle};
pub use error::{Result, TimeboxError};
pub use evaluator::{evaluate, Verdict};
pub use ids::{IdGenerator, SequentialIds, UuidGenerator};
pub use notification::{
    LogNotifier, MemoryNotifier, NotificationDispatcher, Notifier, Permission,
};
pub use persistence::{JsonFileRepository, MemoryRepository, TodoRepository};
pub use recurrence::RecurrenceGenerator;
pub use store::{CompleteOutcome, ReconcileReport, StoreError, TodoStore};
pub use types::{DueMode, Frequency, RepeatRule, Todo};
