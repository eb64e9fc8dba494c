//! Persistence of the todo collection.
//!
//! The whole collection is stored under one fixed logical key
//! ([`STORAGE_KEY`]) as a JSON array. Loading happens once at startup and
//! is forgiving: a corrupt document yields an empty collection, and a
//! malformed entry is skipped without discarding its neighbours. Saving
//! rewrites the full collection.
//!
//! # Storage Format
//!
//! ```json
//! [
//!   {
//!     "id": "0f8fad5b-d9cb-469f-a165-70867728950e",
//!     "title": "Stand-up",
//!     "createdAt": 1704099600000,
//!     "durationMinutes": null,
//!     "scheduledFor": "2024-01-02T09:00:00Z",
//!     "completed": false,
//!     "expired": false,
//!     "notified": false,
//!     "tags": ["work"],
//!     "repeat": {"frequency": "daily", "time": "09:00"}
//!   }
//! ]
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tracing::{debug, warn};

use crate::types::Todo;

/// Logical key the collection is stored under.
pub const STORAGE_KEY: &str = "my-todos";

/// Errors that can occur while reading or writing the collection.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Load-all / save-all storage for the todo collection.
pub trait TodoRepository: Send + std::fmt::Debug {
    /// Loads the stored collection. Missing storage is an empty collection.
    ///
    /// # Errors
    ///
    /// Only for failures to reach the storage itself; unparseable content
    /// is recovered as an empty (or partial) collection.
    fn load(&self) -> Result<Vec<Todo>, PersistenceError>;

    /// Replaces the stored collection with `todos`.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError` if serialization or the write fails.
    fn save(&self, todos: &[Todo]) -> Result<(), PersistenceError>;
}

/// Parses a stored collection, skipping anything it cannot understand.
///
/// # Example
///
/// ```
/// use timebox_engine::persistence::parse_todos_lenient;
///
/// let json = r#"[
///   {"id": "a", "title": "Valid", "createdAt": 0, "durationMinutes": 5},
///   {"id": "b"},
///   {"id": "c", "title": "Also valid", "createdAt": 0, "durationMinutes": null}
/// ]"#;
///
/// assert_eq!(parse_todos_lenient(json).len(), 2);
/// assert!(parse_todos_lenient("{not json").is_empty());
/// assert!(parse_todos_lenient(r#"{"id": "a"}"#).is_empty());
/// ```
#[must_use]
pub fn parse_todos_lenient(content: &str) -> Vec<Todo> {
    if content.trim().is_empty() {
        return Vec::new();
    }

    let value = match serde_json::from_str::<serde_json::Value>(content) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Stored todos are not valid JSON, starting empty");
            return Vec::new();
        }
    };

    let Some(array) = value.as_array() else {
        warn!("Stored todos are not a JSON array, starting empty");
        return Vec::new();
    };

    array
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            match serde_json::from_value::<Todo>(entry.clone()) {
                Ok(todo) => Some(todo),
                Err(e) => {
                    warn!(index, error = %e, "Skipping malformed stored todo");
                    None
                }
            }
        })
        .collect()
}

/// Stores the collection as a JSON file.
///
/// Writes go to a sibling temporary file that is renamed over the target,
/// so a crash mid-write leaves the previous collection intact.
#[derive(Debug, Clone)]
pub struct JsonFileRepository {
    path: PathBuf,
}

impl JsonFileRepository {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Repository at `<dir>/my-todos.json`.
    #[must_use]
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(format!("{STORAGE_KEY}.json")))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TodoRepository for JsonFileRepository {
    fn load(&self) -> Result<Vec<Todo>, PersistenceError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => {
                let todos = parse_todos_lenient(&content);
                debug!(path = %self.path.display(), count = todos.len(), "Loaded todos");
                Ok(todos)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No stored todos yet");
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, todos: &[Todo]) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(todos)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;

        debug!(path = %self.path.display(), count = todos.len(), "Saved todos");
        Ok(())
    }
}

/// Keeps the serialized collection in memory.
///
/// Clones share storage, which lets tests inspect what an engine saved.
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    raw: Arc<Mutex<Option<String>>>,
}

impl MemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Repository pre-filled with raw stored content.
    #[must_use]
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            raw: Arc::new(Mutex::new(Some(raw.into()))),
        }
    }

    /// The raw stored content, if anything was saved.
    #[must_use]
    pub fn raw(&self) -> Option<String> {
        self.raw.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl TodoRepository for MemoryRepository {
    fn load(&self) -> Result<Vec<Todo>, PersistenceError> {
        Ok(self.raw().map(|raw| parse_todos_lenient(&raw)).unwrap_or_default())
    }

    fn save(&self, todos: &[Todo]) -> Result<(), PersistenceError> {
        let json = serde_json::to_string(todos)?;
        *self.raw.lock().unwrap_or_else(PoisonError::into_inner) = Some(json);
        Ok(())
    }
}
