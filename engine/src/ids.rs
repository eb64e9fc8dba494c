//! Identifier generation for new todos and successors.

use uuid::Uuid;

/// Produces identifiers that never repeat within the process lifetime.
pub trait IdGenerator: Send + std::fmt::Debug {
    fn next_id(&mut self) -> String;
}

/// Random v4 UUIDs.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&mut self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Predictable `<prefix>-<n>` identifiers for tests and fixtures.
///
/// # Example
///
/// ```
/// use timebox_engine::ids::{IdGenerator, SequentialIds};
///
/// let mut ids = SequentialIds::new("todo");
/// assert_eq!(ids.next_id(), "todo-1");
/// assert_eq!(ids.next_id(), "todo-2");
/// ```
#[derive(Debug, Clone)]
pub struct SequentialIds {
    prefix: String,
    next: u64,
}

impl SequentialIds {
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: 1,
        }
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&mut self) -> String {
        let id = format!("{}-{}", self.prefix, self.next);
        self.next += 1;
        id
    }
}
