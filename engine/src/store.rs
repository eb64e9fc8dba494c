//! The authoritative in-memory todo collection.
//!
//! [`TodoStore`] owns identity and lifecycle of every todo. Each mutation
//! builds a new collection and swaps it in, so a [`snapshot`](TodoStore::snapshot)
//! handed out earlier is never observed half-updated.
//!
//! # State machine
//!
//! ```text
//! Active(timeless) ─────────────────────────────┐
//! Active(timed|scheduled) ── reconcile ──> Expired ──> [successor if recurring]
//!        │                                     │
//!        └───────────── complete ──────────────┴──> Completed (terminal)
//! ```
//!
//! [`reconcile`](TodoStore::reconcile) is the only path that sets `expired`
//! and `notified`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info};

use crate::evaluator::{evaluate, Verdict};
use crate::ids::IdGenerator;
use crate::notification::NotificationDispatcher;
use crate::recurrence::RecurrenceGenerator;
use crate::types::{Todo, DEFAULT_TOGGLE_MINUTES};

/// Errors returned by store mutations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The todo's title is empty or whitespace.
    #[error("todo title cannot be empty")]
    EmptyTitle,

    /// A todo with the same id is already stored.
    #[error("duplicate todo id: {0}")]
    DuplicateId(String),
}

/// What one reconciliation pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Ids that transitioned to expired.
    pub expired: Vec<String>,
    /// Ids whose notification was claimed in this pass.
    pub notified: Vec<String>,
    /// Ids of successors appended in this pass.
    pub spawned: Vec<String>,
}

impl ReconcileReport {
    /// Returns true if the pass changed nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.expired.is_empty() && self.spawned.is_empty()
    }
}

/// Result of [`TodoStore::complete`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompleteOutcome {
    /// Unknown id, or the todo was already completed.
    Ignored,
    /// Marked completed; no successor.
    Completed,
    /// Marked completed and the series continued with this successor id.
    CompletedWithSuccessor(String),
}

impl CompleteOutcome {
    #[must_use]
    pub fn changed(&self) -> bool {
        !matches!(self, Self::Ignored)
    }
}

/// In-memory todo collection with tick-driven reconciliation.
#[derive(Debug)]
pub struct TodoStore {
    todos: Arc<Vec<Todo>>,
    dispatcher: NotificationDispatcher,
    recurrence: RecurrenceGenerator,
    ids: Box<dyn IdGenerator>,
}

impl TodoStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(
        dispatcher: NotificationDispatcher,
        recurrence: RecurrenceGenerator,
        ids: impl IdGenerator + 'static,
    ) -> Self {
        Self {
            todos: Arc::new(Vec::new()),
            dispatcher,
            recurrence,
            ids: Box::new(ids),
        }
    }

    /// Replaces the collection with `todos`, e.g. after loading.
    ///
    /// Ids already marked `notified` are registered with the dispatcher so
    /// they are never notified twice.
    #[must_use]
    pub fn with_todos(mut self, todos: Vec<Todo>) -> Self {
        self.dispatcher
            .seed(todos.iter().filter(|t| t.notified).map(|t| t.id.clone()));
        self.todos = Arc::new(todos);
        self
    }

    /// Current collection. Cheap: clones an `Arc`.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Vec<Todo>> {
        Arc::clone(&self.todos)
    }

    #[must_use]
    pub fn todos(&self) -> &[Todo] {
        &self.todos
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Todo> {
        self.todos.iter().find(|t| t.id == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.todos.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.todos.is_empty()
    }

    /// Allocates an id for a new todo.
    pub fn next_id(&mut self) -> String {
        self.ids.next_id()
    }

    pub fn dispatcher_mut(&mut self) -> &mut NotificationDispatcher {
        &mut self.dispatcher
    }

    #[must_use]
    pub fn dispatcher(&self) -> &NotificationDispatcher {
        &self.dispatcher
    }

    /// Appends a todo.
    ///
    /// # Errors
    ///
    /// - [`StoreError::EmptyTitle`] if the title is blank
    /// - [`StoreError::DuplicateId`] if the id is already present
    pub fn add(&mut self, todo: Todo) -> Result<(), StoreError> {
        if todo.title.trim().is_empty() {
            return Err(StoreError::EmptyTitle);
        }
        if self.get(&todo.id).is_some() {
            return Err(StoreError::DuplicateId(todo.id));
        }

        debug!(todo_id = %todo.id, title = %todo.title, "Adding todo");
        let mut next = Vec::with_capacity(self.todos.len() + 1);
        next.extend(self.todos.iter().cloned());
        next.push(todo);
        self.commit(next);
        Ok(())
    }

    /// Deletes a todo. Returns false if the id is unknown.
    pub fn remove(&mut self, id: &str) -> bool {
        if self.get(id).is_none() {
            return false;
        }
        let next = self.todos.iter().filter(|t| t.id != id).cloned().collect();
        self.commit(next);
        debug!(todo_id = id, "Removed todo");
        true
    }

    /// Marks a todo completed.
    ///
    /// A recurring todo that has not expired yet immediately spawns its
    /// successor, advanced from its original schedule.
    ///
    /// Completing a recurring todo that already expired spawns no successor:
    /// [`reconcile`](Self::reconcile) appended the next occurrence when it
    /// expired, and the series never gets two.
    pub fn complete(&mut self, id: &str, now: DateTime<Utc>) -> CompleteOutcome {
        let Some(current) = self.get(id) else {
            return CompleteOutcome::Ignored;
        };
        if current.completed {
            return CompleteOutcome::Ignored;
        }

        let successor = if current.expired {
            None
        } else {
            let current = current.clone();
            self.recurrence
                .next_occurrence(&current, self.ids.as_mut(), now)
        };

        let mut next: Vec<Todo> = self
            .todos
            .iter()
            .map(|t| {
                if t.id == id {
                    Todo {
                        completed: true,
                        ..t.clone()
                    }
                } else {
                    t.clone()
                }
            })
            .collect();

        let outcome = match successor {
            Some(successor) => {
                info!(
                    todo_id = id,
                    successor = %successor.id,
                    "Completed recurring todo, series advanced"
                );
                let successor_id = successor.id.clone();
                next.push(successor);
                CompleteOutcome::CompletedWithSuccessor(successor_id)
            }
            None => {
                debug!(todo_id = id, "Completed todo");
                CompleteOutcome::Completed
            }
        };

        self.commit(next);
        outcome
    }

    /// Removes every expired todo that is not completed. Returns how many.
    pub fn clear_expired(&mut self) -> usize {
        let (cleared, kept): (Vec<Todo>, Vec<Todo>) = self
            .todos
            .iter()
            .cloned()
            .partition(|t| t.expired && !t.completed);

        if cleared.is_empty() {
            return 0;
        }
        self.commit(kept);
        info!(count = cleared.len(), "Cleared expired todos");
        cleared.len()
    }

    /// Restarts a todo's countdown with a new duration.
    ///
    /// Resets `created_at` to `now`, clears `expired` and `notified`, drops
    /// any fixed schedule, and sets the duration (`None` or zero makes it
    /// timeless). Completed todos are left untouched. Returns false for
    /// no-ops.
    ///
    /// The dispatcher still remembers the id, so a todo that already
    /// notified expires again silently.
    pub fn set_duration(&mut self, id: &str, minutes: Option<u32>, now: DateTime<Utc>) -> bool {
        match self.get(id) {
            Some(todo) if !todo.completed => {}
            _ => return false,
        }
        let minutes = minutes.filter(|m| *m > 0);

        let next = self
            .todos
            .iter()
            .map(|t| {
                if t.id == id {
                    Todo {
                        created_at: now,
                        duration_minutes: minutes,
                        scheduled_for: None,
                        expired: false,
                        notified: false,
                        ..t.clone()
                    }
                } else {
                    t.clone()
                }
            })
            .collect();

        self.commit(next);
        debug!(todo_id = id, ?minutes, "Reset todo duration");
        true
    }

    /// Flips a todo between timed and timeless.
    ///
    /// Timeless todos get [`DEFAULT_TOGGLE_MINUTES`]; timed ones become
    /// timeless. Either way the countdown restarts.
    pub fn toggle_timed(&mut self, id: &str, now: DateTime<Utc>) -> bool {
        let Some(todo) = self.get(id) else {
            return false;
        };
        let minutes = match todo.duration_minutes {
            Some(_) => None,
            None => Some(DEFAULT_TOGGLE_MINUTES),
        };
        self.set_duration(id, minutes, now)
    }

    /// Advances every todo's expiration state to `now`.
    ///
    /// Newly expired todos are marked `expired` and `notified`, their
    /// notification is dispatched (deduplicated), and recurring ones get a
    /// successor appended. Successors are first evaluated on the next pass.
    pub fn reconcile(&mut self, now: DateTime<Utc>) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        if !self
            .todos
            .iter()
            .any(|t| evaluate(t, now).is_expired())
        {
            return report;
        }

        let mut next = Vec::with_capacity(self.todos.len());
        let mut successors = Vec::new();

        for todo in self.todos.iter() {
            if evaluate(todo, now) != Verdict::Expired {
                next.push(todo.clone());
                continue;
            }

            info!(todo_id = %todo.id, title = %todo.title, "Todo expired");
            let expired = Todo {
                expired: true,
                notified: true,
                ..todo.clone()
            };

            report.expired.push(expired.id.clone());
            if self.dispatcher.notify_once(&expired.id, &expired.title) {
                report.notified.push(expired.id.clone());
            }

            if let Some(successor) =
                self.recurrence
                    .next_occurrence(&expired, self.ids.as_mut(), now)
            {
                info!(
                    todo_id = %expired.id,
                    successor = %successor.id,
                    "Spawned next occurrence"
                );
                report.spawned.push(successor.id.clone());
                successors.push(successor);
            }

            next.push(expired);
        }

        next.extend(successors);
        self.commit(next);
        report
    }

    fn commit(&mut self, next: Vec<Todo>) {
        self.todos = Arc::new(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SequentialIds;
    use crate::notification::MemoryNotifier;
    use crate::types::RepeatRule;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()
    }

    fn store_with(notifier: &MemoryNotifier) -> TodoStore {
        TodoStore::new(
            NotificationDispatcher::new(notifier.clone()),
            RecurrenceGenerator::utc(),
            SequentialIds::new("gen"),
        )
    }

    #[test]
    fn add_rejects_blank_title() {
        let mut store = store_with(&MemoryNotifier::granted());
        assert_eq!(
            store.add(Todo::new("a", "   ", t0())),
            Err(StoreError::EmptyTitle)
        );
        assert!(store.is_empty());
    }

    #[test]
    fn add_rejects_duplicate_id() {
        let mut store = store_with(&MemoryNotifier::granted());
        store.add(Todo::new("a", "A", t0())).unwrap();
        assert_eq!(
            store.add(Todo::new("a", "B", t0())),
            Err(StoreError::DuplicateId("a".to_string()))
        );
    }

    #[test]
    fn snapshots_are_immutable() {
        let mut store = store_with(&MemoryNotifier::granted());
        store.add(Todo::new("a", "A", t0())).unwrap();
        let before = store.snapshot();

        store.add(Todo::new("b", "B", t0())).unwrap();

        assert_eq!(before.len(), 1);
        assert_eq!(store.snapshot().len(), 2);
    }

    #[test]
    fn remove_unknown_is_noop() {
        let mut store = store_with(&MemoryNotifier::granted());
        store.add(Todo::new("a", "A", t0())).unwrap();
        assert!(!store.remove("zzz"));
        assert!(store.remove("a"));
        assert!(store.is_empty());
    }

    #[test]
    fn reconcile_expires_notifies_once() {
        let notifier = MemoryNotifier::granted();
        let mut store = store_with(&notifier);
        store
            .add(Todo::new("a", "Tea", t0()).with_duration(1))
            .unwrap();

        assert!(store.reconcile(t0() + Duration::seconds(59)).is_empty());

        let report = store.reconcile(t0() + Duration::seconds(61));
        assert_eq!(report.expired, vec!["a".to_string()]);
        assert_eq!(report.notified, vec!["a".to_string()]);
        assert!(report.spawned.is_empty());

        for s in 62..120 {
            assert!(store.reconcile(t0() + Duration::seconds(s)).is_empty());
        }

        let todo = store.get("a").unwrap();
        assert!(todo.expired && todo.notified);
        assert_eq!(store.len(), 1);
        assert_eq!(notifier.sent().len(), 1);
    }

    #[test]
    fn reconcile_skips_completed() {
        let mut store = store_with(&MemoryNotifier::granted());
        store.add(Todo::new("a", "A", t0()).with_duration(1)).unwrap();
        store.complete("a", t0());

        assert!(store.reconcile(t0() + Duration::hours(1)).is_empty());
        assert!(!store.get("a").unwrap().expired);
    }

    #[test]
    fn reconcile_spawns_successor_for_recurring() {
        let mut store = store_with(&MemoryNotifier::granted());
        store
            .add(
                Todo::new("a", "Stand-up", t0())
                    .scheduled_at(t0())
                    .with_repeat(RepeatRule::daily().at("09:00")),
            )
            .unwrap();

        let report = store.reconcile(t0() + Duration::seconds(1));
        assert_eq!(report.spawned, vec!["gen-1".to_string()]);

        let successor = store.get("gen-1").unwrap();
        assert_eq!(
            successor.scheduled_for,
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap())
        );
        assert!(store.get("a").unwrap().expired);

        // The successor is not due yet; nothing else happens today.
        assert!(store.reconcile(t0() + Duration::hours(2)).is_empty());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn complete_recurring_spawns_one_successor() {
        let mut store = store_with(&MemoryNotifier::granted());
        let at = t0() + Duration::hours(3);
        store
            .add(
                Todo::new("a", "Gym", t0())
                    .scheduled_at(at)
                    .with_repeat(RepeatRule::weekly(1)),
            )
            .unwrap();

        let outcome = store.complete("a", t0());
        assert_eq!(outcome, CompleteOutcome::CompletedWithSuccessor("gen-1".into()));
        assert_eq!(store.complete("a", t0()), CompleteOutcome::Ignored);

        assert_eq!(store.len(), 2);
        assert_eq!(
            store.get("gen-1").unwrap().scheduled_for,
            Some(at + Duration::days(7))
        );
    }

    #[test]
    fn complete_expired_recurring_does_not_duplicate_successor() {
        let mut store = store_with(&MemoryNotifier::granted());
        store
            .add(
                Todo::new("a", "A", t0())
                    .scheduled_at(t0())
                    .with_repeat(RepeatRule::daily()),
            )
            .unwrap();
        store.reconcile(t0());
        assert_eq!(store.len(), 2);

        assert_eq!(store.complete("a", t0()), CompleteOutcome::Completed);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn clear_expired_keeps_completed_and_active() {
        let mut store = store_with(&MemoryNotifier::granted());
        store.add(Todo::new("exp", "E", t0()).with_duration(1)).unwrap();
        store.add(Todo::new("act", "A", t0()).with_duration(60)).unwrap();
        store.add(Todo::new("done", "D", t0()).with_duration(1)).unwrap();
        store.add(Todo::new("free", "F", t0())).unwrap();
        store.complete("done", t0());
        store.reconcile(t0() + Duration::minutes(2));

        assert_eq!(store.clear_expired(), 1);
        let ids: Vec<&str> = store.todos().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["act", "done", "free"]);
        assert_eq!(store.clear_expired(), 0);
    }

    #[test]
    fn set_duration_resets_countdown() {
        let notifier = MemoryNotifier::granted();
        let mut store = store_with(&notifier);
        store.add(Todo::new("a", "A", t0()).with_duration(1)).unwrap();
        store.reconcile(t0() + Duration::minutes(2));

        let later = t0() + Duration::minutes(10);
        assert!(store.set_duration("a", Some(5), later));

        let todo = store.get("a").unwrap();
        assert_eq!(todo.created_at, later);
        assert_eq!(todo.duration_minutes, Some(5));
        assert!(!todo.expired && !todo.notified);

        assert!(store.reconcile(later + Duration::minutes(4)).is_empty());
        let report = store.reconcile(later + Duration::minutes(5));
        assert_eq!(report.expired, vec!["a".to_string()]);
        assert!(report.notified.is_empty());

        let todo = store.get("a").unwrap();
        assert!(todo.expired && todo.notified);
        assert_eq!(notifier.sent().len(), 1);
    }

    #[test]
    fn set_duration_zero_makes_timeless() {
        let mut store = store_with(&MemoryNotifier::granted());
        store.add(Todo::new("a", "A", t0()).with_duration(10)).unwrap();

        assert!(store.set_duration("a", Some(0), t0()));
        assert_eq!(store.get("a").unwrap().duration_minutes, None);
        assert!(store.reconcile(t0() + Duration::days(1)).is_empty());
    }

    #[test]
    fn set_duration_none_makes_timeless() {
        let mut store = store_with(&MemoryNotifier::granted());
        store
            .add(Todo::new("a", "A", t0()).scheduled_at(t0() + Duration::hours(1)))
            .unwrap();

        assert!(store.set_duration("a", None, t0()));
        let todo = store.get("a").unwrap();
        assert_eq!(todo.duration_minutes, None);
        assert_eq!(todo.scheduled_for, None);
        assert!(store.reconcile(t0() + Duration::days(30)).is_empty());
    }

    #[test]
    fn set_duration_ignores_unknown_and_completed() {
        let mut store = store_with(&MemoryNotifier::granted());
        store.add(Todo::new("a", "A", t0())).unwrap();
        store.complete("a", t0());

        assert!(!store.set_duration("a", Some(5), t0()));
        assert!(!store.set_duration("missing", Some(5), t0()));
        assert_eq!(store.get("a").unwrap().duration_minutes, None);
    }

    #[test]
    fn toggle_timed_flips_mode() {
        let mut store = store_with(&MemoryNotifier::granted());
        store.add(Todo::new("a", "A", t0())).unwrap();

        assert!(store.toggle_timed("a", t0()));
        assert_eq!(
            store.get("a").unwrap().duration_minutes,
            Some(DEFAULT_TOGGLE_MINUTES)
        );

        assert!(store.toggle_timed("a", t0()));
        assert_eq!(store.get("a").unwrap().duration_minutes, None);
    }

    #[test]
    fn readded_id_is_not_renotified() {
        let notifier = MemoryNotifier::granted();
        let mut store = store_with(&notifier);
        store.add(Todo::new("a", "A", t0()).with_duration(1)).unwrap();
        store.reconcile(t0() + Duration::minutes(2));
        assert_eq!(store.clear_expired(), 1);

        store.add(Todo::new("a", "A", t0()).with_duration(1)).unwrap();
        let report = store.reconcile(t0() + Duration::minutes(3));

        assert_eq!(report.expired, vec!["a".to_string()]);
        assert!(report.notified.is_empty());
        assert_eq!(notifier.sent().len(), 1);
    }

    #[test]
    fn loaded_notified_todos_are_not_renotified() {
        let notifier = MemoryNotifier::granted();
        let mut loaded = Todo::new("a", "A", t0()).with_duration(1);
        loaded.notified = true;

        let mut store = store_with(&notifier).with_todos(vec![loaded]);
        let report = store.reconcile(t0() + Duration::minutes(5));

        assert_eq!(report.expired, vec!["a".to_string()]);
        assert!(report.notified.is_empty());
        assert!(notifier.sent().is_empty());
    }
}
