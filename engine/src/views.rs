//! Read-only projections of a todo collection.
//!
//! These back the list output: active todos grouped by tag, the expired
//! section, tag filtering and countdown labels. Nothing here mutates.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};

use crate::evaluator::time_left;
use crate::types::Todo;

/// A collection split by lifecycle state.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Partition<'a> {
    /// Neither completed nor expired.
    pub active: Vec<&'a Todo>,
    /// Expired and not completed.
    pub expired: Vec<&'a Todo>,
    pub completed: Vec<&'a Todo>,
}

/// Splits todos into active, expired and completed.
#[must_use]
pub fn partition(todos: &[Todo]) -> Partition<'_> {
    let mut out = Partition::default();
    for todo in todos {
        if todo.completed {
            out.completed.push(todo);
        } else if todo.expired {
            out.expired.push(todo);
        } else {
            out.active.push(todo);
        }
    }
    out
}

/// Active todos grouped by tag.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TagGroups<'a> {
    /// One entry per tag, ordered by tag name. A todo appears under each of
    /// its tags.
    pub tagged: BTreeMap<String, Vec<&'a Todo>>,
    pub untagged: Vec<&'a Todo>,
}

impl TagGroups<'_> {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tagged.is_empty() && self.untagged.is_empty()
    }
}

/// Groups the active todos by tag.
///
/// # Example
///
/// ```
/// use chrono::Utc;
/// use timebox_engine::types::Todo;
/// use timebox_engine::views::group_by_tag;
///
/// let now = Utc::now();
/// let todos = vec![
///     Todo::new("a", "Report", now).with_tags(["work", "urgent"]),
///     Todo::new("b", "Walk", now),
/// ];
///
/// let groups = group_by_tag(&todos);
/// assert_eq!(groups.tagged["work"].len(), 1);
/// assert_eq!(groups.tagged["urgent"].len(), 1);
/// assert_eq!(groups.untagged.len(), 1);
/// ```
#[must_use]
pub fn group_by_tag(todos: &[Todo]) -> TagGroups<'_> {
    let mut groups = TagGroups::default();
    for todo in todos.iter().filter(|t| t.is_active()) {
        if todo.tags.is_empty() {
            groups.untagged.push(todo);
            continue;
        }
        for tag in &todo.tags {
            groups.tagged.entry(tag.clone()).or_default().push(todo);
        }
    }
    groups
}

/// Every tag in use, sorted.
#[must_use]
pub fn all_tags(todos: &[Todo]) -> Vec<String> {
    todos
        .iter()
        .flat_map(|t| t.tags.iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Todos carrying every one of `selected` (case-insensitive).
///
/// An empty selection matches everything.
#[must_use]
pub fn filter_by_tags<'a, S: AsRef<str>>(todos: &'a [Todo], selected: &[S]) -> Vec<&'a Todo> {
    todos
        .iter()
        .filter(|todo| selected.iter().all(|tag| todo.has_tag(tag.as_ref())))
        .collect()
}

/// Renders a remaining duration as `MM:SS`. Negative input renders as `00:00`.
#[must_use]
pub fn format_countdown(left: Duration) -> String {
    let total_secs = left.num_seconds().max(0);
    format!("{:02}:{:02}", total_secs / 60, total_secs % 60)
}

/// Short status text for a todo.
#[must_use]
pub fn status_label(todo: &Todo, now: DateTime<Utc>) -> String {
    if todo.completed {
        return "Done".to_string();
    }
    if todo.expired {
        return "Reminder passed".to_string();
    }
    match time_left(todo, now) {
        None => "Timeless".to_string(),
        Some(left) if left.is_zero() => "Reminder passed".to_string(),
        Some(left) => format!("In {}", format_countdown(left)),
    }
}
