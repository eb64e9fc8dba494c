//! Expiration evaluation.
//!
//! [`evaluate`] decides whether a todo crosses its due point at a given
//! instant. It is a pure function of `(todo, now)` and never mutates the
//! todo; the [`TodoStore`](crate::store::TodoStore) applies the verdict.
//!
//! The countdown helpers ([`time_left`], [`percent_left`], [`is_urgent`])
//! back the list views and use the same due-point rules.

use chrono::{DateTime, Duration, Utc};

use crate::types::{DueMode, Todo};

/// Milliseconds per minute.
const MINUTE_MS: i64 = 60_000;

/// Default remaining-time threshold under which a timed todo is urgent.
pub const DEFAULT_URGENT_MINUTES: u32 = 5;

/// Outcome of evaluating one todo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Nothing to do: not due yet, timeless, completed, or already expired.
    Unchanged,
    /// The todo reached its due point and must be marked expired.
    Expired,
}

impl Verdict {
    #[must_use]
    pub fn is_expired(self) -> bool {
        matches!(self, Self::Expired)
    }
}

/// Determines whether `todo` has newly expired at `now`.
///
/// Calling this again on a todo already marked expired is a no-op.
///
/// # Example
///
/// ```
/// use chrono::{Duration, TimeZone, Utc};
/// use timebox_engine::evaluator::{evaluate, Verdict};
/// use timebox_engine::types::Todo;
///
/// let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
/// let todo = Todo::new("a", "Tea", t0).with_duration(1);
///
/// assert_eq!(evaluate(&todo, t0 + Duration::seconds(59)), Verdict::Unchanged);
/// assert_eq!(evaluate(&todo, t0 + Duration::seconds(60)), Verdict::Expired);
/// ```
#[must_use]
pub fn evaluate(todo: &Todo, now: DateTime<Utc>) -> Verdict {
    if todo.completed || todo.expired {
        return Verdict::Unchanged;
    }

    let due = match todo.due_mode() {
        DueMode::Scheduled(at) => now >= at,
        DueMode::Timed(minutes) => {
            let elapsed_ms = (now - todo.created_at).num_milliseconds();
            elapsed_ms >= i64::from(minutes) * MINUTE_MS
        }
        DueMode::Timeless => false,
    };

    if due {
        Verdict::Expired
    } else {
        Verdict::Unchanged
    }
}

/// Remaining time until the due point, floored at zero.
///
/// Returns `None` for timeless todos.
#[must_use]
pub fn time_left(todo: &Todo, now: DateTime<Utc>) -> Option<Duration> {
    let due = todo.due_point()?;
    Some(std::cmp::max(due - now, Duration::zero()))
}

/// Fraction (0-100) of a timed todo's duration still remaining.
///
/// Only meaningful in duration mode; scheduled and timeless todos return
/// `None`.
#[must_use]
pub fn percent_left(todo: &Todo, now: DateTime<Utc>) -> Option<f64> {
    let DueMode::Timed(minutes) = todo.due_mode() else {
        return None;
    };
    let total_ms = i64::from(minutes) * MINUTE_MS;
    let left_ms = time_left(todo, now)?.num_milliseconds();
    Some(left_ms as f64 / total_ms as f64 * 100.0)
}

/// Whether an active, timed todo is within `threshold` of its due point.
#[must_use]
pub fn is_urgent(todo: &Todo, now: DateTime<Utc>, threshold: Duration) -> bool {
    if !todo.is_active() {
        return false;
    }
    match time_left(todo, now) {
        Some(left) => left <= threshold,
        None => false,
    }
}
