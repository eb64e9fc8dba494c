//! Recurrence generation.
//!
//! When a recurring todo expires (or is completed early) the series
//! continues with a successor: a fresh todo whose `scheduled_for` is the
//! next occurrence computed from the predecessor's schedule.
//!
//! # Wall clock
//!
//! Day arithmetic happens on the wall clock of a fixed UTC offset, so
//! "every day at 09:00" means 09:00 on that clock. The offset is taken once
//! from the local zone (or UTC) when the generator is built; DST transitions
//! are not tracked.
//!
//! # Rules
//!
//! | Frequency | Advance |
//! |-----------|---------|
//! | `daily`   | +1 calendar day |
//! | `weekly`  | next `day_of_week` strictly after the base day (same weekday = +7 days) |
//! | `monthly` | `day_of_month` of the following month, clamped to its last day |
//!
//! A rule's `time` (`HH:MM`) then overwrites the hour and minute, zeroing
//! seconds. Missing or out-of-range parameters never fail: the base
//! instant's own weekday/day is used, and values are clamped into range.

use chrono::{
    DateTime, Datelike, Days, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, Offset,
    TimeZone, Utc,
};
use tracing::{debug, warn};

use crate::ids::IdGenerator;
use crate::types::{Frequency, RepeatRule, Todo};

/// Computes successors of recurring todos.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecurrenceGenerator {
    offset: FixedOffset,
}

impl Default for RecurrenceGenerator {
    fn default() -> Self {
        Self::utc()
    }
}

impl RecurrenceGenerator {
    /// Generator working on UTC wall-clock time.
    #[must_use]
    pub fn utc() -> Self {
        Self {
            offset: Utc.fix(),
        }
    }

    /// Generator working on the current local offset.
    #[must_use]
    pub fn local() -> Self {
        Self {
            offset: Local::now().offset().fix(),
        }
    }

    #[must_use]
    pub fn with_offset(offset: FixedOffset) -> Self {
        Self { offset }
    }

    #[must_use]
    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Computes the next occurrence instant for a recurring todo.
    ///
    /// The base is `scheduled_for` when present, otherwise `created_at`.
    /// Returns `None` only when the todo has no repeat rule.
    ///
    /// # Example
    ///
    /// ```
    /// use chrono::{TimeZone, Utc};
    /// use timebox_engine::recurrence::RecurrenceGenerator;
    /// use timebox_engine::types::{RepeatRule, Todo};
    ///
    /// let at = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
    /// let todo = Todo::new("a", "Stand-up", at)
    ///     .scheduled_at(at)
    ///     .with_repeat(RepeatRule::daily().at("09:00"));
    ///
    /// let next = RecurrenceGenerator::utc().next_instant(&todo).unwrap();
    /// assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap());
    /// ```
    #[must_use]
    pub fn next_instant(&self, todo: &Todo) -> Option<DateTime<Utc>> {
        let rule = todo.repeat.as_ref()?;
        let base = todo.scheduled_for.unwrap_or(todo.created_at);
        let base_local = base.with_timezone(&self.offset).naive_local();

        let mut next = advance(base_local, rule);

        if let Some(raw) = rule.time.as_deref() {
            match parse_wall_time(raw) {
                Some(time) => next = next.date().and_time(time),
                None => warn!(time = raw, todo_id = %todo.id, "Ignoring malformed repeat time"),
            }
        }

        // A fixed offset maps every wall-clock time to exactly one instant.
        let instant = self
            .offset
            .from_local_datetime(&next)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(base);

        Some(instant)
    }

    /// Builds the successor of a recurring todo.
    ///
    /// The successor gets a fresh id, `created_at = now`, the computed
    /// `scheduled_for`, cleared status flags, and copies of the title, tags,
    /// duration and rule.
    #[must_use]
    pub fn next_occurrence(
        &self,
        todo: &Todo,
        ids: &mut dyn IdGenerator,
        now: DateTime<Utc>,
    ) -> Option<Todo> {
        let scheduled_for = self.next_instant(todo)?;
        let successor = Todo {
            id: ids.next_id(),
            title: todo.title.clone(),
            created_at: now,
            duration_minutes: todo.duration_minutes,
            scheduled_for: Some(scheduled_for),
            completed: false,
            expired: false,
            notified: false,
            tags: todo.tags.clone(),
            repeat: todo.repeat.clone(),
        };

        debug!(
            predecessor = %todo.id,
            successor = %successor.id,
            scheduled_for = %scheduled_for.to_rfc3339(),
            "Generated next occurrence"
        );

        Some(successor)
    }
}

/// Advances a wall-clock instant by one step of `rule`, keeping its time of day.
#[must_use]
pub fn advance(base: NaiveDateTime, rule: &RepeatRule) -> NaiveDateTime {
    let date = base.date();
    let next_date = match rule.frequency {
        Frequency::Daily => add_days(date, 1),
        Frequency::Weekly => {
            let current = date.weekday().num_days_from_sunday();
            let target = rule
                .day_of_week
                .map(|d| u32::from(d.min(6)))
                .unwrap_or(current);
            let delta = match (target + 7 - current) % 7 {
                0 => 7,
                d => d,
            };
            add_days(date, u64::from(delta))
        }
        Frequency::Monthly => {
            let (year, month) = if date.month() == 12 {
                (date.year() + 1, 1)
            } else {
                (date.year(), date.month() + 1)
            };
            let wanted = rule
                .day_of_month
                .map(|d| u32::from(d.clamp(1, 31)))
                .unwrap_or_else(|| date.day());
            let day = wanted.min(days_in_month(year, month));
            NaiveDate::from_ymd_opt(year, month, day).unwrap_or(date)
        }
    };
    next_date.and_time(base.time())
}

/// Parses an `HH:MM` wall-clock time. Seconds are always zero.
#[must_use]
pub fn parse_wall_time(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M").ok()
}

/// Number of days in `month` of `year`.
#[must_use]
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    first_of_next
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

fn add_days(date: NaiveDate, days: u64) -> NaiveDate {
    date.checked_add_days(Days::new(days)).unwrap_or(date)
}
