//! Core data types for the Timebox engine.
//!
//! A [`Todo`] is the unit the engine tracks. All types serialize to camelCase
//! JSON so the persisted collection stays compatible with the browser
//! storage layout (`createdAt` in epoch milliseconds, `scheduledFor` as an
//! ISO-8601 string).

use std::collections::BTreeSet;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Minutes assigned when a timeless todo is toggled back to timed.
pub const DEFAULT_TOGGLE_MINUTES: u32 = 5;

/// Cadence of a recurring todo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Daily => write!(f, "daily"),
            Self::Weekly => write!(f, "weekly"),
            Self::Monthly => write!(f, "monthly"),
        }
    }
}

impl std::str::FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(format!("unknown frequency '{other}'")),
        }
    }
}

/// Recurrence rule attached to a todo.
///
/// `day_of_week` uses 0 = Sunday through 6 = Saturday. `day_of_month` is
/// 1-31 and is clamped to the target month when the next occurrence is
/// generated. `time` is a wall-clock `HH:MM` string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepeatRule {
    pub frequency: Frequency,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_week: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_month: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

impl RepeatRule {
    /// Creates a rule with only a frequency set.
    #[must_use]
    pub fn new(frequency: Frequency) -> Self {
        Self {
            frequency,
            day_of_week: None,
            day_of_month: None,
            time: None,
        }
    }

    /// Creates a daily rule.
    #[must_use]
    pub fn daily() -> Self {
        Self::new(Frequency::Daily)
    }

    /// Creates a weekly rule firing on `day_of_week` (0 = Sunday).
    #[must_use]
    pub fn weekly(day_of_week: u8) -> Self {
        Self {
            day_of_week: Some(day_of_week),
            ..Self::new(Frequency::Weekly)
        }
    }

    /// Creates a monthly rule firing on `day_of_month`.
    #[must_use]
    pub fn monthly(day_of_month: u8) -> Self {
        Self {
            day_of_month: Some(day_of_month),
            ..Self::new(Frequency::Monthly)
        }
    }

    /// Sets the wall-clock time (`HH:MM`) of each occurrence.
    #[must_use]
    pub fn at(mut self, time: impl Into<String>) -> Self {
        self.time = Some(time.into());
        self
    }
}

/// How a todo's due point is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueMode {
    /// Due at a fixed instant.
    Scheduled(DateTime<Utc>),
    /// Due a number of minutes after `created_at`.
    Timed(u32),
    /// Never due.
    Timeless,
}

/// A tracked todo.
///
/// Fields are public for reading and construction; once a todo is handed to
/// the [`TodoStore`](crate::store::TodoStore) every mutation goes through it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    /// Opaque unique identifier.
    pub id: String,

    /// Display title, never empty once stored.
    pub title: String,

    /// When the todo was created or last reset.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,

    /// Deadline in minutes after `created_at`. `None` means timeless; a
    /// stored zero reads as `None`.
    #[serde(default, deserialize_with = "deserialize_duration")]
    pub duration_minutes: Option<u32>,

    /// Fixed due instant. Takes precedence over `duration_minutes`.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_instant"
    )]
    pub scheduled_for: Option<DateTime<Utc>>,

    #[serde(default)]
    pub completed: bool,

    #[serde(default)]
    pub expired: bool,

    #[serde(default)]
    pub notified: bool,

    /// Lowercased, deduplicated labels.
    #[serde(default, deserialize_with = "deserialize_tags")]
    pub tags: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<RepeatRule>,
}

impl Todo {
    /// Creates an active, timeless todo.
    ///
    /// # Example
    ///
    /// ```
    /// use chrono::Utc;
    /// use timebox_engine::types::{DueMode, Todo};
    ///
    /// let todo = Todo::new("todo-1", "Water the plants", Utc::now()).with_duration(10);
    /// assert_eq!(todo.due_mode(), DueMode::Timed(10));
    /// assert!(!todo.expired);
    /// ```
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            created_at,
            duration_minutes: None,
            scheduled_for: None,
            completed: false,
            expired: false,
            notified: false,
            tags: BTreeSet::new(),
            repeat: None,
        }
    }

    #[must_use]
    pub fn with_duration(mut self, minutes: u32) -> Self {
        self.duration_minutes = Some(minutes);
        self
    }

    #[must_use]
    pub fn scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_for = Some(at);
        self
    }

    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tags = normalize_tags(tags);
        self
    }

    #[must_use]
    pub fn with_repeat(mut self, rule: RepeatRule) -> Self {
        self.repeat = Some(rule);
        self
    }

    /// Returns the mode that determines this todo's due point.
    ///
    /// A schedule wins over a duration; with neither the todo is timeless.
    /// A zero-minute duration counts as no duration.
    #[must_use]
    pub fn due_mode(&self) -> DueMode {
        match (self.scheduled_for, self.duration_minutes) {
            (Some(at), _) => DueMode::Scheduled(at),
            (None, Some(minutes)) if minutes > 0 => DueMode::Timed(minutes),
            (None, _) => DueMode::Timeless,
        }
    }

    /// Returns the instant at which this todo becomes eligible to expire.
    #[must_use]
    pub fn due_point(&self) -> Option<DateTime<Utc>> {
        match self.due_mode() {
            DueMode::Scheduled(at) => Some(at),
            DueMode::Timed(minutes) => {
                Some(self.created_at + chrono::Duration::minutes(i64::from(minutes)))
            }
            DueMode::Timeless => None,
        }
    }

    /// Returns true if the todo is neither completed nor expired.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.completed && !self.expired
    }

    #[must_use]
    pub fn is_recurring(&self) -> bool {
        self.repeat.is_some()
    }

    /// Case-insensitive tag membership.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(&tag.trim().to_lowercase())
    }
}

/// Normalizes labels: trims, lowercases, drops empties and duplicates.
///
/// # Example
///
/// ```
/// use timebox_engine::types::normalize_tags;
///
/// let tags = normalize_tags(["Work", "work ", "", "Home"]);
/// assert_eq!(tags.into_iter().collect::<Vec<_>>(), vec!["home", "work"]);
/// ```
#[must_use]
pub fn normalize_tags<I, S>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|t| t.as_ref().trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Parses an instant from user or persisted input.
///
/// Accepts RFC 3339 (`2024-01-01T09:00:00Z`, with or without fractional
/// seconds) and offset-less local wall-clock forms (`2024-01-01T09:00`,
/// `2024-01-01 09:00:00`), the latter interpreted in the local time zone.
#[must_use]
pub fn parse_instant(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }

    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ];

    NAIVE_FORMATS.iter().find_map(|fmt| {
        let naive = NaiveDateTime::parse_from_str(input, fmt).ok()?;
        Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

fn deserialize_instant<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => parse_instant(&s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid instant '{s}'"))),
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<u32>::deserialize(deserializer)?;
    Ok(raw.filter(|minutes| *minutes > 0))
}

fn deserialize_tags<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<String>>::deserialize(deserializer)?;
    Ok(normalize_tags(raw.unwrap_or_default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn due_mode_prefers_schedule_over_duration() {
        let at = t0() + chrono::Duration::hours(3);
        let todo = Todo::new("a", "A", t0()).with_duration(10).scheduled_at(at);

        assert_eq!(todo.due_mode(), DueMode::Scheduled(at));
        assert_eq!(todo.due_point(), Some(at));
    }

    #[test]
    fn due_point_for_duration() {
        let todo = Todo::new("a", "A", t0()).with_duration(15);
        assert_eq!(todo.due_point(), Some(t0() + chrono::Duration::minutes(15)));
    }

    #[test]
    fn timeless_has_no_due_point() {
        let todo = Todo::new("a", "A", t0());
        assert_eq!(todo.due_mode(), DueMode::Timeless);
        assert_eq!(todo.due_point(), None);
    }

    #[test]
    fn zero_duration_is_timeless() {
        let todo = Todo::new("a", "A", t0()).with_duration(0);
        assert_eq!(todo.due_mode(), DueMode::Timeless);
        assert_eq!(todo.due_point(), None);

        let json = r#"{"id": "z", "title": "Z", "createdAt": 0, "durationMinutes": 0}"#;
        let stored: Todo = serde_json::from_str(json).unwrap();
        assert_eq!(stored.duration_minutes, None);
    }

    #[test]
    fn tags_are_case_insensitive() {
        let todo = Todo::new("a", "A", t0()).with_tags(["Work", "WORK", " errands "]);

        assert_eq!(todo.tags.len(), 2);
        assert!(todo.has_tag("work"));
        assert!(todo.has_tag("Errands"));
        assert!(!todo.has_tag("home"));
    }

    #[test]
    fn serializes_camel_case_with_epoch_millis() {
        let todo = Todo::new("a", "A", t0())
            .with_duration(1)
            .with_repeat(RepeatRule::daily().at("09:00"));

        let json = serde_json::to_value(&todo).unwrap();

        assert_eq!(json["createdAt"], serde_json::json!(t0().timestamp_millis()));
        assert_eq!(json["durationMinutes"], serde_json::json!(1));
        assert_eq!(json["repeat"]["frequency"], "daily");
        assert_eq!(json["repeat"]["time"], "09:00");
        assert!(json.get("scheduledFor").is_none());
    }

    #[test]
    fn deserializes_browser_shape() {
        let json = r#"{
            "id": "8f0c",
            "title": "Stand-up",
            "createdAt": 1704099600000,
            "durationMinutes": null,
            "completed": false,
            "scheduledFor": "2024-01-01T09:00:00.000Z",
            "repeat": {"frequency": "weekly", "dayOfWeek": 1}
        }"#;

        let todo: Todo = serde_json::from_str(json).unwrap();

        assert_eq!(todo.created_at, t0());
        assert_eq!(todo.scheduled_for, Some(t0()));
        assert!(todo.tags.is_empty());
        assert!(!todo.expired);
        assert!(!todo.notified);
        assert_eq!(todo.repeat, Some(RepeatRule::weekly(1)));
    }

    #[test]
    fn null_tags_default_to_empty() {
        let json = r#"{"id": "x", "title": "T", "createdAt": 0, "tags": null}"#;
        let todo: Todo = serde_json::from_str(json).unwrap();
        assert!(todo.tags.is_empty());
    }

    #[test]
    fn parse_instant_accepts_rfc3339() {
        assert_eq!(parse_instant("2024-01-01T09:00:00Z"), Some(t0()));
        assert_eq!(parse_instant("2024-01-01T10:00:00+01:00"), Some(t0()));
    }

    #[test]
    fn parse_instant_accepts_local_forms() {
        assert!(parse_instant("2024-01-01T09:00").is_some());
        assert!(parse_instant("2024-01-01 09:00:30").is_some());
        assert!(parse_instant("tomorrow").is_none());
    }

    #[test]
    fn frequency_from_str() {
        assert_eq!("Weekly".parse::<Frequency>(), Ok(Frequency::Weekly));
        assert!("yearly".parse::<Frequency>().is_err());
    }
}
