//! Integration tests for the JSON file store.
//!
//! These tests run engines against a real `my-todos.json` in a temporary
//! directory, covering the stored document shape and recovery from
//! damaged files.

use std::fs;
use std::path::Path;

use chrono::{Duration, TimeZone, Utc};
use serde_json::Value;
use tempfile::TempDir;
use timebox_engine::clock::ManualClock;
use timebox_engine::engine::Engine;
use timebox_engine::ids::SequentialIds;
use timebox_engine::notification::{MemoryNotifier, NotificationDispatcher};
use timebox_engine::persistence::{JsonFileRepository, TodoRepository};
use timebox_engine::recurrence::RecurrenceGenerator;
use timebox_engine::types::{RepeatRule, Todo};

// ============================================================================
// Helper Functions
// ============================================================================

fn open(dir: &Path, clock: &ManualClock, notifier: &MemoryNotifier) -> Engine {
    Engine::open(
        JsonFileRepository::in_dir(dir),
        clock.clone(),
        NotificationDispatcher::new(notifier.clone()),
        RecurrenceGenerator::utc(),
        SequentialIds::new("file"),
    )
}

fn read_json(dir: &Path) -> Value {
    let content = fs::read_to_string(dir.join("my-todos.json")).expect("store file exists");
    serde_json::from_str(&content).expect("store file is JSON")
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn stored_document_uses_camel_case_fields() {
    let dir = TempDir::new().unwrap();
    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
    let clock = ManualClock::new(t0);
    let mut engine = open(dir.path(), &clock, &MemoryNotifier::granted());

    engine
        .store_mut()
        .add(
            Todo::new("weekly", "Review", t0)
                .scheduled_at(t0)
                .with_tags(["Work", " work "])
                .with_repeat(RepeatRule::weekly(5).at("16:30")),
        )
        .unwrap();
    engine.save().unwrap();

    let doc = read_json(dir.path());
    let entry = &doc.as_array().unwrap()[0];
    assert_eq!(entry["id"], "weekly");
    assert_eq!(entry["createdAt"], 1_704_099_600_000_i64);
    assert!(entry["durationMinutes"].is_null());
    assert_eq!(entry["completed"], false);
    assert_eq!(entry["tags"], serde_json::json!(["work"]));
    assert_eq!(entry["repeat"]["frequency"], "weekly");
    assert_eq!(entry["repeat"]["dayOfWeek"], 5);
    assert_eq!(entry["repeat"]["time"], "16:30");
}

#[test]
fn state_survives_restart() {
    let dir = TempDir::new().unwrap();
    let t0 = Utc.with_ymd_and_hms(2024, 2, 1, 8, 0, 0).unwrap();
    let clock = ManualClock::new(t0);
    let notifier = MemoryNotifier::granted();

    let mut engine = open(dir.path(), &clock, &notifier);
    engine
        .store_mut()
        .add(
            Todo::new("bills", "Pay bills", t0)
                .scheduled_at(t0 + Duration::minutes(1))
                .with_repeat(RepeatRule::monthly(1)),
        )
        .unwrap();
    engine
        .store_mut()
        .add(Todo::new("tea", "Tea", t0).with_duration(30))
        .unwrap();

    clock.advance(Duration::minutes(2));
    engine.tick();
    engine.save().unwrap();
    drop(engine);

    let reopened = open(dir.path(), &clock, &notifier);
    let todos = reopened.store().todos();
    assert_eq!(todos.len(), 3);
    assert!(todos[0].expired && todos[0].notified);
    assert!(todos[1].is_active());
    assert_eq!(
        todos[2].scheduled_for,
        Some(Utc.with_ymd_and_hms(2024, 3, 1, 8, 1, 0).unwrap())
    );
    assert_eq!(notifier.sent().len(), 1);
}

#[test]
fn damaged_store_recovers_valid_entries() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("my-todos.json"),
        r#"[
            {"id": "keep", "title": "Keep me", "createdAt": 1704099600000, "durationMinutes": 10, "tags": null},
            {"id": "broken", "createdAt": "yesterday"},
            {"id": "legacy", "title": "Legacy", "createdAt": 1704099600000, "scheduledFor": "2024-01-01T10:00:00.000Z"}
        ]"#,
    )
    .unwrap();

    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap());
    let engine = open(dir.path(), &clock, &MemoryNotifier::granted());

    let ids: Vec<&str> = engine.store().todos().iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["keep", "legacy"]);
    assert!(engine.store().get("keep").unwrap().tags.is_empty());
    assert_eq!(
        engine.store().get("legacy").unwrap().scheduled_for,
        Some(Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap())
    );
}

#[test]
fn unreadable_store_starts_empty_and_is_overwritten() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("my-todos.json"), "not json at all").unwrap();

    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
    let clock = ManualClock::new(t0);
    let mut engine = open(dir.path(), &clock, &MemoryNotifier::granted());
    assert!(engine.store().is_empty());

    engine
        .store_mut()
        .add(Todo::new("fresh", "Fresh start", t0))
        .unwrap();
    engine.save().unwrap();

    let loaded = JsonFileRepository::in_dir(dir.path()).load().unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].title, "Fresh start");
}
