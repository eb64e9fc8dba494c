//! Timebox - expiring and recurring todos from the terminal.
//!
//! # Commands
//!
//! - `timebox add`: Create a todo (timeless, timed, scheduled, recurring)
//! - `timebox list`: Show todos grouped by tag with countdowns
//! - `timebox complete | remove | set-duration | toggle`: Change one todo
//! - `timebox clear-expired`: Drop every expired, unfinished todo
//! - `timebox run`: Keep the engine ticking and notify on expiration
//!
//! # Environment Variables
//!
//! See the [`config`](timebox_engine::config) module for available options.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{debug, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use timebox_engine::clock::SystemClock;
use timebox_engine::config::Config;
use timebox_engine::engine::Engine;
use timebox_engine::evaluator::is_urgent;
use timebox_engine::ids::UuidGenerator;
use timebox_engine::notification::{LogNotifier, NotificationDispatcher};
use timebox_engine::persistence::JsonFileRepository;
use timebox_engine::store::CompleteOutcome;
use timebox_engine::types::{parse_instant, Frequency, RepeatRule, Todo};
use timebox_engine::views::{all_tags, filter_by_tags, group_by_tag, partition, status_label};

/// Timebox - expiring and recurring todos.
#[derive(Parser, Debug)]
#[command(name = "timebox")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    TIMEBOX_DATA_DIR        Store directory (default: platform data dir)
    TIMEBOX_TICK_MS         Tick period for 'run' (default: 1000)
    TIMEBOX_NOTIFICATIONS   ask, granted or denied (default: ask)
    TIMEBOX_WALL_CLOCK      local or utc (default: local)
    TIMEBOX_URGENT_MINUTES  Urgency threshold (default: 5)
    TIMEBOX_LOG_FORMAT      text or json (default: text)

EXAMPLES:
    # A todo that expires in 10 minutes
    timebox add \"Take the bread out\" --minutes 10 --tag kitchen

    # Every Monday at 09:30
    timebox add \"Weekly sync\" --at 2024-01-01T09:30 --repeat weekly --day-of-week 1 --time 09:30

    # Keep the engine running
    timebox run
")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new todo.
    Add {
        /// Title shown in lists and notifications.
        title: String,

        /// Expire this many minutes from now.
        #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
        minutes: Option<u32>,

        /// Expire at this instant (RFC 3339, or local `YYYY-MM-DDTHH:MM`).
        #[arg(long)]
        at: Option<String>,

        /// Label; repeat for several.
        #[arg(short, long = "tag")]
        tags: Vec<String>,

        /// Recurrence cadence: daily, weekly or monthly.
        #[arg(long)]
        repeat: Option<Frequency>,

        /// Weekday for weekly recurrence (0 = Sunday).
        #[arg(long, requires = "repeat", value_parser = clap::value_parser!(u8).range(0..=6))]
        day_of_week: Option<u8>,

        /// Day of month for monthly recurrence.
        #[arg(long, requires = "repeat", value_parser = clap::value_parser!(u8).range(1..=31))]
        day_of_month: Option<u8>,

        /// Wall-clock time of each occurrence (HH:MM).
        #[arg(long, requires = "repeat")]
        time: Option<String>,
    },

    /// List todos grouped by tag.
    List {
        /// Only show todos carrying all of these tags.
        #[arg(short, long = "tag")]
        tags: Vec<String>,
    },

    /// Mark a todo completed.
    Complete {
        /// Todo id or unique id prefix.
        id: String,
    },

    /// Delete a todo.
    Remove {
        /// Todo id or unique id prefix.
        id: String,
    },

    /// Delete every expired todo that was not completed.
    ClearExpired,

    /// Restart a todo's countdown. Without --minutes the todo becomes timeless.
    SetDuration {
        /// Todo id or unique id prefix.
        id: String,

        #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
        minutes: Option<u32>,
    },

    /// Switch a todo between timed (5 minutes) and timeless.
    Toggle {
        /// Todo id or unique id prefix.
        id: String,
    },

    /// Run the engine until interrupted.
    Run,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging();

    let config = Config::from_env().context("Failed to load configuration")?;

    match cli.command {
        Command::Run => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("Failed to create tokio runtime")?;

            runtime.block_on(run_engine(config))
        }
        command => run_once(command, &config),
    }
}

/// Opens the engine on the configured store.
fn open_engine(config: &Config) -> Engine {
    Engine::open(
        JsonFileRepository::new(config.store_path()),
        SystemClock,
        NotificationDispatcher::new(LogNotifier::new(config.notifications)),
        config.wall_clock.generator(),
        UuidGenerator,
    )
}

/// Runs a single command: reconcile, apply, save.
fn run_once(command: Command, config: &Config) -> Result<()> {
    let mut engine = open_engine(config);
    let report = engine.tick();
    let mut changed = !report.is_empty();
    let now = engine.now();

    match command {
        Command::Add {
            title,
            minutes,
            at,
            tags,
            repeat,
            day_of_week,
            day_of_month,
            time,
        } => {
            let scheduled_for = match at.as_deref() {
                Some(raw) => Some(
                    parse_instant(raw).with_context(|| format!("Invalid --at value '{raw}'"))?,
                ),
                None => None,
            };
            let repeat = repeat.map(|frequency| RepeatRule {
                frequency,
                day_of_week,
                day_of_month,
                time,
            });

            let todo = build_todo(
                engine.store_mut().next_id(),
                title,
                now,
                minutes,
                scheduled_for,
                tags,
                repeat,
            );
            let id = todo.id.clone();
            engine
                .store_mut()
                .add(todo)
                .context("Failed to add todo")?;
            changed = true;
            println!("Added {id}");
        }

        Command::List { tags } => {
            print_list(&engine, &tags, now, config.urgent_threshold());
        }

        Command::Complete { id } => {
            if let Some(id) = resolve_id(&engine, &id)? {
                match engine.store_mut().complete(&id, now) {
                    CompleteOutcome::Ignored => println!("{id} is already completed"),
                    CompleteOutcome::Completed => {
                        changed = true;
                        println!("Completed {id}");
                    }
                    CompleteOutcome::CompletedWithSuccessor(next) => {
                        changed = true;
                        println!("Completed {id}, next occurrence {next}");
                    }
                }
            }
        }

        Command::Remove { id } => {
            if let Some(id) = resolve_id(&engine, &id)? {
                changed |= engine.store_mut().remove(&id);
                println!("Removed {id}");
            }
        }

        Command::ClearExpired => {
            let cleared = engine.store_mut().clear_expired();
            changed |= cleared > 0;
            println!("Cleared {cleared} expired todo(s)");
        }

        Command::SetDuration { id, minutes } => {
            if let Some(id) = resolve_id(&engine, &id)? {
                if engine.store_mut().set_duration(&id, minutes, now) {
                    changed = true;
                    match minutes {
                        Some(m) => println!("{id} now expires in {m} minute(s)"),
                        None => println!("{id} is now timeless"),
                    }
                } else {
                    println!("{id} is completed and cannot be changed");
                }
            }
        }

        Command::Toggle { id } => {
            if let Some(id) = resolve_id(&engine, &id)? {
                if engine.store_mut().toggle_timed(&id, now) {
                    changed = true;
                    let label = engine
                        .store()
                        .get(&id)
                        .map(|t| status_label(t, now))
                        .unwrap_or_default();
                    println!("{id}: {label}");
                } else {
                    println!("{id} is completed and cannot be changed");
                }
            }
        }

        Command::Run => bail!("'run' is not a one-shot command"),
    }

    if changed {
        engine.save().context("Failed to save todos")?;
    }
    Ok(())
}

fn build_todo(
    id: String,
    title: String,
    now: DateTime<Utc>,
    minutes: Option<u32>,
    scheduled_for: Option<DateTime<Utc>>,
    tags: Vec<String>,
    repeat: Option<RepeatRule>,
) -> Todo {
    let mut todo = Todo::new(id, title.trim(), now).with_tags(tags);
    todo.duration_minutes = minutes;
    todo.scheduled_for = scheduled_for;
    todo.repeat = repeat;
    todo
}

/// Resolves a full id or a unique prefix of one.
///
/// Unknown ids print a message and resolve to `None`; only an ambiguous
/// prefix is an error.
fn resolve_id(engine: &Engine, query: &str) -> Result<Option<String>> {
    let todos = engine.store().todos();
    if todos.iter().any(|t| t.id == query) {
        return Ok(Some(query.to_string()));
    }

    let matches: Vec<&Todo> = todos.iter().filter(|t| t.id.starts_with(query)).collect();
    match matches.as_slice() {
        [] => {
            println!("No todo matches '{query}'");
            Ok(None)
        }
        [only] => Ok(Some(only.id.clone())),
        _ => bail!("'{query}' matches {} todos, use a longer prefix", matches.len()),
    }
}

fn print_list(engine: &Engine, tags: &[String], now: DateTime<Utc>, urgent: chrono::Duration) {
    let snapshot = engine.store().snapshot();
    let selected: Vec<Todo> = filter_by_tags(&snapshot, tags)
        .into_iter()
        .cloned()
        .collect();

    let line = |todo: &Todo| {
        let marker = if is_urgent(todo, now, urgent) { "!" } else { " " };
        let repeat = todo
            .repeat
            .as_ref()
            .map(|r| format!(" ({})", r.frequency))
            .unwrap_or_default();
        println!(
            "  {marker} {}  {}{repeat}  [{}]",
            short_id(&todo.id),
            todo.title,
            status_label(todo, now)
        );
    };

    let known = all_tags(&snapshot);
    if !known.is_empty() {
        println!("Tags: {}", known.join(", "));
    }

    let groups = group_by_tag(&selected);
    if groups.is_empty() {
        println!("No active todos");
    }
    for (tag, todos) in &groups.tagged {
        println!("#{tag}");
        todos.iter().for_each(|&t| line(t));
    }
    if !groups.untagged.is_empty() {
        println!("Uncategorized");
        groups.untagged.iter().for_each(|&t| line(t));
    }

    let parts = partition(&selected);
    if !parts.expired.is_empty() {
        println!("Expired");
        parts.expired.iter().for_each(|&t| line(t));
    }
    if !parts.completed.is_empty() {
        println!("Completed");
        parts.completed.iter().for_each(|&t| line(t));
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// Runs the engine until a shutdown signal arrives.
async fn run_engine(config: Config) -> Result<()> {
    info!(
        store = %config.store_path().display(),
        tick_ms = config.tick.as_millis(),
        "Starting Timebox"
    );

    let handle = open_engine(&config).start(config.tick);
    let mut updates = handle.subscribe();

    info!("Timebox running. Press Ctrl+C to stop.");

    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }

            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                let parts = partition(&snapshot);
                debug!(
                    active = parts.active.len(),
                    expired = parts.expired.len(),
                    completed = parts.completed.len(),
                    "Todos updated"
                );
            }
        }
    }

    tokio::time::timeout(Duration::from_secs(5), handle.stop())
        .await
        .context("Timed out stopping the engine")?
        .context("Failed to stop the engine")?;

    info!("Timebox stopped");
    Ok(())
}

/// Initializes the logging subsystem.
///
/// Logs go to stderr so list output stays clean:
/// - Level filtering via `RUST_LOG` (default `info`)
/// - `TIMEBOX_LOG_FORMAT=json` switches to one JSON object per line
fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("TIMEBOX_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true),
            )
            .init();
    }
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_recurring_add() {
        let cli = Cli::try_parse_from([
            "timebox",
            "add",
            "Weekly sync",
            "--at",
            "2024-01-01T09:30:00Z",
            "--repeat",
            "weekly",
            "--day-of-week",
            "1",
            "--time",
            "09:30",
            "-t",
            "work",
        ])
        .unwrap();

        match cli.command {
            Command::Add {
                repeat,
                day_of_week,
                tags,
                ..
            } => {
                assert_eq!(repeat, Some(Frequency::Weekly));
                assert_eq!(day_of_week, Some(1));
                assert_eq!(tags, vec!["work".to_string()]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_out_of_range_weekday() {
        let result = Cli::try_parse_from([
            "timebox",
            "add",
            "x",
            "--repeat",
            "weekly",
            "--day-of-week",
            "7",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn weekday_requires_repeat() {
        let result = Cli::try_parse_from(["timebox", "add", "x", "--day-of-week", "2"]);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_zero_minutes() {
        assert!(Cli::try_parse_from(["timebox", "add", "x", "--minutes", "0"]).is_err());
        assert!(Cli::try_parse_from(["timebox", "set-duration", "abc", "-m", "0"]).is_err());
        assert!(Cli::try_parse_from(["timebox", "add", "x", "--minutes", "1"]).is_ok());
    }

    #[test]
    fn short_id_truncates() {
        assert_eq!(short_id("0f8fad5b-d9cb-469f"), "0f8fad5b");
        assert_eq!(short_id("abc"), "abc");
    }
}
