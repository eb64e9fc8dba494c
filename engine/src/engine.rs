//! The tick-driven engine.
//!
//! [`Engine`] bundles the store, the repository and the clock. Used
//! synchronously it serves one-shot commands; [`Engine::start`] moves it into
//! a background task that reconciles on every tick and applies user
//! mutations sent through an [`EngineHandle`].
//!
//! # Architecture
//!
//! The task is the single owner of the collection. Ticks and commands are
//! handled one at a time inside one `select!` loop, so there is no lock
//! around the todos and a tick always finishes before the next command or
//! tick is looked at. After each change the task publishes the new
//! snapshot on a `watch` channel and saves the collection.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use timebox_engine::engine::Engine;
//! use timebox_engine::persistence::MemoryRepository;
//! use timebox_engine::clock::SystemClock;
//! use timebox_engine::ids::UuidGenerator;
//! use timebox_engine::notification::{LogNotifier, NotificationDispatcher};
//! use timebox_engine::recurrence::RecurrenceGenerator;
//! use timebox_engine::types::Todo;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Engine::open(
//!         MemoryRepository::new(),
//!         SystemClock,
//!         NotificationDispatcher::new(LogNotifier::default()),
//!         RecurrenceGenerator::local(),
//!         UuidGenerator,
//!     );
//!     let handle = engine.start(Duration::from_secs(1));
//!
//!     handle.add(Todo::new("tea", "Tea", chrono::Utc::now()).with_duration(3)).await?;
//!     handle.stop().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::ids::IdGenerator;
use crate::notification::NotificationDispatcher;
use crate::persistence::{PersistenceError, TodoRepository};
use crate::recurrence::RecurrenceGenerator;
use crate::store::{CompleteOutcome, ReconcileReport, StoreError, TodoStore};
use crate::types::Todo;

/// Capacity of the command channel.
const COMMAND_BUFFER: usize = 64;

/// Shortest accepted tick period.
const MIN_TICK: Duration = Duration::from_millis(1);

/// Errors returned by [`EngineHandle`] calls.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The engine task has exited.
    #[error("engine is not running")]
    Stopped,

    /// The store rejected the mutation.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Shared collection snapshot.
pub type Snapshot = Arc<Vec<Todo>>;

/// User mutations routed to the engine task.
#[derive(Debug)]
enum Command {
    Add(Todo, oneshot::Sender<Result<(), StoreError>>),
    Remove(String, oneshot::Sender<bool>),
    Complete(String, oneshot::Sender<CompleteOutcome>),
    ClearExpired(oneshot::Sender<usize>),
    SetDuration {
        id: String,
        minutes: Option<u32>,
        reply: oneshot::Sender<bool>,
    },
    ToggleTimed(String, oneshot::Sender<bool>),
    Stop(oneshot::Sender<()>),
}

/// Store, repository and clock wired together.
#[derive(Debug)]
pub struct Engine {
    store: TodoStore,
    repository: Box<dyn TodoRepository>,
    clock: Arc<dyn Clock>,
}

impl Engine {
    /// Wires an engine around an existing store.
    #[must_use]
    pub fn new(
        store: TodoStore,
        repository: impl TodoRepository + 'static,
        clock: impl Clock + 'static,
    ) -> Self {
        Self {
            store,
            repository: Box::new(repository),
            clock: Arc::new(clock),
        }
    }

    /// Loads the stored collection and asks for notification permission.
    ///
    /// A repository that cannot be read yields an empty collection; the
    /// failure is logged, never returned.
    #[must_use]
    pub fn open(
        repository: impl TodoRepository + 'static,
        clock: impl Clock + 'static,
        mut dispatcher: NotificationDispatcher,
        recurrence: RecurrenceGenerator,
        ids: impl IdGenerator + 'static,
    ) -> Self {
        let todos = match repository.load() {
            Ok(todos) => todos,
            Err(e) => {
                warn!(error = %e, "Failed to load todos, starting with an empty list");
                Vec::new()
            }
        };
        info!(count = todos.len(), "Todos loaded");

        dispatcher.ensure_permission();
        let store = TodoStore::new(dispatcher, recurrence, ids).with_todos(todos);
        Self::new(store, repository, clock)
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    #[must_use]
    pub fn store(&self) -> &TodoStore {
        &self.store
    }

    /// Mutable store access for one-shot callers; remember to [`save`](Self::save).
    pub fn store_mut(&mut self) -> &mut TodoStore {
        &mut self.store
    }

    /// Runs one reconciliation pass at the clock's current time.
    pub fn tick(&mut self) -> ReconcileReport {
        let now = self.clock.now();
        self.store.reconcile(now)
    }

    /// Writes the current collection to the repository.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError` if the repository write fails.
    pub fn save(&self) -> Result<(), PersistenceError> {
        self.repository.save(self.store.todos())
    }

    /// Moves the engine into a background task ticking every `tick`.
    ///
    /// Periods below one millisecond are raised to one millisecond.
    /// Must be called inside a Tokio runtime.
    #[must_use]
    pub fn start(self, tick: Duration) -> EngineHandle {
        let tick = if tick < MIN_TICK {
            warn!(tick_ms = tick.as_millis(), "Tick period too short, using 1ms");
            MIN_TICK
        } else {
            tick
        };
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (snapshot_tx, snapshot_rx) = watch::channel(self.store.snapshot());

        info!(tick_ms = tick.as_millis(), "Starting engine");
        let task = tokio::spawn(self.run(tick, command_rx, snapshot_tx));

        EngineHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
            task: Some(task),
        }
    }

    async fn run(
        mut self,
        tick: Duration,
        mut commands: mpsc::Receiver<Command>,
        snapshots: watch::Sender<Snapshot>,
    ) {
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let report = self.tick();
                    if !report.is_empty() {
                        debug!(
                            expired = report.expired.len(),
                            spawned = report.spawned.len(),
                            "Tick changed todos"
                        );
                        self.publish(&snapshots);
                    }
                }

                command = commands.recv() => {
                    match command {
                        Some(Command::Stop(reply)) => {
                            self.persist();
                            let _ = reply.send(());
                            break;
                        }
                        Some(command) => {
                            if self.apply(command) {
                                self.publish(&snapshots);
                            }
                        }
                        None => {
                            debug!("All engine handles dropped");
                            self.persist();
                            break;
                        }
                    }
                }
            }
        }

        info!("Engine stopped");
    }

    /// Applies one mutation, answering its caller. Returns true on change.
    fn apply(&mut self, command: Command) -> bool {
        let now = self.clock.now();
        match command {
            Command::Add(todo, reply) => {
                let result = self.store.add(todo);
                let changed = result.is_ok();
                let _ = reply.send(result);
                changed
            }
            Command::Remove(id, reply) => {
                let changed = self.store.remove(&id);
                let _ = reply.send(changed);
                changed
            }
            Command::Complete(id, reply) => {
                let outcome = self.store.complete(&id, now);
                let changed = outcome.changed();
                let _ = reply.send(outcome);
                changed
            }
            Command::ClearExpired(reply) => {
                let cleared = self.store.clear_expired();
                let _ = reply.send(cleared);
                cleared > 0
            }
            Command::SetDuration { id, minutes, reply } => {
                let changed = self.store.set_duration(&id, minutes, now);
                let _ = reply.send(changed);
                changed
            }
            Command::ToggleTimed(id, reply) => {
                let changed = self.store.toggle_timed(&id, now);
                let _ = reply.send(changed);
                changed
            }
            Command::Stop(reply) => {
                let _ = reply.send(());
                false
            }
        }
    }

    fn publish(&self, snapshots: &watch::Sender<Snapshot>) {
        snapshots.send_replace(self.store.snapshot());
        self.persist();
    }

    fn persist(&self) {
        if let Err(e) = self.save() {
            error!(error = %e, "Failed to save todos");
        }
    }
}

/// Client side of a running engine.
///
/// Dropping the handle without calling [`stop`](Self::stop) aborts the
/// engine task.
#[derive(Debug)]
pub struct EngineHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<Snapshot>,
    task: Option<JoinHandle<()>>,
}

impl EngineHandle {
    /// Latest published collection.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Arc::clone(&self.snapshots.borrow())
    }

    /// A receiver notified on every change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    /// Appends a todo.
    ///
    /// # Errors
    ///
    /// [`EngineError::Store`] if the store rejects it, [`EngineError::Stopped`]
    /// if the engine has exited.
    pub async fn add(&self, todo: Todo) -> Result<(), EngineError> {
        let result = self.request(|reply| Command::Add(todo, reply)).await?;
        result.map_err(EngineError::from)
    }

    /// Deletes a todo; `false` if the id was unknown.
    ///
    /// # Errors
    ///
    /// [`EngineError::Stopped`] if the engine has exited.
    pub async fn remove(&self, id: impl Into<String>) -> Result<bool, EngineError> {
        let id = id.into();
        self.request(|reply| Command::Remove(id, reply)).await
    }

    /// Marks a todo completed, continuing its series if recurring.
    ///
    /// # Errors
    ///
    /// [`EngineError::Stopped`] if the engine has exited.
    pub async fn complete(&self, id: impl Into<String>) -> Result<CompleteOutcome, EngineError> {
        let id = id.into();
        self.request(|reply| Command::Complete(id, reply)).await
    }

    /// Removes all expired, not completed todos.
    ///
    /// # Errors
    ///
    /// [`EngineError::Stopped`] if the engine has exited.
    pub async fn clear_expired(&self) -> Result<usize, EngineError> {
        self.request(Command::ClearExpired).await
    }

    /// Restarts a todo's countdown; `None` makes it timeless.
    ///
    /// # Errors
    ///
    /// [`EngineError::Stopped`] if the engine has exited.
    pub async fn set_duration(
        &self,
        id: impl Into<String>,
        minutes: Option<u32>,
    ) -> Result<bool, EngineError> {
        let id = id.into();
        self.request(|reply| Command::SetDuration { id, minutes, reply })
            .await
    }

    /// Flips a todo between timed and timeless.
    ///
    /// # Errors
    ///
    /// [`EngineError::Stopped`] if the engine has exited.
    pub async fn toggle_timed(&self, id: impl Into<String>) -> Result<bool, EngineError> {
        let id = id.into();
        self.request(|reply| Command::ToggleTimed(id, reply)).await
    }

    /// Stops the ticker, saves, and waits for the task to finish.
    ///
    /// # Errors
    ///
    /// [`EngineError::Stopped`] if the task had already exited abnormally.
    pub async fn stop(mut self) -> Result<(), EngineError> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        if self.commands.send(Command::Stop(reply_tx)).await.is_ok() {
            let _ = reply_rx.await;
        }

        task.await.map_err(|e| {
            warn!(error = %e, "Engine task ended abnormally");
            EngineError::Stopped
        })
    }

    /// Whether the engine task is still alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(build(reply_tx))
            .await
            .map_err(|_| EngineError::Stopped)?;
        reply_rx.await.map_err(|_| EngineError::Stopped)
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
