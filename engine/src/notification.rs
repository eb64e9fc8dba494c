//! Expiration notifications.
//!
//! A [`Notifier`] is the external capability that shows a user-visible
//! message. The [`NotificationDispatcher`] sits in front of it and guarantees
//! the side effect fires at most once per todo id for the lifetime of the
//! process, independently of the persisted `notified` flag.
//!
//! Permission is asked for once ([`NotificationDispatcher::ensure_permission`]).
//! When it is not granted every dispatch is a silent no-op.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info};

/// Fixed title of every expiration notification.
pub const EXPIRED_TITLE: &str = "⏰ Todo Expired";

/// Body text for an expired todo.
#[must_use]
pub fn expired_body(title: &str) -> String {
    format!("Your todo \"{title}\" has expired.")
}

/// Notification permission state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Permission {
    /// Not asked yet.
    #[default]
    Default,
    Granted,
    Denied,
}

impl std::str::FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ask" | "default" => Ok(Self::Default),
            "granted" | "grant" => Ok(Self::Granted),
            "denied" | "deny" => Ok(Self::Denied),
            other => Err(format!("expected ask, granted or denied, got '{other}'")),
        }
    }
}

/// External notification capability.
pub trait Notifier: Send + std::fmt::Debug {
    /// Current permission state.
    fn permission(&self) -> Permission;

    /// Asks for permission and returns the resulting state.
    fn request_permission(&mut self) -> Permission;

    /// Shows a notification. Implementations may assume permission is granted.
    fn notify(&mut self, title: &str, body: &str);
}

/// Emits notifications as log records.
///
/// Used by the CLI: a terminal session has nothing to consent to, so a
/// pending request resolves to [`Permission::Granted`] unless it was
/// explicitly denied through configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier {
    permission: Permission,
}

impl LogNotifier {
    #[must_use]
    pub fn new(permission: Permission) -> Self {
        Self { permission }
    }
}

impl Notifier for LogNotifier {
    fn permission(&self) -> Permission {
        self.permission
    }

    fn request_permission(&mut self) -> Permission {
        if self.permission == Permission::Default {
            self.permission = Permission::Granted;
        }
        self.permission
    }

    fn notify(&mut self, title: &str, body: &str) {
        info!(target: "timebox::notification", title, body, "Notification");
    }
}

/// Records notifications in memory.
///
/// Clones share the same record, so tests can hand one clone to the engine
/// and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct MemoryNotifier {
    permission: Arc<Mutex<Permission>>,
    grant_on_request: bool,
    sent: Arc<Mutex<Vec<(String, String)>>>,
    requests: Arc<Mutex<u32>>,
}

impl MemoryNotifier {
    /// A notifier that already has permission.
    #[must_use]
    pub fn granted() -> Self {
        Self::with_permission(Permission::Granted, true)
    }

    /// A notifier whose permission was refused.
    #[must_use]
    pub fn denied() -> Self {
        Self::with_permission(Permission::Denied, false)
    }

    /// A notifier starting at `permission`; a pending request resolves to
    /// granted when `grant_on_request` is set, denied otherwise.
    #[must_use]
    pub fn with_permission(permission: Permission, grant_on_request: bool) -> Self {
        Self {
            permission: Arc::new(Mutex::new(permission)),
            grant_on_request,
            ..Self::default()
        }
    }

    /// Notifications shown so far as `(title, body)` pairs.
    #[must_use]
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// How many times permission was requested.
    #[must_use]
    pub fn permission_requests(&self) -> u32 {
        *self.requests.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Notifier for MemoryNotifier {
    fn permission(&self) -> Permission {
        *self.permission.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn request_permission(&mut self) -> Permission {
        *self.requests.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        let mut permission = self.permission.lock().unwrap_or_else(PoisonError::into_inner);
        if *permission == Permission::Default {
            *permission = if self.grant_on_request {
                Permission::Granted
            } else {
                Permission::Denied
            };
        }
        *permission
    }

    fn notify(&mut self, title: &str, body: &str) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((title.to_string(), body.to_string()));
    }
}

/// Deduplicating front for a [`Notifier`].
#[derive(Debug)]
pub struct NotificationDispatcher {
    notifier: Box<dyn Notifier>,
    notified: HashSet<String>,
}

impl NotificationDispatcher {
    #[must_use]
    pub fn new(notifier: impl Notifier + 'static) -> Self {
        Self {
            notifier: Box::new(notifier),
            notified: HashSet::new(),
        }
    }

    /// Requests permission if it has neither been granted nor denied yet.
    pub fn ensure_permission(&mut self) -> Permission {
        match self.notifier.permission() {
            Permission::Default => {
                let permission = self.notifier.request_permission();
                info!(?permission, "Notification permission requested");
                permission
            }
            settled => settled,
        }
    }

    /// Notifies that the todo `id` expired, at most once per id.
    ///
    /// Returns `true` when this call claimed the id (whether or not the
    /// notifier actually displayed anything), `false` for a duplicate.
    pub fn notify_once(&mut self, id: &str, title: &str) -> bool {
        if !self.notified.insert(id.to_string()) {
            debug!(todo_id = id, "Notification already dispatched");
            return false;
        }

        if self.notifier.permission() == Permission::Granted {
            self.notifier.notify(EXPIRED_TITLE, &expired_body(title));
        } else {
            debug!(todo_id = id, "Notification skipped: permission not granted");
        }
        true
    }

    /// Whether `id` has been claimed.
    #[must_use]
    pub fn has_notified(&self, id: &str) -> bool {
        self.notified.contains(id)
    }

    /// Marks ids as already notified, e.g. from a loaded collection.
    pub fn seed<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.notified.extend(ids.into_iter().map(Into::into));
    }

    #[must_use]
    pub fn permission(&self) -> Permission {
        self.notifier.permission()
    }
}
