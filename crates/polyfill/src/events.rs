//! Event Bus - Cancelable notifications raised before each mutating step
//!
//! Listeners run synchronously, in registration order, and may veto the step
//! with [`Notification::prevent_default`]. Every dispatched notification is
//! also broadcast, with its final cancel state, to passive subscribers.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use dashmap::DashMap;
use dom::NodeId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    Load,
    Apply,
    Insert,
    Revoke,
    Remove,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Apply => "apply",
            Self::Insert => "insert",
            Self::Revoke => "revoke",
            Self::Remove => "remove",
        }
    }

    /// `"{namespace}.{kind}"`
    pub fn event_name(self, namespace: &str) -> String {
        format!("{}.{}", namespace, self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationDetail {
    Load { address: String },
    Apply { address: String, identifier: String },
    Insert { address: String, file: NodeId },
    Revoke { value: String },
    Remove { address: String },
}

impl NotificationDetail {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Self::Load { .. } => NotificationKind::Load,
            Self::Apply { .. } => NotificationKind::Apply,
            Self::Insert { .. } => NotificationKind::Insert,
            Self::Revoke { .. } => NotificationKind::Revoke,
            Self::Remove { .. } => NotificationKind::Remove,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub name: String,
    /// Referencing element or injection root the notification is raised on
    pub target: NodeId,
    pub detail: NotificationDetail,
    pub default_prevented: bool,
}

impl Notification {
    pub fn new(namespace: &str, target: NodeId, detail: NotificationDetail) -> Self {
        Self {
            name: detail.kind().event_name(namespace),
            target,
            detail,
            default_prevented: false,
        }
    }

    /// Veto the step this notification announces
    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }
}

pub type Listener = Arc<dyn Fn(&mut Notification) + Send + Sync>;

pub struct EventBus {
    listeners: DashMap<String, Vec<Listener>>,
    tx: broadcast::Sender<Notification>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self {
            listeners: DashMap::new(),
            tx,
        }
    }

    /// Register a listener for a full notification name
    pub fn on<F>(&self, name: impl Into<String>, listener: F)
    where
        F: Fn(&mut Notification) + Send + Sync + 'static,
    {
        self.listeners
            .entry(name.into())
            .or_default()
            .push(Arc::new(listener));
    }

    /// Drop every listener for `name`
    pub fn off(&self, name: &str) {
        self.listeners.remove(name);
    }

    /// Run the listeners; returns `true` if the default action may proceed
    pub fn dispatch(&self, mut notification: Notification) -> bool {
        // Clone out so listeners may register more listeners without deadlocking
        let listeners = self
            .listeners
            .get(&notification.name)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();

        for listener in listeners {
            let outcome = catch_unwind(AssertUnwindSafe(|| listener(&mut notification)));
            if outcome.is_err() {
                tracing::warn!("Listener for '{}' panicked", notification.name);
            }
        }

        let proceed = !notification.default_prevented;
        tracing::debug!(
            "Dispatched '{}' on node {} (proceed: {})",
            notification.name,
            notification.target,
            proceed
        );
        let _ = self.tx.send(notification); // Ignore error if no subscribers
        proceed
    }

    /// Passive stream of dispatched notifications
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
