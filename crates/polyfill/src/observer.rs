//! Observation - re-scan triggers
//!
//! Each trigger decides which host events call for a re-scan. Registering one
//! spawns a task that owns a host subscription; the returned [`Subscription`]
//! aborts that task when cancelled or dropped.
//!
//! Every matching event triggers a full re-scan. Events already queued behind
//! it are drained first, so a burst of mutations costs one scan.

use std::sync::{Arc, Weak};

use dom::{MutationRecord, NodeId};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::broadcast::Receiver;
use tokio::task::JoinHandle;

use crate::attribute::ReferenceAttribute;
use crate::error::{PolyfillError, Result};
use crate::host::{HostDocument, HostEvent};
use crate::processor::Engine;

pub trait Trigger: Send + Sync {
    /// Human-readable name for logging
    fn name(&self) -> &str;

    /// Does `event` call for a re-scan?
    fn matches(&self, event: &HostEvent, host: &HostDocument) -> bool;
}

/// Structural changes inside the scan context: child insertion and removal,
/// and writes to a reference attribute
pub struct MutationTrigger {
    context: Option<NodeId>,
}

impl MutationTrigger {
    pub fn new(context: Option<NodeId>) -> Self {
        Self { context }
    }
}

impl Trigger for MutationTrigger {
    fn name(&self) -> &str {
        "mutation"
    }

    fn matches(&self, event: &HostEvent, host: &HostDocument) -> bool {
        let HostEvent::Mutation(record) = event else {
            return false;
        };
        if let MutationRecord::Attributes { name, .. } = record {
            if ReferenceAttribute::from_name(name).is_none() {
                return false;
            }
        }
        match self.context {
            Some(context) => host.read(|doc| doc.contains(context, record.target())),
            None => true,
        }
    }
}

/// Resize and orientation changes, for layouts that swap markup without mutating
pub struct ViewportTrigger;

impl Trigger for ViewportTrigger {
    fn name(&self) -> &str {
        "viewport"
    }

    fn matches(&self, event: &HostEvent, _host: &HostDocument) -> bool {
        matches!(event, HostEvent::Resize | HostEvent::OrientationChange)
    }
}

/// A running trigger task
pub struct Subscription {
    name: String,
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[derive(Default)]
pub struct SubscriptionSet {
    subscriptions: Vec<Subscription>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `trigger` to the engine's host; needs a tokio runtime
    pub fn register(&mut self, trigger: Arc<dyn Trigger>, engine: &Arc<Engine>) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| PolyfillError::NoRuntime("observer"))?;

        let name = trigger.name().to_string();
        let rx = engine.host.subscribe();
        let task = runtime.spawn(watch(trigger, rx, Arc::downgrade(engine)));
        tracing::debug!("Registered {} observer", name);
        self.subscriptions.push(Subscription { name, task });
        Ok(())
    }

    pub fn cancel_all(&mut self) {
        for subscription in self.subscriptions.drain(..) {
            tracing::debug!("Cancelled {} observer", subscription.name());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.subscriptions.iter().map(Subscription::name).collect()
    }
}

async fn watch(trigger: Arc<dyn Trigger>, mut rx: Receiver<HostEvent>, weak: Weak<Engine>) {
    loop {
        let event = match rx.recv().await {
            Ok(event) => Some(event),
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(
                    "{} observer lagged by {} event(s); re-scanning",
                    trigger.name(),
                    skipped
                );
                None
            }
            Err(RecvError::Closed) => {
                tracing::warn!(
                    "{} notifications closed; falling back to explicit scans",
                    trigger.name()
                );
                break;
            }
        };

        let Some(engine) = weak.upgrade() else {
            break;
        };
        if let Some(event) = event {
            if !trigger.matches(&event, &engine.host) {
                continue;
            }
        }

        loop {
            match rx.try_recv() {
                Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        engine.scan();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn host() -> HostDocument {
        HostDocument::parse(
            r#"<html><body><svg><use/></svg></body><aside/></html>"#,
            Url::parse("http://localhost/").unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_mutation_trigger_scope() {
        let host = host();
        let (body, use_el, aside) = host.read(|d| {
            (
                d.find_by_tag("body")[0],
                d.find_by_tag("use")[0],
                d.find_by_tag("aside")[0],
            )
        });
        let trigger = MutationTrigger::new(Some(body));

        let attr = |target, name: &str| {
            HostEvent::Mutation(MutationRecord::Attributes {
                target,
                name: name.to_string(),
                old_value: None,
            })
        };
        assert!(trigger.matches(&attr(use_el, "href"), &host));
        assert!(trigger.matches(&attr(use_el, "xlink:href"), &host));
        assert!(!trigger.matches(&attr(use_el, "class"), &host));
        assert!(!trigger.matches(&attr(aside, "href"), &host));
        assert!(!trigger.matches(&HostEvent::Resize, &host));
    }

    #[test]
    fn test_viewport_trigger() {
        let host = host();
        assert!(ViewportTrigger.matches(&HostEvent::Resize, &host));
        assert!(ViewportTrigger.matches(&HostEvent::OrientationChange, &host));
    }
}
