//! Host document handle
//!
//! The shared document the resolver works on. Reads and writes go through
//! closures; every write drains the arena's mutation journal and publishes the
//! records, together with viewport changes, on a broadcast channel.

use std::sync::Arc;

use dom::{DomArena, MutationRecord, NodeId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use url::Url;

use crate::error::Result;

const EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostEvent {
    Mutation(MutationRecord),
    Resize,
    OrientationChange,
}

struct HostInner {
    arena: RwLock<DomArena>,
    location: Url,
    user_agent: RwLock<String>,
    tx: broadcast::Sender<HostEvent>,
}

#[derive(Clone)]
pub struct HostDocument {
    inner: Arc<HostInner>,
}

impl HostDocument {
    pub fn new(mut arena: DomArena, location: Url) -> Self {
        // Construction is not a mutation anyone observed
        arena.take_mutations();
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(HostInner {
                arena: RwLock::new(arena),
                location,
                user_agent: RwLock::new(String::new()),
                tx,
            }),
        }
    }

    pub fn parse(markup: &str, location: Url) -> Result<Self> {
        Ok(Self::new(dom::parse(markup)?, location))
    }

    /// Base location references resolve against
    pub fn location(&self) -> &Url {
        &self.inner.location
    }

    pub fn user_agent(&self) -> String {
        self.inner.user_agent.read().clone()
    }

    pub fn set_user_agent(&self, user_agent: impl Into<String>) {
        *self.inner.user_agent.write() = user_agent.into();
    }

    pub fn read<R>(&self, f: impl FnOnce(&DomArena) -> R) -> R {
        f(&self.inner.arena.read())
    }

    /// Mutate the document; recorded mutations are published after the lock is released
    pub fn write<R>(&self, f: impl FnOnce(&mut DomArena) -> R) -> R {
        let (result, records) = {
            let mut arena = self.inner.arena.write();
            let result = f(&mut arena);
            (result, arena.take_mutations())
        };
        for record in records {
            let _ = self.inner.tx.send(HostEvent::Mutation(record)); // Ignore error if no subscribers
        }
        result
    }

    pub fn resize(&self) {
        let _ = self.inner.tx.send(HostEvent::Resize);
    }

    pub fn orientation_change(&self) {
        let _ = self.inner.tx.send(HostEvent::OrientationChange);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.inner.tx.subscribe()
    }

    pub fn serialize(&self) -> Result<String> {
        Ok(self.read(dom::serializer::serialize)?)
    }

    pub fn element_count(&self) -> usize {
        self.read(DomArena::element_count)
    }

    /// `body` if present, else the document element, else the root
    pub fn default_container(&self) -> Option<NodeId> {
        self.read(|doc| {
            doc.find_by_tag("body")
                .first()
                .copied()
                .or_else(|| doc.document_element())
                .or_else(|| doc.root_id())
        })
    }
}

impl std::fmt::Debug for HostDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostDocument")
            .field("location", &self.inner.location.as_str())
            .field("nodes", &self.inner.arena.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(markup: &str) -> HostDocument {
        HostDocument::parse(markup, Url::parse("http://localhost/index.html").unwrap()).unwrap()
    }

    #[test]
    fn test_default_container() {
        let doc = host("<html><body><svg/></body></html>");
        let body = doc.default_container().unwrap();
        assert_eq!(
            doc.read(|d| d.get(body).unwrap().node_name.clone()),
            "body"
        );

        let doc = host("<svg><use/></svg>");
        let container = doc.default_container().unwrap();
        assert_eq!(doc.read(|d| d.document_element()), Some(container));
    }

    #[tokio::test]
    async fn test_write_publishes_mutations() {
        let doc = host("<svg><use/></svg>");
        let mut rx = doc.subscribe();

        let use_el = doc.read(|d| d.find_by_tag("use")[0]);
        doc.write(|d| d.set_attribute(use_el, "href", "#x")).unwrap();
        doc.resize();

        match rx.recv().await {
            Ok(HostEvent::Mutation(record)) => assert_eq!(record.target(), use_el),
            other => panic!("Expected mutation, got {:?}", other),
        }
        assert_eq!(rx.recv().await.unwrap(), HostEvent::Resize);
    }

    #[test]
    fn test_parsing_is_not_published() {
        let doc = host("<svg><use/></svg>");
        let mut rx = doc.subscribe();
        doc.write(|_| ());
        assert!(rx.try_recv().is_err());
        assert_eq!(doc.element_count(), 2);
    }
}
