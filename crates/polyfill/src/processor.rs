//! Element processing
//!
//! [`Engine`] holds everything a scan needs: the host, the loader, the cache,
//! the notification bus and the frame queue. [`Engine::process`] takes one
//! candidate element through the guarded steps:
//!
//! ```text
//! read reference → local/bound? → resolve → awaiting? → load (once per address)
//!                                                          ↓
//!                 frame: write `#identifier`, record binding ← apply
//! ```
//!
//! Lock order is always host, then cache. Continuations and listeners run
//! with no lock held.

use std::sync::Arc;

use dom::{DomArena, NodeId, Selector};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use url::Url;

use crate::address::{self, is_local_value};
use crate::attribute::ReferenceAttribute;
use crate::cache::{Admission, DocumentCache, ElementBinding, Waiter};
use crate::error::{LoadError, PolyfillError, Result};
use crate::events::{EventBus, Notification, NotificationDetail};
use crate::frame::FrameScheduler;
use crate::host::HostDocument;
use crate::identifier::{derive_identifier, rewrite_document, strip_delimiter};
use crate::loader::{load_document, Loader};
use crate::options::{Options, Target};

const HIDDEN_STYLE: &str = "position: absolute; overflow: hidden; width: 0; height: 0";

/// What [`Engine::process`] did with an element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// No reference, a local `#fragment`, or an unresolvable value
    Untouched,
    /// Already rewritten from this value
    AlreadyBound,
    /// Empty fragment, or same origin while `crossdomain` is set
    Skipped,
    /// Already waiting on the same load
    Awaiting,
    LoadVetoed,
    /// First sighting of the address; load started
    Loading,
    /// Load already in flight; rewrite follows on completion
    Queued,
    /// Document already loaded; rewrite requested
    Scheduled,
    /// Address failed earlier and is never retried
    Failed,
}

/// One pending rewrite of one element
struct Application {
    element: NodeId,
    value: String,
    address: String,
    identifier: String,
    generation: u64,
}

pub struct Engine {
    pub(crate) host: HostDocument,
    loader: Arc<dyn Loader>,
    pub(crate) options: RwLock<Options>,
    pub(crate) cache: DocumentCache,
    pub(crate) events: EventBus,
    pub(crate) frames: FrameScheduler,
    inflight: Mutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    pub fn new(host: HostDocument, loader: Arc<dyn Loader>, options: Options) -> Self {
        Self {
            host,
            loader,
            options: RwLock::new(options),
            cache: DocumentCache::new(),
            events: EventBus::new(),
            frames: FrameScheduler::new(),
            inflight: Mutex::new(Vec::new()),
        }
    }

    fn notify(&self, target: NodeId, detail: NotificationDetail) -> bool {
        let namespace = self.options.read().namespace.clone();
        self.events
            .dispatch(Notification::new(&namespace, target, detail))
    }

    /// Scan context: configured node or the host's default container
    pub(crate) fn context(&self) -> Option<NodeId> {
        self.options
            .read()
            .context
            .or_else(|| self.host.default_container())
    }

    /// Injection root: configured node or the host's default container
    pub(crate) fn injection_root(&self) -> Option<NodeId> {
        self.options
            .read()
            .root
            .or_else(|| self.host.default_container())
    }

    // ------------------------------------------------------------------
    // Scanning
    // ------------------------------------------------------------------

    /// Elements the current target designates
    pub fn candidates(&self) -> Result<Vec<NodeId>> {
        let target = self.options.read().target.clone();
        match target {
            Target::Elements(elements) => Ok(elements),
            Target::Selector(source) => {
                let selector = Selector::parse(&source)?;
                let Some(context) = self.context() else {
                    return Ok(Vec::new());
                };
                Ok(self.host.read(|doc| selector.select_all(doc, context))?)
            }
        }
    }

    /// Process every candidate; per-element failures are logged and skipped
    pub fn scan(self: &Arc<Self>) -> usize {
        self.prune_bindings();

        let elements = match self.candidates() {
            Ok(elements) => elements,
            Err(e) => {
                tracing::warn!("Scan aborted, no candidates: {}", e);
                return 0;
            }
        };

        for &element in &elements {
            match self.process(element) {
                Ok(outcome) => tracing::trace!("Element {}: {:?}", element, outcome),
                Err(e) => tracing::warn!("Skipping element {}: {}", element, e),
            }
        }
        tracing::debug!("Scanned {} candidate(s)", elements.len());
        elements.len()
    }

    /// Drop bindings whose elements left the document
    fn prune_bindings(&self) {
        let bound: Vec<NodeId> = self.cache.bindings().into_iter().map(|(id, _)| id).collect();
        if bound.is_empty() {
            return;
        }
        let stale: Vec<NodeId> = self.host.read(|doc| {
            bound
                .into_iter()
                .filter(|&id| !doc.is_connected(id))
                .collect()
        });
        if !stale.is_empty() {
            let removed = self.cache.remove_bindings(&stale);
            tracing::debug!("Pruned {} disconnected binding(s)", removed);
        }
    }

    // ------------------------------------------------------------------
    // Processing
    // ------------------------------------------------------------------

    pub fn process(self: &Arc<Self>, element: NodeId) -> Result<Outcome> {
        let value = match self.host.read(|doc| ReferenceAttribute::read(doc, element))? {
            Some(value) if !is_local_value(&value) => value,
            _ => return Ok(Outcome::Untouched),
        };

        if self
            .cache
            .binding(element)
            .is_some_and(|binding| binding.original == value)
        {
            return Ok(Outcome::AlreadyBound);
        }

        let reference = address::resolve(&value, self.host.location());
        let Some(url) = reference.address.clone() else {
            return Ok(Outcome::Untouched);
        };
        if reference.fragment.is_empty() {
            tracing::debug!("Element {}: '{}' names no fragment", element, value);
            return Ok(Outcome::Skipped);
        }

        let (crossdomain, prefix) = {
            let options = self.options.read();
            (options.crossdomain, options.prefix)
        };
        if crossdomain && url.origin() == self.host.location().origin() {
            return Ok(Outcome::Skipped);
        }

        let identifier = if prefix {
            derive_identifier(&reference.fragment, &url)
        } else {
            strip_delimiter(&reference.fragment)
        };
        let key = url.to_string();

        if !self.cache.mark_awaiting(element, &value, &key) {
            return Ok(Outcome::Awaiting);
        }

        if !self.cache.contains_file(&key) {
            let allowed = self.notify(
                element,
                NotificationDetail::Load {
                    address: key.clone(),
                },
            );
            if !allowed {
                tracing::debug!("Load of {} vetoed", key);
                self.cache.clear_awaiting(element, &value);
                return Ok(Outcome::LoadVetoed);
            }
        }

        let application = Application {
            element,
            value: value.clone(),
            address: key.clone(),
            identifier,
            generation: self.cache.generation(),
        };
        let generation = application.generation;
        let weak = Arc::downgrade(self);
        let waiter: Waiter = Box::new(move |_file| {
            if let Some(engine) = weak.upgrade() {
                engine.apply(application);
            }
        });

        match self.cache.ensure_loading(&key, waiter) {
            Admission::Started => {
                self.spawn_load(url, generation)?;
                Ok(Outcome::Loading)
            }
            Admission::Queued => Ok(Outcome::Queued),
            Admission::Ready(file, waiter) => {
                waiter(file);
                Ok(Outcome::Scheduled)
            }
            Admission::Failed => {
                self.cache.clear_awaiting(element, &value);
                Ok(Outcome::Failed)
            }
        }
    }

    /// Announce the rewrite, then queue it for the next frame
    fn apply(self: &Arc<Self>, application: Application) {
        if application.generation != self.cache.generation() {
            return;
        }

        let allowed = self.notify(
            application.element,
            NotificationDetail::Apply {
                address: application.address.clone(),
                identifier: application.identifier.clone(),
            },
        );
        if !allowed {
            tracing::debug!("Rewrite of element {} vetoed", application.element);
            self.cache
                .clear_awaiting(application.element, &application.value);
            return;
        }

        let weak = Arc::downgrade(self);
        self.frames.request(move |doc| {
            if let Some(engine) = weak.upgrade() {
                engine.rewrite_element(doc, application);
            }
        });
    }

    /// Runs inside a frame, under the host write lock
    fn rewrite_element(&self, doc: &mut DomArena, application: Application) {
        let Application {
            element,
            value,
            identifier,
            generation,
            ..
        } = application;
        self.cache.clear_awaiting(element, &value);
        if generation != self.cache.generation() {
            return;
        }

        match ReferenceAttribute::read(doc, element) {
            Ok(Some(current)) if current == value => {}
            _ => {
                tracing::debug!("Element {} changed before its rewrite; skipped", element);
                return;
            }
        }

        let applied = format!("#{identifier}");
        let written = ReferenceAttribute::snapshot(doc, element).and_then(|forms| {
            ReferenceAttribute::write(doc, element, &applied).map(|_| forms)
        });
        match written {
            Ok(forms) => {
                tracing::debug!("Element {}: '{}' → '{}'", element, value, applied);
                self.cache.record_binding(
                    element,
                    ElementBinding {
                        original: value,
                        applied,
                        forms,
                    },
                );
            }
            Err(e) => tracing::warn!("Failed to rewrite element {}: {}", element, e),
        }
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    fn spawn_load(self: &Arc<Self>, address: Url, generation: u64) -> Result<()> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            self.cache.fail(address.as_str());
            return Err(PolyfillError::NoRuntime("document load"));
        };

        let task = runtime.spawn(self.clone().load_file(address, generation));
        let mut inflight = self.inflight.lock();
        inflight.retain(|handle| !handle.is_finished());
        inflight.push(task);
        Ok(())
    }

    async fn load_file(self: Arc<Self>, address: Url, generation: u64) {
        let key = address.to_string();
        let loaded = load_document(self.loader.as_ref(), &address).await;

        if generation != self.cache.generation() {
            tracing::debug!("Discarding load of {} finished after teardown", key);
            return;
        }

        let injected = loaded
            .map_err(PolyfillError::from)
            .and_then(|doc| self.inject(doc, &address, generation));

        match injected {
            Ok(file) => {
                tracing::info!("Loaded {}", key);
                for waiter in self.cache.complete(&key, file) {
                    waiter(file);
                }
            }
            Err(e) => {
                tracing::warn!("Failed to load {}: {}", key, e);
                self.cache.fail(&key);
            }
        }
    }

    /// Prepare the loaded document and copy it into the host, detached.
    ///
    /// Insertion under the injection root waits for the `insert` notification
    /// and the next frame. A vetoed insertion still counts as loaded.
    fn inject(self: &Arc<Self>, mut doc: DomArena, address: &Url, generation: u64) -> Result<NodeId> {
        let document_element = doc
            .document_element()
            .ok_or_else(|| LoadError::Empty(address.to_string()))?;

        if self.options.read().prefix {
            let renamed = rewrite_document(&mut doc, address);
            tracing::debug!("Prefixed {} identifier(s) in {}", renamed.len(), address);
        }
        hide(&mut doc, document_element)?;

        let file = self
            .host
            .write(|host| host.import_subtree(&doc, document_element))?;

        let Some(root) = self.injection_root() else {
            tracing::warn!("No injection root for {}", address);
            return Ok(file);
        };
        let allowed = self.notify(
            root,
            NotificationDetail::Insert {
                address: address.to_string(),
                file,
            },
        );
        if allowed {
            let weak = Arc::downgrade(self);
            self.frames.request(move |host| {
                let current = weak.upgrade().map(|engine| engine.cache.generation());
                if current != Some(generation) {
                    return;
                }
                if let Err(e) = host.prepend_child(root, file) {
                    tracing::warn!("Failed to insert loaded document: {}", e);
                }
            });
        }
        Ok(file)
    }

    /// Handles of loads started since the last call
    pub(crate) fn take_inflight(&self) -> Vec<JoinHandle<()>> {
        std::mem::take(&mut *self.inflight.lock())
    }

    pub(crate) fn abort_inflight(&self) {
        for handle in self.inflight.lock().drain(..) {
            handle.abort();
        }
    }
}

/// Keep the injected document out of layout and the accessibility tree
fn hide(doc: &mut DomArena, element: NodeId) -> dom::Result<()> {
    let style = match doc.get(element)?.attr("style").map(str::trim) {
        Some(existing) if !existing.is_empty() => {
            format!("{}; {}", existing.trim_end_matches(';'), HIDDEN_STYLE)
        }
        _ => HIDDEN_STYLE.to_string(),
    };
    doc.set_attribute(element, "aria-hidden", "true")?;
    doc.set_attribute(element, "style", style)?;
    Ok(())
}
