//! Polyfill - the controller
//!
//! ```text
//! Idle ──run()──▶ Running ──observe()──▶ Observing
//!   ▲                                        │
//!   └──────────────── destroy() ◀────────────┘
//! ```
//!
//! Owns the engine, the observer subscriptions and the frame loop. Teardown
//! reverts every rewritten element first, then removes every injected file.

use std::sync::Arc;
use std::time::Duration;

use dom::NodeId;
use futures_util::future::join_all;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::attribute::ReferenceAttribute;
use crate::cache::{DocumentCache, FileState};
use crate::detect;
use crate::error::Result;
use crate::events::{EventBus, Notification, NotificationDetail, NotificationKind};
use crate::host::HostDocument;
use crate::loader::Loader;
use crate::observer::{MutationTrigger, SubscriptionSet, ViewportTrigger};
use crate::options::Options;
use crate::processor::{Engine, Outcome};

const SETTLE_PAUSE: Duration = Duration::from_millis(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Running,
    Observing,
    Destroyed,
}

pub struct Polyfill {
    engine: Arc<Engine>,
    state: Mutex<ControllerState>,
    subscriptions: Mutex<SubscriptionSet>,
    frame_task: Mutex<Option<JoinHandle<()>>>,
}

impl Polyfill {
    /// Build a resolver over `host`. Runs immediately when `options.run` is set.
    pub fn new(host: HostDocument, loader: Arc<dyn Loader>, options: Options) -> Result<Self> {
        options.validate()?;
        let run = options.run;
        let polyfill = Self {
            engine: Arc::new(Engine::new(host, loader, options)),
            state: Mutex::new(ControllerState::Idle),
            subscriptions: Mutex::new(SubscriptionSet::new()),
            frame_task: Mutex::new(None),
        };
        polyfill.start_frames();
        if run {
            polyfill.run();
        }
        Ok(polyfill)
    }

    /// Tick the frame queue on the runtime, if there is one
    fn start_frames(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("No runtime; frames apply on explicit flush");
            return;
        };
        let interval = self.engine.options.read().frame_interval();
        let engine = Arc::downgrade(&self.engine);
        let task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let Some(engine) = engine.upgrade() else {
                    break;
                };
                engine.frames.flush(&engine.host);
            }
        });
        if let Some(previous) = self.frame_task.lock().replace(task) {
            previous.abort();
        }
    }

    pub fn options(&self) -> Options {
        self.engine.options.read().clone()
    }

    /// Replace the options. Takes effect on the next scan; nothing re-runs.
    pub fn set(&self, options: Options) -> Result<()> {
        options.validate()?;
        let interval_changed =
            self.engine.options.read().frame_interval_ms != options.frame_interval_ms;
        *self.engine.options.write() = options;
        if interval_changed && self.frame_task.lock().is_some() {
            self.start_frames();
        }
        Ok(())
    }

    pub fn events(&self) -> &EventBus {
        &self.engine.events
    }

    /// Listen for `kind` under the configured namespace
    pub fn on<F>(&self, kind: NotificationKind, listener: F)
    where
        F: Fn(&mut Notification) + Send + Sync + 'static,
    {
        let name = kind.event_name(&self.engine.options.read().namespace);
        self.engine.events.on(name, listener);
    }

    /// Drop every listener for `kind` under the configured namespace
    pub fn off(&self, kind: NotificationKind) {
        let name = kind.event_name(&self.engine.options.read().namespace);
        self.engine.events.off(&name);
    }

    pub fn host(&self) -> &HostDocument {
        &self.engine.host
    }

    pub fn cache(&self) -> &DocumentCache {
        &self.engine.cache
    }

    pub fn state(&self) -> ControllerState {
        *self.state.lock()
    }

    /// Does the host's user agent need resolving?
    pub fn detect(&self) -> bool {
        let agents = self.engine.options.read().agents.clone();
        detect::detect(&agents, &self.engine.host.user_agent())
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Scan once, then observe if configured. Gated on [`detect`](Self::detect).
    pub fn run(&self) {
        let (gate, observe) = {
            let options = self.engine.options.read();
            (options.detect, options.observe)
        };
        if gate && !self.detect() {
            tracing::info!("User agent resolves external references natively; not running");
            return;
        }

        let previous = {
            let mut state = self.state.lock();
            let previous = *state;
            if matches!(previous, ControllerState::Idle | ControllerState::Destroyed) {
                *state = ControllerState::Running;
            }
            previous
        };
        if previous == ControllerState::Destroyed {
            // Finish the teardown before scanning the restored document
            let flushed = self.flush();
            tracing::debug!("Applied {} pending teardown change(s)", flushed);
        }
        tracing::info!("Running initial scan");
        self.engine.scan();

        if observe {
            self.observe();
        }
    }

    /// Subscribe to mutation and viewport notifications.
    ///
    /// Without a runtime there is nothing to deliver them; the controller keeps
    /// working on explicit scans only.
    pub fn observe(&self) {
        let mut subscriptions = self.subscriptions.lock();
        if !subscriptions.is_empty() {
            return;
        }

        let context = self.engine.context();
        let registered = subscriptions
            .register(Arc::new(MutationTrigger::new(context)), &self.engine)
            .and_then(|()| subscriptions.register(Arc::new(ViewportTrigger), &self.engine));
        if let Err(e) = registered {
            tracing::warn!("Observation unavailable: {}", e);
            subscriptions.cancel_all();
            return;
        }

        *self.state.lock() = ControllerState::Observing;
        tracing::info!("Observing {:?}", subscriptions.names());
    }

    pub fn unobserve(&self) {
        let mut subscriptions = self.subscriptions.lock();
        if subscriptions.is_empty() {
            return;
        }
        subscriptions.cancel_all();

        let mut state = self.state.lock();
        if *state == ControllerState::Observing {
            *state = ControllerState::Running;
        }
    }

    /// Revert every rewritten element, then remove every injected file.
    ///
    /// Loads still in flight finish but their results are discarded. Each
    /// revert and removal may be vetoed individually; vetoed items stay.
    ///
    /// File entries leave the cache immediately; the host changes wait for the
    /// next frame. Detached files keep their arena slots, since the host arena
    /// never frees nodes.
    pub fn destroy(&self) {
        self.unobserve();
        let engine = &self.engine;
        let generation = engine.cache.bump_generation();
        tracing::info!("Destroying (generation {})", generation);

        engine.cache.for_each_binding(|element, binding| {
            let allowed = self.notify(
                element,
                NotificationDetail::Revoke {
                    value: binding.original.clone(),
                },
            );
            if !allowed {
                return;
            }
            let forms = binding.forms.clone();
            let weak = Arc::downgrade(engine);
            engine.frames.request(move |doc| {
                if let Err(e) = ReferenceAttribute::restore(doc, element, &forms) {
                    tracing::warn!("Failed to revert element {}: {}", element, e);
                }
                if let Some(engine) = weak.upgrade() {
                    engine.cache.remove_binding(element);
                }
            });
        });

        engine.cache.for_each_file(|address, file_state| match file_state {
            FileState::Loaded(file) => {
                let allowed = self.notify(
                    file,
                    NotificationDetail::Remove {
                        address: address.to_string(),
                    },
                );
                if !allowed {
                    return;
                }
                // Forget the entry now so nothing scheduled from here on reuses it
                engine.cache.remove_file(address);
                let address = address.to_string();
                engine.frames.request(move |doc| {
                    if let Err(e) = doc.detach(file) {
                        tracing::warn!("Failed to remove {}: {}", address, e);
                    }
                });
            }
            FileState::Pending | FileState::Failed => {
                engine.cache.remove_file(address);
            }
        });
        engine.cache.clear_all_awaiting();

        *self.state.lock() = ControllerState::Destroyed;
    }

    fn notify(&self, target: NodeId, detail: NotificationDetail) -> bool {
        let namespace = self.engine.options.read().namespace.clone();
        self.engine
            .events
            .dispatch(Notification::new(&namespace, target, detail))
    }

    // ------------------------------------------------------------------
    // Driving
    // ------------------------------------------------------------------

    /// Re-scan every candidate now
    pub fn scan(&self) -> usize {
        self.engine.scan()
    }

    pub fn process(&self, element: NodeId) -> Result<Outcome> {
        self.engine.process(element)
    }

    /// Apply queued frame mutations now; returns how many ran
    pub fn flush(&self) -> usize {
        self.engine.frames.flush(&self.engine.host)
    }

    /// Wait for in-flight loads and flush frames until nothing is left to do
    pub async fn settle(&self) {
        let mut idle_rounds = 0;
        while idle_rounds < 2 {
            tokio::task::yield_now().await;
            let loads = self.engine.take_inflight();
            let loaded = loads.len();
            for outcome in join_all(loads).await {
                if let Err(e) = outcome {
                    if !e.is_cancelled() {
                        tracing::warn!("Load task failed: {}", e);
                    }
                }
            }
            let flushed = self.flush();

            if loaded == 0 && flushed == 0 {
                idle_rounds += 1;
                // Let woken observers run before declaring quiet
                tokio::time::sleep(SETTLE_PAUSE).await;
            } else {
                idle_rounds = 0;
            }
        }
    }

    /// Like [`settle`](Self::settle), bounded by `timeout`; returns `false` on timeout
    pub async fn settle_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.settle()).await.is_ok()
    }
}

impl Drop for Polyfill {
    fn drop(&mut self) {
        self.subscriptions.get_mut().cancel_all();
        if let Some(task) = self.frame_task.get_mut().take() {
            task.abort();
        }
        self.engine.abort_inflight();
    }
}

impl std::fmt::Debug for Polyfill {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Polyfill")
            .field("state", &self.state())
            .field("files", &self.engine.cache.file_count())
            .field("bindings", &self.engine.cache.binding_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::MemoryLoader;
    use url::Url;

    fn host() -> HostDocument {
        HostDocument::parse(
            r#"<html><body><svg><use href="a.svg#star"/></svg></body></html>"#,
            Url::parse("http://localhost/index.html").unwrap(),
        )
        .unwrap()
    }

    fn manual() -> Options {
        Options {
            run: false,
            detect: false,
            ..Options::default()
        }
    }

    #[test]
    fn test_detect_gate_blocks_run() {
        let loader = Arc::new(MemoryLoader::new());
        let options = Options {
            run: false,
            ..Options::default()
        };
        let polyfill = Polyfill::new(host(), loader.clone(), options).unwrap();
        polyfill.host().set_user_agent("Mozilla/5.0 Firefox/121.0");
        assert!(!polyfill.detect());

        polyfill.run();
        assert_eq!(polyfill.state(), ControllerState::Idle);
        assert_eq!(loader.total_fetches(), 0);
        assert_eq!(polyfill.cache().file_count(), 0);
    }

    #[test]
    fn test_load_without_runtime_fails_softly() {
        let polyfill = Polyfill::new(host(), Arc::new(MemoryLoader::new()), manual()).unwrap();
        polyfill.run();

        // No runtime: the load cannot start and observation degrades
        assert_eq!(polyfill.state(), ControllerState::Running);
        assert_eq!(
            polyfill.cache().file_state("http://localhost/a.svg"),
            Some(FileState::Failed)
        );
    }

    #[tokio::test]
    async fn test_observe_and_unobserve_transitions() {
        let polyfill = Polyfill::new(host(), Arc::new(MemoryLoader::new()), manual()).unwrap();
        assert_eq!(polyfill.state(), ControllerState::Idle);

        polyfill.run();
        assert_eq!(polyfill.state(), ControllerState::Observing);
        polyfill.observe();
        assert_eq!(polyfill.state(), ControllerState::Observing);

        polyfill.unobserve();
        assert_eq!(polyfill.state(), ControllerState::Running);

        polyfill.destroy();
        assert_eq!(polyfill.state(), ControllerState::Destroyed);
    }

    #[test]
    fn test_set_replaces_options_without_running() {
        let loader = Arc::new(MemoryLoader::new());
        let polyfill = Polyfill::new(host(), loader.clone(), manual()).unwrap();
        let options = Options {
            namespace: "sprites".to_string(),
            ..manual()
        };
        polyfill.set(options).unwrap();
        assert_eq!(polyfill.options().namespace, "sprites");
        assert_eq!(loader.total_fetches(), 0);

        let invalid = Options {
            namespace: String::new(),
            ..manual()
        };
        assert!(polyfill.set(invalid).is_err());
        assert_eq!(polyfill.options().namespace, "sprites");
    }
}
