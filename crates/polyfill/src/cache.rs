//! Document cache
//!
//! Owns the per-address load state and the per-element bindings. One entry per
//! address: created `Pending` at first sighting, moved to `Loaded` or `Failed`
//! exactly once, never reverted. Continuations registered while `Pending` run
//! once on completion, in registration order.
//!
//! All state sits behind one short, synchronous lock. Continuations are always
//! returned to the caller and run outside it.

use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;
use dom::NodeId;
use parking_lot::Mutex;

use crate::attribute::ReferenceAttribute;

/// Continuation invoked with the injected (or detached) document element
pub type Waiter = Box<dyn FnOnce(NodeId) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Pending,
    /// Document element of the loaded file, imported into the host
    Loaded(NodeId),
    Failed,
}

/// What a rewritten element pointed at before, and what it points at now
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementBinding {
    pub original: String,
    pub applied: String,
    /// Each reference form the element carried, with its own value
    pub forms: Vec<(ReferenceAttribute, String)>,
}

/// Result of asking for an address
pub enum Admission {
    /// First sighting: the caller must start the load
    Started,
    /// A load is in flight; the waiter was queued
    Queued,
    /// Already loaded; the caller runs the waiter
    Ready(NodeId, Waiter),
    /// Permanently failed; the waiter was dropped
    Failed,
}

impl std::fmt::Debug for Admission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Admission::Started => f.write_str("Started"),
            Admission::Queued => f.write_str("Queued"),
            Admission::Ready(node, _) => write!(f, "Ready({node})"),
            Admission::Failed => f.write_str("Failed"),
        }
    }
}

struct FileEntry {
    state: FileState,
    waiters: Vec<Waiter>,
}

#[derive(Default)]
struct CacheState {
    files: AHashMap<String, FileEntry>,
    /// Insertion order of `files`
    file_order: Vec<String>,
    bindings: AHashMap<NodeId, ElementBinding>,
    binding_order: Vec<NodeId>,
    /// (element, reference value) pairs waiting on a load, with the address
    awaiting: AHashMap<(NodeId, String), String>,
}

#[derive(Default)]
pub struct DocumentCache {
    state: Mutex<CacheState>,
    generation: AtomicU64,
}

impl DocumentCache {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Files
    // ------------------------------------------------------------------

    /// Single-flight admission for `address`
    pub fn ensure_loading(&self, address: &str, waiter: Waiter) -> Admission {
        let mut state = self.state.lock();
        if let Some(entry) = state.files.get_mut(address) {
            return match entry.state {
                FileState::Pending => {
                    entry.waiters.push(waiter);
                    Admission::Queued
                }
                FileState::Loaded(node) => Admission::Ready(node, waiter),
                FileState::Failed => Admission::Failed,
            };
        }

        state.files.insert(
            address.to_string(),
            FileEntry {
                state: FileState::Pending,
                waiters: vec![waiter],
            },
        );
        state.file_order.push(address.to_string());
        Admission::Started
    }

    pub fn contains_file(&self, address: &str) -> bool {
        self.state.lock().files.contains_key(address)
    }

    pub fn file_state(&self, address: &str) -> Option<FileState> {
        self.state.lock().files.get(address).map(|entry| entry.state)
    }

    /// `Pending → Loaded`; returns the queued waiters to run.
    ///
    /// Returns nothing if the entry is gone or already settled.
    pub fn complete(&self, address: &str, node: NodeId) -> Vec<Waiter> {
        let mut state = self.state.lock();
        match state.files.get_mut(address) {
            Some(entry) if entry.state == FileState::Pending => {
                entry.state = FileState::Loaded(node);
                std::mem::take(&mut entry.waiters)
            }
            _ => Vec::new(),
        }
    }

    /// `Pending → Failed`; queued waiters are dropped
    pub fn fail(&self, address: &str) {
        let mut state = self.state.lock();
        if let Some(entry) = state.files.get_mut(address) {
            if entry.state == FileState::Pending {
                entry.state = FileState::Failed;
                entry.waiters.clear();
            }
        }
        // Nobody waits on a failed address any more
        state.awaiting.retain(|_, awaited| awaited != address);
    }

    pub fn remove_file(&self, address: &str) -> Option<FileState> {
        let mut state = self.state.lock();
        let entry = state.files.remove(address)?;
        state.file_order.retain(|a| a != address);
        Some(entry.state)
    }

    /// Every file entry in insertion order
    pub fn files(&self) -> Vec<(String, FileState)> {
        let state = self.state.lock();
        state
            .file_order
            .iter()
            .filter_map(|a| state.files.get(a).map(|e| (a.clone(), e.state)))
            .collect()
    }

    /// Visit every file entry once, on a snapshot
    pub fn for_each_file(&self, mut f: impl FnMut(&str, FileState)) {
        for (address, file_state) in self.files() {
            f(&address, file_state);
        }
    }

    pub fn file_count(&self) -> usize {
        self.state.lock().files.len()
    }

    // ------------------------------------------------------------------
    // Bindings
    // ------------------------------------------------------------------

    /// Remember what `element` held before it was rewritten to `applied`.
    ///
    /// A rebinding keeps the first original so teardown restores the author's value.
    pub fn record_binding(&self, element: NodeId, binding: ElementBinding) {
        let mut state = self.state.lock();
        let CacheState {
            bindings,
            binding_order,
            ..
        } = &mut *state;
        match bindings.get_mut(&element) {
            Some(existing) if existing.applied == binding.original => {
                existing.applied = binding.applied
            }
            Some(existing) => *existing = binding,
            None => {
                bindings.insert(element, binding);
                binding_order.push(element);
            }
        }
    }

    pub fn binding(&self, element: NodeId) -> Option<ElementBinding> {
        self.state.lock().bindings.get(&element).cloned()
    }

    pub fn remove_binding(&self, element: NodeId) -> Option<ElementBinding> {
        let mut state = self.state.lock();
        let binding = state.bindings.remove(&element)?;
        state.binding_order.retain(|&id| id != element);
        Some(binding)
    }

    pub fn remove_bindings(&self, elements: &[NodeId]) -> usize {
        let mut state = self.state.lock();
        let before = state.bindings.len();
        for element in elements {
            state.bindings.remove(element);
        }
        let CacheState {
            bindings,
            binding_order,
            ..
        } = &mut *state;
        binding_order.retain(|id| bindings.contains_key(id));
        before - bindings.len()
    }

    /// Every binding in insertion order
    pub fn bindings(&self) -> Vec<(NodeId, ElementBinding)> {
        let state = self.state.lock();
        state
            .binding_order
            .iter()
            .filter_map(|id| state.bindings.get(id).map(|b| (*id, b.clone())))
            .collect()
    }

    /// Visit every binding once, on a snapshot
    pub fn for_each_binding(&self, mut f: impl FnMut(NodeId, &ElementBinding)) {
        for (element, binding) in self.bindings() {
            f(element, &binding);
        }
    }

    pub fn binding_count(&self) -> usize {
        self.state.lock().bindings.len()
    }

    // ------------------------------------------------------------------
    // Awaiting elements
    // ------------------------------------------------------------------

    /// Returns `false` if the pair was already waiting
    pub fn mark_awaiting(&self, element: NodeId, value: &str, address: &str) -> bool {
        self.state
            .lock()
            .awaiting
            .insert((element, value.to_string()), address.to_string())
            .is_none()
    }

    pub fn clear_awaiting(&self, element: NodeId, value: &str) {
        self.state
            .lock()
            .awaiting
            .remove(&(element, value.to_string()));
    }

    pub fn clear_all_awaiting(&self) {
        self.state.lock().awaiting.clear();
    }

    pub fn awaiting_count(&self) -> usize {
        self.state.lock().awaiting.len()
    }

    // ------------------------------------------------------------------
    // Lifetime
    // ------------------------------------------------------------------

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Invalidate every effect scheduled under the current generation
    pub fn bump_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        *state = CacheState::default();
    }

    pub fn is_empty(&self) -> bool {
        let state = self.state.lock();
        state.files.is_empty() && state.bindings.is_empty() && state.awaiting.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    const A: &str = "http://localhost/a.svg";

    fn counting(counter: &Arc<AtomicUsize>) -> Waiter {
        let counter = counter.clone();
        Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_single_flight() {
        let cache = DocumentCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        assert!(matches!(cache.ensure_loading(A, counting(&calls)), Admission::Started));
        assert!(matches!(cache.ensure_loading(A, counting(&calls)), Admission::Queued));
        assert_eq!(cache.file_state(A), Some(FileState::Pending));

        let waiters = cache.complete(A, 42);
        assert_eq!(waiters.len(), 2);
        for waiter in waiters {
            waiter(42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // Settles exactly once
        assert!(cache.complete(A, 43).is_empty());
        assert_eq!(cache.file_state(A), Some(FileState::Loaded(42)));

        match cache.ensure_loading(A, counting(&calls)) {
            Admission::Ready(node, waiter) => waiter(node),
            other => panic!("Expected Ready, got {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_failed_address_is_never_retried() {
        let cache = DocumentCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        cache.ensure_loading(A, counting(&calls));
        cache.mark_awaiting(7, "a.svg#star", A);
        cache.fail(A);

        assert_eq!(cache.file_state(A), Some(FileState::Failed));
        assert!(matches!(cache.ensure_loading(A, counting(&calls)), Admission::Failed));
        assert!(cache.complete(A, 1).is_empty());
        assert_eq!(cache.file_state(A), Some(FileState::Failed));
        assert_eq!(cache.awaiting_count(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    fn binding(original: &str, applied: &str) -> ElementBinding {
        ElementBinding {
            original: original.into(),
            applied: applied.into(),
            forms: vec![(ReferenceAttribute::Plain, original.into())],
        }
    }

    #[test]
    fn test_bindings_keep_first_original() {
        let cache = DocumentCache::new();
        cache.record_binding(3, binding("a.svg#star", "#a-star"));
        cache.record_binding(1, binding("b.svg#moon", "#b-moon"));
        cache.record_binding(3, binding("#a-star", "#a-star2"));

        assert_eq!(
            cache.binding(3),
            Some(ElementBinding {
                applied: "#a-star2".into(),
                ..binding("a.svg#star", "#a-star")
            })
        );
        let order: Vec<_> = cache.bindings().into_iter().map(|(id, _)| id).collect();
        assert_eq!(order, vec![3, 1]);

        assert_eq!(cache.remove_bindings(&[3, 99]), 1);
        assert!(cache.remove_binding(1).is_some());
        assert!(cache.remove_binding(1).is_none());
        assert_eq!(cache.binding_count(), 0);
    }

    #[test]
    fn test_awaiting_dedup_and_clear() {
        let cache = DocumentCache::new();
        assert!(cache.mark_awaiting(5, "a.svg#star", A));
        assert!(!cache.mark_awaiting(5, "a.svg#star", A));
        assert!(cache.mark_awaiting(5, "a.svg#moon", A));
        cache.clear_awaiting(5, "a.svg#star");
        assert_eq!(cache.awaiting_count(), 1);

        cache.ensure_loading(A, Box::new(|_| {}));
        cache.bump_generation();
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.generation(), 1);
    }

    #[test]
    fn test_files_in_insertion_order() {
        let cache = DocumentCache::new();
        for address in ["http://localhost/b.svg", A, "http://localhost/c.svg"] {
            cache.ensure_loading(address, Box::new(|_| {}));
        }
        cache.remove_file("http://localhost/c.svg");

        let mut seen = Vec::new();
        cache.for_each_file(|address, _| seen.push(address.to_string()));
        assert_eq!(seen, vec!["http://localhost/b.svg", A]);
    }
}
