//! Cached filter answers for the current selection.
//!
//! Menu-style enablement asks the same "does the selection contain anything
//! matching X" question for many filters in a row. [`FilterManager`] keeps
//! one flat and one recursive answer per filter, recomputes every known
//! filter in a single walk after an invalidation, and is invalidated by
//! [`ResourceStatesChanged`] events.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::presence::{check_for_resources_presence, PresenceDepth, ResourceProvider};
use super::{FilterId, StateFilter};
use crate::monitor::{NullMonitor, ProgressMonitor};

/// Notification that the state of some working-copy items changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceStatesChanged {
    pub paths: Vec<PathBuf>,
}

impl ResourceStatesChanged {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }
}

/// Counters exposed for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    /// Full recomputations after an invalidation.
    pub recomputations: u64,
    /// Answers served from the cache.
    pub hits: u64,
    /// Answers computed for a filter the cache did not know yet.
    pub misses: u64,
    /// Invalidations received.
    pub invalidations: u64,
}

#[derive(Default)]
struct CacheState {
    dirty: bool,
    generation: u64,
    selection: Vec<PathBuf>,
    flat: HashMap<FilterId, Option<bool>>,
    recursive: HashMap<FilterId, Option<bool>>,
    filters: HashMap<FilterId, StateFilter>,
}

/// Per-selection cache of filter presence answers.
pub struct FilterManager<P: ResourceProvider + ?Sized> {
    provider: Arc<P>,
    state: Mutex<CacheState>,
    precise: AtomicBool,
    recomputations: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

impl<P: ResourceProvider + ?Sized> FilterManager<P> {
    /// `precise_enablements` off makes every recursive answer `true`
    /// without scanning.
    pub fn new(provider: Arc<P>, precise_enablements: bool) -> Self {
        Self {
            provider,
            state: Mutex::new(CacheState::default()),
            precise: AtomicBool::new(precise_enablements),
            recomputations: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    pub fn precise_enablements(&self) -> bool {
        self.precise.load(Ordering::SeqCst)
    }

    /// Change the precision preference; a change invalidates the cache.
    pub fn set_precise_enablements(&self, precise: bool) {
        if self.precise.swap(precise, Ordering::SeqCst) != precise {
            debug!(precise, "precise enablements changed");
            self.clear();
        }
    }

    /// Drop all cached answers; the next query recomputes them.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.dirty = true;
        state.generation += 1;
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn resources_state_changed(&self, event: &ResourceStatesChanged) {
        debug!(changed = event.paths.len(), "resource states changed; invalidating filter cache");
        self.clear();
    }

    pub fn stats(&self) -> FilterStats {
        FilterStats {
            recomputations: self.recomputations.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }

    /// Whether any item of `selection` itself is accepted by `filter`.
    pub fn check_for_resources_presence(&self, selection: &[PathBuf], filter: &StateFilter) -> bool {
        self.query(selection, filter, false)
    }

    /// Whether any item at or below `selection` is accepted by `filter`.
    pub fn check_for_resources_presence_recursive(&self, selection: &[PathBuf], filter: &StateFilter) -> bool {
        self.query(selection, filter, true)
    }

    fn query(&self, selection: &[PathBuf], filter: &StateFilter, recursive: bool) -> bool {
        let precise = self.precise_enablements();
        if let Some((generation, flat, deep)) = self.take_dirty(selection, filter) {
            self.recompute(selection, generation, flat, deep, precise);
        }

        let generation = {
            let state = self.lock();
            let map = if recursive { &state.recursive } else { &state.flat };
            if let Some(Some(answer)) = map.get(&filter.id()) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return *answer;
            }
            state.generation
        };

        self.misses.fetch_add(1, Ordering::Relaxed);
        let answer = if recursive && !precise {
            true
        } else {
            let depth = if recursive { PresenceDepth::Infinity } else { PresenceDepth::Empty };
            let mut probe = filter.clone();
            check_for_resources_presence(self.provider.as_ref(), selection, &mut probe, depth, &NullMonitor)
        };

        let mut state = self.lock();
        if state.generation == generation && !state.dirty {
            let map = if recursive { &mut state.recursive } else { &mut state.flat };
            map.insert(filter.id(), Some(answer));
        }
        answer
    }

    /// Register `filter`, note a selection change, and claim the pending
    /// recomputation when the cache is dirty.
    #[allow(clippy::type_complexity)]
    fn take_dirty(
        &self,
        selection: &[PathBuf],
        filter: &StateFilter,
    ) -> Option<(u64, Vec<StateFilter>, Vec<StateFilter>)> {
        let mut state = self.lock();
        if state.selection.as_slice() != selection {
            state.selection = selection.to_vec();
            state.dirty = true;
            state.generation += 1;
        }
        state.filters.entry(filter.id()).or_insert_with(|| filter.clone());
        if !state.dirty {
            return None;
        }
        state.dirty = false;
        for value in state.flat.values_mut() {
            *value = None;
        }
        for value in state.recursive.values_mut() {
            *value = None;
        }
        let flat = state.flat.keys().filter_map(|id| state.filters.get(id).cloned()).collect();
        let deep = state.recursive.keys().filter_map(|id| state.filters.get(id).cloned()).collect();
        Some((state.generation, flat, deep))
    }

    fn recompute(
        &self,
        selection: &[PathBuf],
        generation: u64,
        flat: Vec<StateFilter>,
        deep: Vec<StateFilter>,
        precise: bool,
    ) {
        self.recomputations.fetch_add(1, Ordering::Relaxed);
        let flat_answers = probe_all(self.provider.as_ref(), selection, &flat, PresenceDepth::Empty, &NullMonitor);
        let deep_answers = if precise {
            probe_all(self.provider.as_ref(), selection, &deep, PresenceDepth::Infinity, &NullMonitor)
        } else {
            vec![true; deep.len()]
        };
        info!(
            selection = selection.len(),
            flat = flat.len(),
            recursive = deep.len(),
            "recomputed filter cache"
        );

        let mut state = self.lock();
        if state.generation != generation {
            debug!("filter cache invalidated during recomputation; discarding results");
            return;
        }
        for (filter, answer) in flat.iter().zip(flat_answers) {
            state.flat.insert(filter.id(), Some(answer));
        }
        for (filter, answer) in deep.iter().zip(deep_answers) {
            state.recursive.insert(filter.id(), Some(answer));
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("filter cache mutex poisoned; recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl<P: ResourceProvider + Send + Sync + ?Sized + 'static> FilterManager<P> {
    /// Clear the cache on every received event. The task ends once all
    /// senders are dropped.
    pub fn spawn_invalidation_listener(
        self: &Arc<Self>,
        mut events: broadcast::Receiver<ResourceStatesChanged>,
    ) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => manager.resources_state_changed(&event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "invalidation listener lagged");
                        manager.clear();
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("invalidation listener stopped");
        })
    }
}

/// Evaluate several filters in one walk. Each filter keeps its own
/// recursion gate, so every answer equals a separate presence check.
fn probe_all<P: ResourceProvider + ?Sized>(
    provider: &P,
    roots: &[PathBuf],
    filters: &[StateFilter],
    depth: PresenceDepth,
    monitor: &dyn ProgressMonitor,
) -> Vec<bool> {
    let mut answers = vec![false; filters.len()];
    let active: Vec<usize> = (0..filters.len()).collect();
    let roots: Vec<&Path> = roots.iter().map(PathBuf::as_path).collect();
    probe_level(provider, &roots, filters, &active, depth, monitor, &mut answers);
    answers
}

fn probe_level<P: ResourceProvider + ?Sized>(
    provider: &P,
    paths: &[&Path],
    filters: &[StateFilter],
    active: &[usize],
    depth: PresenceDepth,
    monitor: &dyn ProgressMonitor,
    answers: &mut [bool],
) {
    for path in paths {
        if monitor.is_cancelled() {
            return;
        }
        if !provider.is_supervised(path) {
            continue;
        }
        let local = provider.local_resource(path);
        for &idx in active {
            if !answers[idx] && filters[idx].accept(&local) {
                answers[idx] = true;
            }
        }
        if depth == PresenceDepth::Empty || !local.kind.is_container() {
            continue;
        }
        let descend: Vec<usize> = active
            .iter()
            .copied()
            .filter(|&idx| !answers[idx] && filters[idx].allows_recursion(&local))
            .collect();
        if descend.is_empty() {
            continue;
        }
        let members = provider.members(path);
        let members: Vec<&Path> = members.iter().map(PathBuf::as_path).collect();
        let next = if depth == PresenceDepth::Immediates { PresenceDepth::Empty } else { depth };
        probe_level(provider, &members, filters, &descend, next, monitor, answers);
    }
}
