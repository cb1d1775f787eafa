//! Event-driven reconciliation of indicator state with the remote graph.
//!
//! Notifications only record a pending wake and poke the worker. The worker
//! runs at most one cycle at a time; whatever arrives while a cycle is in
//! flight is folded into a single follow-up cycle that sees the latest graph.

use crate::{
    map_state, resolve_rooted, resolve_scene, EventAction, FetchError, GraphEvent, GraphSource,
    IndicatorSink, SceneGraph, SceneGraphCache, SceneItem, Source, Tally, TallyState,
};
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Idle,
    Refreshing,
    Applying,
}

impl fmt::Display for LoopPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoopPhase::Idle => "idle",
            LoopPhase::Refreshing => "refreshing",
            LoopPhase::Applying => "applying",
        })
    }
}

#[derive(Debug, Default)]
struct PendingWake {
    refresh: bool,
    switched: Option<(String, Vec<SceneItem>)>,
}

impl PendingWake {
    fn refresh() -> Self {
        Self {
            refresh: true,
            switched: None,
        }
    }

    fn is_empty(&self) -> bool {
        !self.refresh && self.switched.is_none()
    }
}

#[derive(Debug, Default)]
struct Guarded {
    cache: SceneGraphCache,
    pending: PendingWake,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<Guarded>,
    wake: Notify,
}

/// Cheap handle for the notification side of the loop.
#[derive(Clone, Debug)]
pub struct ReconcileHandle {
    shared: Arc<Shared>,
}

impl ReconcileHandle {
    /// Record `notification` as pending and wake the worker.
    pub async fn dispatch(&self, notification: GraphEvent) {
        debug!(event = "graph_event", kind = notification.name());
        let mut state = self.shared.state.lock().await;
        match notification.action() {
            EventAction::Refresh => state.pending.refresh = true,
            EventAction::ApplyScene => state.pending.switched = notification.into_switched(),
        }
        drop(state);
        self.shared.wake.notify_one();
    }

    /// Ask for a full re-fetch, e.g. after the connection came back.
    pub async fn request_refresh(&self) {
        self.shared.state.lock().await.pending.refresh = true;
        self.shared.wake.notify_one();
    }

    /// Run `f` against the cache under the loop's lock.
    pub async fn with_cache<R>(&self, f: impl FnOnce(&SceneGraphCache) -> R) -> R {
        let state = self.shared.state.lock().await;
        f(&state.cache)
    }
}

/// Owns the cache, the graph source and the indicator sink.
pub struct ReconcileLoop<S, K> {
    source: S,
    sink: K,
    tallies: Vec<Tally>,
    include_invisible: bool,
    shared: Arc<Shared>,
    phase: LoopPhase,
    last_applied: Option<TallyState>,
    cycles: u64,
    failed_fetches: u64,
}

impl<S: GraphSource, K: IndicatorSink> ReconcileLoop<S, K> {
    pub fn new(source: S, sink: K, tallies: Vec<Tally>, include_invisible: bool) -> Self {
        Self {
            source,
            sink,
            tallies,
            include_invisible,
            shared: Arc::new(Shared::default()),
            phase: LoopPhase::Idle,
            last_applied: None,
            cycles: 0,
            failed_fetches: 0,
        }
    }

    pub fn handle(&self) -> ReconcileHandle {
        ReconcileHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    pub fn last_applied(&self) -> Option<&TallyState> {
        self.last_applied.as_ref()
    }

    /// Completed refresh-or-switch cycles that reached the sink.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn failed_fetches(&self) -> u64 {
        self.failed_fetches
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut K {
        &mut self.sink
    }

    pub fn tallies(&self) -> &[Tally] {
        &self.tallies
    }

    /// Refresh once, then reconcile on every wake until `shutdown` resolves.
    /// Returns the loop so the caller can inspect or reset the sink.
    ///
    /// A fetch still in flight at shutdown is dropped; cache and indicators
    /// keep whatever the last completed cycle left behind.
    pub async fn run<F>(mut self, shutdown: F) -> Self
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(event = "reconcile_start", tallies = self.tallies.len());
        let mut wake = PendingWake::refresh();
        'run: loop {
            let fetched = if wake.refresh {
                self.set_phase(LoopPhase::Refreshing);
                tokio::select! {
                    biased;
                    _ = &mut shutdown => {
                        info!(event = "graph_fetch_abandoned");
                        self.set_phase(LoopPhase::Idle);
                        break 'run;
                    }
                    result = self.source.fetch_graph() => Some(result),
                }
            } else {
                None
            };
            self.cycle(fetched, wake.switched).await;

            wake = loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown => break 'run,
                    _ = self.shared.wake.notified() => {}
                }
                let pending = std::mem::take(&mut self.shared.state.lock().await.pending);
                if !pending.is_empty() {
                    break pending;
                }
            };
        }
        info!(
            event = "reconcile_stop",
            cycles = self.cycles,
            failed_fetches = self.failed_fetches
        );
        self
    }

    /// Apply the outcome of one wake. A successful fetch wins over a carried
    /// scene switch; a failed one falls back to the switch, resolved against
    /// the last good graph.
    async fn cycle(
        &mut self,
        fetched: Option<Result<SceneGraph, FetchError>>,
        switched: Option<(String, Vec<SceneItem>)>,
    ) {
        let shared = self.shared.clone();
        let mut guarded = shared.state.lock().await;
        let graph = match fetched {
            Some(Ok(graph)) => Some(graph),
            Some(Err(err)) => {
                self.failed_fetches += 1;
                warn!(event = "graph_fetch_failed", error = %err);
                None
            }
            None => None,
        };
        let state = if let Some(graph) = graph {
            guarded.cache.replace(graph);
            self.set_phase(LoopPhase::Applying);
            let visible = self.resolve_active(&guarded.cache);
            map_state(&self.tallies, &visible)
        } else if let Some((scene, items)) = switched {
            info!(event = "scene_switched", scene = %scene);
            guarded.cache.set_active_scene(&scene);
            self.set_phase(LoopPhase::Applying);
            let visible = resolve_rooted(&scene, &items, &guarded.cache, self.include_invisible);
            map_state(&self.tallies, &visible)
        } else {
            self.set_phase(LoopPhase::Idle);
            return;
        };
        drop(guarded);

        self.sink.apply(&state);
        if self.last_applied.as_ref() != Some(&state) {
            info!(event = "tally_state", active = ?state.active_names());
        }
        self.last_applied = Some(state);
        self.cycles += 1;
        self.set_phase(LoopPhase::Idle);
    }

    fn resolve_active(&self, cache: &SceneGraphCache) -> BTreeSet<Source> {
        let Some(active) = cache.active_scene() else {
            return BTreeSet::new();
        };
        if cache.scene(active).is_none() {
            warn!(event = "active_scene_missing", scene = %active);
            return BTreeSet::new();
        }
        resolve_scene(active, cache, self.include_invisible)
    }

    fn set_phase(&mut self, phase: LoopPhase) {
        debug!(event = "reconcile_phase", from = %self.phase, to = %phase);
        self.phase = phase;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_wake_is_detected() {
        assert!(PendingWake::default().is_empty());
        assert!(!PendingWake::refresh().is_empty());
        let switched = PendingWake {
            refresh: false,
            switched: Some(("Main".to_string(), vec![])),
        };
        assert!(!switched.is_empty());
    }

    #[tokio::test]
    async fn dispatch_coalesces_into_one_pending_wake() {
        let shared = Arc::new(Shared::default());
        let handle = ReconcileHandle {
            shared: shared.clone(),
        };
        handle.dispatch(GraphEvent::SourceCreated).await;
        handle.dispatch(GraphEvent::SceneItemAdded).await;
        handle
            .dispatch(GraphEvent::SceneSwitched {
                scene: "First".to_string(),
                items: vec![],
            })
            .await;
        handle
            .dispatch(GraphEvent::SceneSwitched {
                scene: "Second".to_string(),
                items: vec![SceneItem::input("Cam1", true)],
            })
            .await;

        let pending = std::mem::take(&mut shared.state.lock().await.pending);
        assert!(pending.refresh);
        let (scene, items) = pending.switched.expect("switch recorded");
        assert_eq!(scene, "Second");
        assert_eq!(items.len(), 1);
        assert!(shared.state.lock().await.pending.is_empty());
    }
}
