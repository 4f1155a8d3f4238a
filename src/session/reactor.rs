use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use crate::kernel::correlation::{CorrelationEngine, CorrelationReport, GazeOutcome, GazePairing};
use crate::kernel::event::{Event, EventKind};
use crate::kernel::latency::LatencyDifferences;
use crate::kernel::store::{EventStore, StoreSnapshot};
use crate::kernel::timeline::{Projection, TimelineView};
use crate::session::persist::SessionSnapshot;

/// What one cadence step produced.
#[derive(Debug, Default)]
pub struct TickReport {
    /// Events appended since the previous step, in time order.
    pub fresh: Vec<Event>,
    pub correlation: CorrelationReport,
    /// Present only when the store changed since the previous step.
    pub projection: Option<Projection>,
}

/// The consumer side of a session: pulls snapshots from the store on a
/// fixed cadence and derives latencies and the visible window. Never
/// written to by detectors.
pub struct SessionReactor {
    store: Arc<EventStore>,
    engine: CorrelationEngine,
    view: TimelineView,
    changes: watch::Receiver<u64>,
    last: StoreSnapshot,
}

impl SessionReactor {
    pub fn new(store: Arc<EventStore>, policy: GazePairing, view: TimelineView) -> Self {
        let changes = store.subscribe();
        Self {
            store,
            engine: CorrelationEngine::new(policy),
            view,
            changes,
            last: StoreSnapshot::default(),
        }
    }

    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    pub fn latencies(&self) -> &LatencyDifferences {
        self.engine.latencies()
    }

    pub fn engine(&self) -> &CorrelationEngine {
        &self.engine
    }

    pub fn view_mut(&mut self) -> &mut TimelineView {
        &mut self.view
    }

    /// Last snapshot taken by `tick_step`.
    pub fn snapshot(&self) -> &StoreSnapshot {
        &self.last
    }

    /// Pure pull step: snapshot, correlate the new suffix, re-project.
    pub fn tick_step(&mut self) -> TickReport {
        let changed = self.changes.has_changed().unwrap_or(false);
        if !changed {
            return TickReport::default();
        }
        self.changes.borrow_and_update();

        let previous = std::mem::replace(&mut self.last, self.store.snapshot());
        let mut fresh: Vec<Event> = EventKind::ALL
            .iter()
            .flat_map(|&kind| {
                let seen = previous.events(kind).len();
                self.last.events(kind).get(seen..).unwrap_or(&[]).iter().cloned()
            })
            .collect();
        fresh.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));

        let correlation = self.engine.evaluate(&self.last);
        for outcome in &correlation.gaze {
            if let GazeOutcome::Paired { latency, .. } = outcome {
                info!("Time between text gaze and first mic activity after: {:.2} seconds", latency);
            } else {
                info!("No microphone activity detected after the last text gaze.");
            }
        }
        for latency in &correlation.audio_to_mic {
            info!("Time since audio started: {:.2} seconds", latency);
        }

        TickReport {
            fresh,
            correlation,
            projection: Some(self.view.project(&self.last)),
        }
    }

    /// Re-projects the current window without touching the store.
    pub fn project(&self) -> Projection {
        self.view.project(&self.last)
    }

    pub fn scroll(&mut self, offset_secs: f64) -> Projection {
        self.view.scroll(offset_secs, &self.last);
        self.project()
    }

    pub fn tail(&mut self, span_secs: f64) -> Projection {
        self.view.tail(span_secs, &self.last);
        self.project()
    }

    /// Explicit retry of gaze events that had no later mic activity. Uses its
    /// own snapshot: `last` belongs to the cadence step.
    pub fn reevaluate(&mut self) -> CorrelationReport {
        let snapshot = self.store.snapshot();
        self.engine.reevaluate(&snapshot)
    }

    /// Swaps in a persisted session. Replaces, never merges.
    pub fn restore(&mut self, saved: &SessionSnapshot) {
        let snapshot = saved.store_snapshot();
        self.store.replace(snapshot.clone());
        self.engine = CorrelationEngine::resume(self.engine.policy(), saved.latencies(), &snapshot);
        self.last = self.store.snapshot();
        self.changes.borrow_and_update();
        self.view.fit();
    }
}
