use std::path::Path;
use std::sync::Arc;

use crate::kernel::correlation::GazePairing;
use crate::kernel::event::EventKind;
use crate::kernel::latency::{average_message, LatencyDifferences, LatencySeries, LatencySummary};
use crate::kernel::store::EventStore;
use crate::kernel::timeline::TimelineView;
use crate::session::persist::{self, PersistError};
use crate::session::reactor::SessionReactor;

/// Read-only replay of a saved session.
pub struct ReviewSession {
    reactor: SessionReactor,
}

impl ReviewSession {
    pub fn new(policy: GazePairing, cluster_gap_secs: f64) -> Self {
        Self {
            reactor: SessionReactor::new(
                Arc::new(EventStore::new()),
                policy,
                TimelineView::new(cluster_gap_secs),
            ),
        }
    }

    /// Loads `path`, replacing whatever was shown before. On error the
    /// previous session stays intact.
    pub fn open(&mut self, path: &Path) -> Result<(), PersistError> {
        let saved = persist::load(path)?;
        self.reactor.restore(&saved);
        Ok(())
    }

    pub fn reactor(&self) -> &SessionReactor {
        &self.reactor
    }

    pub fn reactor_mut(&mut self) -> &mut SessionReactor {
        &mut self.reactor
    }

    pub fn latencies(&self) -> &LatencyDifferences {
        self.reactor.latencies()
    }

    /// Counts, latency summaries and averages, one line each.
    pub fn summary(&self) -> Vec<String> {
        let snapshot = self.reactor.snapshot();
        let mut lines: Vec<String> = EventKind::ALL
            .iter()
            .map(|&kind| format!("{:<12} {}", kind.to_string(), snapshot.events(kind).len()))
            .collect();

        let latencies = self.latencies();
        for (name, series) in [
            ("audio→mic", LatencySeries::AudioToMic),
            ("gaze→mic", LatencySeries::GazeToMic),
        ] {
            match LatencySummary::from_series(series.select(latencies)) {
                Some(summary) => lines.push(format!("{name:<12} {summary}")),
                None => lines.push(format!("{name:<12} no data")),
            }
            lines.push(average_message(series, latencies));
        }
        lines
    }

    pub fn transcript(&self) -> Vec<String> {
        self.reactor.project().transcript()
    }
}
