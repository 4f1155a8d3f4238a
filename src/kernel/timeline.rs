use super::event::{Event, EventKind};
use super::store::StoreSnapshot;
use super::time::{now, offset, seconds_between, Timestamp};

/// A run of two or more same-kind events, each within `cluster_gap` of the
/// previous one.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub start: Timestamp,
    pub end: Timestamp,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedEvent {
    pub event: Event,
    /// Index into the owning lane's `clusters`.
    pub cluster: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lane {
    pub kind: EventKind,
    pub events: Vec<ProjectedEvent>,
    pub clusters: Vec<Cluster>,
}

/// Renderable slice of the ledger. Holds copies; the store is untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub from: Timestamp,
    pub to: Timestamp,
    pub lanes: Vec<Lane>,
}

impl Projection {
    pub fn lane(&self, kind: EventKind) -> &Lane {
        // Lanes are built in `EventKind::ALL` order.
        &self.lanes[kind.index()]
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.iter().all(|l| l.events.is_empty())
    }

    /// Transcript lines in time order. A cluster note follows the event
    /// that opens each cluster.
    pub fn transcript(&self) -> Vec<String> {
        let mut rows: Vec<(&Lane, usize)> = self
            .lanes
            .iter()
            .flat_map(|lane| (0..lane.events.len()).map(move |i| (lane, i)))
            .collect();
        rows.sort_by(|(la, ia), (lb, ib)| {
            let (a, b) = (&la.events[*ia].event, &lb.events[*ib].event);
            a.timestamp
                .cmp(&b.timestamp)
                .then(a.kind.index().cmp(&b.kind.index()))
                .then(a.id.cmp(&b.id))
        });

        let mut lines = Vec::with_capacity(rows.len());
        for (lane, i) in rows {
            let projected = &lane.events[i];
            let event = &projected.event;
            lines.push(event.line());

            let opens_cluster = i == 0 || lane.events[i - 1].cluster != projected.cluster;
            if let (true, Some(cluster)) = (
                opens_cluster,
                projected.cluster.and_then(|c| lane.clusters.get(c)),
            ) {
                lines.push(format!(
                    "    burst: {} {} events over {:.1}s",
                    cluster.count,
                    event.kind,
                    seconds_between(cluster.start, cluster.end)
                ));
            }
        }
        lines
    }
}

/// Windowed, scrollable view over a session. `None` bounds follow the full
/// data extent.
#[derive(Debug, Clone)]
pub struct TimelineView {
    range: Option<(Timestamp, Timestamp)>,
    cluster_gap: f64,
}

impl TimelineView {
    pub fn new(cluster_gap_secs: f64) -> Self {
        Self {
            range: None,
            cluster_gap: cluster_gap_secs.max(0.0),
        }
    }

    pub fn cluster_gap(&self) -> f64 {
        self.cluster_gap
    }

    /// Pins the view to `[from, to]`. An inverted or empty range falls back
    /// to the full extent.
    pub fn set_range(&mut self, from: Timestamp, to: Timestamp) {
        self.range = if from < to { Some((from, to)) } else { None };
    }

    pub fn fit(&mut self) {
        self.range = None;
    }

    /// Current bounds for `snapshot`.
    pub fn bounds(&self, snapshot: &StoreSnapshot) -> (Timestamp, Timestamp) {
        match self.range {
            Some(range) => range,
            None => full_extent(snapshot),
        }
    }

    pub fn project(&self, snapshot: &StoreSnapshot) -> Projection {
        if snapshot.is_empty() {
            let start = now();
            return window(snapshot, start, widen(start), self.cluster_gap);
        }
        let (from, to) = self.bounds(snapshot);
        window(snapshot, from, to, self.cluster_gap)
    }

    /// Shifts the window by `offset_secs`, clamped to the data extent. If the
    /// shifted window no longer overlaps the data, the view resets to the
    /// full extent.
    pub fn scroll(&mut self, offset_secs: f64, snapshot: &StoreSnapshot) {
        let (from, to) = self.bounds(snapshot);
        let (lo, hi) = full_extent(snapshot);
        let shifted = offset(from, offset_secs).zip(offset(to, offset_secs));
        self.range = match shifted {
            Some((f, t)) => {
                let (f, t) = (f.max(lo), t.min(hi));
                if f < t {
                    Some((f, t))
                } else {
                    None
                }
            }
            None => None,
        };
    }

    /// Scales the window around its centre. `factor < 1` zooms in.
    pub fn zoom(&mut self, factor: f64, snapshot: &StoreSnapshot) {
        if !(factor.is_finite() && factor > 0.0) {
            return;
        }
        let (from, to) = self.bounds(snapshot);
        let half = seconds_between(from, to) / 2.0;
        let scaled = half * factor;
        self.range = offset(from, half)
            .and_then(|centre| offset(centre, -scaled).zip(offset(centre, scaled)))
            .filter(|(f, t)| f < t);
    }

    /// Shows the last `span_secs` of data.
    pub fn tail(&mut self, span_secs: f64, snapshot: &StoreSnapshot) {
        let (_, hi) = full_extent(snapshot);
        self.range = offset(hi, -span_secs.abs())
            .filter(|from| *from < hi)
            .map(|from| (from, hi));
    }
}

impl Default for TimelineView {
    fn default() -> Self {
        Self::new(3.0)
    }
}

/// Per-kind events in `[from, to]` with cluster annotations.
pub fn window(snapshot: &StoreSnapshot, from: Timestamp, to: Timestamp, cluster_gap: f64) -> Projection {
    let lanes = EventKind::ALL
        .iter()
        .map(|&kind| {
            let events = snapshot.events(kind);
            let lo = events.partition_point(|e| e.timestamp < from);
            let hi = events.partition_point(|e| e.timestamp <= to);
            build_lane(kind, events.get(lo..hi).unwrap_or(&[]), cluster_gap)
        })
        .collect();
    Projection { from, to, lanes }
}

fn build_lane(kind: EventKind, events: &[Event], cluster_gap: f64) -> Lane {
    let mut projected: Vec<ProjectedEvent> = events
        .iter()
        .map(|e| ProjectedEvent {
            event: e.clone(),
            cluster: None,
        })
        .collect();
    let mut clusters = Vec::new();

    let mut run_start = 0;
    for i in 1..=events.len() {
        let continues = i < events.len()
            && seconds_between(events[i - 1].timestamp, events[i].timestamp) <= cluster_gap;
        if continues {
            continue;
        }
        if i - run_start >= 2 {
            let idx = clusters.len();
            clusters.push(Cluster {
                start: events[run_start].timestamp,
                end: events[i - 1].timestamp,
                count: i - run_start,
            });
            for p in &mut projected[run_start..i] {
                p.cluster = Some(idx);
            }
        }
        run_start = i;
    }

    Lane {
        kind,
        events: projected,
        clusters,
    }
}

fn full_extent(snapshot: &StoreSnapshot) -> (Timestamp, Timestamp) {
    match snapshot.extent() {
        Some((lo, hi)) if lo < hi => (lo, hi),
        Some((lo, _)) => (lo, widen(lo)),
        None => {
            let start = now();
            (start, widen(start))
        }
    }
}

fn widen(from: Timestamp) -> Timestamp {
    offset(from, 1.0).unwrap_or(from)
}
