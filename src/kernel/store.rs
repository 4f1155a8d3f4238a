use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

use super::event::{Event, EventId, EventKind};
use super::time::Timestamp;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store is closed; rejected {kind} append")]
    InvalidState { kind: EventKind },
}

#[derive(Debug, Default)]
struct Ledger {
    series: [Vec<Event>; 4],
    next_id: u64,
    closed: bool,
}

/// Append-only, per-kind ordered ledger shared by every detector.
///
/// A single mutex guards all four series. Critical sections are one push or
/// one clone, so `append` and `snapshot` return promptly even under
/// concurrent writers.
#[derive(Debug)]
pub struct EventStore {
    ledger: Mutex<Ledger>,
    version: watch::Sender<u64>,
}

/// Point-in-time copy of the ledger. Later appends never show up here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreSnapshot {
    series: [Vec<Event>; 4],
}

impl EventStore {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            ledger: Mutex::new(Ledger::default()),
            version,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends one event. A timestamp older than the newest entry of the same
    /// kind is clamped forward so each series stays non-decreasing.
    pub fn append(
        &self,
        kind: EventKind,
        timestamp: Timestamp,
        payload: Option<String>,
    ) -> Result<EventId, StoreError> {
        let id = {
            let mut ledger = self.lock();
            if ledger.closed {
                return Err(StoreError::InvalidState { kind });
            }
            let series = &ledger.series[kind.index()];
            let timestamp = match series.last() {
                Some(last) if last.timestamp > timestamp => {
                    debug!(%kind, ?timestamp, last = ?last.timestamp, "Clamping out-of-order append");
                    last.timestamp
                }
                _ => timestamp,
            };
            ledger.next_id += 1;
            let id = EventId(ledger.next_id);
            ledger.series[kind.index()].push(Event::new(id, kind, timestamp, payload));
            id
        };
        self.version.send_modify(|v| *v += 1);
        Ok(id)
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let ledger = self.lock();
        StoreSnapshot {
            series: ledger.series.clone(),
        }
    }

    /// Rejects further appends until the next `reset`.
    pub fn close(&self) {
        self.lock().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Clears every series and reopens the store for a fresh session.
    pub fn reset(&self) {
        {
            let mut ledger = self.lock();
            *ledger = Ledger::default();
        }
        self.version.send_modify(|v| *v += 1);
    }

    /// Replaces the whole ledger in one critical section. Ids are reassigned
    /// in kind order; the store is left open.
    pub fn replace(&self, snapshot: StoreSnapshot) {
        {
            let mut ledger = self.lock();
            *ledger = Ledger::default();
            for kind in EventKind::ALL {
                for event in &snapshot.series[kind.index()] {
                    ledger.next_id += 1;
                    let id = EventId(ledger.next_id);
                    ledger.series[kind.index()].push(Event::new(
                        id,
                        kind,
                        event.timestamp,
                        event.payload.clone(),
                    ));
                }
            }
        }
        self.version.send_modify(|v| *v += 1);
    }

    pub fn len(&self) -> usize {
        self.lock().series.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bumped after every mutation. UI layers watch this instead of being
    /// called by the store.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreSnapshot {
    /// Builds a snapshot from bare timestamps, e.g. a persisted session.
    /// Ids are assigned sequentially in kind order.
    pub fn from_times(times: [Vec<Timestamp>; 4]) -> Self {
        let mut next = 0u64;
        let mut series: [Vec<Event>; 4] = Default::default();
        for kind in EventKind::ALL {
            series[kind.index()] = times[kind.index()]
                .iter()
                .map(|&ts| {
                    next += 1;
                    Event::new(EventId(next), kind, ts, None)
                })
                .collect();
        }
        Self { series }
    }

    pub fn events(&self, kind: EventKind) -> &[Event] {
        &self.series[kind.index()]
    }

    pub fn times(&self, kind: EventKind) -> Vec<Timestamp> {
        self.events(kind).iter().map(|e| e.timestamp).collect()
    }

    pub fn len(&self) -> usize {
        self.series.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Earliest and latest timestamp across all kinds.
    pub fn extent(&self) -> Option<(Timestamp, Timestamp)> {
        let mut bounds: Option<(Timestamp, Timestamp)> = None;
        for series in &self.series {
            if let (Some(first), Some(last)) = (series.first(), series.last()) {
                bounds = Some(match bounds {
                    Some((lo, hi)) => (lo.min(first.timestamp), hi.max(last.timestamp)),
                    None => (first.timestamp, last.timestamp),
                });
            }
        }
        bounds
    }

    /// All events merged by timestamp; ties keep kind order then id order.
    pub fn merged(&self) -> Vec<&Event> {
        let mut all: Vec<&Event> = self.series.iter().flatten().collect();
        all.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then(a.kind.index().cmp(&b.kind.index()))
                .then(a.id.cmp(&b.id))
        });
        all
    }
}
