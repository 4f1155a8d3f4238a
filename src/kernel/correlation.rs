//! Cross-modal latency pairing.
//!
//! Two rules run over the store's snapshots:
//! - audio→mic: an `AudioPlaybackStart` arms a latch; the first `MicActivity`
//!   strictly after it records one latency and disarms the latch.
//! - gaze→mic: each `GazeNotification` looks for the first `MicActivity`
//!   strictly after it. A gaze event pairs at most once.
//!
//! The engine consumes each series incrementally through cursors, so calling
//! `evaluate` on successive snapshots never double counts.

use serde::Deserialize;
use tracing::debug;

use super::event::{Event, EventId, EventKind};
use super::latency::LatencyDifferences;
use super::store::StoreSnapshot;
use super::time::{seconds_between, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Latch {
    Armed { since: Timestamp },
    Disarmed,
}

/// When an unpaired gaze event is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GazePairing {
    /// One attempt when the event is first seen; retried only by `reevaluate`.
    #[default]
    Once,
    /// Retried on every evaluation until a later mic event shows up.
    UntilPaired,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GazeOutcome {
    Paired {
        gaze: EventId,
        latency: f64,
    },
    /// No mic activity after this gaze event yet.
    NoQualifyingMic {
        gaze: EventId,
    },
}

/// What one evaluation pass added.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorrelationReport {
    pub audio_to_mic: Vec<f64>,
    pub gaze: Vec<GazeOutcome>,
}

impl CorrelationReport {
    pub fn is_empty(&self) -> bool {
        self.audio_to_mic.is_empty() && self.gaze.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingGaze {
    id: EventId,
    at: Timestamp,
}

#[derive(Debug, Clone, Copy, Default)]
struct Cursors {
    audio: usize,
    mic: usize,
    gaze: usize,
}

#[derive(Debug)]
pub struct CorrelationEngine {
    policy: GazePairing,
    latencies: LatencyDifferences,
    audio_latch: Latch,
    cursors: Cursors,
    unpaired: Vec<PendingGaze>,
}

impl CorrelationEngine {
    pub fn new(policy: GazePairing) -> Self {
        Self {
            policy,
            latencies: LatencyDifferences::default(),
            audio_latch: Latch::Disarmed,
            cursors: Cursors::default(),
            unpaired: Vec::new(),
        }
    }

    /// Continues a loaded session: latencies are taken as-is and every event
    /// already in `snapshot` counts as consumed.
    pub fn resume(policy: GazePairing, latencies: LatencyDifferences, snapshot: &StoreSnapshot) -> Self {
        let mut engine = Self::new(policy);
        engine.latencies = latencies;
        engine.cursors = Cursors {
            audio: snapshot.events(EventKind::AudioPlaybackStart).len(),
            mic: snapshot.events(EventKind::MicActivity).len(),
            gaze: snapshot.events(EventKind::GazeNotification).len(),
        };
        engine
    }

    /// Derives every latency of `snapshot` from scratch.
    pub fn replay(policy: GazePairing, snapshot: &StoreSnapshot) -> LatencyDifferences {
        let mut engine = Self::new(policy);
        engine.evaluate(snapshot);
        engine.latencies
    }

    pub fn latencies(&self) -> &LatencyDifferences {
        &self.latencies
    }

    pub fn audio_latch(&self) -> Latch {
        self.audio_latch
    }

    pub fn policy(&self) -> GazePairing {
        self.policy
    }

    /// Gaze events that were evaluated but found no later mic activity.
    pub fn unpaired_gaze(&self) -> usize {
        self.unpaired.len()
    }

    /// Consumes the part of `snapshot` not seen by earlier passes.
    pub fn evaluate(&mut self, snapshot: &StoreSnapshot) -> CorrelationReport {
        let mut report = CorrelationReport::default();
        self.advance_audio(snapshot, &mut report);

        let mics = snapshot.events(EventKind::MicActivity);
        if self.policy == GazePairing::UntilPaired {
            self.retry_unpaired(mics, &mut report);
        }

        let gazes = snapshot.events(EventKind::GazeNotification);
        for gaze in gazes.iter().skip(self.cursors.gaze) {
            let outcome = self.try_pair(gaze.id, gaze.timestamp, mics);
            if let GazeOutcome::NoQualifyingMic { .. } = outcome {
                self.unpaired.push(PendingGaze {
                    id: gaze.id,
                    at: gaze.timestamp,
                });
            }
            report.gaze.push(outcome);
        }
        self.cursors.gaze = gazes.len();

        report
    }

    /// Explicit second chance for gaze events that found nothing earlier.
    /// Already paired events are never revisited.
    pub fn reevaluate(&mut self, snapshot: &StoreSnapshot) -> CorrelationReport {
        let mut report = CorrelationReport::default();
        self.retry_unpaired(snapshot.events(EventKind::MicActivity), &mut report);
        report
    }

    fn retry_unpaired(&mut self, mics: &[Event], report: &mut CorrelationReport) {
        let pending = std::mem::take(&mut self.unpaired);
        for gaze in pending {
            match self.try_pair(gaze.id, gaze.at, mics) {
                outcome @ GazeOutcome::Paired { .. } => report.gaze.push(outcome),
                GazeOutcome::NoQualifyingMic { .. } => self.unpaired.push(gaze),
            }
        }
    }

    fn try_pair(&mut self, gaze: EventId, at: Timestamp, mics: &[Event]) -> GazeOutcome {
        // Mic series is non-decreasing, so the first later event is a partition point.
        let idx = mics.partition_point(|m| m.timestamp <= at);
        match mics.get(idx) {
            Some(mic) => {
                let latency = seconds_between(at, mic.timestamp);
                debug!(?gaze, latency, "gaze→mic paired");
                self.latencies.gaze_to_mic.push(latency);
                GazeOutcome::Paired { gaze, latency }
            }
            None => {
                debug!(?gaze, "No qualifying mic activity yet");
                GazeOutcome::NoQualifyingMic { gaze }
            }
        }
    }

    fn advance_audio(&mut self, snapshot: &StoreSnapshot, report: &mut CorrelationReport) {
        let starts = snapshot
            .events(EventKind::AudioPlaybackStart)
            .get(self.cursors.audio..)
            .unwrap_or(&[]);
        let mics = snapshot
            .events(EventKind::MicActivity)
            .get(self.cursors.mic..)
            .unwrap_or(&[]);
        self.cursors.audio += starts.len();
        self.cursors.mic += mics.len();

        // Merge both suffixes by time. On a tie the mic event goes first: it
        // is not strictly after a start at the same instant.
        let (mut s, mut m) = (0, 0);
        while s < starts.len() || m < mics.len() {
            let take_start = match (starts.get(s), mics.get(m)) {
                (Some(start), Some(mic)) => start.timestamp < mic.timestamp,
                (Some(_), None) => true,
                _ => false,
            };
            if take_start {
                self.audio_latch = Latch::Armed {
                    since: starts[s].timestamp,
                };
                s += 1;
                continue;
            }
            let mic_at = mics[m].timestamp;
            m += 1;
            if let Latch::Armed { since } = self.audio_latch {
                if mic_at > since {
                    let latency = seconds_between(since, mic_at);
                    debug!(latency, "audio→mic paired");
                    self.latencies.audio_to_mic.push(latency);
                    report.audio_to_mic.push(latency);
                    self.audio_latch = Latch::Disarmed;
                }
            }
        }
    }
}

impl Default for CorrelationEngine {
    fn default() -> Self {
        Self::new(GazePairing::default())
    }
}
