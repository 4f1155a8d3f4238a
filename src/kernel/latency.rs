use serde::{Deserialize, Serialize};
use std::fmt;

/// Cross-modal latency series, in seconds. Append-only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyDifferences {
    pub audio_to_mic: Vec<f64>,
    pub gaze_to_mic: Vec<f64>,
}

impl LatencyDifferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.audio_to_mic.is_empty() && self.gaze_to_mic.is_empty()
    }
}

/// Mean of a latency series. `NoData` is never reported as zero seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LatencyAverage {
    Seconds(f64),
    NoData,
}

impl LatencyAverage {
    pub fn seconds(self) -> Option<f64> {
        match self {
            LatencyAverage::Seconds(s) => Some(s),
            LatencyAverage::NoData => None,
        }
    }
}

pub fn average_latency(series: &[f64]) -> LatencyAverage {
    if series.is_empty() {
        return LatencyAverage::NoData;
    }
    LatencyAverage::Seconds(series.iter().sum::<f64>() / series.len() as f64)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencySummary {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

impl LatencySummary {
    pub fn from_series(series: &[f64]) -> Option<Self> {
        let mean = average_latency(series).seconds()?;
        let min = series.iter().copied().fold(f64::INFINITY, f64::min);
        let max = series.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some(Self {
            count: series.len(),
            mean,
            min,
            max,
        })
    }
}

impl fmt::Display for LatencySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "n={} mean={:.2}s min={:.2}s max={:.2}s",
            self.count, self.mean, self.min, self.max
        )
    }
}

/// Which latency series a report line is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencySeries {
    AudioToMic,
    GazeToMic,
}

impl LatencySeries {
    fn describe(self) -> &'static str {
        match self {
            LatencySeries::AudioToMic => "audio playback",
            LatencySeries::GazeToMic => "text gaze",
        }
    }

    pub fn select(self, latencies: &LatencyDifferences) -> &[f64] {
        match self {
            LatencySeries::AudioToMic => &latencies.audio_to_mic,
            LatencySeries::GazeToMic => &latencies.gaze_to_mic,
        }
    }
}

/// Human-readable average line shown on request.
pub fn average_message(series: LatencySeries, latencies: &LatencyDifferences) -> String {
    match average_latency(series.select(latencies)) {
        LatencyAverage::Seconds(avg) => format!(
            "Average time between {} and mic activity: {:.2} seconds",
            series.describe(),
            avg
        ),
        LatencyAverage::NoData => format!(
            "No microphone activity detected after {}.",
            series.describe()
        ),
    }
}
