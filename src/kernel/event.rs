use serde::{Deserialize, Serialize};
use std::fmt;

use super::time::{format_clock, Timestamp};

/// Monotonic id handed out by the store on every append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Inbound peer message: the user looked at a presented text cue.
    GazeNotification,
    /// Microphone amplitude crossed the threshold (debounced).
    MicActivity,
    AudioPlaybackStart,
    /// One per elapsed second of active playback.
    AudioPlaybackTick,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::GazeNotification,
        EventKind::MicActivity,
        EventKind::AudioPlaybackStart,
        EventKind::AudioPlaybackTick,
    ];

    /// Stable slot used by per-kind storage.
    pub fn index(self) -> usize {
        match self {
            EventKind::GazeNotification => 0,
            EventKind::MicActivity => 1,
            EventKind::AudioPlaybackStart => 2,
            EventKind::AudioPlaybackTick => 3,
        }
    }

    /// Transcript label, padded so timestamps line up.
    pub fn label(self) -> &'static str {
        match self {
            EventKind::GazeNotification => "[Text Gaze]     ",
            EventKind::MicActivity => "[Mic Activity]  ",
            EventKind::AudioPlaybackStart => "[Audio Playback]",
            EventKind::AudioPlaybackTick => "[Playback Tick] ",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::GazeNotification => "gaze",
            EventKind::MicActivity => "mic",
            EventKind::AudioPlaybackStart => "audio-start",
            EventKind::AudioPlaybackTick => "audio-tick",
        };
        f.write_str(name)
    }
}

/// Immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub kind: EventKind,
    pub timestamp: Timestamp,
    pub payload: Option<String>,
}

impl Event {
    pub fn new(id: EventId, kind: EventKind, timestamp: Timestamp, payload: Option<String>) -> Self {
        Self { id, kind, timestamp, payload }
    }

    /// One transcript row: label, second-resolution clock, then payload.
    pub fn line(&self) -> String {
        let mut line = format!("{} {}", self.kind.label(), format_clock(self.timestamp));
        if let Some(payload) = &self.payload {
            line.push_str("  ");
            line.push_str(payload.trim_end());
        }
        line
    }
}
