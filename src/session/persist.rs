use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::kernel::event::EventKind;
use crate::kernel::latency::LatencyDifferences;
use crate::kernel::store::StoreSnapshot;
use crate::kernel::time::Timestamp;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("session file I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("session file {path} is malformed: {reason}")]
    Parse { path: PathBuf, reason: String },
}

/// On-disk session record (JSON, UTF-8). Timestamps are naive local
/// ISO-8601 strings; latencies are seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    #[serde(rename = "text_gaze_times")]
    pub gaze_times: Vec<Timestamp>,
    #[serde(rename = "mic_activity_times")]
    pub mic_times: Vec<Timestamp>,
    #[serde(rename = "audio_playback_times")]
    pub audio_times: Vec<Timestamp>,
    /// Not in older files; defaults to empty.
    #[serde(rename = "audio_tick_times", default)]
    pub audio_tick_times: Vec<Timestamp>,
    #[serde(rename = "time_differences_audio_mic")]
    pub audio_to_mic: Vec<f64>,
    #[serde(rename = "time_differences_text_gaze")]
    pub gaze_to_mic: Vec<f64>,
}

impl SessionSnapshot {
    pub fn capture(store: &StoreSnapshot, latencies: &LatencyDifferences) -> Self {
        Self {
            gaze_times: store.times(EventKind::GazeNotification),
            mic_times: store.times(EventKind::MicActivity),
            audio_times: store.times(EventKind::AudioPlaybackStart),
            audio_tick_times: store.times(EventKind::AudioPlaybackTick),
            audio_to_mic: latencies.audio_to_mic.clone(),
            gaze_to_mic: latencies.gaze_to_mic.clone(),
        }
    }

    pub fn store_snapshot(&self) -> StoreSnapshot {
        StoreSnapshot::from_times([
            self.gaze_times.clone(),
            self.mic_times.clone(),
            self.audio_times.clone(),
            self.audio_tick_times.clone(),
        ])
    }

    pub fn latencies(&self) -> LatencyDifferences {
        LatencyDifferences {
            audio_to_mic: self.audio_to_mic.clone(),
            gaze_to_mic: self.gaze_to_mic.clone(),
        }
    }

    /// Per-kind series must be chronological.
    fn validate(&self) -> Result<(), String> {
        let series = [
            ("text_gaze_times", &self.gaze_times),
            ("mic_activity_times", &self.mic_times),
            ("audio_playback_times", &self.audio_times),
            ("audio_tick_times", &self.audio_tick_times),
        ];
        for (key, times) in series {
            if times.windows(2).any(|w| w[0] > w[1]) {
                return Err(format!("{key} is not in chronological order"));
            }
        }
        let latencies = [
            ("time_differences_audio_mic", &self.audio_to_mic),
            ("time_differences_text_gaze", &self.gaze_to_mic),
        ];
        for (key, values) in latencies {
            if values.iter().any(|v| !v.is_finite()) {
                return Err(format!("{key} contains a non-finite value"));
            }
        }
        Ok(())
    }
}

/// Writes the snapshot next to `path` and renames it into place, so `path`
/// is either the previous file or the complete new one.
pub fn save(store: &StoreSnapshot, latencies: &LatencyDifferences, path: &Path) -> Result<(), PersistError> {
    let snapshot = SessionSnapshot::capture(store, latencies);
    write_snapshot(&snapshot, path)
}

pub fn write_snapshot(snapshot: &SessionSnapshot, path: &Path) -> Result<(), PersistError> {
    let io_err = |source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    };

    let json = serde_json::to_string_pretty(snapshot).map_err(|e| PersistError::Parse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let tmp = temp_path(path);
    let written = fs::File::create(&tmp).and_then(|mut file| {
        file.write_all(json.as_bytes())?;
        file.sync_all()
    });
    if let Err(e) = written.and_then(|_| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(io_err(e));
    }

    info!(
        path = %path.display(),
        events = snapshot.gaze_times.len() + snapshot.mic_times.len() + snapshot.audio_times.len(),
        "Session saved"
    );
    Ok(())
}

pub fn load(path: &Path) -> Result<SessionSnapshot, PersistError> {
    let text = fs::read_to_string(path).map_err(|source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let snapshot: SessionSnapshot = serde_json::from_str(&text).map_err(|e| PersistError::Parse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    snapshot.validate().map_err(|reason| PersistError::Parse {
        path: path.to_path_buf(),
        reason,
    })?;
    Ok(snapshot)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "session".into());
    name.push(".tmp");
    path.with_file_name(name)
}
