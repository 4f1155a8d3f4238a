//! Session configuration, loaded from an optional TOML file.
//!
//! Every field has a default, so an empty file (or no file) gives the stock
//! setup: 500 amplitude threshold with a 1 s debounce, peer on ports
//! 5000/5001, 3 s cluster shading and a 100 ms cadence.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::detectors::gaze::Framing;
use crate::detectors::mic::MicConfig;
use crate::kernel::correlation::GazePairing;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub mic: MicConfig,
    pub gaze: GazeConfig,
    pub notify: NotifyConfig,
    pub timeline: TimelineConfig,
    pub correlation: CorrelationConfig,
    pub session: LoopConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GazeConfig {
    pub listen_addr: String,
    pub framing: Framing,
    pub chunk_size: usize,
}

impl Default for GazeConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:5000".to_string(),
            framing: Framing::Chunk,
            chunk_size: 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub peer_addr: String,
    pub timeout_ms: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            peer_addr: "127.0.0.1:5001".to_string(),
            timeout_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    pub cluster_gap_secs: f64,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            cluster_gap_secs: 3.0,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
    pub gaze_pairing: GazePairing,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    pub cadence_ms: u64,
    pub file_name: String,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            cadence_ms: 100,
            file_name: "session_data.json".to_string(),
        }
    }
}

impl LoopConfig {
    pub fn cadence(&self) -> Duration {
        Duration::from_millis(self.cadence_ms.max(1))
    }
}

impl SessionConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse session config")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&text)
    }

    /// Loads `path` when given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}
