//! Independent producers. Each one owns its signal source and only ever
//! appends to the shared `EventStore`.

use thiserror::Error;
use tracing::warn;

use crate::audio::DeviceError;

pub mod gaze;
pub mod mic;
pub mod playback;

pub use gaze::{Framing, GazeDetector};
pub use mic::{MicConfig, MicDetector};
pub use playback::{PlaybackDetector, PlaybackStatus, StopStatus};

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} detector failed to start")]
    Startup(&'static str),
}

enum Worker {
    Thread(std::thread::JoinHandle<()>),
    Task(tokio::task::JoinHandle<()>),
}

/// Join handle for a running detector, whichever way it was spawned.
pub struct DetectorHandle {
    name: &'static str,
    worker: Worker,
}

impl DetectorHandle {
    pub(crate) fn thread(name: &'static str, handle: std::thread::JoinHandle<()>) -> Self {
        Self {
            name,
            worker: Worker::Thread(handle),
        }
    }

    pub(crate) fn task(name: &'static str, handle: tokio::task::JoinHandle<()>) -> Self {
        Self {
            name,
            worker: Worker::Task(handle),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        match &self.worker {
            Worker::Thread(h) => h.is_finished(),
            Worker::Task(h) => h.is_finished(),
        }
    }

    /// Waits for the detector loop to exit. Signal cancellation first.
    pub async fn join(self) {
        let name = self.name;
        let panicked = match self.worker {
            Worker::Thread(h) => match tokio::task::spawn_blocking(move || h.join()).await {
                Ok(joined) => joined.is_err(),
                Err(_) => true,
            },
            Worker::Task(h) => h.await.is_err(),
        };
        if panicked {
            warn!(detector = name, "Detector terminated abnormally");
        }
    }
}
