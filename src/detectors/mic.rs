use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{DetectorError, DetectorHandle};
use crate::audio::monitor::MicGate;
use crate::audio::{DeviceError, FrameSource};
use crate::kernel::event::EventKind;
use crate::kernel::store::EventStore;
use crate::kernel::time;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MicConfig {
    /// Mean absolute amplitude (i16 scale) a frame must exceed.
    pub threshold: f64,
    pub debounce_secs: f64,
    pub frame_size: usize,
    /// Upper bound on one blocking frame read; also the stop-flag cadence.
    pub read_timeout_ms: u64,
}

impl Default for MicConfig {
    fn default() -> Self {
        Self {
            threshold: 500.0,
            debounce_secs: 1.0,
            frame_size: 1024,
            read_timeout_ms: 200,
        }
    }
}

/// Turns microphone frames into debounced `MicActivity` events.
pub struct MicDetector {
    config: MicConfig,
    store: Arc<EventStore>,
}

impl MicDetector {
    pub fn new(config: MicConfig, store: Arc<EventStore>) -> Self {
        Self { config, store }
    }

    /// Runs the detector on a dedicated thread. `open` is called on that
    /// thread so the device handle never crosses threads; an open failure is
    /// returned here and nothing keeps running.
    pub async fn spawn<F, S>(self, open: F, token: CancellationToken) -> Result<DetectorHandle, DetectorError>
    where
        F: FnOnce() -> Result<S, DeviceError> + Send + 'static,
        S: FrameSource + 'static,
    {
        let (ready_tx, ready_rx) = oneshot::channel();
        let handle = std::thread::Builder::new()
            .name("mic-detector".into())
            .spawn(move || {
                let source = match open() {
                    Ok(source) => {
                        let _ = ready_tx.send(Ok(()));
                        source
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                self.run(source, &token);
            })
            .map_err(|_| DetectorError::Startup("mic"))?;

        match ready_rx.await {
            Ok(Ok(())) => Ok(DetectorHandle::thread("mic", handle)),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e.into())
            }
            Err(_) => Err(DetectorError::Startup("mic")),
        }
    }

    /// Blocking loop. Returns on cancellation or on the first device read
    /// error; `source` is dropped on every exit path.
    pub fn run<S: FrameSource>(self, mut source: S, token: &CancellationToken) {
        let mut gate = MicGate::new(self.config.threshold, self.config.debounce_secs);
        let mut frame = vec![0i16; self.config.frame_size.max(1)];
        let timeout = Duration::from_millis(self.config.read_timeout_ms.max(1));

        info!(
            rate = source.sample_rate(),
            threshold = gate.threshold(),
            "Mic detector started"
        );

        while !token.is_cancelled() {
            match source.read_frame(&mut frame, timeout) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    error!("Mic detector stopping: {}", e);
                    break;
                }
            }

            let at = time::now();
            if let Some(level) = gate.process(&frame, at) {
                if let Err(e) = self
                    .store
                    .append(EventKind::MicActivity, at, Some(format!("level={level:.0}")))
                {
                    warn!("Mic activity rejected: {}", e);
                }
            }
        }

        info!("Mic detector stopped");
    }
}
