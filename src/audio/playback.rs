use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use super::DeviceError;
use crate::kernel::store::StoreError;

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("cannot load {path}: {reason}")]
    Load { path: PathBuf, reason: String },
    #[error("nothing loaded")]
    NothingLoaded,
    #[error(transparent)]
    Rejected(#[from] StoreError),
}

/// External playback collaborator. The detector only observes its state.
pub trait PlaybackControl: Send + Sync + 'static {
    fn load(&self, path: &Path) -> Result<(), PlaybackError>;
    fn play(&self) -> Result<(), PlaybackError>;
    fn stop(&self);
    fn is_playing(&self) -> bool;
}

#[derive(Debug, Clone)]
struct Clip {
    samples: Arc<Vec<f32>>,
    channels: u16,
    sample_rate: u32,
}

struct ActiveOutput {
    stop_tx: mpsc::Sender<()>,
    worker: JoinHandle<()>,
}

/// PCM WAV player. Each `play` runs a dedicated thread that owns the cpal
/// output stream; the device is released when that thread exits (stop, end
/// of clip, or stream error).
#[derive(Default)]
pub struct WavPlayer {
    clip: Mutex<Option<Clip>>,
    active: Mutex<Option<ActiveOutput>>,
    playing: Arc<AtomicBool>,
}

impl WavPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    fn decode(path: &Path) -> Result<Clip, PlaybackError> {
        let load_err = |reason: String| PlaybackError::Load {
            path: path.to_path_buf(),
            reason,
        };
        let mut reader = hound::WavReader::open(path).map_err(|e| load_err(e.to_string()))?;
        let spec = reader.spec();
        let samples: Result<Vec<f32>, hound::Error> = match spec.sample_format {
            hound::SampleFormat::Float => reader.samples::<f32>().collect(),
            hound::SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1) as u32)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect()
            }
        };
        let samples = samples.map_err(|e| load_err(e.to_string()))?;
        info!(
            path = %path.display(),
            channels = spec.channels,
            rate = spec.sample_rate,
            samples = samples.len(),
            "Loaded WAV clip"
        );
        Ok(Clip {
            samples: Arc::new(samples),
            channels: spec.channels,
            sample_rate: spec.sample_rate,
        })
    }

    fn halt(&self) {
        let active = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(active) = active {
            let _ = active.stop_tx.send(());
            if active.worker.join().is_err() {
                warn!("Playback worker panicked");
            }
        }
        self.playing.store(false, Ordering::SeqCst);
    }
}

impl PlaybackControl for WavPlayer {
    fn load(&self, path: &Path) -> Result<(), PlaybackError> {
        let clip = Self::decode(path)?;
        *self.clip.lock().unwrap_or_else(PoisonError::into_inner) = Some(clip);
        Ok(())
    }

    fn play(&self) -> Result<(), PlaybackError> {
        let clip = self
            .clip
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(PlaybackError::NothingLoaded)?;
        // Reap a finished worker before starting another.
        self.halt();

        let (stop_tx, stop_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let playing = Arc::clone(&self.playing);
        playing.store(true, Ordering::SeqCst);

        let worker = std::thread::Builder::new()
            .name("wav-playback".into())
            .spawn(move || {
                let result = run_output(clip, &playing, stop_rx, &ready_tx);
                if let Err(e) = result {
                    error!("Playback output failed: {}", e);
                    let _ = ready_tx.send(Err(e));
                }
                playing.store(false, Ordering::SeqCst);
            })
            .map_err(|e| DeviceError::Unavailable(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                *self.active.lock().unwrap_or_else(PoisonError::into_inner) =
                    Some(ActiveOutput { stop_tx, worker });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(e.into())
            }
            Err(_) => {
                let _ = worker.join();
                Err(DeviceError::Unavailable("playback worker exited early".into()).into())
            }
        }
    }

    fn stop(&self) {
        self.halt();
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }
}

impl Drop for WavPlayer {
    fn drop(&mut self) {
        self.halt();
    }
}

/// Owns the output stream for the lifetime of one playback.
fn run_output(
    clip: Clip,
    playing: &AtomicBool,
    stop_rx: mpsc::Receiver<()>,
    ready_tx: &mpsc::Sender<Result<(), DeviceError>>,
) -> Result<(), DeviceError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| DeviceError::Unavailable("no output device available".into()))?;

    let config = cpal::StreamConfig {
        channels: clip.channels,
        sample_rate: cpal::SampleRate(clip.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let cursor = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicBool::new(false));
    let samples = Arc::clone(&clip.samples);
    let (cb_cursor, cb_finished) = (Arc::clone(&cursor), Arc::clone(&finished));

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let start = cb_cursor.load(Ordering::Relaxed);
                for (i, out) in data.iter_mut().enumerate() {
                    *out = samples.get(start + i).copied().unwrap_or(0.0);
                }
                let next = start + data.len();
                cb_cursor.store(next, Ordering::Relaxed);
                if next >= samples.len() {
                    cb_finished.store(true, Ordering::SeqCst);
                }
            },
            |err| error!("an error occurred on output stream: {}", err),
            None,
        )
        .map_err(|e| DeviceError::Unavailable(e.to_string()))?;
    stream
        .play()
        .map_err(|e| DeviceError::Unavailable(e.to_string()))?;
    let _ = ready_tx.send(Ok(()));

    // Bounded waits: wake on stop or poll for end of clip.
    loop {
        match stop_rx.recv_timeout(Duration::from_millis(50)) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if finished.load(Ordering::SeqCst) {
                    info!("Playback reached end of clip");
                    break;
                }
            }
        }
    }
    playing.store(false, Ordering::SeqCst);
    drop(stream);
    Ok(())
}
