#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use speech_timeline::audio::playback::{PlaybackControl, PlaybackError};
use speech_timeline::audio::{DeviceError, FrameSource};
use speech_timeline::kernel::time::offset;

/// 2024-05-01 10:00:00 plus `secs`.
pub fn t(secs: f64) -> NaiveDateTime {
    let base = NaiveDate::from_ymd_opt(2024, 5, 1)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap();
    offset(base, secs).unwrap()
}

/// Playback collaborator that only flips a flag.
#[derive(Default)]
pub struct MockPlayer {
    playing: AtomicBool,
    fail_load: AtomicBool,
    load_delay: Duration,
    pub loads: Mutex<Vec<PathBuf>>,
    pub stops: AtomicUsize,
}

impl MockPlayer {
    pub fn failing() -> Self {
        let player = Self::default();
        player.fail_load.store(true, Ordering::SeqCst);
        player
    }

    /// `load` blocks the calling thread for `delay`, like a slow device open.
    pub fn slow(delay: Duration) -> Self {
        Self {
            load_delay: delay,
            ..Self::default()
        }
    }

    /// Simulates the clip running out.
    pub fn finish(&self) {
        self.playing.store(false, Ordering::SeqCst);
    }
}

impl PlaybackControl for MockPlayer {
    fn load(&self, path: &Path) -> Result<(), PlaybackError> {
        if !self.load_delay.is_zero() {
            std::thread::sleep(self.load_delay);
        }
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(PlaybackError::Load {
                path: path.to_path_buf(),
                reason: "unsupported".into(),
            });
        }
        self.loads.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }

    fn play(&self) -> Result<(), PlaybackError> {
        self.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.playing.store(false, Ordering::SeqCst);
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }
}

pub enum Step {
    Frame(i16),
    Fail,
}

/// Frame source replaying a script, then idling. Flags its own drop so tests
/// can check the device was released.
pub struct ScriptedSource {
    steps: VecDeque<Step>,
    pub released: Arc<AtomicBool>,
}

impl ScriptedSource {
    pub fn new(steps: Vec<Step>) -> (Self, Arc<AtomicBool>) {
        let released = Arc::new(AtomicBool::new(false));
        (
            Self {
                steps: steps.into(),
                released: Arc::clone(&released),
            },
            released,
        )
    }
}

impl FrameSource for ScriptedSource {
    fn sample_rate(&self) -> u32 {
        44_100
    }

    fn read_frame(&mut self, frame: &mut [i16], timeout: Duration) -> Result<bool, DeviceError> {
        match self.steps.pop_front() {
            Some(Step::Frame(level)) => {
                frame.fill(level);
                Ok(true)
            }
            Some(Step::Fail) => Err(DeviceError::Read("device unplugged".into())),
            None => {
                std::thread::sleep(timeout.min(Duration::from_millis(5)));
                Ok(false)
            }
        }
    }
}

impl Drop for ScriptedSource {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Polls `check` until it holds or two seconds pass.
pub async fn wait_for(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
