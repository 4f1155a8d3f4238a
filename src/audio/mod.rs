use std::time::Duration;

use thiserror::Error;

pub mod capture;
pub mod monitor;
pub mod playback;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("audio device unavailable: {0}")]
    Unavailable(String),
    #[error("audio device read failed: {0}")]
    Read(String),
}

/// Pollable source of fixed-size signed 16-bit frames.
pub trait FrameSource {
    fn sample_rate(&self) -> u32;

    /// Fills `frame` completely, waiting at most `timeout`. Returns
    /// `Ok(false)` when no full frame arrived in time.
    fn read_frame(&mut self, frame: &mut [i16], timeout: Duration) -> Result<bool, DeviceError>;
}
