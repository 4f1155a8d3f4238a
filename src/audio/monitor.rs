use crate::kernel::time::{seconds_between, Timestamp};

/// Amplitude gate for microphone frames.
///
/// Fires when a frame's mean absolute amplitude exceeds `threshold` and at
/// least `debounce_secs` have passed since the previous firing. The cooldown
/// is global: sustained loud input produces one event per interval, not one
/// per frame.
#[derive(Debug, Clone)]
pub struct MicGate {
    threshold: f64,
    debounce_secs: f64,

    // State
    last_fired: Option<Timestamp>,
}

impl MicGate {
    pub fn new(threshold: f64, debounce_secs: f64) -> Self {
        Self {
            threshold,
            debounce_secs: debounce_secs.max(0.0),
            last_fired: None,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Returns the frame level when the gate fires.
    pub fn process(&mut self, frame: &[i16], at: Timestamp) -> Option<f64> {
        let level = mean_abs_amplitude(frame)?;
        if level <= self.threshold {
            return None;
        }
        if let Some(last) = self.last_fired {
            if seconds_between(last, at) < self.debounce_secs {
                return None;
            }
        }
        self.last_fired = Some(at);
        Some(level)
    }

    pub fn reset(&mut self) {
        self.last_fired = None;
    }
}

/// Mean of |sample| over the frame; `None` for an empty frame.
pub fn mean_abs_amplitude(frame: &[i16]) -> Option<f64> {
    if frame.is_empty() {
        return None;
    }
    // i32 widening: |i16::MIN| does not fit in i16.
    let sum: i64 = frame.iter().map(|&s| (s as i32).abs() as i64).sum();
    Some(sum as f64 / frame.len() as f64)
}
