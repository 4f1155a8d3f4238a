use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapRb};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{error, info};

use super::{DeviceError, FrameSource};

/// Poll step while waiting for the callback to fill a frame.
const WAIT_STEP: Duration = Duration::from_millis(5);

/// Default input device, mono-agnostic, feeding i16 samples into a ring
/// buffer. The stream lives as long as this value; dropping it releases the
/// device.
pub struct CpalInput {
    _stream: cpal::Stream,
    consumer: HeapCons<i16>,
    sample_rate: u32,
    stream_error: Arc<Mutex<Option<String>>>,
}

impl CpalInput {
    /// Opens the default input device. `buffer_frames` sizes the ring buffer
    /// in units of `frame_size`.
    pub fn open(frame_size: usize, buffer_frames: usize) -> Result<Self, DeviceError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| DeviceError::Unavailable("no input device available".into()))?;

        info!("Audio Input Device: {}", device.name().unwrap_or_default());

        let config = device
            .default_input_config()
            .map_err(|e| DeviceError::Unavailable(e.to_string()))?;
        let sample_rate = config.sample_rate().0;
        info!("Audio Config Selected: Rate={}Hz, Channels={}", sample_rate, config.channels());

        let rb = HeapRb::<i16>::new(frame_size.max(1) * buffer_frames.max(2));
        let (mut producer, consumer) = rb.split();

        let stream_error = Arc::new(Mutex::new(None));
        let err_slot = Arc::clone(&stream_error);
        let err_fn = move |err: cpal::StreamError| {
            error!("an error occurred on input stream: {}", err);
            *err_slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(err.to_string());
        };

        let build = |e: cpal::BuildStreamError| DeviceError::Unavailable(e.to_string());
        let stream = match config.sample_format() {
            cpal::SampleFormat::I16 => device
                .build_input_stream(
                    &config.into(),
                    move |data: &[i16], _: &_| {
                        // Full buffer: newest samples are dropped (lossy).
                        producer.push_slice(data);
                    },
                    err_fn,
                    None,
                )
                .map_err(build)?,
            cpal::SampleFormat::F32 => device
                .build_input_stream(
                    &config.into(),
                    move |data: &[f32], _: &_| {
                        for &sample in data {
                            let _ = producer.try_push(f32_to_i16(sample));
                        }
                    },
                    err_fn,
                    None,
                )
                .map_err(build)?,
            other => {
                return Err(DeviceError::Unavailable(format!(
                    "unsupported sample format {other:?}"
                )))
            }
        };

        stream
            .play()
            .map_err(|e| DeviceError::Unavailable(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            consumer,
            sample_rate,
            stream_error,
        })
    }
}

impl FrameSource for CpalInput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_frame(&mut self, frame: &mut [i16], timeout: Duration) -> Result<bool, DeviceError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(err) = self
                .stream_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
            {
                return Err(DeviceError::Read(err));
            }
            if self.consumer.occupied_len() >= frame.len() {
                self.consumer.pop_slice(frame);
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            std::thread::sleep(WAIT_STEP);
        }
    }
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}
