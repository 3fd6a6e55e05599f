//! Gapless playback scheduling for inbound audio chunks.
//!
//! The scheduler keeps a single playhead: the device-clock time at which the
//! next chunk may begin. Each chunk starts at the playhead (pushed forward to
//! `now + lookahead` when it has fallen behind) and advances it by the chunk's
//! duration, so consecutive chunks abut exactly in enqueue order.

use tracing::{debug, info};

use crate::error::{AudioError, PlaybackError};
use crate::pcm;

/// An output device with a monotonic clock that plays buffers at absolute times
pub trait OutputDevice {
    /// Device clock in seconds; never decreases
    fn current_time(&self) -> f64;

    /// Play `samples` (mono, at the device's content rate) starting at `start_time`
    fn schedule_buffer(&mut self, samples: Vec<f32>, start_time: f64);

    /// Make sure the device is running
    fn resume(&mut self) -> Result<(), AudioError> {
        Ok(())
    }
}

/// Creates the output device on first use
pub type DeviceFactory<D> = Box<dyn FnMut(u32) -> Result<D, AudioError>>;

/// Where and how long a chunk was scheduled
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledChunk {
    pub start_time: f64,
    pub duration: f64,
    pub sample_count: usize,
}

struct PlaybackState<D> {
    device: D,
    playhead_time: f64,
}

pub struct PlaybackScheduler<D: OutputDevice> {
    open_device: DeviceFactory<D>,
    state: Option<PlaybackState<D>>,
    sample_rate: u32,
    lookahead: f64,
}

impl<D: OutputDevice> PlaybackScheduler<D> {
    pub fn new(sample_rate: u32, lookahead: f64, open_device: DeviceFactory<D>) -> Self {
        PlaybackScheduler {
            open_device,
            state: None,
            sample_rate,
            lookahead,
        }
    }

    /// User-initiated audio enable: create the device if needed and resume it
    pub fn enable_audio(&mut self) -> Result<(), AudioError> {
        let state = self.ensure_state()?;
        state.device.resume()?;
        Ok(())
    }

    /// Decode a base64 PCM16 chunk and schedule it right after the previous one
    pub fn enqueue(&mut self, audio_base64: &str) -> Result<ScheduledChunk, PlaybackError> {
        let samples = pcm::decode_base64_chunk(audio_base64)?;
        Ok(self.schedule(samples)?)
    }

    /// Schedule already-decoded samples
    pub fn schedule(&mut self, samples: Vec<f32>) -> Result<ScheduledChunk, AudioError> {
        let sample_rate = self.sample_rate;
        let lookahead = self.lookahead;
        let state = self.ensure_state()?;

        let now = state.device.current_time();
        let floor = now + lookahead;
        if state.playhead_time < floor {
            // Fell behind (or first chunk): restart the jitter buffer
            debug!(
                "Playhead {:.3}s behind floor {:.3}s, resetting",
                state.playhead_time, floor
            );
            state.playhead_time = floor;
        }

        let sample_count = samples.len();
        let duration = pcm::duration_secs(sample_count, sample_rate);
        let start_time = state.playhead_time;

        state.device.schedule_buffer(samples, start_time);
        state.playhead_time += duration;

        Ok(ScheduledChunk {
            start_time,
            duration,
            sample_count,
        })
    }

    fn ensure_state(&mut self) -> Result<&mut PlaybackState<D>, AudioError> {
        if self.state.is_none() {
            let device = (self.open_device)(self.sample_rate)?;
            let playhead_time = device.current_time();
            info!("🔊 Audio output initialized at {} Hz", self.sample_rate);
            self.state = Some(PlaybackState { device, playhead_time });
        }
        // Populated above
        self.state.as_mut().ok_or(AudioError::NoOutputDevice)
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    pub fn playhead_time(&self) -> Option<f64> {
        self.state.as_ref().map(|s| s.playhead_time)
    }

    /// Audio already scheduled but not yet played
    pub fn buffered_duration(&self) -> f64 {
        self.state
            .as_ref()
            .map(|s| (s.playhead_time - s.device.current_time()).max(0.0))
            .unwrap_or(0.0)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
