use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

use crate::error::AudioError;
use crate::pcm;
use crate::playback::{DeviceFactory, OutputDevice};

struct ScheduledBuffer {
    start_frame: u64,
    samples: Vec<f32>,
}

impl ScheduledBuffer {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// Sample-accurate render queue shared with the output callback.
///
/// Frame positions are counted from the first rendered frame, which makes the
/// number of frames rendered so far the device clock.
pub struct Timeline {
    frames_rendered: u64,
    queue: VecDeque<ScheduledBuffer>,
}

impl Timeline {
    pub fn new() -> Self {
        Timeline {
            frames_rendered: 0,
            queue: VecDeque::new(),
        }
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Number of buffers not yet fully played
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Queue mono samples to start at `start_frame`, keeping the queue ordered by start
    pub fn insert(&mut self, start_frame: u64, samples: Vec<f32>) {
        let position = self
            .queue
            .iter()
            .position(|b| b.start_frame > start_frame)
            .unwrap_or(self.queue.len());
        self.queue.insert(position, ScheduledBuffer { start_frame, samples });
    }

    /// Fill one interleaved callback buffer and advance the clock by its frame count.
    /// Gaps between buffers render as silence.
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let frames = out.len() / channels;
        out.fill(0.0);

        let window_start = self.frames_rendered;
        let window_end = window_start + frames as u64;

        for buffer in &self.queue {
            if buffer.start_frame >= window_end {
                break;
            }
            if buffer.end_frame() <= window_start {
                continue;
            }

            let from = buffer.start_frame.max(window_start);
            let to = buffer.end_frame().min(window_end);
            for frame in from..to {
                let sample = buffer.samples[(frame - buffer.start_frame) as usize];
                let base = (frame - window_start) as usize * channels;
                for slot in &mut out[base..base + channels] {
                    *slot += sample;
                }
            }
        }

        self.queue.retain(|b| b.end_frame() > window_end);
        self.frames_rendered = window_end;
    }
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Map a chunk of content-rate samples starting at `start_time` onto device frames.
///
/// Both ends are rounded from absolute time, so a chunk that starts where the
/// previous one ended lands on the previous chunk's end frame.
pub fn place_on_device(
    samples: &[f32],
    start_time: f64,
    content_rate: u32,
    device_rate: u32,
) -> (u64, Vec<f32>) {
    let end_time = start_time + pcm::duration_secs(samples.len(), content_rate);
    let start_frame = (start_time * device_rate as f64).round() as u64;
    let end_frame = (end_time * device_rate as f64).round() as u64;
    let frames = end_frame.saturating_sub(start_frame) as usize;
    (start_frame, pcm::stretch(samples, frames))
}

/// Output device backed by a cpal stream and a [`Timeline`]
pub struct CpalOutput {
    stream: Stream,
    timeline: Arc<Mutex<Timeline>>,
    clock_frames: Arc<AtomicU64>,
    device_rate: u32,
    content_rate: u32,
}

impl CpalOutput {
    /// Open the output device for content at `content_rate` Hz
    pub fn open(content_rate: u32, device_name: Option<&str>) -> Result<Self, AudioError> {
        let device = Self::find_device(device_name)?;
        info!("🔊 Using audio output device: {}", device.name().unwrap_or_default());

        let config = Self::stream_config(&device, content_rate)?;
        let channels = config.channels as usize;
        let device_rate = config.sample_rate.0;

        let timeline = Arc::new(Mutex::new(Timeline::new()));
        let clock_frames = Arc::new(AtomicU64::new(0));

        let cb_timeline = Arc::clone(&timeline);
        let cb_clock = Arc::clone(&clock_frames);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let Ok(mut timeline) = cb_timeline.lock() else {
                        data.fill(0.0);
                        return;
                    };
                    timeline.render(data, channels);
                    cb_clock.store(timeline.frames_rendered(), Ordering::Release);
                },
                |err| error!("🔴 Audio output stream error: {}", err),
                None,
            )
            .map_err(|e| AudioError::Device(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioError::Device(e.to_string()))?;

        Ok(CpalOutput {
            stream,
            timeline,
            clock_frames,
            device_rate,
            content_rate,
        })
    }

    /// Factory for [`crate::playback::PlaybackScheduler`], opening the device lazily
    pub fn factory(device_name: Option<String>) -> DeviceFactory<CpalOutput> {
        Box::new(move |rate| CpalOutput::open(rate, device_name.as_deref()))
    }

    fn find_device(device_name: Option<&str>) -> Result<Device, AudioError> {
        let host = cpal::default_host();
        let device = match device_name {
            Some(name) => host
                .output_devices()
                .map_err(|e| AudioError::Device(e.to_string()))?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false)),
            None => host.default_output_device(),
        };
        device.ok_or(AudioError::NoOutputDevice)
    }

    fn stream_config(device: &Device, content_rate: u32) -> Result<StreamConfig, AudioError> {
        let default_config = device
            .default_output_config()
            .map_err(|e| AudioError::Device(e.to_string()))?;
        let mut config: StreamConfig = default_config.into();

        let supported_configs = device
            .supported_output_configs()
            .map_err(|e| AudioError::Device(e.to_string()))?;

        let mut found = false;
        for supported_config in supported_configs {
            if supported_config.min_sample_rate().0 <= content_rate
                && supported_config.max_sample_rate().0 >= content_rate
            {
                found = true;
                config.sample_rate = cpal::SampleRate(content_rate);
                config.channels = supported_config.channels();
                break;
            }
        }

        if !found {
            warn!(
                "{}Hz output not supported, resampling to {}Hz",
                content_rate, config.sample_rate.0
            );
        }

        debug!(
            "Output config: {} channels, {} Hz",
            config.channels, config.sample_rate.0
        );

        Ok(config)
    }
}

impl OutputDevice for CpalOutput {
    fn current_time(&self) -> f64 {
        self.clock_frames.load(Ordering::Acquire) as f64 / self.device_rate as f64
    }

    fn schedule_buffer(&mut self, samples: Vec<f32>, start_time: f64) {
        let (start_frame, samples) =
            place_on_device(&samples, start_time, self.content_rate, self.device_rate);

        match self.timeline.lock() {
            Ok(mut timeline) => timeline.insert(start_frame, samples),
            Err(_) => warn!("⚠️  Output timeline mutex poisoned, dropping audio chunk"),
        }
    }

    fn resume(&mut self) -> Result<(), AudioError> {
        self.stream
            .play()
            .map_err(|e| AudioError::Device(e.to_string()))
    }
}
