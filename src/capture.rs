use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BuildStreamError, Device, Stream, StreamConfig};
use tracing::{debug, error, info, warn};

use crate::config::CaptureConfig;
use crate::error::CaptureError;
use crate::pcm;

/// Receives one encoded PCM16 frame per capture tick, on the audio thread
pub type FrameCallback = Box<dyn FnMut(Vec<u8>) + Send + 'static>;

/// A microphone that produces fixed-size encoded frames while started
pub trait CaptureSource {
    /// Acquire the microphone and begin delivering frames to `on_frame_encoded`
    fn start(&mut self, on_frame_encoded: FrameCallback) -> Result<(), CaptureError>;

    /// Release the microphone. Calling this while stopped does nothing.
    fn stop(&mut self);

    fn is_recording(&self) -> bool;
}

/// Regroups driver-sized callback buffers into frames of exactly `frame_size` samples
pub struct FrameAssembler {
    frame_size: usize,
    pending: Vec<f32>,
}

impl FrameAssembler {
    pub fn new(frame_size: usize) -> Self {
        FrameAssembler {
            frame_size,
            pending: Vec::with_capacity(frame_size),
        }
    }

    /// Append mono samples and call `emit` once per completed frame
    pub fn push(&mut self, samples: &[f32], mut emit: impl FnMut(&[f32])) {
        let mut rest = samples;
        while !rest.is_empty() {
            let take = (self.frame_size - self.pending.len()).min(rest.len());
            self.pending.extend_from_slice(&rest[..take]);
            rest = &rest[take..];

            if self.pending.len() == self.frame_size {
                emit(&self.pending);
                self.pending.clear();
            }
        }
    }

    /// Samples waiting for the next frame
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Average interleaved channels down to mono
pub fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Per-callback processing: downmix, resample to the capture rate, frame, encode.
///
/// Lives inside the input callback so resampler and framing state carry over
/// from one driver buffer to the next.
pub struct CaptureChain {
    channels: usize,
    resampler: pcm::Resampler,
    assembler: FrameAssembler,
}

impl CaptureChain {
    pub fn new(channels: usize, device_rate: u32, target_rate: u32, frame_size: usize) -> Self {
        CaptureChain {
            channels,
            resampler: pcm::Resampler::new(device_rate, target_rate),
            assembler: FrameAssembler::new(frame_size),
        }
    }

    /// Feed one interleaved device buffer; `on_frame` gets each completed PCM16 frame
    pub fn process(&mut self, data: &[f32], mut on_frame: impl FnMut(Vec<u8>)) {
        let mono = downmix(data, self.channels);
        let mono = self.resampler.process(&mono);
        self.assembler.push(&mono, |frame| {
            on_frame(pcm::encode_float_to_pcm16(frame));
        });
    }
}

/// Microphone capture backed by cpal
pub struct AudioCapture {
    config: CaptureConfig,
    stream: Option<Stream>,
}

impl AudioCapture {
    pub fn new(config: CaptureConfig) -> Self {
        AudioCapture { config, stream: None }
    }

    fn open_device(&self) -> Result<Device, CaptureError> {
        let host = cpal::default_host();

        let device = match &self.config.device {
            Some(name) => host
                .input_devices()
                .map_err(|e| CaptureError::PermissionDenied(e.to_string()))?
                .find(|d| d.name().map(|n| &n == name).unwrap_or(false)),
            None => host.default_input_device(),
        };

        device.ok_or_else(|| CaptureError::PermissionDenied("No input device available".to_string()))
    }

    fn stream_config(&self, device: &Device) -> Result<StreamConfig, CaptureError> {
        let default_config = device
            .default_input_config()
            .map_err(|e| CaptureError::PermissionDenied(e.to_string()))?;

        let mut config: StreamConfig = default_config.into();
        let wanted = self.config.sample_rate;

        let supported_configs = device
            .supported_input_configs()
            .map_err(|e| CaptureError::PermissionDenied(e.to_string()))?;

        let mut found = false;
        for supported_config in supported_configs {
            if supported_config.min_sample_rate().0 <= wanted
                && supported_config.max_sample_rate().0 >= wanted
            {
                found = true;
                config.sample_rate = cpal::SampleRate(wanted);
                config.channels = supported_config.channels();
                break;
            }
        }

        if !found {
            warn!(
                "{}Hz capture not supported, resampling from {}Hz",
                wanted, config.sample_rate.0
            );
        }

        Ok(config)
    }
}

impl CaptureSource for AudioCapture {
    fn start(&mut self, mut on_frame_encoded: FrameCallback) -> Result<(), CaptureError> {
        if self.stream.is_some() {
            return Ok(()); // Already recording
        }

        let device = self.open_device()?;
        info!("🎤 Using audio input device: {}", device.name().unwrap_or_default());

        let stream_config = self.stream_config(&device)?;
        let channels = stream_config.channels as usize;
        let device_rate = stream_config.sample_rate.0;
        let target_rate = self.config.sample_rate;
        let mut chain = CaptureChain::new(channels, device_rate, target_rate, self.config.frame_size);

        debug!(
            "Capture config: {} channels, {} Hz, frames of {} samples",
            channels, device_rate, self.config.frame_size
        );

        let err_fn = |err| error!("🔴 Audio input stream error: {}", err);

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    chain.process(data, &mut on_frame_encoded);
                },
                err_fn,
                None,
            )
            .map_err(|e| match e {
                // Refused permission surfaces as an unavailable device or a backend error
                BuildStreamError::DeviceNotAvailable | BuildStreamError::BackendSpecific { .. } => {
                    CaptureError::PermissionDenied(e.to_string())
                }
                other => CaptureError::Stream(other.to_string()),
            })?;

        stream
            .play()
            .map_err(|e| CaptureError::Stream(e.to_string()))?;

        self.stream = Some(stream);
        info!("Recording started");

        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            info!("Recording stopped");
        }
    }

    fn is_recording(&self) -> bool {
        self.stream.is_some()
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}
