//! PCM16 codec shared by the capture and playback paths.
//!
//! Everything here is pure: identical input always yields identical bytes.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use crate::constants::pcm::{CONTAINER_HEADER_LEN, CONTAINER_MAGIC};
use crate::error::DecodeError;

/// Encode float samples as little-endian signed 16-bit PCM.
///
/// Samples are clamped to [-1, 1]; positives scale by 32767, negatives by 32768.
pub fn encode_float_to_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        bytes.extend_from_slice(&quantize(sample).to_le_bytes());
    }
    bytes
}

fn quantize(sample: f32) -> i16 {
    // NaN has no meaningful level, treat it as silence
    let s = if sample.is_nan() { 0.0 } else { sample.clamp(-1.0, 1.0) };
    let scaled = if s < 0.0 { s * 32768.0 } else { s * 32767.0 };
    scaled.round() as i16
}

/// Decode little-endian PCM16 into floats in [-1, 1).
///
/// A leading RIFF header is skipped as a fixed 44 bytes; a trailing odd byte is ignored.
pub fn decode_pcm16_to_float(bytes: &[u8]) -> Vec<f32> {
    samples_from_le(strip_container_header(bytes))
}

/// Decode a base64 `audio_chunk` payload, rejecting payloads that are not whole samples.
pub fn decode_base64_chunk(audio_base64: &str) -> Result<Vec<f32>, DecodeError> {
    let bytes = STANDARD.decode(audio_base64.trim())?;
    let payload = strip_container_header(&bytes);

    if payload.is_empty() {
        return Err(DecodeError::Empty);
    }
    if payload.len() % 2 != 0 {
        return Err(DecodeError::OddLength(payload.len()));
    }

    Ok(samples_from_le(payload))
}

/// Encode raw bytes for an `audio_chunk` envelope
pub fn encode_base64_chunk(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

fn strip_container_header(bytes: &[u8]) -> &[u8] {
    if bytes.len() > CONTAINER_HEADER_LEN && bytes.starts_with(CONTAINER_MAGIC) {
        &bytes[CONTAINER_HEADER_LEN..]
    } else {
        bytes
    }
}

fn samples_from_le(payload: &[u8]) -> Vec<f32> {
    payload
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect()
}

/// Duration in seconds of `sample_count` samples at `sample_rate`
pub fn duration_secs(sample_count: usize, sample_rate: u32) -> f64 {
    sample_count as f64 / sample_rate as f64
}

/// Streaming linear-interpolation resampler.
///
/// Keeps the source position and the last input sample between calls, so a
/// signal fed in arbitrary blocks resamples exactly as if fed in one piece.
pub struct Resampler {
    ratio: f64,
    /// Output samples produced so far
    emitted: u64,
    /// Absolute source index of `history`
    base: u64,
    history: Option<f32>,
    passthrough: bool,
}

impl Resampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Self {
        Resampler {
            ratio: from_rate as f64 / to_rate.max(1) as f64,
            emitted: 0,
            base: 0,
            history: None,
            passthrough: from_rate == to_rate,
        }
    }

    /// Resample the next block of input
    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        if self.passthrough {
            return input.to_vec();
        }

        let mut buf = Vec::with_capacity(input.len() + 1);
        buf.extend(self.history);
        buf.extend_from_slice(input);
        if buf.is_empty() {
            return Vec::new();
        }

        let mut output = Vec::with_capacity((input.len() as f64 / self.ratio) as usize + 1);
        loop {
            let position = self.emitted as f64 * self.ratio - self.base as f64;
            let index = position.floor() as usize;
            if index + 1 >= buf.len() {
                break;
            }
            let frac = (position - index as f64) as f32;
            output.push(buf[index] * (1.0 - frac) + buf[index + 1] * frac);
            self.emitted += 1;
        }

        // The last sample is the left neighbour for the next block
        self.base += (buf.len() - 1) as u64;
        self.history = buf.last().copied();

        output
    }
}

/// Linearly stretch or squeeze `input` to exactly `len` samples
pub fn stretch(input: &[f32], len: usize) -> Vec<f32> {
    if input.len() == len {
        return input.to_vec();
    }
    if input.is_empty() {
        return vec![0.0; len];
    }

    let ratio = input.len() as f64 / len as f64;
    let last = input.len() - 1;

    (0..len)
        .map(|i| {
            let src_idx = i as f64 * ratio;
            let floor = (src_idx.floor() as usize).min(last);
            let ceil = (floor + 1).min(last);
            let frac = (src_idx - floor as f64) as f32;
            input[floor] * (1.0 - frac) + input[ceil] * frac
        })
        .collect()
}
