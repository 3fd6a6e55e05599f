/// Application-wide constants for capture, playback and the wire protocol

pub mod capture {
    /// Sample rate of the outbound microphone stream
    pub const SAMPLE_RATE: u32 = 16000;

    /// Samples per outbound frame (~256ms at 16kHz)
    pub const FRAME_SIZE: usize = 4096;
}

pub mod playback {
    /// Sample rate of inbound synthesized audio
    pub const SAMPLE_RATE: u32 = 44100;

    /// Minimum distance between "now" and the start of a newly scheduled chunk
    pub const LOOKAHEAD_SECS: f64 = 0.15;
}

pub mod pcm {
    /// Magic bytes of a RIFF/WAV container
    pub const CONTAINER_MAGIC: &[u8; 4] = b"RIFF";

    /// Canonical WAV header length, skipped without parsing
    pub const CONTAINER_HEADER_LEN: usize = 44;
}

pub mod transport {
    /// Default endpoint of the voice agent
    pub const DEFAULT_URL: &str = "ws://127.0.0.1:8000/ws";

    /// Outbound frames allowed in flight before new ones are dropped.
    /// At 256ms per frame, 16 frames = ~4 seconds of audio
    pub const OUTBOUND_QUEUE_DEPTH: usize = 16;
}
