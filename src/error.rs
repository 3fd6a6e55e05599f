use thiserror::Error;

/// Failures while acquiring or running the microphone
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Microphone access denied: {0}")]
    PermissionDenied(String),
    #[error("Input stream error: {0}")]
    Stream(String),
}

/// Failures while unpacking an inbound audio chunk
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Malformed base64 audio: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("PCM payload has odd length ({0} bytes)")]
    OddLength(usize),
    #[error("Audio chunk contains no samples")]
    Empty,
}

/// Failures of the output device
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("No output device available")]
    NoOutputDevice,
    #[error("Output device error: {0}")]
    Device(String),
}

/// Failures of a single enqueue; never fatal to the scheduler
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Output(#[from] AudioError),
}

/// Inbound frames that cannot be turned into a message
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Unparseable server message: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Server message has no type field")]
    MissingKind,
    #[error("Unknown message type: {0}")]
    UnrecognizedKind(String),
}
