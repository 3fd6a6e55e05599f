// Library exports for the binary and tests
pub mod capture;
pub mod config;
pub mod constants;
pub mod dispatch;
pub mod display;
pub mod error;
pub mod output;
pub mod pcm;
pub mod playback;
pub mod protocol;
pub mod session;
pub mod transport;
