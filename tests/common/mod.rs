// Shared fakes for integration tests
#![allow(dead_code)]

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, WebSocketStream};

use voice_stream::capture::{CaptureSource, FrameCallback};
use voice_stream::error::{AudioError, CaptureError};
use voice_stream::pcm;
use voice_stream::playback::{OutputDevice, PlaybackScheduler};
use voice_stream::transport::{TransportEvent, TransportState};

pub const LOOKAHEAD: f64 = 0.15;
pub const RATE: u32 = 44100;

/// Manually driven device clock
#[derive(Clone, Default)]
pub struct FakeClock(Arc<Mutex<f64>>);

impl FakeClock {
    pub fn now(&self) -> f64 {
        *self.0.lock().unwrap()
    }

    pub fn set(&self, t: f64) {
        *self.0.lock().unwrap() = t;
    }

    pub fn advance(&self, dt: f64) {
        *self.0.lock().unwrap() += dt;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scheduled {
    pub start_time: f64,
    pub samples: usize,
    /// Device clock at the moment the buffer was handed over
    pub now: f64,
}

pub struct FakeDevice {
    clock: FakeClock,
    scheduled: Arc<Mutex<Vec<Scheduled>>>,
    resumed: Arc<Mutex<usize>>,
}

impl OutputDevice for FakeDevice {
    fn current_time(&self) -> f64 {
        self.clock.now()
    }

    fn schedule_buffer(&mut self, samples: Vec<f32>, start_time: f64) {
        self.scheduled.lock().unwrap().push(Scheduled {
            start_time,
            samples: samples.len(),
            now: self.clock.now(),
        });
    }

    fn resume(&mut self) -> Result<(), AudioError> {
        *self.resumed.lock().unwrap() += 1;
        Ok(())
    }
}

/// Observes every device a scheduler opens
#[derive(Clone, Default)]
pub struct Harness {
    pub clock: FakeClock,
    pub scheduled: Arc<Mutex<Vec<Scheduled>>>,
    pub opened: Arc<Mutex<usize>>,
    pub resumed: Arc<Mutex<usize>>,
    /// Number of upcoming device opens that fail
    pub failures: Arc<Mutex<usize>>,
}

impl Harness {
    pub fn scheduler(&self) -> PlaybackScheduler<FakeDevice> {
        let harness = self.clone();
        PlaybackScheduler::new(
            RATE,
            LOOKAHEAD,
            Box::new(move |rate| {
                assert_eq!(rate, RATE);
                let mut failures = harness.failures.lock().unwrap();
                if *failures > 0 {
                    *failures -= 1;
                    return Err(AudioError::NoOutputDevice);
                }
                *harness.opened.lock().unwrap() += 1;
                Ok(FakeDevice {
                    clock: harness.clock.clone(),
                    scheduled: Arc::clone(&harness.scheduled),
                    resumed: Arc::clone(&harness.resumed),
                })
            }),
        )
    }

    pub fn scheduled(&self) -> Vec<Scheduled> {
        self.scheduled.lock().unwrap().clone()
    }

    pub fn opened(&self) -> usize {
        *self.opened.lock().unwrap()
    }

    pub fn resumed(&self) -> usize {
        *self.resumed.lock().unwrap()
    }
}

/// Base64 PCM16 silence of `ms` milliseconds at 44.1kHz
pub fn silent_chunk(ms: usize) -> String {
    let samples = vec![0.0f32; RATE as usize * ms / 1000];
    pcm::encode_base64_chunk(&pcm::encode_float_to_pcm16(&samples))
}

pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

/// Microphone stand-in; the test pushes frames through the handle
#[derive(Clone, Default)]
pub struct MicHandle(Arc<Mutex<Option<FrameCallback>>>);

impl MicHandle {
    /// Deliver one encoded frame as if from the audio thread
    pub fn push(&self, chunk: Vec<u8>) -> bool {
        match self.0.lock().unwrap().as_mut() {
            Some(callback) => {
                callback(chunk);
                true
            }
            None => false,
        }
    }
}

pub struct FakeMic {
    pub handle: MicHandle,
    pub deny: bool,
}

impl FakeMic {
    pub fn new() -> (Self, MicHandle) {
        let handle = MicHandle::default();
        (FakeMic { handle: handle.clone(), deny: false }, handle)
    }

    pub fn denied() -> Self {
        FakeMic { handle: MicHandle::default(), deny: true }
    }
}

impl CaptureSource for FakeMic {
    fn start(&mut self, on_frame_encoded: FrameCallback) -> Result<(), CaptureError> {
        if self.deny {
            return Err(CaptureError::PermissionDenied("denied by test".to_string()));
        }
        *self.handle.0.lock().unwrap() = Some(on_frame_encoded);
        Ok(())
    }

    fn stop(&mut self) {
        self.handle.0.lock().unwrap().take();
    }

    fn is_recording(&self) -> bool {
        self.handle.0.lock().unwrap().is_some()
    }
}

/// Accept a single WebSocket client on an ephemeral port and hand it to `handler`
pub async fn serve_once<F, Fut>(handler: F) -> String
where
    F: FnOnce(WebSocketStream<TcpStream>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        handler(ws).await;
    });
    format!("ws://{}", addr)
}

/// A URL nothing listens on
pub async fn dead_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("ws://{}", addr)
}

pub async fn recv_event(events: &mut mpsc::UnboundedReceiver<TransportEvent>) -> TransportEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for transport event")
        .expect("transport event channel closed")
}

/// Skip events until the given state shows up
pub async fn wait_for_state(
    events: &mut mpsc::UnboundedReceiver<TransportEvent>,
    wanted: TransportState,
) {
    loop {
        if recv_event(events).await == TransportEvent::StateChanged(wanted) {
            return;
        }
    }
}
