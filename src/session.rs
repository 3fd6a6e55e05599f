use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::capture::CaptureSource;
use crate::dispatch::{dispatch_frame, DispatchOutcome};
use crate::display::DisplaySink;
use crate::error::{AudioError, CaptureError};
use crate::playback::{OutputDevice, PlaybackScheduler};
use crate::transport::{Transport, TransportEvent, TransportState};

/// One conversation: owns the transport, the microphone and the playback scheduler.
///
/// Everything except the capture callback runs on the caller's run-loop, so
/// the scheduler is never touched concurrently.
pub struct Session<C, D, S>
where
    C: CaptureSource,
    D: OutputDevice,
    S: DisplaySink,
{
    transport: Transport,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    capture: C,
    scheduler: PlaybackScheduler<D>,
    sink: S,
}

impl<C, D, S> Session<C, D, S>
where
    C: CaptureSource,
    D: OutputDevice,
    S: DisplaySink,
{
    pub fn new(url: impl Into<String>, capture: C, scheduler: PlaybackScheduler<D>, sink: S) -> Self {
        let (transport, events) = Transport::new(url);
        Session {
            transport,
            events,
            capture,
            scheduler,
            sink,
        }
    }

    /// Connect and start streaming microphone frames.
    ///
    /// A refused microphone is returned to the caller and the connection is torn down again.
    pub fn start_recording(&mut self) -> Result<(), CaptureError> {
        if self.capture.is_recording() {
            return Ok(());
        }

        self.transport.start();

        let sender = self.transport.sender();
        // Frames captured before the socket opens are dropped, not queued
        let result = self.capture.start(Box::new(move |chunk| {
            let _ = sender.send(chunk);
        }));

        if let Err(e) = result {
            warn!("✗ Failed to start recording: {}", e);
            self.transport.stop();
            return Err(e);
        }

        info!("✓ Recording started");
        Ok(())
    }

    pub fn stop_recording(&mut self) {
        self.capture.stop();
        self.transport.stop();
    }

    /// Start if idle, stop if recording. Returns whether recording afterwards.
    pub fn toggle_recording(&mut self) -> Result<bool, CaptureError> {
        if self.capture.is_recording() {
            self.stop_recording();
            Ok(false)
        } else {
            self.start_recording()?;
            Ok(true)
        }
    }

    pub fn enable_audio(&mut self) -> Result<(), AudioError> {
        self.scheduler.enable_audio()
    }

    /// Clear the chat display; the connection and playback are untouched
    pub fn clear_chat(&mut self) {
        self.sink.clear();
    }

    /// Wait for the next transport event
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    /// Apply one transport event: route frames, react to the connection going away
    pub fn handle_event(&mut self, event: TransportEvent) -> Option<DispatchOutcome> {
        match event {
            TransportEvent::StateChanged(state) => {
                info!("Transport {:?}", state);
                // Check the live state: a queued Closed may belong to an earlier connection
                if self.transport.state() == TransportState::Closed && self.capture.is_recording() {
                    warn!("Connection lost, stopping microphone");
                    self.capture.stop();
                }
                None
            }
            TransportEvent::Frame(raw) => {
                Some(dispatch_frame(&raw, &mut self.sink, &mut self.scheduler))
            }
        }
    }

    pub fn is_recording(&self) -> bool {
        self.capture.is_recording()
    }

    pub fn transport_state(&self) -> TransportState {
        self.transport.state()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn scheduler(&self) -> &PlaybackScheduler<D> {
        &self.scheduler
    }
}

impl<C, D, S> Drop for Session<C, D, S>
where
    C: CaptureSource,
    D: OutputDevice,
    S: DisplaySink,
{
    fn drop(&mut self) {
        self.stop_recording();
    }
}
