//! WebSocket transport shared by both pipelines.
//!
//! `Disconnected → Connecting → Open → Closing → Closed`. The socket runs in a
//! spawned task; the owner sees state changes and inbound frames as
//! [`TransportEvent`]s. Outbound audio goes through [`AudioSender`], which is
//! safe to call from the real-time capture thread and never blocks.

use futures_util::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, trace, warn};

use crate::constants::transport::OUTBOUND_QUEUE_DEPTH;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Disconnected,
    Connecting,
    Open,
    Closing,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    StateChanged(TransportState),
    /// One inbound text frame (or UTF-8 binary frame), unparsed
    Frame(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// Not open, or the outbound queue is full
    Dropped,
}

struct Link {
    /// Bumped on every start/stop so a superseded socket task cannot touch state
    generation: u64,
    state: TransportState,
    outbound: Option<mpsc::Sender<Vec<u8>>>,
}

struct Shared {
    link: Mutex<Link>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl Shared {
    fn link(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, link: &mut Link, state: TransportState) {
        link.state = state;
        if state == TransportState::Closed {
            link.outbound = None;
        }
        let _ = self.events.send(TransportEvent::StateChanged(state));
    }

    /// Apply a state change reported by the socket task of `generation`
    fn transition(&self, generation: u64, state: TransportState) -> bool {
        let mut link = self.link();
        if link.generation != generation || link.state == state {
            return false;
        }
        self.set_state(&mut link, state);
        true
    }

    fn forward(&self, generation: u64, frame: String) {
        let link = self.link();
        if link.generation == generation && link.state == TransportState::Open {
            let _ = self.events.send(TransportEvent::Frame(frame));
        }
    }
}

pub struct Transport {
    url: String,
    shared: Arc<Shared>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Transport {
    pub fn new(url: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            link: Mutex::new(Link {
                generation: 0,
                state: TransportState::Disconnected,
                outbound: None,
            }),
            events: events_tx,
        });

        let transport = Transport {
            url: url.into(),
            shared,
            shutdown: None,
        };
        (transport, events_rx)
    }

    pub fn state(&self) -> TransportState {
        self.shared.link().state
    }

    /// Handle for sending audio frames from any thread
    pub fn sender(&self) -> AudioSender {
        AudioSender {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn send(&self, chunk: Vec<u8>) -> SendOutcome {
        self.sender().send(chunk)
    }

    /// Begin connecting. Must be called within a tokio runtime.
    pub fn start(&mut self) {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);

        let generation = {
            let mut link = self.shared.link();
            if matches!(link.state, TransportState::Connecting | TransportState::Open) {
                debug!("Transport already {:?}, ignoring start", link.state);
                return;
            }
            link.generation += 1;
            link.outbound = Some(outbound_tx);
            self.shared.set_state(&mut link, TransportState::Connecting);
            link.generation
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown = Some(shutdown_tx);

        tokio::spawn(run_connection(
            self.url.clone(),
            generation,
            Arc::clone(&self.shared),
            outbound_rx,
            shutdown_rx,
        ));
    }

    /// Force `Closing → Closed` from any state. Calling it again does nothing.
    pub fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            // The socket task finishes the close handshake on its own
            let _ = shutdown.send(());
        }

        let mut link = self.shared.link();
        if link.state == TransportState::Closed {
            return;
        }
        link.generation += 1;
        self.shared.set_state(&mut link, TransportState::Closing);
        self.shared.set_state(&mut link, TransportState::Closed);
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Cloneable, non-blocking outbound handle
#[derive(Clone)]
pub struct AudioSender {
    shared: Arc<Shared>,
}

impl AudioSender {
    /// Queue one binary frame. Frames sent while not open are discarded, not buffered.
    pub fn send(&self, chunk: Vec<u8>) -> SendOutcome {
        let link = self.shared.link();
        if link.state != TransportState::Open {
            trace!("Dropping {} byte frame, transport {:?}", chunk.len(), link.state);
            return SendOutcome::Dropped;
        }
        let Some(outbound) = &link.outbound else {
            return SendOutcome::Dropped;
        };

        match outbound.try_send(chunk) {
            Ok(()) => SendOutcome::Sent,
            Err(TrySendError::Full(chunk)) => {
                warn!("⚠️  Outbound queue full, dropping {} byte frame", chunk.len());
                SendOutcome::Dropped
            }
            Err(TrySendError::Closed(_)) => SendOutcome::Dropped,
        }
    }
}

async fn run_connection(
    url: String,
    generation: u64,
    shared: Arc<Shared>,
    mut outbound: mpsc::Receiver<Vec<u8>>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let ws = tokio::select! {
        result = connect_async(url.as_str()) => match result {
            Ok((ws, _response)) => ws,
            Err(e) => {
                error!("⚠️  WebSocket error connecting to {}: {}", url, e);
                shared.transition(generation, TransportState::Closed);
                return;
            }
        },
        _ = &mut shutdown => {
            debug!("Connection attempt to {} abandoned", url);
            return;
        }
    };

    if !shared.transition(generation, TransportState::Open) {
        // Stopped while the handshake was in flight
        return;
    }
    info!("✅ WebSocket connected to {}", url);

    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                if let Err(e) = write.send(Message::Close(None)).await {
                    debug!("Close handshake failed: {}", e);
                }
                break;
            }
            Some(chunk) = outbound.recv() => {
                if let Err(e) = write.send(Message::Binary(chunk)).await {
                    error!("⚠️  WebSocket send failed: {}", e);
                    break;
                }
            }
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => shared.forward(generation, text),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => shared.forward(generation, text),
                    Err(e) => warn!("Dropping non-UTF-8 binary frame ({} bytes)", e.as_bytes().len()),
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {} // ping/pong are answered by tungstenite
                Some(Err(e)) => {
                    error!("⚠️  WebSocket error: {}", e);
                    break;
                }
            },
        }
    }

    info!("❌ WebSocket closed");
    shared.transition(generation, TransportState::Closed);
}
