use tracing::{debug, error, warn};

use crate::display::{Direction, DisplaySink};
use crate::error::ProtocolError;
use crate::playback::{OutputDevice, PlaybackScheduler, ScheduledChunk};
use crate::protocol::{parse_inbound, InboundMessage};

/// What happened to one inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Displayed(Direction),
    Scheduled(ScheduledChunk),
    Dropped,
}

/// Parse a raw frame and route it. Every failure is logged here and never propagates.
pub fn dispatch_frame<S, D>(
    raw: &str,
    sink: &mut S,
    scheduler: &mut PlaybackScheduler<D>,
) -> DispatchOutcome
where
    S: DisplaySink,
    D: OutputDevice,
{
    match parse_inbound(raw) {
        Ok(message) => dispatch(message, sink, scheduler),
        Err(ProtocolError::UnrecognizedKind(kind)) => {
            warn!("Unknown message type: {}", kind);
            DispatchOutcome::Dropped
        }
        Err(e) => {
            error!("Failed to parse server message: {} ({} bytes)", e, raw.len());
            DispatchOutcome::Dropped
        }
    }
}

/// Route a parsed message: text to the sink, audio to the scheduler
pub fn dispatch<S, D>(
    message: InboundMessage,
    sink: &mut S,
    scheduler: &mut PlaybackScheduler<D>,
) -> DispatchOutcome
where
    S: DisplaySink,
    D: OutputDevice,
{
    match message {
        InboundMessage::Transcript { text } => {
            debug!("you: {:?}", text);
            sink.display(&text, Direction::Sent);
            DispatchOutcome::Displayed(Direction::Sent)
        }
        InboundMessage::AiResponse { text } => {
            debug!("voice_agent: {:?}", text);
            sink.display(&text, Direction::Received);
            DispatchOutcome::Displayed(Direction::Received)
        }
        InboundMessage::AudioChunk { audio } => {
            debug!("🎵 Received audio chunk ({} chars)", audio.len());
            match scheduler.enqueue(&audio) {
                Ok(chunk) => DispatchOutcome::Scheduled(chunk),
                Err(e) => {
                    error!("❌ Audio playback error: {}", e);
                    DispatchOutcome::Dropped
                }
            }
        }
    }
}
