mod common;

use common::{dead_url, serve_once, silent_chunk, FakeDevice, FakeMic, Harness};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use voice_stream::dispatch::DispatchOutcome;
use voice_stream::display::{ChatEntry, ChatLog, Direction};
use voice_stream::error::CaptureError;
use voice_stream::session::Session;
use voice_stream::transport::{TransportEvent, TransportState};

type TestSession = Session<FakeMic, FakeDevice, ChatLog>;

/// Handle events until `done` holds, collecting dispatch outcomes
async fn pump_until(
    session: &mut TestSession,
    mut done: impl FnMut(&TestSession) -> bool,
) -> Vec<DispatchOutcome> {
    let mut outcomes = Vec::new();
    while !done(session) {
        let event = tokio::time::timeout(Duration::from_secs(5), session.next_event())
            .await
            .expect("timed out waiting for session event")
            .expect("event channel closed");
        if let Some(outcome) = session.handle_event(event) {
            outcomes.push(outcome);
        }
    }
    outcomes
}

#[tokio::test]
async fn test_denied_microphone_tears_down_connection() {
    let harness = Harness::default();
    let mut session = Session::new(dead_url().await, FakeMic::denied(), harness.scheduler(), ChatLog::new());

    let result = session.start_recording();
    assert!(matches!(result, Err(CaptureError::PermissionDenied(_))));
    assert!(!session.is_recording());
    assert_eq!(session.transport_state(), TransportState::Closed);
}

#[tokio::test]
async fn test_microphone_frames_reach_server_once_open() {
    let (got_tx, got_rx) = oneshot::channel();
    let url = serve_once(|mut ws| async move {
        while let Some(Ok(message)) = ws.next().await {
            if let Message::Binary(bytes) = message {
                let _ = got_tx.send(bytes);
                break;
            }
        }
    })
    .await;

    let (mic, handle) = FakeMic::new();
    let harness = Harness::default();
    let mut session = Session::new(url, mic, harness.scheduler(), ChatLog::new());

    session.start_recording().unwrap();
    assert!(session.is_recording());

    // Captured before the socket opened: discarded, not queued
    assert!(handle.push(vec![9, 9]));

    pump_until(&mut session, |s| s.transport_state() == TransportState::Open).await;
    assert!(handle.push(vec![1, 2, 3, 4]));

    let received = tokio::time::timeout(Duration::from_secs(5), got_rx)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_server_messages_are_routed() {
    let audio = format!(r#"{{"type":"audio_chunk","audio":"{}"}}"#, silent_chunk(100));
    let url = serve_once(move |mut ws| async move {
        for text in [
            r#"{"type":"transcript","text":"book a table"}"#.to_string(),
            r#"{"type":"bogus"}"#.to_string(),
            r#"{"type":"ai_response","text":"For how many?"}"#.to_string(),
            audio,
        ] {
            ws.send(Message::Text(text)).await.unwrap();
        }
        while let Some(Ok(_)) = ws.next().await {}
    })
    .await;

    let (mic, _handle) = FakeMic::new();
    let harness = Harness::default();
    let mut session = Session::new(url, mic, harness.scheduler(), ChatLog::new());
    session.start_recording().unwrap();

    let mut outcomes = Vec::new();
    while outcomes.len() < 4 {
        let event = tokio::time::timeout(Duration::from_secs(5), session.next_event())
            .await
            .unwrap()
            .unwrap();
        if let Some(outcome) = session.handle_event(event) {
            outcomes.push(outcome);
        }
    }

    assert_eq!(outcomes[0], DispatchOutcome::Displayed(Direction::Sent));
    assert_eq!(outcomes[1], DispatchOutcome::Dropped);
    assert_eq!(outcomes[2], DispatchOutcome::Displayed(Direction::Received));
    assert!(matches!(outcomes[3], DispatchOutcome::Scheduled(_)));

    assert_eq!(
        session.sink().entries(),
        &[
            ChatEntry { text: "book a table".to_string(), direction: Direction::Sent },
            ChatEntry { text: "For how many?".to_string(), direction: Direction::Received },
        ]
    );
    assert_eq!(harness.scheduled().len(), 1);
    assert!(session.scheduler().is_initialized());
}

#[tokio::test]
async fn test_connection_loss_stops_microphone() {
    let url = serve_once(|mut ws| async move {
        ws.close(None).await.unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    })
    .await;

    let (mic, handle) = FakeMic::new();
    let harness = Harness::default();
    let mut session = Session::new(url, mic, harness.scheduler(), ChatLog::new());
    session.start_recording().unwrap();

    pump_until(&mut session, |s| !s.is_recording()).await;

    assert_eq!(session.transport_state(), TransportState::Closed);
    assert!(!handle.push(vec![0, 0]));
}

#[tokio::test]
async fn test_toggle_recording() {
    let url = serve_once(|mut ws| async move {
        while let Some(Ok(_)) = ws.next().await {}
    })
    .await;

    let (mic, _handle) = FakeMic::new();
    let harness = Harness::default();
    let mut session = Session::new(url, mic, harness.scheduler(), ChatLog::new());

    assert!(session.toggle_recording().unwrap());
    assert!(session.is_recording());
    assert_eq!(session.transport_state(), TransportState::Connecting);

    assert!(!session.toggle_recording().unwrap());
    assert!(!session.is_recording());
    assert_eq!(session.transport_state(), TransportState::Closed);
}

#[tokio::test]
async fn test_stale_closed_event_does_not_stop_new_recording() {
    let (mic, _handle) = FakeMic::new();
    let harness = Harness::default();
    let mut session = Session::new(dead_url().await, mic, harness.scheduler(), ChatLog::new());

    // Start, stop and start again before any event is handled
    session.start_recording().unwrap();
    session.stop_recording();
    session.start_recording().unwrap();
    assert_eq!(session.transport_state(), TransportState::Connecting);

    let mut seen = Vec::new();
    for _ in 0..4 {
        let event = tokio::time::timeout(Duration::from_secs(5), session.next_event())
            .await
            .unwrap()
            .unwrap();
        seen.push(event.clone());
        assert_eq!(session.handle_event(event), None);
        assert!(session.is_recording(), "stopped by {:?}", seen.last());
    }

    assert_eq!(
        seen,
        vec![
            TransportEvent::StateChanged(TransportState::Connecting),
            TransportEvent::StateChanged(TransportState::Closing),
            TransportEvent::StateChanged(TransportState::Closed),
            TransportEvent::StateChanged(TransportState::Connecting),
        ]
    );
}

#[tokio::test]
async fn test_clear_chat_empties_display() {
    let url = serve_once(|mut ws| async move {
        ws.send(Message::Text(r#"{"type":"ai_response","text":"Hello!"}"#.to_string()))
            .await
            .unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    })
    .await;

    let (mic, _handle) = FakeMic::new();
    let harness = Harness::default();
    let mut session = Session::new(url, mic, harness.scheduler(), ChatLog::new());
    session.start_recording().unwrap();

    pump_until(&mut session, |s| !s.sink().entries().is_empty()).await;
    session.clear_chat();

    assert!(session.sink().entries().is_empty());
    assert!(session.is_recording());
}

#[tokio::test]
async fn test_enable_audio_opens_output_without_recording() {
    let (mic, _handle) = FakeMic::new();
    let harness = Harness::default();
    let mut session = Session::new(dead_url().await, mic, harness.scheduler(), ChatLog::new());

    session.enable_audio().unwrap();
    assert_eq!(harness.opened(), 1);
    assert_eq!(harness.resumed(), 1);
    assert_eq!(session.transport_state(), TransportState::Disconnected);
}
