//! Call Lifecycle Integration Tests
//!
//! Drives whole calls through the controller and the audio bridge with an
//! in-process carrier on the other end of the media stream.

mod common;

use callwire::application::CallbackOutcome;
use callwire::domain::call::{CallEvent, CallState, EndReason, Speaker};
use callwire::domain::shared::{CallError, CallId};
use callwire::infrastructure::media::{CarrierEnd, ChannelTransport, OutboundMessage};
use common::{utterance_frames, Harness, HarnessOptions};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_test::{assert_err, assert_ok};

async fn bridge_call(harness: &Harness, call_id: &CallId) -> (CarrierEnd, JoinHandle<()>) {
    assert_ok!(harness.controller.handle_status_callback(call_id, "ringing").await);
    let (transport, carrier) = ChannelTransport::pair(format!("MZ-{}", call_id), 64);
    let handle = assert_ok!(harness.bridge.attach(call_id, transport).await);
    (carrier, handle)
}

async fn speak(carrier: &CarrierEnd) {
    for frame in utterance_frames() {
        carrier.send_media(frame).await.unwrap();
    }
}

/// Collect outbound messages until a mark arrives; returns the media count and the mark
async fn until_mark(carrier: &mut CarrierEnd) -> (usize, String) {
    let mut media = 0;
    loop {
        let message = tokio::time::timeout(Duration::from_secs(3), carrier.sent.recv())
            .await
            .expect("no mark from the bridge")
            .expect("bridge closed the stream");
        match message {
            OutboundMessage::Media { .. } => media += 1,
            OutboundMessage::Mark { mark, .. } => return (media, mark.name),
            OutboundMessage::Clear { .. } => {}
        }
    }
}

#[tokio::test]
async fn test_full_conversation() {
    let harness = Harness::with_options(HarnessOptions {
        greeting: Some("Hi, this is Ava."),
        ..Default::default()
    });
    let mut events = harness.events.subscribe();
    harness.script(&["I would like to book a table"]);

    let call_id = harness.place_call().await;
    let (mut carrier, handle) = bridge_call(&harness, &call_id).await;
    assert_eq!(harness.state(&call_id).await, CallState::Bridged);

    // greeting goes out before anything else
    let (media, mark) = until_mark(&mut carrier).await;
    assert_eq!(media, 3);
    assert_eq!(mark, "turn-0");

    speak(&carrier).await;
    let transcript = harness.wait_for_transcript(&call_id, 3).await;
    assert_eq!(transcript[0].speaker, Speaker::Agent);
    assert_eq!(transcript[0].text, "Hi, this is Ava.");
    assert_eq!(transcript[1].speaker, Speaker::Caller);
    assert_eq!(transcript[1].text, "I would like to book a table");
    assert_eq!(transcript[2].speaker, Speaker::Agent);
    assert_eq!(transcript[2].text, "You said: I would like to book a table");

    let (media, mark) = until_mark(&mut carrier).await;
    assert_eq!(media, 3);
    assert_eq!(mark, "turn-1");

    // the callee hangs up
    let outcome = assert_ok!(harness.controller.handle_status_callback(&call_id, "completed").await);
    assert_eq!(
        outcome,
        CallbackOutcome::Applied {
            from: CallState::Bridged,
            to: CallState::Ending
        }
    );
    tokio::time::timeout(Duration::from_secs(3), handle)
        .await
        .expect("media loop did not stop")
        .unwrap();
    harness.wait_for_state(&call_id, CallState::Terminated).await;

    let snapshot = harness.registry.get(&call_id).await.unwrap();
    assert_eq!(snapshot.end_reason, Some(EndReason::Completed));
    assert!(!snapshot.has_transport());
    assert!(!snapshot.synthesis_active);
    assert_eq!(
        harness.transcriber.released.lock().unwrap().as_slice(),
        &[call_id.clone()]
    );

    let summary = loop {
        match events.recv().await.unwrap() {
            CallEvent::Ended(summary) => break summary,
            _ => continue,
        }
    };
    assert_eq!(summary.call_id, call_id);
    assert_eq!(summary.final_state, CallState::Terminated);
    assert_eq!(summary.transcript.len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_hangup_races_carrier_completion() {
    for _ in 0..20 {
        let harness = Arc::new(Harness::new());
        let call_id = harness.place_call().await;
        let (_carrier, handle) = bridge_call(&harness, &call_id).await;

        let ending = {
            let harness = harness.clone();
            let call_id = call_id.clone();
            tokio::spawn(async move { harness.controller.end_call(&call_id).await })
        };
        let completed = {
            let harness = harness.clone();
            let call_id = call_id.clone();
            tokio::spawn(async move {
                harness
                    .controller
                    .handle_status_callback(&call_id, "completed")
                    .await
            })
        };
        let (ending, completed) = (ending.await.unwrap(), completed.await.unwrap());

        // exactly one of them moved the call to Ending
        match (&ending, &completed) {
            (Ok(()), Err(CallError::AlreadyTerminal(_))) => {}
            (Err(CallError::AlreadyTerminal(_)), Ok(CallbackOutcome::Applied { .. })) => {}
            other => panic!("unexpected race outcome: {:?}", other),
        }

        handle.await.unwrap();
        harness.wait_for_state(&call_id, CallState::Terminated).await;
        let reason = harness.registry.get(&call_id).await.unwrap().end_reason;
        assert!(matches!(
            reason,
            Some(EndReason::HungUp) | Some(EndReason::Completed)
        ));
    }
}

#[tokio::test]
async fn test_attach_requires_waiting_session() {
    let harness = Harness::new();

    let (transport, _carrier) = ChannelTransport::pair("MZ-unknown", 8);
    let err = assert_err!(harness.bridge.attach(&CallId::new("CA-unknown"), transport).await);
    assert!(matches!(err, CallError::SessionNotFound(_)));

    let call_id = harness.place_call().await;
    let (_carrier, _handle) = bridge_call(&harness, &call_id).await;

    let (second, _second_carrier) = ChannelTransport::pair("MZ-second", 8);
    let err = assert_err!(harness.bridge.attach(&call_id, second).await);
    assert!(matches!(err, CallError::SessionNotFound(_)));
    assert_eq!(
        harness.registry.get(&call_id).await.unwrap().stream_sid.as_deref(),
        Some(format!("MZ-{}", call_id).as_str())
    );
}

#[tokio::test]
async fn test_media_arriving_before_ringing_callback() {
    let harness = Harness::new();
    let call_id = harness.place_call().await;

    let (transport, carrier) = ChannelTransport::pair("MZ-early", 8);
    let handle = assert_ok!(harness.bridge.attach(&call_id, transport).await);
    assert_eq!(harness.state(&call_id).await, CallState::Bridged);

    // the late ringing callback changes nothing
    let outcome = assert_ok!(harness.controller.handle_status_callback(&call_id, "ringing").await);
    assert_eq!(outcome, CallbackOutcome::Unchanged(CallState::Bridged));

    carrier.stop().await.unwrap();
    handle.await.unwrap();
    harness.wait_for_state(&call_id, CallState::Terminated).await;
    assert_eq!(
        harness.registry.get(&call_id).await.unwrap().end_reason,
        Some(EndReason::TransportClosed)
    );
}

#[tokio::test]
async fn test_degraded_upstreams_keep_call_alive() {
    let harness = Harness::with_options(HarnessOptions {
        greeting: Some("Hello!"),
        ..Default::default()
    });
    harness.synthesizer.down.store(true, Ordering::SeqCst);
    harness.script(&["can you hear me"]);

    let call_id = harness.place_call().await;
    let (carrier, handle) = bridge_call(&harness, &call_id).await;

    speak(&carrier).await;
    let transcript = harness.wait_for_transcript(&call_id, 3).await;
    assert_eq!(transcript[1].text, "can you hear me");
    assert_eq!(transcript[2].text, "You said: can you hear me");
    assert_eq!(harness.state(&call_id).await, CallState::Bridged);

    // transcription goes away too; the caller still gets a turn
    harness.transcriber.down.store(true, Ordering::SeqCst);
    speak(&carrier).await;
    let transcript = harness.wait_for_transcript(&call_id, 4).await;
    assert_eq!(transcript[3].speaker, Speaker::Caller);
    assert!(transcript[3].text.is_empty());
    assert_eq!(harness.state(&call_id).await, CallState::Bridged);

    assert_ok!(harness.controller.end_call(&call_id).await);
    handle.await.unwrap();
    harness.wait_for_state(&call_id, CallState::Terminated).await;
    assert_eq!(
        harness.gateway.hung_up.lock().unwrap().as_slice(),
        &[call_id.clone()]
    );
}

#[tokio::test]
async fn test_unanswered_media_stream_times_out() {
    let harness = Harness::with_options(HarnessOptions {
        attach_timeout: Duration::from_millis(100),
        ..Default::default()
    });
    let call_id = harness.place_call().await;
    assert_ok!(harness.controller.handle_status_callback(&call_id, "ringing").await);

    harness.wait_for_state(&call_id, CallState::Failed).await;
    assert_eq!(
        harness.registry.get(&call_id).await.unwrap().end_reason,
        Some(EndReason::TransportAttachTimeout)
    );
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        harness.gateway.hung_up.lock().unwrap().as_slice(),
        &[call_id.clone()]
    );

    let (transport, _carrier) = ChannelTransport::pair("MZ-late", 8);
    assert_err!(harness.bridge.attach(&call_id, transport).await);
}

#[tokio::test]
async fn test_finished_sessions_are_swept() {
    let harness = Harness::with_options(HarnessOptions {
        grace: Duration::ZERO,
        ..Default::default()
    });
    let finished = harness.place_call().await;
    let live = harness.place_call().await;

    // never rang, so hanging up fails it outright
    assert_ok!(harness.controller.end_call(&finished).await);
    assert_eq!(harness.state(&finished).await, CallState::Failed);

    let swept = harness
        .registry
        .sweep_at(chrono::Utc::now() + chrono::Duration::seconds(1))
        .await;
    assert_eq!(swept, vec![finished.clone()]);
    assert!(harness.registry.get(&finished).await.is_none());
    assert_eq!(harness.state(&live).await, CallState::Initiating);

    let err = assert_err!(harness.controller.end_call(&finished).await);
    assert!(matches!(err, CallError::CallNotFound(_)));
}

#[tokio::test]
async fn test_early_status_callback_is_replayed() {
    let harness = Harness::new();

    // the carrier numbers its calls CA000..001, CA000..002, ...
    let upcoming = CallId::new(format!("CA{:032}", 1));
    let outcome = assert_ok!(harness.controller.handle_status_callback(&upcoming, "ringing").await);
    assert_eq!(outcome, CallbackOutcome::Parked);

    let call_id = harness.place_call().await;
    assert_eq!(call_id, upcoming);
    assert_eq!(harness.state(&call_id).await, CallState::Ringing);
}
