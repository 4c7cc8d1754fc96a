use std::sync::Arc;

use medcall_client::model::Participant;
use medcall_client::{CallState, SyntheticDevices};

use crate::integration::init_tracing;
use crate::utils::{SHORT_TIMEOUT, TestRelay, spawn_session};

#[tokio::test]
async fn test_repeated_end_call_sends_one_leave_and_releases_once() {
    init_tracing();

    let relay = TestRelay::start().await.expect("Failed to start relay");
    let session = spawn_session(
        &relay,
        "room-twice",
        Participant::patient("patient-1"),
        Arc::new(SyntheticDevices::new()),
    )
    .unwrap();

    session.join().await;
    session.acquire_media().await;
    let stream = session.local_stream().expect("media was not acquired");

    session.end_call().await;
    session.end_call().await;
    session.end_call().await;

    assert!(stream.tracks().iter().all(|t| t.is_stopped()));
    // A track stops at most once.
    assert!(stream.tracks().iter().all(|t| !t.stop()));
    assert!(session.local_stream().is_none());
    assert_eq!(session.connection_state(), CallState::Closed);
    assert!(session.last_error().is_none());

    assert!(relay.wait_for_joined("room-twice", 0, SHORT_TIMEOUT).await);
    assert_eq!(relay.received_count("room-twice", "leave_room").await, 1);
}

#[tokio::test]
async fn test_rejoin_after_end_call_opens_new_channel() {
    init_tracing();

    let relay = TestRelay::start().await.expect("Failed to start relay");
    let session = spawn_session(
        &relay,
        "room-rejoin",
        Participant::doctor("doctor-1"),
        Arc::new(SyntheticDevices::new()),
    )
    .unwrap();

    session.join().await;
    session.end_call().await;
    session.join().await;

    assert!(session.is_connected());
    assert_eq!(session.connection_state(), CallState::New);
    assert!(relay.wait_for_joined("room-rejoin", 1, SHORT_TIMEOUT).await);
    assert_eq!(relay.received_count("room-rejoin", "join_room").await, 2);

    session.shutdown().await;
    assert!(relay.wait_for_joined("room-rejoin", 0, SHORT_TIMEOUT).await);
}
