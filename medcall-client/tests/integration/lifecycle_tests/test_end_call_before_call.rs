use std::sync::Arc;

use medcall_client::model::Participant;
use medcall_client::{CallState, SyntheticDevices};

use crate::integration::init_tracing;
use crate::utils::{SHORT_TIMEOUT, TestRelay, spawn_session};

#[tokio::test]
async fn test_end_call_in_new_state_closes_cleanly() {
    init_tracing();

    let relay = TestRelay::start().await.expect("Failed to start relay");
    let devices = Arc::new(SyntheticDevices::new());
    let session = spawn_session(
        &relay,
        "room-d",
        Participant::doctor("doctor-1"),
        devices.clone(),
    )
    .unwrap();

    session.join().await;
    assert!(session.is_connected());
    assert_eq!(session.connection_state(), CallState::New);

    session.end_call().await;

    assert!(!session.is_connected());
    assert!(!session.is_call_active());
    assert_eq!(session.connection_state(), CallState::Closed);
    assert!(session.last_error().is_none());
    assert!(session.local_stream().is_none());
    assert_eq!(devices.opened_count(), 0);

    assert!(relay.wait_for_joined("room-d", 0, SHORT_TIMEOUT).await);
    assert_eq!(relay.received_count("room-d", "leave_room").await, 1);
}

#[tokio::test]
async fn test_end_call_without_join_is_harmless() {
    init_tracing();

    let relay = TestRelay::start().await.expect("Failed to start relay");
    let session = spawn_session(
        &relay,
        "room-unjoined",
        Participant::patient("patient-1"),
        Arc::new(SyntheticDevices::new()),
    )
    .unwrap();

    session.end_call().await;

    assert!(!session.is_connected());
    assert!(session.last_error().is_none());
    assert_eq!(relay.received_count("room-unjoined", "leave_room").await, 0);
    session.shutdown().await;
}
