use std::sync::Arc;

use medcall_client::model::Participant;
use medcall_client::{CallState, SyntheticDevices};

use crate::integration::init_tracing;
use crate::utils::{SHORT_TIMEOUT, TestRelay, spawn_session};

#[tokio::test]
async fn test_release_media_stops_tracks_and_keeps_room() {
    init_tracing();

    let relay = TestRelay::start().await.expect("Failed to start relay");
    let devices = Arc::new(SyntheticDevices::new());
    let session = spawn_session(
        &relay,
        "room-release",
        Participant::doctor("doctor-1"),
        devices.clone(),
    )
    .unwrap();

    session.join().await;
    assert!(relay.wait_for_joined("room-release", 1, SHORT_TIMEOUT).await);
    session.acquire_media().await;
    let stream = session.local_stream().expect("no local media");

    assert!(session.release_media().await);

    assert!(session.local_stream().is_none());
    assert!(stream.tracks().iter().all(|t| t.is_stopped()));
    assert!(session.is_connected());
    assert_eq!(session.connection_state(), CallState::New);
    assert!(session.last_error().is_none());
    assert_eq!(relay.received_count("room-release", "leave_room").await, 0);

    // Nothing left to release.
    assert!(!session.release_media().await);

    // Media can be acquired again afterwards.
    session.acquire_media().await;
    assert!(session.local_stream().is_some_and(|s| s.id() != stream.id()));
    assert_eq!(devices.opened_count(), 4);

    // Cleanup
    session.end_call().await;
}
