use std::sync::Arc;

use medcall_client::model::Participant;
use medcall_client::{CallError, SyntheticDevices};

use crate::integration::init_tracing;
use crate::utils::{SHORT_TIMEOUT, TestRelay, spawn_session};

#[tokio::test]
async fn test_relay_failure_surfaces_transport_error() {
    init_tracing();

    let relay = TestRelay::start().await.expect("Failed to start relay");
    let session = spawn_session(
        &relay,
        "room-drop",
        Participant::patient("patient-1"),
        Arc::new(SyntheticDevices::new()),
    )
    .unwrap();
    session.join().await;
    assert!(relay.wait_for_joined("room-drop", 1, SHORT_TIMEOUT).await);

    relay.fail_room("room-drop").await;

    let dropped = session
        .wait_until(
            |s| !s.is_connected && s.last_error.is_some(),
            SHORT_TIMEOUT,
        )
        .await;
    assert!(dropped);
    assert!(matches!(session.last_error(), Some(CallError::Transport(_))));

    // Nothing to close any more; ending must not send a leave.
    session.end_call().await;
    assert_eq!(relay.received_count("room-drop", "leave_room").await, 0);
}
