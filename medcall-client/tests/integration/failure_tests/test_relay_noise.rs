use std::sync::Arc;

use medcall_client::model::Participant;
use medcall_client::{CallError, CallState, SyntheticDevices};

use crate::integration::init_tracing;
use crate::utils::{SHORT_TIMEOUT, TestRelay, spawn_session};

#[tokio::test]
async fn test_unparseable_frames_do_not_break_the_channel() {
    init_tracing();

    let relay = TestRelay::start().await.expect("Failed to start relay");
    let session = spawn_session(
        &relay,
        "room-noise",
        Participant::doctor("doctor-1"),
        Arc::new(SyntheticDevices::new()),
    )
    .unwrap();
    session.join().await;

    relay.inject("room-noise", "server restarting in 5").await;
    relay.inject("room-noise", r#"{"type":"typing"}"#).await;
    relay
        .inject(
            "room-noise",
            r#"{"type":"rtc_signal","signal_type":"answer","payload":42}"#,
        )
        .await;
    // A well-formed frame behind the noise proves the reader kept going.
    relay
        .inject(
            "room-noise",
            r#"{"type":"error","message":"maintenance window"}"#,
        )
        .await;

    let saw_error = session
        .wait_until(|s| s.last_error.is_some(), SHORT_TIMEOUT)
        .await;
    assert!(saw_error);
    assert_eq!(
        session.last_error(),
        Some(CallError::Transport("maintenance window".to_owned()))
    );
    assert!(session.is_connected());
    assert_eq!(session.connection_state(), CallState::New);

    // Cleanup
    session.end_call().await;
}
