use std::sync::Arc;

use medcall_client::model::Participant;
use medcall_client::{CallError, SyntheticDevices};

use crate::integration::init_tracing;
use crate::utils::{SHORT_TIMEOUT, TestRelay, joined_pair, spawn_session};

#[tokio::test]
async fn test_third_participant_gets_relay_error() {
    init_tracing();

    let relay = TestRelay::start().await.expect("Failed to start relay");
    let (doctor, patient) = joined_pair(&relay, "room-full")
        .await
        .expect("Pair did not join");

    let extra = spawn_session(
        &relay,
        "room-full",
        Participant::patient("patient-2"),
        Arc::new(SyntheticDevices::new()),
    )
    .unwrap();
    extra.join().await;

    let rejected = extra
        .wait_until(|s| s.last_error.is_some(), SHORT_TIMEOUT)
        .await;
    assert!(rejected);
    assert_eq!(
        extra.last_error(),
        Some(CallError::Transport("room is full".to_owned()))
    );
    assert_eq!(relay.joined_count("room-full").await, 2);
    assert!(doctor.last_error().is_none());
    assert!(patient.last_error().is_none());

    // Cleanup
    extra.end_call().await;
    patient.end_call().await;
    doctor.end_call().await;
}
