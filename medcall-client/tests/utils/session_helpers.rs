use anyhow::{Context, Result, bail};
use std::sync::Arc;
use std::time::Duration;

use medcall_client::model::Participant;
use medcall_client::{
    CallConfig, CallSession, CallState, MediaDevices, SessionContext, SyntheticDevices,
};

use crate::utils::TestRelay;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
pub const SHORT_TIMEOUT: Duration = Duration::from_secs(5);

/// Host-only config pointed at the test relay.
pub fn local_config(relay: &TestRelay) -> CallConfig {
    CallConfig::default()
        .with_relay_url(relay.url())
        .with_ice_servers(vec![])
        .with_loopback_candidates(true)
}

pub fn spawn_session(
    relay: &TestRelay,
    room: &str,
    participant: Participant,
    devices: Arc<dyn MediaDevices>,
) -> Result<CallSession> {
    spawn_session_with(local_config(relay), room, participant, devices)
}

pub fn spawn_session_with(
    config: CallConfig,
    room: &str,
    participant: Participant,
    devices: Arc<dyn MediaDevices>,
) -> Result<CallSession> {
    let mut ctx = SessionContext::new();
    ctx.authenticate(participant)?;
    CallSession::spawn(&ctx, room, config, devices).context("Failed to spawn call session")
}

/// Doctor and patient in `room`, both joined, the doctor holding media so
/// its tracks go out with the answer.
pub async fn joined_pair(relay: &TestRelay, room: &str) -> Result<(CallSession, CallSession)> {
    let doctor = spawn_session(
        relay,
        room,
        Participant::doctor("doctor-1"),
        Arc::new(SyntheticDevices::new()),
    )?;
    let patient = spawn_session(
        relay,
        room,
        Participant::patient("patient-1"),
        Arc::new(SyntheticDevices::new()),
    )?;

    doctor.join().await;
    patient.join().await;
    if !relay.wait_for_joined(room, 2, SHORT_TIMEOUT).await {
        bail!("relay never saw both participants join {room}");
    }
    doctor.acquire_media().await;
    Ok((doctor, patient))
}

/// Patient offers and both sides reach `Connected`.
pub async fn connect_pair(relay: &TestRelay, room: &str) -> Result<(CallSession, CallSession)> {
    let (doctor, patient) = joined_pair(relay, room).await?;
    patient.start_call().await;

    wait_for_state(&patient, CallState::Connected, CONNECT_TIMEOUT)
        .await
        .context("patient never connected")?;
    wait_for_state(&doctor, CallState::Connected, CONNECT_TIMEOUT)
        .await
        .context("doctor never connected")?;
    Ok((doctor, patient))
}

pub async fn wait_for_state(
    session: &CallSession,
    state: CallState,
    timeout: Duration,
) -> Result<()> {
    if session
        .wait_until(|s| s.connection_state == state, timeout)
        .await
    {
        return Ok(());
    }
    bail!(
        "expected {state}, still {} (last error: {:?})",
        session.connection_state(),
        session.last_error()
    )
}
