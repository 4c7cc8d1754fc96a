use anyhow::{Context, Result, bail};
use clap::Parser;
use colored::*;
use medcall_client::{
    CallConfig, CallSession, CallState, MediaError, SessionContext, SessionSnapshot,
    SyntheticDevices,
};
use medcall_core::{Participant, Role};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "medcall")]
#[command(about = "Join a consultation room and run a call with synthetic media")]
struct Args {
    /// Room to join.
    #[arg(short, long)]
    room: String,

    /// User id to announce. Falls back to the saved identity.
    #[arg(short, long)]
    user: Option<String>,

    /// Join as the doctor instead of the patient.
    #[arg(long)]
    doctor: bool,

    /// Send the offer after joining instead of waiting for one.
    #[arg(long)]
    start: bool,

    /// Relay base URL, overrides the config file and environment.
    #[arg(long)]
    relay: Option<String>,

    /// JSON file with `CallConfig` fields.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Where the identity is saved between runs.
    #[arg(long, default_value = ".medcall-identity.json")]
    identity: PathBuf,

    /// Hang up after this many seconds.
    #[arg(long)]
    duration: Option<u64>,

    /// Pretend camera/microphone access was refused.
    #[arg(long)]
    deny_media: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => CallConfig::from_json_file(path)?,
        None => CallConfig::default(),
    }
    .with_env_overrides();
    if let Some(relay) = &args.relay {
        config = config.with_relay_url(relay.clone());
    }

    let mut ctx = SessionContext::initialize_from_persisted(&args.identity);
    if let Some(user) = &args.user {
        let role = if args.doctor { Role::Doctor } else { Role::Patient };
        ctx.authenticate(Participant::new(user.clone(), role))
            .with_context(|| format!("Failed to save identity to {}", args.identity.display()))?;
    }
    let Some(participant) = ctx.participant().cloned() else {
        bail!("No identity: pass --user or log in once with it");
    };

    let devices = if args.deny_media {
        SyntheticDevices::denying(MediaError::PermissionDenied)
    } else {
        SyntheticDevices::new()
    };

    println!(
        "{} {} {} {}",
        "📞 Joining".green().bold(),
        args.room.as_str().cyan(),
        "as".green(),
        participant.to_string().as_str().cyan()
    );

    let session = CallSession::spawn(&ctx, args.room.as_str(), config, Arc::new(devices))?;
    session.join().await;
    if args.start {
        session.start_call().await;
    } else {
        session.acquire_media().await;
    }

    println!(
        "{}",
        "Commands: m = toggle mute, v = toggle video, q = hang up".dimmed()
    );

    let mut updates = session.subscribe();
    let mut last = updates.borrow_and_update().clone();
    print_snapshot(&last);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let hang_up = async {
        match args.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(hang_up);

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let next = updates.borrow_and_update().clone();
                if differs(&last, &next) {
                    print_snapshot(&next);
                }
                last = next;
            }
            line = lines.next_line() => {
                match line.context("Failed to read stdin")?.as_deref().map(str::trim) {
                    Some("m") => report_toggle("Microphone", session.toggle_mute().await),
                    Some("v") => report_toggle("Camera", session.toggle_video().await),
                    Some("q") | None => break,
                    Some(_) => {}
                }
            }
            _ = tokio::signal::ctrl_c() => break,
            _ = &mut hang_up => break,
        }
    }

    println!("{}", "👋 Hanging up...".yellow());
    session.shutdown().await;
    println!("{}", "✨ Call ended".green().bold());
    Ok(())
}

fn differs(a: &SessionSnapshot, b: &SessionSnapshot) -> bool {
    a.is_connected != b.is_connected
        || a.is_call_active != b.is_call_active
        || a.connection_state != b.connection_state
        || a.last_error != b.last_error
        || a.remote_stream.is_some() != b.remote_stream.is_some()
}

fn print_snapshot(s: &SessionSnapshot) {
    let label = s.connection_state.to_string();
    let state = match s.connection_state {
        CallState::Connected => label.as_str().green().bold(),
        CallState::Failed => label.as_str().red().bold(),
        CallState::Negotiating | CallState::Disconnected => label.as_str().yellow(),
        _ => label.as_str().normal(),
    };
    println!(
        "   state: {}  relay: {}  in call: {}  remote: {}",
        state,
        yes_no(s.is_connected),
        yes_no(s.is_call_active),
        s.remote_stream
            .as_ref()
            .map(|r| format!("{} tracks", r.tracks().len()))
            .unwrap_or_else(|| "-".to_owned())
    );
    if let Some(err) = &s.last_error {
        println!("   {} {}", "error:".red().bold(), err);
    }
}

fn report_toggle(device: &str, enabled: Option<bool>) {
    match enabled {
        Some(true) => println!("   {} {}", device, "on".green()),
        Some(false) => println!("   {} {}", device, "off".yellow()),
        None => println!("   {} {}", device, "unavailable (no local media)".red()),
    }
}

fn yes_no(flag: bool) -> ColoredString {
    if flag { "yes".green() } else { "no".normal() }
}
