//! piped-sync: keep subscriptions and playlists in sync across Piped
//! servers.
//!
//! One invocation runs one pass: load the baseline, diff every configured
//! server against it, queue corrective actions, apply them everywhere else,
//! and persist the new baseline.

use anyhow::{bail, Result};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use piped_sync::config::Config;
use piped_sync::piped::{PipedSession, ServerApi};
use piped_sync::reconcile::Reconciler;
use piped_sync::state::SyncState;

const USAGE: &str = "Usage: piped-sync [--config <path>] [--state <path>] [--dry-run]

Options:
  --config <path>  Configuration file (default: ./config.toml, then the
                   user config directory)
  --state <path>   State file (default: from config, then ./state.json)
  --dry-run        Log mutating calls instead of sending them
  -h, --help       Show this help";

struct CliArgs {
    config: Option<PathBuf>,
    state: Option<PathBuf>,
    dry_run: bool,
}

fn parse_args() -> Result<CliArgs> {
    let mut args = CliArgs {
        config: None,
        state: None,
        dry_run: false,
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => match iter.next() {
                Some(value) => args.config = Some(PathBuf::from(value)),
                None => bail!("--config requires a path\n{USAGE}"),
            },
            "--state" => match iter.next() {
                Some(value) => args.state = Some(PathBuf::from(value)),
                None => bail!("--state requires a path\n{USAGE}"),
            },
            "--dry-run" => args.dry_run = true,
            "-h" | "--help" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            other => bail!("Unknown argument {other}\n{USAGE}"),
        }
    }

    Ok(args)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = parse_args()?;
    let config = Config::load(args.config.as_deref())?;
    let dry_run = args.dry_run || config.dry_run;

    if config.servers.is_empty() {
        tracing::warn!("No servers configured, nothing to sync");
        return Ok(());
    }
    if dry_run {
        tracing::info!("Dry run: mutating calls will be logged, not sent");
    }

    let state_path = args
        .state
        .or_else(|| config.state_path.clone().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("state.json"));
    let state = SyncState::load(&state_path)?;

    let mut sessions: Vec<Box<dyn ServerApi>> = Vec::new();
    for server in &config.servers {
        let mut session = PipedSession::new(&server.url, dry_run)?;
        // A server that rejects the login keeps its slot so pending actions
        // stay addressed to the right index; its calls fail until the next
        // run reaches it again.
        if let Err(e) = session.login(&server.username, &server.password).await {
            tracing::warn!("Login failed on {}: {}", server.url, e);
        }
        sessions.push(Box::new(session));
    }

    let new_state = Reconciler::new(state, sessions).run().await;

    if dry_run {
        tracing::info!("Dry run: not writing {}", state_path.display());
    } else {
        new_state.save(&state_path)?;
        tracing::info!("Sync finished, state written to {}", state_path.display());
    }
    Ok(())
}
