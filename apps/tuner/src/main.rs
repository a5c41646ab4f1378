use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::{
    io::{self, BufReader},
    sync::broadcast,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tuner_core::{CalibrationSession, TunerEvent};

mod config;
mod shell;

use config::{load_settings, validate_server_url};

#[derive(Parser, Debug)]
#[command(about = "Live HSV range calibration against a colour-matching server")]
struct Cli {
    /// Overrides the server url from config and environment.
    #[arg(long, global = true)]
    server_url: Option<String>,
    /// Directory that receives the refreshed images.
    #[arg(long, global = true)]
    artifact_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive session reading commands from stdin.
    Shell,
    /// Print the server's current parameters as JSON.
    Snapshot,
    /// Apply one edit and wait until it is delivered.
    Set { key: String, value: i64 },
    /// Save the server's current bounds under a name.
    Commit { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();

    let mut settings = load_settings(cli.config.as_deref())?;
    if let Some(server_url) = cli.server_url {
        settings.server_url = server_url;
    }
    if let Some(artifact_dir) = cli.artifact_dir {
        settings.artifact_dir = Some(artifact_dir);
    }
    let server_url = validate_server_url(&settings.server_url)?;

    let session = CalibrationSession::connect(server_url.as_str(), settings.session_options())
        .context("failed to set up calibration session")?;
    spawn_event_log(&session);

    match cli.command.unwrap_or(Command::Shell) {
        Command::Shell => {
            session.start().await;
            println!("{}", shell::render_view(&session.view()));
            println!("{}", shell::HELP);
            let mut stdout = io::stdout();
            shell::run(&session, BufReader::new(io::stdin()), &mut stdout).await?;
        }
        Command::Snapshot => {
            if session.start().await.is_none() {
                anyhow::bail!("server snapshot unavailable");
            }
            let values = session
                .pairs()
                .iter()
                .flat_map(|pair| [pair.lower_key.clone(), pair.upper_key.clone()])
                .filter_map(|key| {
                    session
                        .value(&key)
                        .map(|value| (key, serde_json::Value::from(value)))
                })
                .collect::<serde_json::Map<_, _>>();
            println!("{}", serde_json::to_string_pretty(&values)?);
        }
        Command::Set { key, value } => {
            session.start().await;
            let outcome = session.edit(&key, value)?;
            session.flush().await;
            println!("{}", shell::render_view(&session.view()));
            if let Some((partner, adjusted)) = outcome.adjusted {
                println!("{partner} moved to {adjusted}");
            }
        }
        Command::Commit { name } => {
            session.start().await;
            let receipt = session.commit(&name).await?;
            println!(
                "Configuration saved successfully as '{}'.",
                receipt.configuration.name
            );
        }
    }

    Ok(())
}

fn spawn_event_log(session: &CalibrationSession) {
    let mut events = session.subscribe_events();
    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event log fell behind");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            match event {
                TunerEvent::Delivered { key, value } => info!(%key, value, "server accepted update"),
                TunerEvent::DeliveryFailed { key, value, reason } => {
                    warn!(%key, value, %reason, "server did not take update")
                }
                TunerEvent::ArtifactRefreshed {
                    kind,
                    token,
                    size_bytes,
                } => info!(artifact = kind.file_stem(), token, size_bytes, "image refreshed"),
                _ => {}
            }
        }
    });
}
