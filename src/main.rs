use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::io::BufRead;
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, EnvFilter};

use speech_timeline::audio::capture::CpalInput;
use speech_timeline::audio::playback::WavPlayer;
use speech_timeline::session::{Command, LiveSession, ReviewSession, SessionConfig};

/// Session instrumentation: gaze cues, mic activity and audio playback on one timeline
#[derive(Parser, Debug)]
#[command(name = "speech-timeline")]
#[command(version, about, long_about = None)]
struct Args {
    /// TOML config file (defaults apply when omitted)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Record a live session into a folder
    Session {
        /// Folder that receives the session file
        #[arg(short, long, value_name = "DIR")]
        dir: PathBuf,
    },
    /// Review a saved session file
    Review {
        #[arg(short, long, value_name = "FILE")]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = SessionConfig::load_or_default(args.config.as_deref())?;

    match args.mode {
        Mode::Session { dir } => run_session(config, dir).await,
        Mode::Review { file } => run_review(config, file),
    }
}

async fn run_session(config: SessionConfig, dir: PathBuf) -> Result<()> {
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create session folder: {}", dir.display()))?;

    let frame_size = config.mic.frame_size;
    let mut session = LiveSession::new(config, &dir, Arc::new(WavPlayer::new()));
    tracing::info!(id = %session.id(), "Session starting");

    // Modalities degrade independently; failures are already logged.
    let _ = session.start_mic(move || CpalInput::open(frame_size, 16)).await;
    session.start_gaze().await;

    let (tx, rx) = mpsc::channel(32);
    // Plain thread: a blocked stdin read must not hold up runtime shutdown.
    std::thread::spawn(move || {
        println!("{}", Command::help());
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match Command::parse(&line) {
                Ok(command) => {
                    if tx.blocking_send(command).is_err() {
                        break;
                    }
                }
                Err(e) => println!("{e}. {}", Command::help()),
            }
        }
    });

    let token = session.token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received");
            token.cancel();
        }
    });

    session.run(rx).await;
    let path = session.finish().await.context("Failed to save session")?;
    println!("Data saved to {}", path.display());
    Ok(())
}

fn run_review(config: SessionConfig, file: PathBuf) -> Result<()> {
    let mut review = ReviewSession::new(config.correlation.gaze_pairing, config.timeline.cluster_gap_secs);
    review
        .open(&file)
        .with_context(|| format!("Failed to load session: {}", file.display()))?;

    println!("Review Session Data: {}", file.display());
    for line in review.summary() {
        println!("  {line}");
    }
    println!();
    for line in review.transcript() {
        println!("{line}");
    }
    Ok(())
}
