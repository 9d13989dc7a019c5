//! Soundcheck - duplex audio over HTTP
//!
//! Streams microphone audio as raw PCM chunks to a broadcast server and
//! plays broadcasts back from it.

mod audio;
mod cli;
mod config;
mod interactive;
mod pipeline;
mod session;
mod transport;

use anyhow::Context;
use clap::Parser;
use cli::{Args, Command};
use config::{AppConfig, SessionParams};
use pipeline::{Direction, PipelineReport, Termination};
use session::AppState;
use std::sync::Arc;
use std::time::Duration;
use transport::BroadcastClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    cli::init_logging(&args);

    tracing::info!("Soundcheck v{}", env!("CARGO_PKG_VERSION"));

    let sizing = tokio::task::spawn_blocking(audio::probe_buffer_sizing).await?;

    if args.command == Command::Devices {
        let devices = tokio::task::spawn_blocking(audio::list_devices).await?;
        println!("Input devices:");
        for device in &devices.inputs {
            println!("  - {}", device);
        }
        println!("Output devices:");
        for device in &devices.outputs {
            println!("  - {}", device);
        }
        println!(
            "Chunk size: {} bytes ({:?}), input min {} B, output min {} B",
            sizing.frame_bytes,
            sizing.chunk_duration(),
            sizing.min_input_bytes,
            sizing.min_output_bytes
        );
        return Ok(());
    }

    let config = AppConfig::load(args.config.as_deref())?.merge(args.overrides());
    let params = config.session().context("Invalid session parameters")?;
    tracing::debug!("Session: {:?}", params);

    let client = BroadcastClient::new(tokio::runtime::Handle::current());
    let app = Arc::new(AppState::new(client, sizing, config.diagnostics));

    match args.command {
        Command::Stream => {
            app.start_streaming(params).await?;
            let report = run_until_done(&app, Direction::Send).await?;
            check(report)
        }
        Command::Play => {
            app.start_playback(params).await?;
            let report = run_until_done(&app, Direction::Receive).await?;
            check(report)
        }
        Command::Cleanup => cleanup(&app, &params).await,
        Command::Interactive => interactive::run(app, params).await,
        Command::Devices => Ok(()),
    }
}

/// Wait for Ctrl-C or for the pipeline to end on its own, then collect it
async fn run_until_done(app: &AppState, direction: Direction) -> anyhow::Result<PipelineReport> {
    let mut poll = tokio::time::interval(Duration::from_millis(200));
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                tracing::info!("Interrupted, stopping {}", direction);
                break;
            }
            _ = poll.tick() => {
                if !app.controller.is_running(direction).await {
                    break;
                }
            }
        }
    }
    Ok(app.controller.stop(direction).await?)
}

fn check(report: PipelineReport) -> anyhow::Result<()> {
    println!(
        "{}: {} chunks, {} bytes ({:?})",
        report.direction, report.chunks, report.bytes, report.termination
    );
    match report.termination {
        Termination::Failed(reason) => anyhow::bail!("{} failed: {}", report.direction, reason),
        _ => Ok(()),
    }
}

async fn cleanup(app: &AppState, params: &SessionParams) -> anyhow::Result<()> {
    match app.cleanup(params).await {
        Ok(outcome) => {
            println!("{}", outcome.body);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Cleanup error: {}", e);
            Err(e.into())
        }
    }
}
