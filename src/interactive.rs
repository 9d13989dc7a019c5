//! Line-driven front end: the two toggles and the cleanup intent on stdin

use crate::config::SessionParams;
use crate::session::{AppState, Toggle};
use std::future::Future;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

/// One parsed stdin line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    ToggleStreaming,
    TogglePlayback,
    Cleanup,
    Status,
    Help,
    Quit,
}

impl Intent {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_lowercase().as_str() {
            "s" | "stream" => Some(Intent::ToggleStreaming),
            "p" | "play" => Some(Intent::TogglePlayback),
            "c" | "cleanup" => Some(Intent::Cleanup),
            "status" | "?" => Some(Intent::Status),
            "h" | "help" => Some(Intent::Help),
            "q" | "quit" | "exit" => Some(Intent::Quit),
            _ => None,
        }
    }
}

const HELP: &str = "s: toggle streaming | p: toggle playback | c: cleanup | status | q: quit";

/// Read intents from stdin until `q`, end of input or Ctrl-C, then stop
/// everything
pub async fn run(app: Arc<AppState>, params: SessionParams) -> anyhow::Result<()> {
    println!("{}", HELP);
    let input = BufReader::new(tokio::io::stdin());
    drive(&app, &params, input, tokio::signal::ctrl_c()).await
}

async fn drive<R, I>(
    app: &Arc<AppState>,
    params: &SessionParams,
    input: R,
    interrupt: I,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    I: Future<Output = std::io::Result<()>>,
{
    let mut lines = input.lines();
    tokio::pin!(interrupt);

    loop {
        let line = tokio::select! {
            signal = &mut interrupt => {
                signal?;
                tracing::info!("Interrupted, stopping everything");
                break;
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };

        if line.trim().is_empty() {
            continue;
        }
        let Some(intent) = Intent::parse(&line) else {
            println!("Unknown command {:?}. {}", line.trim(), HELP);
            continue;
        };

        match intent {
            Intent::ToggleStreaming => match app.toggle_streaming(params.clone()).await {
                Ok(Toggle::Started) => println!("Streaming started"),
                Ok(Toggle::Stopped(report)) => println!("Streaming stopped: {} chunks", report.chunks),
                Err(e) => println!("Streaming: {}", e),
            },
            Intent::TogglePlayback => match app.toggle_playback(params.clone()).await {
                Ok(Toggle::Started) => println!("Playback started"),
                Ok(Toggle::Stopped(report)) => println!("Playback stopped: {} chunks", report.chunks),
                Err(e) => println!("Playback: {}", e),
            },
            Intent::Cleanup => {
                // Fire and forget; the outcome is logged
                let app = Arc::clone(app);
                let params = params.clone();
                tokio::spawn(async move {
                    if let Err(e) = app.cleanup(&params).await {
                        tracing::error!("Cleanup error: {}", e);
                    }
                });
            }
            Intent::Status => {
                let status = app.status().await;
                println!("streaming: {:?} | playback: {:?}", status.streaming, status.playback);
            }
            Intent::Help => println!("{}", HELP),
            Intent::Quit => break,
        }
    }

    for report in app.shutdown().await {
        println!("{} stopped: {} chunks", report.direction, report.chunks);
    }
    Ok(())
}
