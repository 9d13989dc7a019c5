//! User intents: toggle streaming, toggle playback, clean up
//!
//! These are what the CLI front ends call. Each intent takes the session
//! parameters as they are at the moment of the call.

use super::controller::{PipelineStatus, SessionController, SessionError};
use crate::audio::BufferSizing;
use crate::config::SessionParams;
use crate::pipeline::{Direction, PipelineReport, ReceivePipeline, SendPipeline};
use crate::transport::{BroadcastClient, CleanupOutcome, TransportError};

/// Application state shared by the front ends
pub struct AppState {
    pub controller: SessionController,
    client: BroadcastClient,
    sizing: BufferSizing,
    diagnostics: bool,
}

/// Result of a toggle intent
#[derive(Debug)]
pub enum Toggle {
    Started,
    Stopped(PipelineReport),
}

impl From<Option<PipelineReport>> for Toggle {
    fn from(stopped: Option<PipelineReport>) -> Self {
        stopped.map_or(Toggle::Started, Toggle::Stopped)
    }
}

/// Both directions at a glance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusResponse {
    pub streaming: PipelineStatus,
    pub playback: PipelineStatus,
}

impl AppState {
    pub fn new(client: BroadcastClient, sizing: BufferSizing, diagnostics: bool) -> Self {
        Self {
            controller: SessionController::new(),
            client,
            sizing,
            diagnostics,
        }
    }

    /// Start capturing and uploading
    pub async fn start_streaming(&self, params: SessionParams) -> Result<(), SessionError> {
        let pipeline = SendPipeline {
            client: self.client.clone(),
            params,
            sizing: self.sizing,
            diagnostics: self.diagnostics,
        };
        self.controller
            .start(Direction::Send, move |cancel| pipeline.run(cancel))
            .await
    }

    pub async fn stop_streaming(&self) -> Result<PipelineReport, SessionError> {
        self.controller.stop(Direction::Send).await
    }

    /// Start downloading and playing
    pub async fn start_playback(&self, params: SessionParams) -> Result<(), SessionError> {
        let pipeline = ReceivePipeline {
            client: self.client.clone(),
            params,
            sizing: self.sizing,
        };
        self.controller
            .start(Direction::Receive, move |cancel| pipeline.run(cancel))
            .await
    }

    pub async fn stop_playback(&self) -> Result<PipelineReport, SessionError> {
        self.controller.stop(Direction::Receive).await
    }

    /// Stop if running, start otherwise
    pub async fn toggle_streaming(&self, params: SessionParams) -> Result<Toggle, SessionError> {
        let pipeline = SendPipeline {
            client: self.client.clone(),
            params,
            sizing: self.sizing,
            diagnostics: self.diagnostics,
        };
        self.controller
            .toggle(Direction::Send, move |cancel| pipeline.run(cancel))
            .await
            .map(Toggle::from)
    }

    /// Stop if running, start otherwise
    pub async fn toggle_playback(&self, params: SessionParams) -> Result<Toggle, SessionError> {
        let pipeline = ReceivePipeline {
            client: self.client.clone(),
            params,
            sizing: self.sizing,
        };
        self.controller
            .toggle(Direction::Receive, move |cancel| pipeline.run(cancel))
            .await
            .map(Toggle::from)
    }

    /// Delete the broadcast chunks on the server
    pub async fn cleanup(&self, params: &SessionParams) -> Result<CleanupOutcome, TransportError> {
        self.client.cleanup(params).await
    }

    pub async fn status(&self) -> StatusResponse {
        StatusResponse {
            streaming: self.controller.status(Direction::Send).await,
            playback: self.controller.status(Direction::Receive).await,
        }
    }

    /// Stop both pipelines
    pub async fn shutdown(&self) -> Vec<PipelineReport> {
        self.controller.shutdown().await
    }
}
