//! HTTP transport to the broadcast server
//!
//! One endpoint per broadcast, `{server_url}/{broadcast_id}`:
//! - PUT streams captured PCM as a single chunked request body
//! - GET streams PCM back for playback
//! - DELETE drops the chunks stored on the server

mod cleanup;
mod client;
mod download;
mod upload;

#[cfg(test)]
pub(crate) mod test_server;

pub use cleanup::CleanupOutcome;
pub use client::BroadcastClient;
pub use download::HttpDownload;
pub use upload::HttpUpload;

use thiserror::Error;

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Server answered {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Upload stream closed by the connection")]
    Closed,

    #[error("Request task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Streaming request body, fed one chunk per device read
#[cfg_attr(test, mockall::automock)]
pub trait UploadSink: Send {
    /// Send `chunk` as one HTTP chunk, without buffering
    fn send_chunk(&mut self, chunk: &[u8]) -> Result<(), TransportError>;

    /// End the body and wait for the server's answer
    fn finish(&mut self) -> Result<(), TransportError>;
}

/// Streaming response body
#[cfg_attr(test, mockall::automock)]
pub trait DownloadSource: Send {
    /// Read up to `buf.len()` bytes; `None` at end of stream
    fn read(&mut self, buf: &mut [u8]) -> Result<Option<usize>, TransportError>;

    /// Drop the connection
    fn close(&mut self);
}
