//! Streaming GET download

use super::{DownloadSource, TransportError};
use reqwest::{RequestBuilder, Response};
use tokio::runtime::Handle;

/// Response body read in caller-sized pieces from a blocking thread
pub struct HttpDownload {
    response: Option<Response>,
    pending: Vec<u8>,
    offset: usize,
    runtime: Handle,
}

impl HttpDownload {
    /// Send the request and check the status before any audio is played
    pub(super) fn connect(request: RequestBuilder, runtime: Handle) -> Result<Self, TransportError> {
        let response = runtime.block_on(request.send())?;
        let status = response.status();

        if !status.is_success() {
            let body = runtime.block_on(response.text()).unwrap_or_default();
            return Err(TransportError::Status { status, body });
        }

        tracing::debug!("Download connected: {}", status);
        Ok(Self {
            response: Some(response),
            pending: Vec::new(),
            offset: 0,
            runtime,
        })
    }
}

impl DownloadSource for HttpDownload {
    fn read(&mut self, buf: &mut [u8]) -> Result<Option<usize>, TransportError> {
        while self.offset >= self.pending.len() {
            let Some(response) = self.response.as_mut() else {
                return Ok(None);
            };
            match self.runtime.block_on(response.chunk())? {
                Some(bytes) => {
                    self.pending.clear();
                    self.pending.extend_from_slice(&bytes);
                    self.offset = 0;
                }
                None => {
                    self.response = None;
                    return Ok(None);
                }
            }
        }

        let n = buf.len().min(self.pending.len() - self.offset);
        buf[..n].copy_from_slice(&self.pending[self.offset..self.offset + n]);
        self.offset += n;
        Ok(Some(n))
    }

    fn close(&mut self) {
        self.response = None;
        self.pending.clear();
        self.offset = 0;
    }
}
