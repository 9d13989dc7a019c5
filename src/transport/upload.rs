//! Chunked PUT upload

use super::{TransportError, UploadSink};
use reqwest::{Body, RequestBuilder, Response};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

type Chunk = Result<Vec<u8>, std::io::Error>;

/// How long a finished body waits for the server's answer
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);

/// A PUT whose body is fed chunk by chunk from a blocking thread.
///
/// The request runs as a task on the runtime. The channel holds a single
/// chunk so nothing accumulates client-side between device reads.
pub struct HttpUpload {
    chunk_tx: Option<mpsc::Sender<Chunk>>,
    request: Option<JoinHandle<Result<Response, reqwest::Error>>>,
    runtime: Handle,
}

impl HttpUpload {
    pub(super) fn start(request: RequestBuilder, runtime: Handle) -> Self {
        let (chunk_tx, chunk_rx) = mpsc::channel::<Chunk>(1);
        let body = Body::wrap_stream(ReceiverStream::new(chunk_rx));
        let request = runtime.spawn(request.body(body).send());

        Self {
            chunk_tx: Some(chunk_tx),
            request: Some(request),
            runtime,
        }
    }

    /// Wait for the request task and turn its outcome into an error, if any.
    ///
    /// The wait is bounded: a server that keeps the connection open without
    /// answering is abandoned after [`RESPONSE_TIMEOUT`].
    fn settle(&mut self) -> Result<(), TransportError> {
        let Some(mut request) = self.request.take() else {
            return Ok(());
        };

        let answer = self.runtime.block_on(async {
            let exchange = async {
                let response = (&mut request).await??;
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                Ok::<_, TransportError>((status, body))
            };
            tokio::time::timeout(RESPONSE_TIMEOUT, exchange).await
        });

        let Ok(answer) = answer else {
            request.abort();
            tracing::warn!("No answer to upload within {:?}, disconnecting", RESPONSE_TIMEOUT);
            return Ok(());
        };

        let (status, body) = answer?;
        if status.is_success() {
            tracing::info!("Upload accepted: {} {}", status, body.trim());
            Ok(())
        } else {
            Err(TransportError::Status { status, body })
        }
    }
}

impl UploadSink for HttpUpload {
    fn send_chunk(&mut self, chunk: &[u8]) -> Result<(), TransportError> {
        let tx = self.chunk_tx.as_ref().ok_or(TransportError::Closed)?;
        if tx.blocking_send(Ok(chunk.to_vec())).is_ok() {
            return Ok(());
        }

        // The body was dropped: the request ended early, report why
        self.chunk_tx = None;
        self.settle()?;
        Err(TransportError::Closed)
    }

    fn finish(&mut self) -> Result<(), TransportError> {
        // Dropping the sender ends the chunked body
        self.chunk_tx = None;
        self.settle()
    }
}

impl Drop for HttpUpload {
    fn drop(&mut self) {
        if let Some(request) = self.request.take() {
            request.abort();
        }
    }
}
