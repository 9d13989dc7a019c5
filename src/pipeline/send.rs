//! Capture-and-Send: microphone → frame buffer → chunked PUT

use super::report::{CancelFlag, Direction, PipelineReport, Termination};
use crate::audio::{rms_level, AudioSource, BufferSizing, Microphone};
use crate::config::SessionParams;
use crate::transport::{BroadcastClient, UploadSink};
use std::hash::{Hash, Hasher};

/// Everything one streaming run needs
pub struct SendPipeline {
    pub client: BroadcastClient,
    pub params: SessionParams,
    pub sizing: BufferSizing,
    pub diagnostics: bool,
}

impl SendPipeline {
    /// Run until cancelled or until an I/O error. Blocking.
    pub fn run(self, cancel: CancelFlag) -> PipelineReport {
        tracing::info!(
            "Streaming started: {} ({} B chunks, cancel latency ~{:?})",
            self.params.endpoint(),
            self.sizing.frame_bytes,
            self.sizing.chunk_duration()
        );

        let mut upload = match self.client.open_upload(&self.params) {
            Ok(upload) => upload,
            Err(e) => return PipelineReport::failed(Direction::Send, e),
        };

        // Dropping the upload aborts the request without sending a body
        let mut microphone = match Microphone::open(self.sizing.frame_bytes) {
            Ok(microphone) => microphone,
            Err(e) => return PipelineReport::failed(Direction::Send, e),
        };

        let mut buffer = self.sizing.allocate();
        stream_loop(
            &mut microphone,
            &mut upload,
            &mut buffer,
            &cancel,
            self.diagnostics,
        )
    }
}

/// One device read becomes one HTTP chunk.
///
/// On every exit path the source is stopped and the upload finished, each
/// exactly once.
pub fn stream_loop<S, U>(
    source: &mut S,
    upload: &mut U,
    buffer: &mut [u8],
    cancel: &CancelFlag,
    diagnostics: bool,
) -> PipelineReport
where
    S: AudioSource + ?Sized,
    U: UploadSink + ?Sized,
{
    let mut report = PipelineReport::new(Direction::Send);

    let termination = loop {
        if cancel.is_cancelled() {
            break Termination::Cancelled;
        }

        let n = match source.read(buffer) {
            Ok(n) => n,
            Err(e) => break Termination::failed(e),
        };
        if n == 0 {
            continue;
        }

        let chunk = &buffer[..n];
        if let Err(e) = upload.send_chunk(chunk) {
            break Termination::failed(e);
        }
        report.record(n);

        tracing::debug!(chunk = report.chunks, bytes = n, total = report.bytes, "Chunk sent");
        if diagnostics {
            tracing::info!(
                chunk = report.chunks,
                fingerprint = %format!("{:016x}", fingerprint(chunk)),
                level = rms_level(chunk),
                "Chunk diagnostics"
            );
        }
    };

    if let Err(e) = source.stop() {
        tracing::warn!("Cannot stop microphone: {}", e);
    }

    let termination = match upload.finish() {
        Ok(()) => termination,
        Err(e) if !termination.is_failed() => Termination::failed(e),
        Err(e) => {
            tracing::warn!("Upload close after failure: {}", e);
            termination
        }
    };

    report.finish(termination)
}

fn fingerprint(chunk: &[u8]) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    chunk.hash(&mut hasher);
    hasher.finish()
}
