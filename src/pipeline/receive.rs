//! Fetch-and-Play: GET response → frame buffer → speaker

use super::report::{CancelFlag, Direction, PipelineReport, Termination};
use crate::audio::{AudioSink, BufferSizing, Speaker};
use crate::config::SessionParams;
use crate::transport::{BroadcastClient, DownloadSource};

/// Everything one playback run needs
pub struct ReceivePipeline {
    pub client: BroadcastClient,
    pub params: SessionParams,
    pub sizing: BufferSizing,
}

impl ReceivePipeline {
    /// Run until end of stream, cancellation or an I/O error. Blocking.
    pub fn run(self, cancel: CancelFlag) -> PipelineReport {
        tracing::info!(
            "Playback started: {} ({} B reads)",
            self.params.endpoint(),
            self.sizing.frame_bytes
        );

        let mut download = match self.client.open_download(&self.params) {
            Ok(download) => download,
            Err(e) => return PipelineReport::failed(Direction::Receive, e),
        };

        let mut speaker = match Speaker::open(self.sizing.frame_bytes) {
            Ok(speaker) => speaker,
            Err(e) => {
                download.close();
                return PipelineReport::failed(Direction::Receive, e);
            }
        };

        let mut buffer = self.sizing.allocate();
        playback_loop(&mut download, &mut speaker, &mut buffer, &cancel)
    }
}

/// Copy the response body to the sink until it ends.
///
/// The sink is stopped and the download closed on every exit path. At the
/// end of the stream the sink is drained first; on cancellation or failure
/// it stops at once.
pub fn playback_loop<D, K>(
    download: &mut D,
    sink: &mut K,
    buffer: &mut [u8],
    cancel: &CancelFlag,
) -> PipelineReport
where
    D: DownloadSource + ?Sized,
    K: AudioSink + ?Sized,
{
    let mut report = PipelineReport::new(Direction::Receive);

    let termination = loop {
        if cancel.is_cancelled() {
            break Termination::Cancelled;
        }

        let n = match download.read(buffer) {
            Ok(Some(n)) => n,
            Ok(None) => break Termination::EndOfStream,
            Err(e) => break Termination::failed(e),
        };
        if n == 0 {
            continue;
        }

        if let Err(e) = sink.write(&buffer[..n]) {
            break Termination::failed(e);
        }
        report.record(n);
        tracing::debug!(chunk = report.chunks, bytes = n, total = report.bytes, "Chunk played");
    };

    download.close();

    // A broadcast that ended normally is played out to its last sample
    let termination = match termination {
        Termination::EndOfStream => match sink.drain() {
            Ok(()) => Termination::EndOfStream,
            Err(e) => Termination::failed(e),
        },
        other => other,
    };
    if let Err(e) = sink.stop() {
        tracing::warn!("Cannot stop speaker: {}", e);
    }

    report.finish(termination)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioError, MockAudioSink};
    use crate::transport::{MockDownloadSource, TransportError};
    use mockall::Sequence;
    use std::sync::{Arc, Mutex};

    fn scripted_download(chunks: Vec<Vec<u8>>) -> MockDownloadSource {
        let mut download = MockDownloadSource::new();
        let mut script = chunks.into_iter();
        download.expect_read().returning(move |buf| match script.next() {
            Some(chunk) => {
                buf[..chunk.len()].copy_from_slice(&chunk);
                Ok(Some(chunk.len()))
            }
            None => Ok(None),
        });
        download.expect_close().times(1).return_const(());
        download
    }

    #[test]
    fn ends_on_end_of_stream_without_cancellation() {
        let cancel = CancelFlag::new();
        let mut download = scripted_download(vec![vec![1, 2], vec![], vec![3, 4, 5]]);

        let played = Arc::new(Mutex::new(Vec::<u8>::new()));
        let recorder = Arc::clone(&played);
        let mut sink = MockAudioSink::new();
        sink.expect_write().times(2).returning(move |data| {
            recorder.lock().unwrap().extend_from_slice(data);
            Ok(())
        });
        sink.expect_drain().times(1).returning(|| Ok(()));
        sink.expect_stop().times(1).returning(|| Ok(()));

        let mut buffer = vec![0u8; 4];
        let report = playback_loop(&mut download, &mut sink, &mut buffer, &cancel);

        assert_eq!(report.termination, Termination::EndOfStream);
        assert_eq!(report.chunks, 2);
        assert_eq!(report.bytes, 5);
        assert_eq!(*played.lock().unwrap(), vec![1, 2, 3, 4, 5]);
        assert!(!cancel.is_cancelled());
    }

    #[test]
    fn cancellation_stops_before_next_read() {
        let cancel = CancelFlag::new();
        let trigger = cancel.clone();

        let mut download = MockDownloadSource::new();
        download.expect_read().times(1).returning(move |buf| {
            trigger.cancel();
            buf[0] = 9;
            Ok(Some(1))
        });
        download.expect_close().times(1).return_const(());

        let mut sink = MockAudioSink::new();
        sink.expect_write().times(1).returning(|_| Ok(()));
        sink.expect_drain().never();
        sink.expect_stop().times(1).returning(|| Ok(()));

        let mut buffer = vec![0u8; 4];
        let report = playback_loop(&mut download, &mut sink, &mut buffer, &cancel);
        assert_eq!(report.termination, Termination::Cancelled);
        assert_eq!(report.chunks, 1);
    }

    #[test]
    fn network_failure_is_reported_and_cleaned_up() {
        let cancel = CancelFlag::new();
        let mut download = MockDownloadSource::new();
        download
            .expect_read()
            .times(1)
            .returning(|_| Err(TransportError::Closed));
        download.expect_close().times(1).return_const(());

        let mut sink = MockAudioSink::new();
        sink.expect_write().never();
        sink.expect_drain().never();
        sink.expect_stop().times(1).returning(|| Ok(()));

        let mut buffer = vec![0u8; 4];
        let report = playback_loop(&mut download, &mut sink, &mut buffer, &cancel);
        assert!(report.termination.is_failed());
    }

    #[test]
    fn device_failure_is_reported() {
        let cancel = CancelFlag::new();
        let mut download = scripted_download(vec![vec![0, 0]]);
        let mut sink = MockAudioSink::new();
        sink.expect_write()
            .times(1)
            .returning(|_| Err(AudioError::ThreadGone));
        sink.expect_drain().never();
        sink.expect_stop().times(1).returning(|| Ok(()));

        let mut buffer = vec![0u8; 4];
        let report = playback_loop(&mut download, &mut sink, &mut buffer, &cancel);
        assert_eq!(report.termination, Termination::Failed("Audio thread stopped".into()));
        assert_eq!(report.chunks, 0);
    }

    #[test]
    fn end_of_stream_drains_before_stopping() {
        let cancel = CancelFlag::new();
        let mut download = scripted_download(vec![vec![7, 7]]);

        let mut seq = Sequence::new();
        let mut sink = MockAudioSink::new();
        sink.expect_write()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        sink.expect_drain()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));
        sink.expect_stop()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));

        let mut buffer = vec![0u8; 4];
        let report = playback_loop(&mut download, &mut sink, &mut buffer, &cancel);
        assert_eq!(report.termination, Termination::EndOfStream);
        assert_eq!(report.bytes, 2);
    }

    #[test]
    fn failed_drain_is_reported() {
        let cancel = CancelFlag::new();
        let mut download = scripted_download(vec![vec![1, 2]]);
        let mut sink = MockAudioSink::new();
        sink.expect_write().times(1).returning(|_| Ok(()));
        sink.expect_drain()
            .times(1)
            .returning(|| Err(AudioError::ThreadGone));
        sink.expect_stop().times(1).returning(|| Ok(()));

        let mut buffer = vec![0u8; 4];
        let report = playback_loop(&mut download, &mut sink, &mut buffer, &cancel);
        assert_eq!(report.termination, Termination::Failed("Audio thread stopped".into()));
        assert_eq!(report.chunks, 1);
    }
}
