//! Audio device seams and host queries
//!
//! The pipelines only see [`AudioSource`] and [`AudioSink`]; the cpal-backed
//! [`Microphone`](super::Microphone) and [`Speaker`](super::Speaker) are the
//! production implementations.

use super::format::{device_min_bytes, BufferSizing};
use cpal::traits::{DeviceTrait, HostTrait};
use cpal::SupportedBufferSize;
use thiserror::Error;

/// Audio device errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("No {0} audio device found")]
    NoDevice(&'static str),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("Stream error: {0}")]
    StreamError(String),

    #[error("Audio thread stopped")]
    ThreadGone,
}

/// Blocking source of wire-format PCM bytes
#[cfg_attr(test, mockall::automock)]
pub trait AudioSource: Send {
    /// Read up to `buf.len()` bytes, always a whole number of frames.
    ///
    /// Blocks until the buffer is full or a bounded wait elapses, so `Ok(0)`
    /// is a valid answer.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, AudioError>;

    /// Stop capturing. Further reads fail.
    fn stop(&mut self) -> Result<(), AudioError>;
}

/// Blocking sink of wire-format PCM bytes
#[cfg_attr(test, mockall::automock)]
pub trait AudioSink: Send {
    /// Queue all of `data` for playback, blocking while the device is full
    fn write(&mut self, data: &[u8]) -> Result<(), AudioError>;

    /// Block until everything written so far has been played
    fn drain(&mut self) -> Result<(), AudioError>;

    /// Stop playback right away and release the device. Queued audio is lost.
    fn stop(&mut self) -> Result<(), AudioError>;
}

/// Names of the host's input and output devices
#[derive(Debug, Clone, Default)]
pub struct DeviceList {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

/// List available input and output devices
pub fn list_devices() -> DeviceList {
    let host = cpal::default_host();
    DeviceList {
        inputs: host
            .input_devices()
            .map(|devices| devices.filter_map(|d| d.name().ok()).collect())
            .unwrap_or_default(),
        outputs: host
            .output_devices()
            .map(|devices| devices.filter_map(|d| d.name().ok()).collect())
            .unwrap_or_default(),
    }
}

fn min_frames(buffer_size: &SupportedBufferSize) -> Option<u32> {
    match buffer_size {
        SupportedBufferSize::Range { min, .. } => Some(*min),
        SupportedBufferSize::Unknown => None,
    }
}

/// Query both default devices and size the shared frame buffer.
///
/// A missing device or an unreported range falls back to the default
/// minimum for that direction.
pub fn probe_buffer_sizing() -> BufferSizing {
    let host = cpal::default_host();

    let min_input = match host.default_input_device().map(|d| d.default_input_config()) {
        Some(Ok(config)) => device_min_bytes(min_frames(config.buffer_size()), config.sample_rate().0),
        Some(Err(e)) => {
            tracing::warn!("Cannot query input device: {}", e);
            device_min_bytes(None, 0)
        }
        None => device_min_bytes(None, 0),
    };

    let min_output = match host.default_output_device().map(|d| d.default_output_config()) {
        Some(Ok(config)) => device_min_bytes(min_frames(config.buffer_size()), config.sample_rate().0),
        Some(Err(e)) => {
            tracing::warn!("Cannot query output device: {}", e);
            device_min_bytes(None, 0)
        }
        None => device_min_bytes(None, 0),
    };

    let sizing = BufferSizing::new(min_input, min_output);
    tracing::debug!(
        "Buffer sizing: input min {} B, output min {} B -> {} B ({:?})",
        sizing.min_input_bytes,
        sizing.min_output_bytes,
        sizing.frame_bytes,
        sizing.chunk_duration()
    );
    sizing
}
