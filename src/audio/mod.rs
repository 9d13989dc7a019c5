//! Audio devices and the wire PCM format
//!
//! Capture and playback through cpal, plus the buffer sizing shared by both
//! pipelines.

mod convert;
mod device;
mod format;
mod microphone;
mod speaker;

pub use convert::rms_level;
pub use device::{list_devices, probe_buffer_sizing, AudioError, AudioSink, AudioSource};
pub use format::BufferSizing;
pub use microphone::Microphone;
pub use speaker::Speaker;

#[cfg(test)]
pub use device::{MockAudioSink, MockAudioSource};
