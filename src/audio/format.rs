//! Wire format and frame buffer sizing
//!
//! Everything on the wire is 16-bit signed little-endian PCM, mono, 44.1kHz.
//! The frame buffer size is shared by the device reads/writes and therefore
//! by the HTTP chunks.

use std::time::Duration;

/// Fixed PCM format exchanged with the broadcast server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bytes_per_sample: usize,
}

/// 16-bit mono 44.1kHz
pub const WIRE_FORMAT: PcmFormat = PcmFormat {
    sample_rate: 44_100,
    channels: 1,
    bytes_per_sample: 2,
};

impl PcmFormat {
    /// Bytes per frame (one sample per channel)
    pub fn frame_bytes(&self) -> usize {
        self.bytes_per_sample * self.channels as usize
    }

    /// Bytes per second of audio
    pub fn byte_rate(&self) -> usize {
        self.frame_bytes() * self.sample_rate as usize
    }

    /// Bytes needed for `millis` of audio, whole frames
    pub fn bytes_for_millis(&self, millis: u64) -> usize {
        let frames = (self.sample_rate as u64 * millis).div_ceil(1000) as usize;
        frames * self.frame_bytes()
    }

    /// Playback time of `bytes` of audio
    pub fn duration_of(&self, bytes: usize) -> Duration {
        Duration::from_secs_f64(bytes as f64 / self.byte_rate() as f64)
    }
}

/// Minimum used when a device reports no buffer range (40ms)
pub const FALLBACK_MIN_MILLIS: u64 = 40;

/// Lower bound on the frame buffer regardless of device minimums (20ms)
pub const FLOOR_MILLIS: u64 = 20;

/// Minimum buffer of one device, expressed in wire bytes.
///
/// `frames` is the device's minimum buffer in frames at its own
/// `device_rate`; the same duration at the wire rate is returned, rounded
/// up to a whole frame. `None` means the device did not report one.
pub fn device_min_bytes(frames: Option<u32>, device_rate: u32) -> usize {
    match frames {
        Some(frames) if device_rate > 0 => {
            let wire_frames = (frames as u64 * WIRE_FORMAT.sample_rate as u64)
                .div_ceil(device_rate as u64) as usize;
            wire_frames * WIRE_FORMAT.frame_bytes()
        }
        _ => WIRE_FORMAT.bytes_for_millis(FALLBACK_MIN_MILLIS),
    }
}

/// Frame buffer size shared by both pipelines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSizing {
    pub min_input_bytes: usize,
    pub min_output_bytes: usize,
    pub frame_bytes: usize,
}

impl BufferSizing {
    /// Take the larger of both directions' minimums, at least [`FLOOR_MILLIS`]
    /// of audio, rounded up to a whole frame.
    pub fn new(min_input_bytes: usize, min_output_bytes: usize) -> Self {
        let floor = WIRE_FORMAT.bytes_for_millis(FLOOR_MILLIS);
        let raw = min_input_bytes.max(min_output_bytes).max(floor);
        let frame = WIRE_FORMAT.frame_bytes();
        let frame_bytes = raw.div_ceil(frame) * frame;

        Self {
            min_input_bytes,
            min_output_bytes,
            frame_bytes,
        }
    }

    /// Worst-case cancellation latency of a pipeline, excluding network time
    pub fn chunk_duration(&self) -> Duration {
        WIRE_FORMAT.duration_of(self.frame_bytes)
    }

    /// Fresh zeroed buffer for one pipeline run
    pub fn allocate(&self) -> Vec<u8> {
        vec![0u8; self.frame_bytes]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_format_constants() {
        assert_eq!(WIRE_FORMAT.frame_bytes(), 2);
        assert_eq!(WIRE_FORMAT.byte_rate(), 88_200);
        assert_eq!(WIRE_FORMAT.bytes_for_millis(40), 3_528);
        assert_eq!(WIRE_FORMAT.bytes_for_millis(20), 1_764);
    }

    #[test]
    fn size_covers_both_directions() {
        for (input, output) in [(0, 0), (3_528, 1_000), (1_000, 7_057), (9_000, 9_000), (1, 2)] {
            let sizing = BufferSizing::new(input, output);
            assert!(sizing.frame_bytes >= input);
            assert!(sizing.frame_bytes >= output);
            assert_eq!(sizing.frame_bytes % 2, 0);
        }
    }

    #[test]
    fn floor_applies_to_tiny_minimums() {
        let sizing = BufferSizing::new(64, 128);
        assert_eq!(sizing.frame_bytes, 1_764);
    }

    #[test]
    fn odd_minimum_rounds_up_to_frame() {
        let sizing = BufferSizing::new(7_057, 0);
        assert_eq!(sizing.frame_bytes, 7_058);
    }

    #[test]
    fn device_minimum_is_scaled_to_wire_rate() {
        // 480 frames at 48kHz = 10ms = 441 wire frames
        assert_eq!(device_min_bytes(Some(480), 48_000), 882);
        assert_eq!(device_min_bytes(Some(1_024), 44_100), 2_048);
        // rounding up never shortens the duration
        assert_eq!(device_min_bytes(Some(1), 48_000), 2);
    }

    #[test]
    fn unknown_device_minimum_falls_back() {
        assert_eq!(device_min_bytes(None, 48_000), 3_528);
        assert_eq!(device_min_bytes(Some(256), 0), 3_528);
    }

    #[test]
    fn chunk_duration_matches_size() {
        let sizing = BufferSizing::new(8_820, 0);
        assert_eq!(sizing.chunk_duration(), Duration::from_millis(100));
        assert_eq!(sizing.allocate().len(), 8_820);
    }
}
