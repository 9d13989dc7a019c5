//! Audio playback to the default output device
//!
//! Mirror of the microphone: [`Speaker::write`] converts wire PCM to the
//! device's native rate and channel count and pushes it into a ring buffer
//! that the cpal output callback drains on its own thread.

use super::convert::{pcm_bytes_to_f32, upmix, Resampler};
use super::device::{AudioError, AudioSink};
use super::format::WIRE_FORMAT;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, StreamConfig};
use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

enum PlaybackCommand {
    Stop,
}

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Slack on top of the queued audio's duration when draining
const DRAIN_GRACE: Duration = Duration::from_millis(200);

/// Device parameters reported back by the playback thread
#[derive(Debug, Clone, Copy)]
struct OutputShape {
    sample_rate: u32,
    channels: u16,
}

/// Speaker playback consuming wire-format PCM
pub struct Speaker {
    producer: HeapProd<f32>,
    shape: OutputShape,
    resampler: Resampler,
    /// Device samples queued so far
    pushed: u64,
    /// Device samples taken by the output callback so far
    played: Arc<AtomicU64>,
    /// Odd byte left over from the previous write
    carry: Option<u8>,
    alive: Arc<AtomicBool>,
    command_tx: mpsc::Sender<PlaybackCommand>,
    thread_handle: Option<JoinHandle<()>>,
}

impl Speaker {
    /// Open the default output device and start playback.
    ///
    /// The ring holds about four writes of `frame_bytes` at the device rate.
    pub fn open(frame_bytes: usize) -> Result<Self, AudioError> {
        let alive = Arc::new(AtomicBool::new(true));
        let played = Arc::new(AtomicU64::new(0));
        let (command_tx, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        let thread_alive = Arc::clone(&alive);
        let thread_played = Arc::clone(&played);
        let thread_handle = thread::Builder::new()
            .name("soundcheck-playback".into())
            .spawn(move || {
                if let Err(e) = run_playback(frame_bytes, thread_played, command_rx, &ready_tx) {
                    tracing::error!("Audio playback error: {}", e);
                    let _ = ready_tx.send(Err(e));
                }
                thread_alive.store(false, Ordering::SeqCst);
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        let (producer, shape) = match ready_rx.recv() {
            Ok(Ok(ready)) => ready,
            Ok(Err(e)) => {
                let _ = thread_handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread_handle.join();
                return Err(AudioError::ThreadGone);
            }
        };

        Ok(Self {
            producer,
            shape,
            resampler: Resampler::new(WIRE_FORMAT.sample_rate, shape.sample_rate),
            pushed: 0,
            played,
            carry: None,
            alive,
            command_tx,
            thread_handle: Some(thread_handle),
        })
    }

    fn to_device_samples(&mut self, data: &[u8]) -> Vec<f32> {
        let mut bytes = Vec::with_capacity(data.len() + 1);
        if let Some(b) = self.carry.take() {
            bytes.push(b);
        }
        bytes.extend_from_slice(data);
        if bytes.len() % 2 == 1 {
            self.carry = bytes.pop();
        }

        let mono = pcm_bytes_to_f32(&bytes);
        let resampled = self.resampler.process(&mono);
        upmix(&resampled, self.shape.channels)
    }
}

impl AudioSink for Speaker {
    fn write(&mut self, data: &[u8]) -> Result<(), AudioError> {
        let samples = self.to_device_samples(data);
        let mut offset = 0;

        while offset < samples.len() {
            let pushed = self.producer.push_slice(&samples[offset..]);
            offset += pushed;
            self.pushed += pushed as u64;
            if offset < samples.len() {
                if !self.alive.load(Ordering::SeqCst) {
                    return Err(AudioError::ThreadGone);
                }
                thread::sleep(POLL_INTERVAL);
            }
        }
        Ok(())
    }

    fn drain(&mut self) -> Result<(), AudioError> {
        let queued = self.pushed.saturating_sub(self.played.load(Ordering::SeqCst));
        let samples_per_sec = (self.shape.sample_rate as u64 * self.shape.channels as u64).max(1);
        let queued_for = Duration::from_secs_f64(queued as f64 / samples_per_sec as f64);
        let deadline = Instant::now() + queued_for + DRAIN_GRACE;

        while self.played.load(Ordering::SeqCst) < self.pushed {
            if !self.alive.load(Ordering::SeqCst) {
                return Err(AudioError::ThreadGone);
            }
            if Instant::now() >= deadline {
                let left = self.pushed.saturating_sub(self.played.load(Ordering::SeqCst));
                tracing::warn!("Playback did not drain in time, {} samples dropped", left);
                break;
            }
            thread::sleep(POLL_INTERVAL);
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        let _ = self.command_tx.send(PlaybackCommand::Stop);
        if let Some(handle) = self.thread_handle.take() {
            handle.join().map_err(|_| AudioError::ThreadGone)?;
        }
        Ok(())
    }
}

impl Drop for Speaker {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

type Ready = (HeapProd<f32>, OutputShape);

/// Run audio playback (in a dedicated thread)
fn run_playback(
    frame_bytes: usize,
    played: Arc<AtomicU64>,
    command_rx: mpsc::Receiver<PlaybackCommand>,
    ready_tx: &mpsc::Sender<Result<Ready, AudioError>>,
) -> Result<(), AudioError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(AudioError::NoDevice("output"))?;

    tracing::info!("Output device: {:?}", device.name());

    let supported = device
        .default_output_config()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?;

    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.into();
    let shape = OutputShape {
        sample_rate: config.sample_rate.0,
        channels: config.channels,
    };

    tracing::info!(
        "Playback config: {}Hz mono i16 -> {}Hz {}ch {:?}",
        WIRE_FORMAT.sample_rate,
        shape.sample_rate,
        shape.channels,
        sample_format
    );

    let wire_samples = frame_bytes / WIRE_FORMAT.bytes_per_sample;
    let device_samples = (wire_samples as u64 * shape.sample_rate as u64)
        .div_ceil(WIRE_FORMAT.sample_rate as u64) as usize
        * shape.channels as usize;
    let rb = HeapRb::<f32>::new(device_samples.max(1) * 4);
    let (producer, consumer) = rb.split();

    let stream = match sample_format {
        SampleFormat::F32 => build_playback_stream::<f32>(&device, &config, consumer, played),
        SampleFormat::I16 => build_playback_stream::<i16>(&device, &config, consumer, played),
        SampleFormat::U16 => build_playback_stream::<u16>(&device, &config, consumer, played),
        SampleFormat::I32 => build_playback_stream::<i32>(&device, &config, consumer, played),
        other => Err(AudioError::UnsupportedFormat(format!("{:?}", other))),
    }?;

    stream
        .play()
        .map_err(|e| AudioError::StreamError(e.to_string()))?;

    tracing::info!("Audio playback started");
    let _ = ready_tx.send(Ok((producer, shape)));

    loop {
        match command_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(PlaybackCommand::Stop) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
        }
    }

    if let Err(e) = stream.pause() {
        tracing::warn!("Cannot pause playback stream: {}", e);
    }
    tracing::info!("Audio playback stopped");
    Ok(())
}

fn build_playback_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut consumer: HeapCons<f32>,
    played: Arc<AtomicU64>,
) -> Result<cpal::Stream, AudioError>
where
    T: SizedSample + FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                scratch.resize(data.len(), 0.0);
                let popped = consumer.pop_slice(&mut scratch);
                played.fetch_add(popped as u64, Ordering::SeqCst);
                // Underrun plays silence
                scratch[popped..].fill(0.0);
                for (out, &sample) in data.iter_mut().zip(scratch.iter()) {
                    *out = T::from_sample(sample);
                }
            },
            |err| {
                tracing::error!("Audio output stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamError(e.to_string()))
}
