//! Audio capture from the microphone
//!
//! The cpal stream lives on a dedicated thread (streams are not `Send` on
//! every host). Its callback downmixes, resamples to the wire rate and
//! quantizes to i16 before pushing into a ring buffer that
//! [`Microphone::read`] drains.

use super::convert::{downmix, f32_to_i16, i16_to_pcm_bytes, Resampler};
use super::device::{AudioError, AudioSource};
use super::format::WIRE_FORMAT;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, StreamConfig};
use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Commands to control the capture thread
enum CaptureCommand {
    Stop,
}

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Microphone capture producing wire-format PCM
pub struct Microphone {
    consumer: HeapCons<i16>,
    scratch: Vec<i16>,
    /// Longest a single read waits for a full buffer
    max_wait: Duration,
    alive: Arc<AtomicBool>,
    command_tx: mpsc::Sender<CaptureCommand>,
    thread_handle: Option<JoinHandle<()>>,
}

impl Microphone {
    /// Open the default input device and start capturing.
    ///
    /// `frame_bytes` is the pipeline read size; the ring holds a few of
    /// those and a read waits at most twice its duration.
    pub fn open(frame_bytes: usize) -> Result<Self, AudioError> {
        let samples_per_read = frame_bytes / WIRE_FORMAT.bytes_per_sample;
        let rb = HeapRb::<i16>::new(samples_per_read.max(1) * 8);
        let (producer, consumer) = rb.split();

        let alive = Arc::new(AtomicBool::new(true));
        let (command_tx, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        let thread_alive = Arc::clone(&alive);
        let thread_handle = thread::Builder::new()
            .name("soundcheck-capture".into())
            .spawn(move || {
                if let Err(e) = run_capture(producer, command_rx, &ready_tx) {
                    tracing::error!("Audio capture error: {}", e);
                    let _ = ready_tx.send(Err(e));
                }
                thread_alive.store(false, Ordering::SeqCst);
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = thread_handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread_handle.join();
                return Err(AudioError::ThreadGone);
            }
        }

        Ok(Self {
            consumer,
            scratch: vec![0; samples_per_read],
            max_wait: WIRE_FORMAT.duration_of(frame_bytes) * 2,
            alive,
            command_tx,
            thread_handle: Some(thread_handle),
        })
    }
}

impl AudioSource for Microphone {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, AudioError> {
        let wanted = (buf.len() / WIRE_FORMAT.bytes_per_sample).min(self.scratch.len());
        let deadline = Instant::now() + self.max_wait;
        let mut filled = 0;

        loop {
            filled += self.consumer.pop_slice(&mut self.scratch[filled..wanted]);
            if filled >= wanted || Instant::now() >= deadline {
                break;
            }
            if !self.alive.load(Ordering::SeqCst) {
                return Err(AudioError::ThreadGone);
            }
            thread::sleep(POLL_INTERVAL);
        }

        Ok(i16_to_pcm_bytes(&self.scratch[..filled], buf))
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        let _ = self.command_tx.send(CaptureCommand::Stop);
        if let Some(handle) = self.thread_handle.take() {
            handle.join().map_err(|_| AudioError::ThreadGone)?;
        }
        Ok(())
    }
}

impl Drop for Microphone {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Run audio capture (in a dedicated thread)
fn run_capture(
    producer: HeapProd<i16>,
    command_rx: mpsc::Receiver<CaptureCommand>,
    ready_tx: &mpsc::Sender<Result<(), AudioError>>,
) -> Result<(), AudioError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or(AudioError::NoDevice("input"))?;

    tracing::info!("Input device: {:?}", device.name());

    // Use the device's default configuration and convert in the callback
    let supported = device
        .default_input_config()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?;

    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.into();

    tracing::info!(
        "Capture config: {}Hz {}ch {:?} -> {}Hz mono i16",
        config.sample_rate.0,
        config.channels,
        sample_format,
        WIRE_FORMAT.sample_rate
    );

    let stream = match sample_format {
        SampleFormat::F32 => build_capture_stream::<f32>(&device, &config, producer),
        SampleFormat::I16 => build_capture_stream::<i16>(&device, &config, producer),
        SampleFormat::U16 => build_capture_stream::<u16>(&device, &config, producer),
        SampleFormat::I32 => build_capture_stream::<i32>(&device, &config, producer),
        other => Err(AudioError::UnsupportedFormat(format!("{:?}", other))),
    }?;

    stream
        .play()
        .map_err(|e| AudioError::StreamError(e.to_string()))?;

    tracing::info!("Audio capture started");
    let _ = ready_tx.send(Ok(()));

    // Wait for stop signal; a dropped handle also stops capture
    loop {
        match command_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(CaptureCommand::Stop) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
        }
    }

    if let Err(e) = stream.pause() {
        tracing::warn!("Cannot pause capture stream: {}", e);
    }
    tracing::info!("Audio capture stopped");
    Ok(())
}

fn build_capture_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut producer: HeapProd<i16>,
) -> Result<cpal::Stream, AudioError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels;
    let mut resampler = Resampler::new(config.sample_rate.0, WIRE_FORMAT.sample_rate);

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let samples: Vec<f32> = data.iter().map(|&s| s.to_sample::<f32>()).collect();
                let mono = downmix(&samples, channels);
                let resampled = resampler.process(&mono);
                let pcm: Vec<i16> = resampled.into_iter().map(f32_to_i16).collect();

                // Overflow is dropped when the pipeline falls behind
                producer.push_slice(&pcm);
            },
            |err| {
                tracing::error!("Audio input stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamError(e.to_string()))
}
