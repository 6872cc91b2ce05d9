//! Live microphone capture via cpal.
//!
//! `cpal::Stream` is not `Send`, so the stream lives on a dedicated
//! thread for its whole lifetime. The thread reports startup success
//! over a oneshot and then parks until it is told to shut down. A
//! mid-capture stream error closes the frame channel, which the
//! session reads as end-of-stream.

use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleRate;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use super::backend::{AudioFrame, CaptureBackend};
use crate::error::{Error, Result};

const FRAME_MS: u64 = 100;
const CHANNELS: u16 = 1;

pub struct MicrophoneCapture {
    sample_rate: u32,
    worker: Option<Worker>,
}

struct Worker {
    shutdown: std_mpsc::Sender<()>,
    thread: thread::JoinHandle<()>,
}

impl MicrophoneCapture {
    pub fn new(sample_rate: u32) -> Result<Self> {
        Ok(Self {
            sample_rate,
            worker: None,
        })
    }
}

#[async_trait::async_trait]
impl CaptureBackend for MicrophoneCapture {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.worker.is_some() {
            return Err(Error::Capture("microphone already capturing".to_string()));
        }

        let (frame_tx, frame_rx) = mpsc::channel(32);
        let (ready_tx, ready_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = std_mpsc::channel();
        let sample_rate = self.sample_rate;

        let thread = thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || run_capture_thread(sample_rate, frame_tx, ready_tx, shutdown_rx))
            .map_err(|err| Error::Capture(format!("failed to spawn capture thread: {err}")))?;

        match ready_rx.await {
            Ok(Ok(())) => {
                self.worker = Some(Worker {
                    shutdown: shutdown_tx,
                    thread,
                });
                Ok(frame_rx)
            }
            Ok(Err(err)) => {
                let _ = thread.join();
                Err(err)
            }
            Err(_) => {
                let _ = thread.join();
                Err(Error::Capture("capture thread exited during startup".to_string()))
            }
        }
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(worker) = self.worker.take() {
            let _ = worker.shutdown.send(());
            // Join off the async runtime; the thread only has to drop the stream.
            tokio::task::spawn_blocking(move || {
                if worker.thread.join().is_err() {
                    error!("Capture thread panicked during shutdown");
                }
            })
            .await
            .map_err(|err| Error::Capture(format!("failed to join capture thread: {err}")))?;
            debug!("Microphone capture stopped");
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.worker.is_some()
    }

    fn name(&self) -> &str {
        "microphone"
    }
}

impl Drop for MicrophoneCapture {
    fn drop(&mut self) {
        // Dropping the sender unparks the thread, which releases the device.
        if let Some(worker) = self.worker.take() {
            drop(worker.shutdown);
        }
    }
}

fn run_capture_thread(
    sample_rate: u32,
    frame_tx: mpsc::Sender<AudioFrame>,
    ready_tx: oneshot::Sender<Result<()>>,
    shutdown_rx: std_mpsc::Receiver<()>,
) {
    let stream = match build_stream(sample_rate, frame_tx) {
        Ok(stream) => stream,
        Err(err) => {
            let _ = ready_tx.send(Err(err));
            return;
        }
    };
    if let Err(err) = stream.play() {
        let _ = ready_tx.send(Err(classify_cpal_error(&err.to_string())));
        return;
    }
    let _ = ready_tx.send(Ok(()));

    // Block until stop or drop; either way the stream is released here.
    let _ = shutdown_rx.recv();
    drop(stream);
}

fn build_stream(sample_rate: u32, frame_tx: mpsc::Sender<AudioFrame>) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host.default_input_device().ok_or(Error::NoDeviceFound)?;

    let supported = device
        .supported_input_configs()
        .map_err(|err| classify_cpal_error(&err.to_string()))?
        .find(|c| {
            c.channels() == CHANNELS
                && c.sample_format() == cpal::SampleFormat::F32
                && c.min_sample_rate() <= SampleRate(sample_rate)
                && c.max_sample_rate() >= SampleRate(sample_rate)
        })
        .ok_or_else(|| {
            Error::Capture(format!("no mono input configuration at {sample_rate} Hz"))
        })?;
    let config = supported.with_sample_rate(SampleRate(sample_rate)).config();

    debug!(
        device = device.name().unwrap_or_default(),
        sample_rate, "Microphone capture initialized"
    );

    let samples_per_frame = (sample_rate as u64 * FRAME_MS / 1000) as usize;
    let mut pending: Vec<i16> = Vec::with_capacity(samples_per_frame);
    let mut emitted_samples: u64 = 0;

    // Both callbacks share the frame sender so the error callback can
    // drop it, closing the channel the session reads from.
    let frame_slot = Arc::new(Mutex::new(Some(frame_tx)));
    let error_slot = Arc::clone(&frame_slot);

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                for &sample in data {
                    pending.push((sample * 32767.0).clamp(-32768.0, 32767.0) as i16);
                    if pending.len() >= samples_per_frame {
                        let samples = std::mem::replace(
                            &mut pending,
                            Vec::with_capacity(samples_per_frame),
                        );
                        let frame = AudioFrame {
                            timestamp_ms: emitted_samples * 1000 / sample_rate as u64,
                            samples,
                            sample_rate,
                            channels: CHANNELS,
                        };
                        emitted_samples += samples_per_frame as u64;
                        let Ok(slot) = frame_slot.lock() else { return };
                        let Some(sender) = slot.as_ref() else { return };
                        // Never block the audio callback; shed frames instead.
                        if sender.try_send(frame).is_err() {
                            warn!("Dropping audio frame, session is not keeping up");
                        }
                    }
                }
            },
            move |err| {
                error!(error = %err, "Audio capture error");
                // End-of-stream for the session; it finalizes with the
                // audio delivered so far.
                if let Ok(mut slot) = error_slot.lock() {
                    slot.take();
                }
            },
            None,
        )
        .map_err(|err| match err {
            cpal::BuildStreamError::DeviceNotAvailable => Error::NoDeviceFound,
            other => classify_cpal_error(&other.to_string()),
        })?;

    Ok(stream)
}

// cpal folds OS-level failures into backend-specific strings, so
// permission problems can only be recognized by their text.
fn classify_cpal_error(detail: &str) -> Error {
    let lowered = detail.to_lowercase();
    if lowered.contains("permission") || lowered.contains("denied") {
        Error::PermissionDenied
    } else if lowered.contains("no device") || lowered.contains("not available") {
        Error::NoDeviceFound
    } else {
        Error::Capture(detail.to_string())
    }
}
