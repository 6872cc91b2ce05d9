use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hound::WavReader;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::backend::{AudioFrame, CaptureBackend};
use crate::error::{Error, Result};

const DEFAULT_FRAME_MS: u64 = 100;

/// Streams a WAV file through the capture interface, one frame at a
/// time, paced to real time so the session behaves as it would with a
/// live microphone. Useful for demos and tests.
pub struct FileCapture {
    path: PathBuf,
    frame_ms: u64,
    paced: bool,
    running: Arc<AtomicBool>,
}

impl FileCapture {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            frame_ms: DEFAULT_FRAME_MS,
            paced: true,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Emit frames as fast as the consumer accepts them instead of
    /// sleeping between frames.
    pub fn unpaced(path: impl Into<PathBuf>) -> Self {
        Self {
            paced: false,
            ..Self::new(path)
        }
    }

    /// Sample rate declared in the WAV header, read without decoding
    /// the samples. Sessions built around this capture should advertise
    /// this rate, not assume the microphone default.
    pub fn sample_rate(&self) -> Result<u32> {
        let reader = WavReader::open(&self.path).map_err(|err| {
            Error::Capture(format!("failed to open {}: {err}", self.path.display()))
        })?;
        Ok(reader.spec().sample_rate)
    }

    fn load(path: &Path) -> Result<LoadedAudio> {
        let reader = WavReader::open(path)
            .map_err(|err| Error::Capture(format!("failed to open {}: {err}", path.display())))?;

        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|err| Error::Capture(format!("failed to read audio samples: {err}")))?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);
        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(LoadedAudio {
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }
}

struct LoadedAudio {
    sample_rate: u32,
    channels: u16,
    samples: Vec<i16>,
}

#[async_trait::async_trait]
impl CaptureBackend for FileCapture {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        let audio = Self::load(&self.path)?;
        let samples_per_frame =
            (audio.sample_rate as u64 * audio.channels as u64 * self.frame_ms / 1000) as usize;
        if samples_per_frame == 0 {
            return Err(Error::Capture(format!(
                "unusable WAV spec in {}",
                self.path.display()
            )));
        }

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let paced = self.paced;
        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            let mut timestamp_ms = 0u64;
            for chunk in audio.samples.chunks(samples_per_frame) {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                let frame = AudioFrame {
                    samples: chunk.to_vec(),
                    sample_rate: audio.sample_rate,
                    channels: audio.channels,
                    timestamp_ms,
                };
                let frame_duration = frame.duration_ms();
                if tx.send(frame).await.is_err() {
                    debug!("Frame receiver dropped, stopping file playback");
                    break;
                }
                timestamp_ms += frame_duration;
                if paced {
                    tokio::time::sleep(std::time::Duration::from_millis(frame_duration)).await;
                }
            }
            running.store(false, Ordering::SeqCst);
        });

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "file"
    }
}
