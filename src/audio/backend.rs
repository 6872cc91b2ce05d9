use tokio::sync::mpsc;

use crate::error::Result;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Frame length in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0;
        }
        let frames = self.samples.len() as u64 / self.channels as u64;
        frames * 1000 / self.sample_rate as u64
    }

    /// Timestamp of the end of this frame.
    pub fn end_ms(&self) -> u64 {
        self.timestamp_ms + self.duration_ms()
    }

    /// Samples as little-endian PCM bytes, the layout the voice
    /// endpoint consumes.
    pub fn pcm_bytes(&self) -> Vec<u8> {
        self.samples
            .iter()
            .flat_map(|sample| sample.to_le_bytes())
            .collect()
    }
}

/// Audio capture backend trait
///
/// Implementations:
/// - File: decode a WAV file and stream it in timed frames
/// - Microphone: live cpal input (behind the `microphone` feature)
#[async_trait::async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive audio frames. The
    /// channel closes when the source ends or the backend is stopped.
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing audio
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Capture backend factory
pub struct CaptureFactory;

impl CaptureFactory {
    /// Live microphone input. Fails with `UnsupportedEnvironment` when
    /// the crate was built without the `microphone` feature.
    pub fn microphone(sample_rate: u32) -> Result<Box<dyn CaptureBackend>> {
        #[cfg(feature = "microphone")]
        {
            let backend = super::mic::MicrophoneCapture::new(sample_rate)?;
            Ok(Box::new(backend))
        }

        #[cfg(not(feature = "microphone"))]
        {
            let _ = sample_rate;
            Err(crate::error::Error::UnsupportedEnvironment)
        }
    }

    /// Stream a WAV file as if it were live input.
    pub fn file(path: impl Into<std::path::PathBuf>) -> Box<dyn CaptureBackend> {
        Box::new(super::file::FileCapture::new(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_duration_accounts_for_channels() {
        let mono = AudioFrame {
            samples: vec![0; 1600],
            sample_rate: 16_000,
            channels: 1,
            timestamp_ms: 0,
        };
        assert_eq!(mono.duration_ms(), 100);
        assert_eq!(mono.end_ms(), 100);

        let stereo = AudioFrame {
            samples: vec![0; 1600],
            sample_rate: 16_000,
            channels: 2,
            timestamp_ms: 50,
        };
        assert_eq!(stereo.duration_ms(), 50);
        assert_eq!(stereo.end_ms(), 100);
    }

    #[test]
    fn pcm_bytes_are_little_endian() {
        let frame = AudioFrame {
            samples: vec![0x0102, -2],
            sample_rate: 16_000,
            channels: 1,
            timestamp_ms: 0,
        };
        assert_eq!(frame.pcm_bytes(), vec![0x02, 0x01, 0xfe, 0xff]);
    }

    #[cfg(not(feature = "microphone"))]
    #[test]
    fn microphone_needs_the_feature() {
        let err = CaptureFactory::microphone(16_000).err();
        assert!(matches!(
            err,
            Some(crate::error::Error::UnsupportedEnvironment)
        ));
    }
}
