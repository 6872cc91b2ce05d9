//! Trailing-silence detection for auto-stopping voice capture.

use super::backend::AudioFrame;

// Threshold at sensitivity 0 (only loud audio counts as speech). A
// sensitivity of 0.5 lands on 0.02 RMS, which works well for 16-bit
// microphone input; the floor keeps sensitivity 1.0 from treating the
// noise floor as speech.
const BASE_THRESHOLD: f32 = 0.04;
const MIN_THRESHOLD: f32 = 0.004;

/// Watches the frame stream and reports when the trailing run of
/// below-threshold audio exceeds the configured timeout.
///
/// Leading silence counts too: a session where nobody ever speaks
/// times out after the same interval.
#[derive(Debug)]
pub struct SilenceDetector {
    threshold: f32,
    timeout_ms: u64,
    silence_ms: u64,
}

impl SilenceDetector {
    /// `sensitivity` is the 0..=1 scale clients configure, 1 meaning
    /// "treat quiet audio as speech". `timeout_ms` is how much trailing
    /// silence ends the recording.
    pub fn new(sensitivity: f32, timeout_ms: u64) -> Self {
        let sensitivity = sensitivity.clamp(0.0, 1.0);
        Self {
            threshold: (BASE_THRESHOLD * (1.0 - sensitivity)).max(MIN_THRESHOLD),
            timeout_ms,
            silence_ms: 0,
        }
    }

    /// Feed one frame. Returns true once enough contiguous silence has
    /// accumulated; the caller is expected to stop the recording.
    pub fn observe(&mut self, frame: &AudioFrame) -> bool {
        if rms_i16(&frame.samples) >= self.threshold {
            self.silence_ms = 0;
        } else {
            self.silence_ms = self.silence_ms.saturating_add(frame.duration_ms());
        }
        self.silence_exceeded()
    }

    pub fn silence_exceeded(&self) -> bool {
        self.silence_ms >= self.timeout_ms
    }

    #[cfg(test)]
    fn threshold(&self) -> f32 {
        self.threshold
    }
}

fn rms_i16(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut sum = 0.0f64;
    for &s in samples {
        let v = s as f64 / 32768.0f64;
        sum += v * v;
    }
    (sum / samples.len() as f64).sqrt() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(samples: Vec<i16>, timestamp_ms: u64) -> AudioFrame {
        AudioFrame {
            samples,
            sample_rate: 16_000,
            channels: 1,
            timestamp_ms,
        }
    }

    // 100ms of mono audio at 16kHz
    fn silent_frame(timestamp_ms: u64) -> AudioFrame {
        frame(vec![0; 1600], timestamp_ms)
    }

    fn loud_frame(timestamp_ms: u64) -> AudioFrame {
        frame(vec![8000; 1600], timestamp_ms)
    }

    #[test]
    fn default_sensitivity_matches_expected_threshold() {
        let detector = SilenceDetector::new(0.5, 2000);
        assert!((detector.threshold() - 0.02).abs() < 1e-6);
    }

    #[test]
    fn silence_accumulates_to_timeout() {
        let mut detector = SilenceDetector::new(0.5, 300);
        assert!(!detector.observe(&silent_frame(0)));
        assert!(!detector.observe(&silent_frame(100)));
        assert!(detector.observe(&silent_frame(200)));
    }

    #[test]
    fn speech_resets_the_silence_run() {
        let mut detector = SilenceDetector::new(0.5, 300);
        assert!(!detector.observe(&silent_frame(0)));
        assert!(!detector.observe(&silent_frame(100)));
        assert!(!detector.observe(&loud_frame(200)));
        assert!(!detector.observe(&silent_frame(300)));
        assert!(!detector.observe(&silent_frame(400)));
        assert!(detector.observe(&silent_frame(500)));
    }

    #[test]
    fn rms_of_full_scale_square_wave_is_one() {
        let samples: Vec<i16> = (0..1600)
            .map(|i| if i % 2 == 0 { i16::MAX } else { i16::MIN })
            .collect();
        let rms = rms_i16(&samples);
        assert!((rms - 1.0).abs() < 0.01);
        assert_eq!(rms_i16(&[]), 0.0);
    }

    #[test]
    fn high_sensitivity_counts_quiet_audio_as_speech() {
        // RMS of a constant 500 amplitude is ~0.015
        let quiet = frame(vec![500; 1600], 0);
        let mut strict = SilenceDetector::new(0.0, 100);
        let mut lenient = SilenceDetector::new(1.0, 100);
        assert!(strict.observe(&quiet), "0.04 threshold treats this as silence");
        assert!(!lenient.observe(&quiet), "low threshold treats this as speech");
    }
}
