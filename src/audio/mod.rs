pub mod backend;
pub mod file;
pub mod vad;

#[cfg(feature = "microphone")]
pub mod mic;

pub use backend::{AudioFrame, CaptureBackend, CaptureFactory};
pub use file::FileCapture;
pub use vad::SilenceDetector;

#[cfg(feature = "microphone")]
pub use mic::MicrophoneCapture;
