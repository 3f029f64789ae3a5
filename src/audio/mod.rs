pub mod capture;
pub mod codec;
pub mod playback;

pub use capture::{CaptureConfig, CaptureError, CaptureSource, CpalCapture};
pub use playback::{AudioSink, CpalSink, PlaybackError, PlaybackPipeline};
