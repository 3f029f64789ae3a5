use super::codec;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("no audio output device available")]
    NoDevice,

    #[error("audio playback stream error: {0}")]
    Stream(String),
}

/// Streaming audio sink with an internal queue.
///
/// `enqueue` appends decoded samples behind whatever is still playing, so
/// consecutive chunks play back gaplessly; callers never wait for playback.
pub trait AudioSink: Send + Sync {
    fn start(&self) -> Result<(), PlaybackError>;

    fn enqueue(&self, samples: Vec<f32>);

    /// Drop any queued audio (used on interruption and teardown).
    fn clear(&self);

    fn queued_samples(&self) -> usize;

    fn stop(&self);
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is only touched through the Mutex in `CpalSink`, one
/// thread at a time.
struct SendStream(cpal::Stream);

unsafe impl Send for SendStream {}

/// CPAL speaker sink: the output callback drains the shared queue and
/// zero-fills on underrun instead of glitching.
pub struct CpalSink {
    sample_rate: u32,
    queue: Arc<Mutex<VecDeque<f32>>>,
    stream: Mutex<Option<SendStream>>,
}

impl CpalSink {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            queue: Arc::new(Mutex::new(VecDeque::new())),
            stream: Mutex::new(None),
        }
    }
}

impl AudioSink for CpalSink {
    fn start(&self) -> Result<(), PlaybackError> {
        let mut guard = self.stream.lock().expect("playback stream lock poisoned");
        if guard.is_some() {
            return Ok(());
        }

        let device = cpal::default_host()
            .default_output_device()
            .ok_or(PlaybackError::NoDevice)?;

        let config = cpal::StreamConfig {
            channels: 1,
            sample_rate: self.sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        let queue = Arc::clone(&self.queue);
        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut queued = queue.lock().expect("playback queue lock poisoned");
                    for slot in data.iter_mut() {
                        *slot = queued.pop_front().unwrap_or(0.0);
                    }
                },
                |err| {
                    warn!("Audio playback stream error: {}", err);
                },
                None,
            )
            .map_err(|e| PlaybackError::Stream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| PlaybackError::Stream(e.to_string()))?;

        info!("Playback sink started at {} Hz", self.sample_rate);

        *guard = Some(SendStream(stream));
        Ok(())
    }

    fn enqueue(&self, samples: Vec<f32>) {
        let mut queued = self.queue.lock().expect("playback queue lock poisoned");
        queued.extend(samples);
    }

    fn clear(&self) {
        let mut queued = self.queue.lock().expect("playback queue lock poisoned");
        queued.clear();
    }

    fn queued_samples(&self) -> usize {
        self.queue
            .lock()
            .expect("playback queue lock poisoned")
            .len()
    }

    fn stop(&self) {
        let mut guard = self.stream.lock().expect("playback stream lock poisoned");
        if let Some(stream) = guard.take() {
            if let Err(e) = stream.0.pause() {
                warn!("Failed to pause playback stream: {}", e);
            }
        }
        self.clear();
    }
}

/// Decodes inbound audio chunks and feeds them to the sink in arrival order.
pub struct PlaybackPipeline {
    sink: Arc<dyn AudioSink>,
}

impl PlaybackPipeline {
    pub fn new(sink: Arc<dyn AudioSink>) -> Self {
        Self { sink }
    }

    /// Decode each chunk of one `audioOutput` envelope, oldest first.
    ///
    /// An undecodable chunk is dropped with a warning; a playback glitch is
    /// not a session failure.
    pub fn handle_chunks(&self, chunks: &[String]) {
        for chunk in chunks {
            match codec::decode_chunk(chunk) {
                Ok(samples) => self.sink.enqueue(samples),
                Err(e) => warn!("Dropping undecodable audio chunk: {}", e),
            }
        }
    }
}
