use super::codec;
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Capture failures surfaced to the session controller.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// Microphone access refused. Fatal to session start, no retry.
    #[error("microphone permission denied")]
    PermissionDenied,

    /// Host has no usable input device at all.
    #[error("no audio input device available")]
    NoDevice,

    #[error("audio capture stream error: {0}")]
    Stream(String),
}

/// Configuration for the capture pipeline.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Target sample rate in Hz (16 kHz on the wire).
    pub sample_rate: u32,
    /// Samples per encoded chunk, fixed at construction.
    pub frame_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            frame_size: 512,
        }
    }
}

/// Microphone capture source.
///
/// `start` returns the receiving end of an unbounded FIFO of base64 PCM16
/// chunks. The sending side lives on the hardware audio callback, which only
/// converts, encodes, and enqueues — it never blocks and never touches the
/// network.
#[async_trait]
pub trait CaptureSource: Send + Sync {
    async fn start(&mut self) -> Result<mpsc::UnboundedReceiver<String>, CaptureError>;

    async fn stop(&mut self) -> Result<(), CaptureError>;

    fn is_capturing(&self) -> bool;

    /// Source name for logging
    fn name(&self) -> &str;
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is only touched through the Mutex in `CpalCapture`, one
/// thread at a time, and its methods do not cross thread boundaries.
struct SendStream(cpal::Stream);

unsafe impl Send for SendStream {}

/// CPAL-backed microphone capture.
///
/// Prefers a mono stream at the target rate with a fixed frame size; falls
/// back to the device's native config with software downmix and decimation
/// when the preferred config is rejected.
pub struct CpalCapture {
    config: CaptureConfig,
    stream: Mutex<Option<SendStream>>,
    capturing: Arc<AtomicBool>,
}

impl CpalCapture {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            stream: Mutex::new(None),
            capturing: Arc::new(AtomicBool::new(false)),
        }
    }

    fn input_device() -> Result<cpal::Device, CaptureError> {
        let host = cpal::default_host();

        match host.default_input_device() {
            Some(device) => Ok(device),
            None => {
                // Devices exist but none is offered as default: the platform
                // is withholding the microphone, not missing hardware.
                let any_device = host
                    .input_devices()
                    .map(|mut devices| devices.next().is_some())
                    .unwrap_or(false);
                if any_device {
                    Err(CaptureError::PermissionDenied)
                } else {
                    Err(CaptureError::NoDevice)
                }
            }
        }
    }

    fn build_stream(
        &self,
        device: &cpal::Device,
        tx: mpsc::UnboundedSender<String>,
    ) -> Result<cpal::Stream, CaptureError> {
        let preferred = cpal::StreamConfig {
            channels: 1,
            sample_rate: self.config.sample_rate,
            buffer_size: cpal::BufferSize::Fixed(self.config.frame_size as u32),
        };

        let err_callback = |err| {
            warn!("Audio capture stream error: {}", err);
        };

        let mut chunker = FrameChunker::new(self.config.frame_size);
        let sender = tx.clone();
        if let Ok(stream) = device.build_input_stream(
            &preferred,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                chunker.push(data, |frame| {
                    let _ = sender.send(codec::encode_frame(frame));
                });
            },
            err_callback,
            None,
        ) {
            return Ok(stream);
        }

        // Native-config fallback: capture at whatever the device offers and
        // convert in software before encoding.
        let native = device
            .default_input_config()
            .map_err(|e| CaptureError::Stream(format!("failed to query input config: {}", e)))?;

        if native.sample_format() != cpal::SampleFormat::F32 {
            return Err(CaptureError::Stream(format!(
                "unsupported native sample format: {:?}",
                native.sample_format()
            )));
        }

        let native_channels = native.channels() as usize;
        let native_rate = native.sample_rate();
        let target_rate = self.config.sample_rate;
        let stream_config: cpal::StreamConfig = native.into();

        info!(
            "Capture using native format ({}ch/{}Hz), converting in software",
            native_channels, native_rate
        );

        let mut chunker = FrameChunker::new(self.config.frame_size);
        device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let mono = mix_to_mono(data, native_channels);
                    let resampled = decimate(&mono, native_rate, target_rate);
                    chunker.push(&resampled, |frame| {
                        let _ = tx.send(codec::encode_frame(frame));
                    });
                },
                err_callback,
                None,
            )
            .map_err(map_build_error)
    }
}

#[async_trait]
impl CaptureSource for CpalCapture {
    async fn start(&mut self) -> Result<mpsc::UnboundedReceiver<String>, CaptureError> {
        let device = Self::input_device()?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

        let (tx, rx) = mpsc::unbounded_channel();

        let stream = self.build_stream(&device, tx)?;
        stream.play().map_err(|e| CaptureError::Stream(e.to_string()))?;

        info!(
            "Microphone capture started on {} ({} Hz, {} samples/frame)",
            device_name, self.config.sample_rate, self.config.frame_size
        );

        let mut guard = self.stream.lock().expect("capture stream lock poisoned");
        *guard = Some(SendStream(stream));
        self.capturing.store(true, Ordering::SeqCst);

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        let mut guard = self.stream.lock().expect("capture stream lock poisoned");

        if let Some(stream) = guard.take() {
            if let Err(e) = stream.0.pause() {
                warn!("Failed to pause capture stream: {}", e);
            }
            // Dropping the stream releases the microphone handle.
        }

        self.capturing.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "cpal-microphone"
    }
}

fn map_build_error(err: cpal::BuildStreamError) -> CaptureError {
    match err {
        // cpal reports an OS-level permission refusal as the device going away.
        cpal::BuildStreamError::DeviceNotAvailable => CaptureError::PermissionDenied,
        other => CaptureError::Stream(other.to_string()),
    }
}

/// Accumulates samples and emits fixed-size frames.
///
/// The platform callback is not guaranteed to deliver exactly the requested
/// buffer size, so frames are re-cut here before encoding.
struct FrameChunker {
    frame_size: usize,
    pending: Vec<f32>,
}

impl FrameChunker {
    fn new(frame_size: usize) -> Self {
        Self {
            frame_size,
            pending: Vec::with_capacity(frame_size * 2),
        }
    }

    fn push(&mut self, samples: &[f32], mut emit: impl FnMut(&[f32])) {
        self.pending.extend_from_slice(samples);
        while self.pending.len() >= self.frame_size {
            let frame: Vec<f32> = self.pending.drain(..self.frame_size).collect();
            emit(&frame);
        }
    }
}

/// Mix interleaved multi-channel audio down to mono by averaging.
fn mix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }

    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Downsample by decimation: take every Nth sample. Upsampling is not
/// attempted; the input is returned unchanged when the rates already match
/// or the ratio is below 2.
fn decimate(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate {
        return samples.to_vec();
    }

    let ratio = source_rate / target_rate;
    if ratio <= 1 {
        return samples.to_vec();
    }

    samples.iter().step_by(ratio as usize).copied().collect()
}
