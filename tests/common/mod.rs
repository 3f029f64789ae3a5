// Scripted collaborators for driving sessions and the batch scheduler
// without hardware, a NATS server, or a model process behind them.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use voicebridge::{
    AudioSink, CaptureError, CaptureSource, Channel, ChannelConnector, ChannelError, Direction,
    Envelope, HandshakeApi, PlaybackError,
};

/// In-memory channel: records everything published, and lets the test feed
/// inbound envelopes through a sender.
pub struct ScriptedChannel {
    pub published: Mutex<Vec<Envelope>>,
    inbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Envelope>>>,
    inbound_tx: Mutex<Option<mpsc::UnboundedSender<Envelope>>>,
    pub fail_next_publishes: AtomicUsize,
    pub closed: AtomicBool,
}

impl ScriptedChannel {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            published: Mutex::new(Vec::new()),
            inbound_rx: Mutex::new(Some(rx)),
            inbound_tx: Mutex::new(Some(tx)),
            fail_next_publishes: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        })
    }

    pub fn push_inbound(&self, envelope: Envelope) {
        let guard = self.inbound_tx.lock().unwrap();
        guard
            .as_ref()
            .expect("inbound side already dropped")
            .send(envelope)
            .expect("inbound stream gone");
    }

    /// Simulate the subscription dying mid-session.
    pub fn drop_inbound(&self) {
        self.inbound_tx.lock().unwrap().take();
    }

    /// Event tags of everything published so far, in order.
    pub fn published_events(&self) -> Vec<String> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|envelope| envelope.event.clone())
            .collect()
    }

    /// Sizes of all published audioInput batches, in order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|envelope| envelope.event == "audioInput")
            .map(|envelope| envelope.data.as_array().map(Vec::len).unwrap_or(0))
            .collect()
    }

    /// All chunks across published audioInput batches, flattened in order.
    pub fn batched_chunks(&self) -> Vec<String> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|envelope| envelope.event == "audioInput")
            .flat_map(|envelope| {
                envelope
                    .data
                    .as_array()
                    .map(|chunks| {
                        chunks
                            .iter()
                            .filter_map(|c| c.as_str().map(str::to_string))
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default()
            })
            .collect()
    }
}

#[async_trait]
impl Channel for ScriptedChannel {
    async fn publish(&self, envelope: &Envelope) -> Result<(), ChannelError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ChannelError::Closed);
        }

        let remaining = self.fail_next_publishes.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next_publishes.store(remaining - 1, Ordering::SeqCst);
            return Err(ChannelError::Publish("scripted publish failure".into()));
        }

        self.published.lock().unwrap().push(envelope.clone());
        Ok(())
    }

    async fn subscribe(&self) -> Result<BoxStream<'static, Envelope>, ChannelError> {
        let rx = self
            .inbound_rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| ChannelError::Subscription("already subscribed".into()))?;

        Ok(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|envelope| (envelope, rx))
        })
        .boxed())
    }

    async fn close(&self) -> Result<(), ChannelError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn address(&self) -> &str {
        "scripted.channel"
    }
}

/// Connector handing out one prepared [`ScriptedChannel`].
pub struct ScriptedConnector {
    channel: Mutex<Option<Arc<ScriptedChannel>>>,
    pub connects: AtomicUsize,
    pub fail: AtomicBool,
}

impl ScriptedConnector {
    pub fn new(channel: Arc<ScriptedChannel>) -> Arc<Self> {
        Arc::new(Self {
            channel: Mutex::new(Some(channel)),
            connects: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            channel: Mutex::new(None),
            connects: AtomicUsize::new(0),
            fail: AtomicBool::new(true),
        })
    }
}

#[async_trait]
impl ChannelConnector for ScriptedConnector {
    async fn connect(&self, _address: &str) -> Result<Arc<dyn Channel>, ChannelError> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        if self.fail.load(Ordering::SeqCst) {
            return Err(ChannelError::Connect("scripted connect failure".into()));
        }

        let channel = self
            .channel
            .lock()
            .unwrap()
            .clone()
            .expect("no scripted channel prepared");
        let channel: Arc<dyn Channel> = channel;
        Ok(channel)
    }
}

/// Capture source fed by the test instead of a microphone.
pub struct ScriptedCapture {
    rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    deny_permission: bool,
    capturing: AtomicBool,
    pub stops: AtomicUsize,
}

impl ScriptedCapture {
    /// Returns the capture source and the sender the test uses to push
    /// encoded chunks "from the microphone".
    pub fn new() -> (Box<Self>, mpsc::UnboundedSender<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Box::new(Self {
                rx: Mutex::new(Some(rx)),
                deny_permission: false,
                capturing: AtomicBool::new(false),
                stops: AtomicUsize::new(0),
            }),
            tx,
        )
    }

    pub fn denied() -> Box<Self> {
        Box::new(Self {
            rx: Mutex::new(None),
            deny_permission: true,
            capturing: AtomicBool::new(false),
            stops: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl CaptureSource for ScriptedCapture {
    async fn start(&mut self) -> Result<mpsc::UnboundedReceiver<String>, CaptureError> {
        if self.deny_permission {
            return Err(CaptureError::PermissionDenied);
        }

        let rx = self
            .rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| CaptureError::Stream("scripted capture already started".into()))?;

        self.capturing.store(true, Ordering::SeqCst);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        self.capturing.store(false, Ordering::SeqCst);
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "scripted-capture"
    }
}

/// Sink that records what would have been played.
#[derive(Default)]
pub struct CollectingSink {
    pub started: AtomicBool,
    pub stops: AtomicUsize,
    pub clears: AtomicUsize,
    pub enqueued: Mutex<Vec<Vec<f32>>>,
}

impl CollectingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl AudioSink for CollectingSink {
    fn start(&self) -> Result<(), PlaybackError> {
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn enqueue(&self, samples: Vec<f32>) {
        self.enqueued.lock().unwrap().push(samples);
    }

    fn clear(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
    }

    fn queued_samples(&self) -> usize {
        self.enqueued.lock().unwrap().iter().map(Vec::len).sum()
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Records announce calls instead of making an HTTP request.
#[derive(Default)]
pub struct RecordingHandshake {
    pub announces: Mutex<Vec<(String, String)>>,
    pub fail: AtomicBool,
}

impl RecordingHandshake {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl HandshakeApi for RecordingHandshake {
    async fn announce(&self, session_id: &str, channel_address: &str) -> Result<(), ChannelError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ChannelError::Connect("scripted handshake failure".into()));
        }

        self.announces
            .lock()
            .unwrap()
            .push((session_id.to_string(), channel_address.to_string()));
        Ok(())
    }
}

// ============================================================================
// Inbound envelope builders (model -> client)
// ============================================================================

pub fn ready_envelope() -> Envelope {
    inbound("ready", serde_json::Value::Null)
}

pub fn end_envelope() -> Envelope {
    inbound("end", serde_json::Value::Null)
}

pub fn audio_output_envelope(chunks: &[&str]) -> Envelope {
    inbound("audioOutput", json!(chunks))
}

pub fn text_start_envelope(id: &str, role: &str, stage: &str) -> Envelope {
    inbound(
        "textStart",
        json!({ "id": id, "role": role, "generationStage": stage }),
    )
}

pub fn text_output_envelope(id: &str, role: &str, content: &str) -> Envelope {
    inbound(
        "textOutput",
        json!({ "id": id, "role": role, "content": content }),
    )
}

pub fn text_stop_envelope(id: &str, stop_reason: &str) -> Envelope {
    inbound("textStop", json!({ "id": id, "stopReason": stop_reason }))
}

fn inbound(event: &str, data: serde_json::Value) -> Envelope {
    Envelope {
        direction: Direction::ModelToClient,
        event: event.to_string(),
        data,
    }
}

/// Poll a condition until it holds or two seconds pass.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
