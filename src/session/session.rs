use super::batcher::BatchScheduler;
use super::config::SessionConfig;
use super::handshake::HandshakeApi;
use super::stats::{SessionState, SessionStats};
use crate::audio::{AudioSink, CaptureSource, PlaybackPipeline};
use crate::channel::{Channel, ChannelConnector, Envelope, InboundEvent, Role, StopReason};
use crate::transcript::{Message, TranscriptReconciler};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// A bidirectional speech session: microphone in, synthesized audio and
/// transcript out.
///
/// Owns the channel, the capture pipeline, the batch scheduler, and the
/// reconciler, and is the only component that transitions lifecycle state.
/// All collaborators are injected, so the controller itself never touches
/// hardware or the network directly.
pub struct SpeechSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: SessionConfig,

    /// Lifecycle state. Guarded by a blocking mutex: critical sections are a
    /// read or a single assignment, never an await.
    state: StdMutex<SessionState>,

    /// Transcript state machine. Only the dispatch task mutates it; the
    /// control API reads snapshots.
    reconciler: StdMutex<TranscriptReconciler>,

    /// Gates the batch scheduler loop; checked at the top of every tick.
    active: Arc<AtomicBool>,

    batches_published: Arc<AtomicUsize>,

    connector: Arc<dyn ChannelConnector>,
    capture: Mutex<Option<Box<dyn CaptureSource>>>,
    sink: Arc<dyn AudioSink>,
    handshake: Arc<dyn HandshakeApi>,

    channel: Mutex<Option<Arc<dyn Channel>>>,
    scheduler_task: Mutex<Option<JoinHandle<()>>>,
    dispatch_task: Mutex<Option<JoinHandle<()>>>,
    shutdown: StdMutex<watch::Sender<bool>>,

    started_at: StdMutex<Option<DateTime<Utc>>>,
    last_error: StdMutex<Option<String>>,
}

impl SpeechSession {
    pub fn new(
        config: SessionConfig,
        connector: Arc<dyn ChannelConnector>,
        capture: Box<dyn CaptureSource>,
        sink: Arc<dyn AudioSink>,
        handshake: Arc<dyn HandshakeApi>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);

        Self {
            inner: Arc::new(SessionInner {
                config,
                state: StdMutex::new(SessionState::Idle),
                reconciler: StdMutex::new(TranscriptReconciler::new()),
                active: Arc::new(AtomicBool::new(false)),
                batches_published: Arc::new(AtomicUsize::new(0)),
                connector,
                capture: Mutex::new(Some(capture)),
                sink,
                handshake,
                channel: Mutex::new(None),
                scheduler_task: Mutex::new(None),
                dispatch_task: Mutex::new(None),
                shutdown: StdMutex::new(shutdown),
                started_at: StdMutex::new(None),
                last_error: StdMutex::new(None),
            }),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.inner.config.session_id
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.lock().expect("state lock poisoned")
    }

    /// Start the session: open the channel, announce it, and begin listening
    /// for the model's `ready`.
    ///
    /// No-op unless the session is `Idle`. Activation (promptStart /
    /// systemPrompt / audioStart, capture, scheduler) happens when `ready`
    /// arrives on the channel, not here.
    pub async fn start(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock().expect("state lock poisoned");
            if *state != SessionState::Idle {
                warn!(
                    "Ignoring start for session {}: already {:?}",
                    self.inner.config.session_id, *state
                );
                return Ok(());
            }
            *state = SessionState::Connecting;
        }

        info!("Starting session {}", self.inner.config.session_id);

        self.inner
            .reconciler
            .lock()
            .expect("reconciler lock poisoned")
            .clear();
        *self.inner.last_error.lock().expect("error lock poisoned") = None;
        *self.inner.started_at.lock().expect("clock lock poisoned") = Some(Utc::now());
        self.inner.batches_published.store(0, Ordering::SeqCst);

        let address = self.inner.config.fresh_channel_address();

        let channel = match self.inner.connector.connect(&address).await {
            Ok(channel) => channel,
            Err(e) => {
                self.abort_connect();
                return Err(e).context("failed to open session channel");
            }
        };

        if let Err(e) = self
            .inner
            .handshake
            .announce(&self.inner.config.session_id, &address)
            .await
        {
            let _ = channel.close().await;
            self.abort_connect();
            return Err(e).context("channel handshake failed");
        }

        let inbound = match channel.subscribe().await {
            Ok(stream) => stream,
            Err(e) => {
                let _ = channel.close().await;
                self.abort_connect();
                return Err(e).context("failed to subscribe to session channel");
            }
        };

        *self.inner.channel.lock().await = Some(channel);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        *self.inner.shutdown.lock().expect("shutdown lock poisoned") = shutdown_tx;

        let inner = Arc::clone(&self.inner);
        let dispatch = tokio::spawn(dispatch_loop(inner, inbound, shutdown_rx));
        *self.inner.dispatch_task.lock().await = Some(dispatch);

        Ok(())
    }

    /// Close the session and release every resource.
    ///
    /// No-op if `Idle`. Safe to call from the interactive control path in any
    /// state, including mid-connect.
    pub async fn close(&self) -> Result<SessionStats> {
        {
            let mut state = self.inner.state.lock().expect("state lock poisoned");
            if *state == SessionState::Idle {
                warn!(
                    "Ignoring close for session {}: not running",
                    self.inner.config.session_id
                );
                drop(state);
                return Ok(self.stats());
            }
            *state = SessionState::Closing;
        }

        info!("Closing session {}", self.inner.config.session_id);

        teardown(&self.inner, true).await;

        Ok(self.stats())
    }

    /// The reconciled transcript so far.
    pub fn transcript(&self) -> Vec<Message> {
        self.inner
            .reconciler
            .lock()
            .expect("reconciler lock poisoned")
            .messages()
    }

    pub fn stats(&self) -> SessionStats {
        let started_at = *self.inner.started_at.lock().expect("clock lock poisoned");
        let duration_secs = started_at
            .map(|t| {
                Utc::now().signed_duration_since(t).num_milliseconds() as f64 / 1000.0
            })
            .unwrap_or(0.0);

        SessionStats {
            state: self.state(),
            started_at,
            duration_secs,
            batches_published: self.inner.batches_published.load(Ordering::SeqCst),
            transcript_messages: self
                .inner
                .reconciler
                .lock()
                .expect("reconciler lock poisoned")
                .message_count(),
            last_error: self
                .inner
                .last_error
                .lock()
                .expect("error lock poisoned")
                .clone(),
        }
    }

    fn abort_connect(&self) {
        *self.inner.state.lock().expect("state lock poisoned") = SessionState::Idle;
    }
}

/// Single consumer of the inbound envelope stream.
///
/// Everything network-facing on the receive side happens here, in one task:
/// reconciliation, playback dispatch, and the activation sequence. The
/// reconciler and the sink are therefore never touched concurrently.
async fn dispatch_loop(
    inner: Arc<SessionInner>,
    mut inbound: BoxStream<'static, Envelope>,
    mut shutdown: watch::Receiver<bool>,
) {
    let playback = PlaybackPipeline::new(Arc::clone(&inner.sink));

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            next = inbound.next() => match next {
                Some(envelope) => {
                    if handle_inbound(&inner, &playback, envelope).await.is_break() {
                        teardown_from_dispatch(&inner).await;
                        break;
                    }
                }
                None => {
                    // The subscription died underneath us. Dead channel, no
                    // auto-reconnect: same teardown as an explicit close.
                    let state = *inner.state.lock().expect("state lock poisoned");
                    if state == SessionState::Connecting || state == SessionState::Active {
                        record_error(&inner, "inbound subscription lost");
                        teardown_from_dispatch(&inner).await;
                    }
                    break;
                }
            }
        }
    }
}

enum Flow {
    Continue,
    Break,
}

impl Flow {
    fn is_break(&self) -> bool {
        matches!(self, Flow::Break)
    }
}

async fn handle_inbound(
    inner: &Arc<SessionInner>,
    playback: &PlaybackPipeline,
    envelope: Envelope,
) -> Flow {
    let event = match envelope.parse_inbound() {
        Ok(Some(event)) => event,
        // Wrong direction or a tag we don't know yet: not ours to handle.
        Ok(None) => return Flow::Continue,
        Err(e) => {
            warn!("Dropping envelope: {}", e);
            return Flow::Continue;
        }
    };

    match event {
        InboundEvent::Ready => {
            if let Err(e) = activate(inner).await {
                error!(
                    "Activation of session {} failed: {:#}",
                    inner.config.session_id, e
                );
                record_error(inner, &format!("{:#}", e));
                return Flow::Break;
            }
            Flow::Continue
        }

        InboundEvent::AudioOutput(chunks) => {
            playback.handle_chunks(&chunks);
            Flow::Continue
        }

        InboundEvent::TextStart(data) => {
            let mut reconciler = inner.reconciler.lock().expect("reconciler lock poisoned");
            reconciler.on_text_start(&data.id, data.role, data.generation_stage);
            Flow::Continue
        }

        InboundEvent::TextOutput(data) => {
            let mut reconciler = inner.reconciler.lock().expect("reconciler lock poisoned");
            reconciler.on_text_output(&data.id, data.role, &data.content);
            Flow::Continue
        }

        InboundEvent::TextStop(data) => {
            if data.stop_reason == StopReason::Interrupted {
                // Barge-in: whatever assistant audio is still queued is stale.
                inner.sink.clear();
            }
            let mut reconciler = inner.reconciler.lock().expect("reconciler lock poisoned");
            reconciler.on_text_stop(&data.id, data.stop_reason);
            Flow::Continue
        }

        InboundEvent::End => {
            info!("Model ended session {}", inner.config.session_id);
            Flow::Break
        }
    }
}

/// The model is ready: run the startup sequence and go `Active`.
async fn activate(inner: &Arc<SessionInner>) -> Result<()> {
    {
        let state = inner.state.lock().expect("state lock poisoned");
        if *state != SessionState::Connecting {
            // Duplicate or late `ready`; the first one won.
            return Ok(());
        }
    }

    let channel = inner
        .channel
        .lock()
        .await
        .clone()
        .context("session channel missing at activation")?;

    channel
        .publish(&Envelope::prompt_start())
        .await
        .context("failed to publish promptStart")?;
    channel
        .publish(&Envelope::system_prompt(&inner.config.system_prompt))
        .await
        .context("failed to publish systemPrompt")?;
    channel
        .publish(&Envelope::audio_start())
        .await
        .context("failed to publish audioStart")?;

    inner
        .reconciler
        .lock()
        .expect("reconciler lock poisoned")
        .seed(Role::System, &inner.config.system_prompt);

    inner
        .sink
        .start()
        .context("failed to start playback sink")?;

    let chunks = {
        let mut capture = inner.capture.lock().await;
        let source = capture.as_mut().context("capture source missing")?;
        source
            .start()
            .await
            .context("failed to start microphone capture")?
    };

    inner.active.store(true, Ordering::SeqCst);

    let scheduler = BatchScheduler::new(inner.config.batch.clone());
    let handle = tokio::spawn(scheduler.run(
        chunks,
        channel,
        Arc::clone(&inner.active),
        Arc::clone(&inner.batches_published),
    ));
    *inner.scheduler_task.lock().await = Some(handle);

    *inner.state.lock().expect("state lock poisoned") = SessionState::Active;

    info!("Session {} active", inner.config.session_id);

    Ok(())
}

/// Teardown initiated from inside the dispatch task (inbound `end`, transport
/// failure, activation failure). Identical to `close()` except it must not
/// await its own join handle.
async fn teardown_from_dispatch(inner: &Arc<SessionInner>) {
    {
        let mut state = inner.state.lock().expect("state lock poisoned");
        if *state == SessionState::Idle {
            return;
        }
        *state = SessionState::Closing;
    }

    teardown(inner, false).await;
}

/// Release session resources in a fixed order: capture first (stop producing),
/// then the scheduler (drain the queue), then `audioStop`, the sink, the
/// channel, and last the dispatch task. Every step is a `take()` so the path
/// is idempotent and partial failure cannot leak a microphone handle or leave
/// the scheduler loop running.
async fn teardown(inner: &Arc<SessionInner>, await_dispatch: bool) {
    if let Some(capture) = inner.capture.lock().await.as_mut() {
        if let Err(e) = capture.stop().await {
            warn!("Failed to stop capture: {}", e);
        }
    }

    let was_active = inner.active.swap(false, Ordering::SeqCst);

    if let Some(handle) = inner.scheduler_task.lock().await.take() {
        if let Err(e) = handle.await {
            error!("Batch scheduler task panicked: {}", e);
        }
    }

    if was_active {
        if let Some(channel) = inner.channel.lock().await.as_ref() {
            if let Err(e) = channel.publish(&Envelope::audio_stop()).await {
                warn!("Failed to publish audioStop: {}", e);
            }
        }
    }

    inner.sink.stop();

    let _ = inner
        .shutdown
        .lock()
        .expect("shutdown lock poisoned")
        .send(true);

    if let Some(channel) = inner.channel.lock().await.take() {
        if let Err(e) = channel.close().await {
            warn!("Failed to close channel: {}", e);
        }
    }

    let dispatch = inner.dispatch_task.lock().await.take();
    if let Some(handle) = dispatch {
        if await_dispatch {
            if let Err(e) = handle.await {
                error!("Dispatch task panicked: {}", e);
            }
        }
        // From inside the dispatch task the handle is our own; dropping it
        // detaches the already-finishing task.
    }

    *inner.state.lock().expect("state lock poisoned") = SessionState::Idle;

    info!("Session {} idle", inner.config.session_id);
}

fn record_error(inner: &Arc<SessionInner>, message: &str) {
    *inner.last_error.lock().expect("error lock poisoned") = Some(message.to_string());
}
