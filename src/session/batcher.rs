use crate::channel::{Channel, Envelope};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Batching thresholds.
///
/// Below the low-water mark chunks wait for more to accumulate, capping the
/// publish rate; the high-water mark caps envelope size and end-to-end
/// latency. Observed tuning values, kept configurable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    pub low_water: usize,
    pub high_water: usize,
    /// Tick interval of the cooperative drain loop.
    pub tick: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            low_water: 10,
            high_water: 20,
            tick: Duration::from_millis(10),
        }
    }
}

/// Drains the capture FIFO and publishes `audioInput` batches.
///
/// Runs as its own cooperative loop, independent of the audio callback; the
/// two only meet through the unbounded chunk channel.
pub struct BatchScheduler {
    config: BatchConfig,
}

impl BatchScheduler {
    pub fn new(config: BatchConfig) -> Self {
        Self { config }
    }

    /// Run until `active` goes false, then flush the tail and return.
    ///
    /// A failed publish is not fatal: the batch is requeued at the front in
    /// its original order and retried on the next tick.
    pub async fn run(
        self,
        mut chunks: mpsc::UnboundedReceiver<String>,
        channel: Arc<dyn Channel>,
        active: Arc<AtomicBool>,
        batches_published: Arc<AtomicUsize>,
    ) {
        info!(
            "Batch scheduler started (low={}, high={})",
            self.config.low_water, self.config.high_water
        );

        let mut ticker = tokio::time::interval(self.config.tick);
        let mut pending: VecDeque<String> = VecDeque::new();

        loop {
            ticker.tick().await;

            // The active flag gates every rescheduling decision; checked
            // before any work so close() stops the loop deterministically.
            if !active.load(Ordering::SeqCst) {
                break;
            }

            while let Ok(chunk) = chunks.try_recv() {
                pending.push_back(chunk);
            }

            if pending.len() <= self.config.low_water {
                continue;
            }

            Self::publish_batch(
                &mut pending,
                self.config.high_water,
                channel.as_ref(),
                &batches_published,
            )
            .await;
        }

        // Session is closing: drain whatever the capture pipeline still had
        // in flight. Tail batches may go below the low-water mark.
        while let Ok(chunk) = chunks.try_recv() {
            pending.push_back(chunk);
        }

        while !pending.is_empty() {
            let before = pending.len();
            Self::publish_batch(
                &mut pending,
                self.config.high_water,
                channel.as_ref(),
                &batches_published,
            )
            .await;
            if pending.len() == before {
                // Channel is gone; nothing left to do with the tail.
                warn!("Discarding {} unsent audio chunks at shutdown", before);
                break;
            }
        }

        info!("Batch scheduler stopped");
    }

    async fn publish_batch(
        pending: &mut VecDeque<String>,
        high_water: usize,
        channel: &dyn Channel,
        batches_published: &AtomicUsize,
    ) {
        let take = pending.len().min(high_water);
        let batch: Vec<String> = pending.drain(..take).collect();

        match channel.publish(&Envelope::audio_input(&batch)).await {
            Ok(()) => {
                batches_published.fetch_add(1, Ordering::SeqCst);
                debug!("Published audio batch of {} chunks", batch.len());
            }
            Err(e) => {
                warn!("Audio batch publish failed, requeueing: {}", e);
                for chunk in batch.into_iter().rev() {
                    pending.push_front(chunk);
                }
            }
        }
    }
}
