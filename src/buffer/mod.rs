use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::error;

/// Consumer for full batches. Delivery failures are the sink's own problem:
/// the buffer never inspects, retries, or fails because of them.
pub trait BatchSink: Send + Sync + 'static {
    fn flush(&self, batch: Vec<String>) -> impl Future<Output = ()> + Send + '_;
}

#[derive(Debug, Error)]
pub enum BufferError {
    #[error("flush threshold must be positive")]
    ZeroMaxItems,

    #[error("flush interval must be positive")]
    ZeroMaxInterval,
}

#[derive(Debug, Clone, Copy)]
pub struct BufferConfig {
    /// Item count that triggers an immediate flush.
    pub max_items: usize,
    /// Time since the last flush before a partial batch is flushed anyway.
    pub max_interval: Duration,
}

/// Internal state behind the shared `Arc`.
struct Shared<S> {
    config: BufferConfig,
    sink: S,
    /// Swap-and-clear happens under this lock; never held across an `.await`.
    batch: Mutex<Vec<String>>,
    /// At most one sink delivery in flight.
    flush_gate: tokio::sync::Mutex<()>,
    /// Pokes the timer task to restart its interval after a size-triggered flush.
    timer_reset: Notify,
}

impl<S: BatchSink> Shared<S> {
    /// Swap out whatever is buffered and deliver it. No-op when empty.
    async fn flush(&self) {
        let batch = std::mem::take(&mut *self.batch.lock().unwrap());
        self.deliver(batch).await;
    }

    async fn deliver(&self, batch: Vec<String>) {
        if batch.is_empty() {
            return;
        }
        let _gate = self.flush_gate.lock().await;
        self.sink.flush(batch).await;
    }
}

/// Accumulates items and hands them to the sink in batches, triggered by
/// item count or by idle time, whichever fires first. Both triggers funnel
/// through the same swap-and-clear, so a batch is flushed exactly once.
pub struct BatchBuffer<S> {
    shared: Arc<Shared<S>>,
    timer: JoinHandle<()>,
    shutdown: CancellationToken,
}

impl<S: BatchSink> BatchBuffer<S> {
    pub fn new(config: BufferConfig, sink: S) -> Result<Self, BufferError> {
        if config.max_items == 0 {
            return Err(BufferError::ZeroMaxItems);
        }
        if config.max_interval.is_zero() {
            return Err(BufferError::ZeroMaxInterval);
        }

        let shared = Arc::new(Shared {
            config,
            sink,
            batch: Mutex::new(Vec::with_capacity(config.max_items)),
            flush_gate: tokio::sync::Mutex::new(()),
            timer_reset: Notify::new(),
        });
        let shutdown = CancellationToken::new();
        let timer = tokio::spawn(run_timer(Arc::clone(&shared), shutdown.clone()));

        Ok(Self {
            shared,
            timer,
            shutdown,
        })
    }

    /// Append one item. When the batch reaches `max_items` it is swapped out
    /// inside the same lock hold (so a flushed batch never exceeds
    /// `max_items`) and delivered inline; the caller blocks for the duration
    /// of the sink call while later adds accumulate the next batch.
    pub async fn add(&self, item: String) {
        let full = {
            let mut batch = self.shared.batch.lock().unwrap();
            batch.push(item);
            if batch.len() >= self.shared.config.max_items {
                Some(std::mem::take(&mut *batch))
            } else {
                None
            }
        };
        if let Some(batch) = full {
            self.shared.timer_reset.notify_one();
            self.shared.deliver(batch).await;
        }
    }

    /// Stop the idle timer and drain remaining items exactly once. No flush
    /// fires after this returns.
    pub async fn close(self) {
        self.shutdown.cancel();
        // Join the timer task so a tick-triggered delivery in progress
        // completes before the final drain.
        if let Err(e) = self.timer.await {
            error!(error = %e, "flush timer task panicked");
        }
        self.shared.flush().await;
    }
}

async fn run_timer<S: BatchSink>(shared: Arc<Shared<S>>, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(shared.config.max_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; consume it so the first real
    // trigger lands one full period from now.
    interval.tick().await;
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => return,
            _ = shared.timer_reset.notified() => interval.reset(),
            _ = interval.tick() => shared.flush().await,
        }
    }
}
