// SPDX-License-Identifier: Apache-2.0

//! Adaptive buffer between a line producer and a slow consumer.
//!
//! A single background task owns the batch. It wakes on cancellation, on a
//! new input value, or on the flush timer. During normal operation a flush
//! gives the consumer [`STALL_TIMEOUT`] per value and drops the rest of the
//! flush once that is exceeded. On shutdown the final flush waits for the
//! consumer, so nothing already batched is lost.

use std::sync::Mutex;
use std::time::Duration;

use opentelemetry::KeyValue;
use opentelemetry::metrics::Counter;
use tokio::select;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bounded_channel::{BoundedReceiver, BoundedSender, bounded};
use crate::buffer::batch::{Admission, Batch};
use crate::buffer::config::{BufferConfig, BufferPolicy};
use crate::buffer::error::{BufferError, Result};
use crate::telemetry::get_meter;

/// Grace period for each value of a non-forced flush
pub const STALL_TIMEOUT: Duration = Duration::from_millis(50);

#[derive(Clone)]
struct BufferMetrics {
    accepted: Counter<u64>,
    dropped: Counter<u64>,
    flushed: Counter<u64>,
    policy: KeyValue,
}

impl BufferMetrics {
    fn new(policy: BufferPolicy) -> Self {
        let meter = get_meter();
        Self {
            accepted: meter
                .u64_counter("tailrelay_buffer_accepted_lines")
                .with_description("Number of values accepted into the batch.")
                .with_unit("lines")
                .build(),
            dropped: meter
                .u64_counter("tailrelay_buffer_dropped_lines")
                .with_description("Number of values dropped by the buffer, by reason.")
                .with_unit("lines")
                .build(),
            flushed: meter
                .u64_counter("tailrelay_buffer_flushed_lines")
                .with_description("Number of values delivered to the buffer output.")
                .with_unit("lines")
                .build(),
            policy: KeyValue::new("policy", policy.as_str()),
        }
    }

    fn dropped(&self, count: u64, reason: &'static str) {
        self.dropped.add(
            count,
            &[self.policy.clone(), KeyValue::new("reason", reason)],
        );
    }
}

pub struct AdaptiveBuffer<T> {
    config: BufferConfig,
    input_tx: BoundedSender<T>,
    input_rx: Mutex<Option<BoundedReceiver<T>>>,
    output_tx: Mutex<Option<BoundedSender<T>>>,
    output_rx: BoundedReceiver<T>,
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
    stopped: OnceCell<()>,
}

impl<T: Send + 'static> AdaptiveBuffer<T> {
    /// Create a buffer whose lifetime is bound to `cancel`: cancelling it has
    /// the same effect as [`AdaptiveBuffer::stop`], except that nobody waits.
    pub fn new(config: BufferConfig, cancel: &CancellationToken) -> Result<Self> {
        config.validate().map_err(BufferError::Config)?;

        let (input_tx, input_rx) = bounded(config.max_size);
        let (output_tx, output_rx) = bounded(config.max_size);

        Ok(Self {
            config,
            input_tx,
            input_rx: Mutex::new(Some(input_rx)),
            output_tx: Mutex::new(Some(output_tx)),
            output_rx,
            cancel: cancel.child_token(),
            handle: Mutex::new(None),
            stopped: OnceCell::new(),
        })
    }

    /// Read from an existing queue instead of a private one, so an upstream
    /// producer can write straight into the buffer.
    pub fn with_input(mut self, input: (BoundedSender<T>, BoundedReceiver<T>)) -> Self {
        let (tx, rx) = input;
        self.input_tx = tx;
        self.input_rx = Mutex::new(Some(rx));
        self
    }

    /// Write flushed values to an existing queue.
    ///
    /// The output only closes once every sender of that queue is gone, so the
    /// caller must not keep a clone of the sender it passes in. Otherwise the
    /// output stays open after [`AdaptiveBuffer::stop`] returns.
    pub fn with_output(mut self, output: (BoundedSender<T>, BoundedReceiver<T>)) -> Self {
        let (tx, rx) = output;
        self.output_tx = Mutex::new(Some(tx));
        self.output_rx = rx;
        self
    }

    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    /// Producer handle. Blocks once the input queue is full, whatever the
    /// policy.
    pub fn input(&self) -> BoundedSender<T> {
        self.input_tx.clone()
    }

    /// Consumer handle. Yields values in acceptance order and returns `None`
    /// once the buffer has shut down and everything flushed was read.
    pub fn output(&self) -> BoundedReceiver<T> {
        self.output_rx.clone()
    }

    /// Spawn the processing task. Only the first call has an effect.
    pub fn start(&self) {
        let mut handle = self.handle.lock().unwrap_or_else(|e| e.into_inner());

        let input = self.input_rx.lock().unwrap_or_else(|e| e.into_inner()).take();
        let output = self.output_tx.lock().unwrap_or_else(|e| e.into_inner()).take();
        let (Some(input), Some(output)) = (input, output) else {
            warn!("Adaptive buffer already started or stopped, ignoring start");
            return;
        };

        info!(
            max_size = self.config.max_size,
            flush_interval = ?self.config.flush_interval,
            policy = %self.config.policy,
            "Starting adaptive buffer"
        );

        let task = BufferTask {
            batch: Batch::new(self.config.max_size, self.config.policy),
            input,
            output,
            flush_interval: self.config.flush_interval,
            cancel: self.cancel.clone(),
            metrics: BufferMetrics::new(self.config.policy),
        };
        *handle = Some(tokio::spawn(task.run()));
    }

    /// Shut down and wait until the output is closed. Safe to call any number
    /// of times from any number of tasks; every call returns only after the
    /// shutdown has completed.
    pub async fn stop(&self) {
        self.stopped
            .get_or_init(|| async {
                self.cancel.cancel();

                let handle = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take();
                if let Some(handle) = handle {
                    if let Err(e) = handle.await {
                        error!(error = ?e, "Adaptive buffer task failed");
                    }
                }

                // Never started: the sender is still here and holds the output open.
                self.output_tx
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .take();

                info!("Adaptive buffer stopped");
            })
            .await;
    }
}

struct BufferTask<T> {
    batch: Batch<T>,
    input: BoundedReceiver<T>,
    output: BoundedSender<T>,
    flush_interval: Duration,
    cancel: CancellationToken,
    metrics: BufferMetrics,
}

impl<T: Send + 'static> BufferTask<T> {
    async fn run(mut self) {
        let period = self.flush_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            select! {
                biased;

                _ = self.cancel.cancelled() => {
                    debug!("Adaptive buffer received shutdown signal");
                    self.shutdown().await;
                    break;
                }

                // Ahead of input so a busy producer cannot starve the timer
                _ = ticker.tick() => {
                    if !self.batch.is_empty() {
                        let items = self.batch.take();
                        self.flush(items, false).await;
                    }
                }

                item = self.input.next() => match item {
                    Some(item) => {
                        if self.admit(item).await {
                            ticker.reset();
                        }
                    }
                    None => {
                        debug!("Adaptive buffer input closed");
                        let items = self.batch.take();
                        self.flush(items, true).await;
                        break;
                    }
                }
            }
        }
        // Dropping self.output closes the output queue.
    }

    /// Returns true if the admission triggered a flush.
    async fn admit(&mut self, item: T) -> bool {
        match self.batch.admit(item) {
            Admission::Accepted => {
                self.metrics.accepted.add(1, &[self.metrics.policy.clone()]);
                false
            }
            Admission::Flush(items) => {
                self.metrics.accepted.add(1, &[self.metrics.policy.clone()]);
                self.flush(items, false).await;
                true
            }
            Admission::Dropped(_) => {
                debug!("Batch full, dropping incoming value");
                self.metrics.dropped(1, "drop_new");
                false
            }
            Admission::Evicted(_) => {
                debug!("Batch full, evicting oldest value");
                self.metrics.accepted.add(1, &[self.metrics.policy.clone()]);
                self.metrics.dropped(1, "drop_oldest");
                false
            }
        }
    }

    async fn shutdown(&mut self) {
        // Only what is queued right now; producers may still be sending.
        let pending = self.input.len();
        let mut overflow: u64 = 0;
        for _ in 0..pending {
            let Some(item) = self.input.try_recv() else {
                break;
            };
            match self.batch.push_if_room(item) {
                Ok(()) => self.metrics.accepted.add(1, &[self.metrics.policy.clone()]),
                Err(_) => overflow += 1,
            }
        }

        if overflow > 0 {
            debug!(dropped = overflow, "Batch full at shutdown, dropping queued values");
            self.metrics.dropped(overflow, "shutdown_overflow");
        }

        let items = self.batch.take();
        self.flush(items, true).await;
    }

    async fn flush(&mut self, items: Vec<T>, forced: bool) {
        if items.is_empty() {
            return;
        }

        let total = items.len();
        let mut sent = 0;

        for item in items {
            let res = if forced {
                self.output.send(item).await
            } else {
                match timeout(STALL_TIMEOUT, self.output.send(item)).await {
                    Ok(res) => res,
                    Err(_) => {
                        let lost = (total - sent) as u64;
                        warn!(
                            dropped = lost,
                            timeout = ?STALL_TIMEOUT,
                            "Consumer stalled during flush, dropping remaining values"
                        );
                        self.metrics.dropped(lost, "consumer_stall");
                        break;
                    }
                }
            };

            if res.is_err() {
                let lost = (total - sent) as u64;
                warn!(dropped = lost, "Buffer output closed, dropping remaining values");
                self.metrics.dropped(lost, "output_closed");
                break;
            }
            sent += 1;
        }

        self.metrics
            .flushed
            .add(sent as u64, &[self.metrics.policy.clone()]);
        debug!(sent, total, forced, "Flushed batch");
    }
}
