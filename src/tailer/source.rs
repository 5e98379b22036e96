// SPDX-License-Identifier: Apache-2.0

//! Line source task.
//!
//! One task per watched file. It suspends on three things only: cancellation,
//! the next watcher event, and the debounce deadline. Each debounced wake-up
//! reads the whole file and hands the new lines to the output queue in order.
//! The task owns the only sender of its output, so the queue closes exactly
//! once, when the task returns.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use opentelemetry::KeyValue;
use opentelemetry::metrics::Counter;
use tokio::select;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tracing::{debug, error, info, warn};

use crate::bounded_channel::{BoundedReceiver, BoundedSender, bounded};
use crate::tailer::config::TailerConfig;
use crate::tailer::debounce::Debounce;
use crate::tailer::error::{Result, TailerError};
use crate::tailer::signature::split_lines;
use crate::tailer::tracker::{Observation, TailTracker};
use crate::tailer::watcher::{NativeWatcher, WatchEvent};
use crate::telemetry::get_meter;

/// Why an emission stopped early
#[derive(Debug)]
enum EmitError {
    /// The cancellation token fired first
    Cancelled,
    /// Every receiver of the output was dropped
    ChannelClosed,
}

struct TailerMetrics {
    emitted: Counter<u64>,
    discontinuities: Counter<u64>,
    tags: [KeyValue; 1],
}

impl TailerMetrics {
    fn new() -> Self {
        Self {
            emitted: get_meter()
                .u64_counter("tailrelay_tailer_emitted_lines")
                .with_description("Number of lines handed to the line source output.")
                .with_unit("lines")
                .build(),
            discontinuities: get_meter()
                .u64_counter("tailrelay_tailer_discontinuities")
                .with_description(
                    "Number of reads where the previous position could not be found.",
                )
                .build(),
            tags: [KeyValue::new("source", "file")],
        }
    }
}

/// Tails one file and emits appended lines
pub struct LineSource {
    config: TailerConfig,
    tracker: TailTracker,
    metrics: TailerMetrics,
}

impl LineSource {
    pub fn new(config: TailerConfig) -> Self {
        let tracker = TailTracker::new(config.first_discovery);
        Self {
            config,
            tracker,
            metrics: TailerMetrics::new(),
        }
    }

    /// Spawn the source into `task_set` and return its output. The task's
    /// result reports a fatal setup failure; the output closes either way.
    pub fn start(
        self,
        task_set: &mut JoinSet<std::result::Result<(), BoxError>>,
        cancel: &CancellationToken,
    ) -> BoundedReceiver<Bytes> {
        let (tx, rx) = bounded(self.config.output_capacity);
        let cancel = cancel.clone();

        info!(
            path = ?self.config.path,
            debounce_interval = ?self.config.debounce_interval,
            first_discovery = ?self.config.first_discovery,
            "Starting line source"
        );

        task_set.spawn(async move { self.run(tx, cancel).await.map_err(BoxError::from) });

        rx
    }

    /// Spawn the source as a detached task and return its output.
    pub fn spawn(self, cancel: CancellationToken) -> BoundedReceiver<Bytes> {
        let (tx, rx) = bounded(self.config.output_capacity);

        tokio::spawn(async move {
            // Already logged; the closed output is the only signal consumers get.
            let _ = self.run(tx, cancel).await;
        });

        rx
    }

    /// Run until cancelled. Returns an error only when the watch cannot be
    /// established.
    pub async fn run(mut self, output: BoundedSender<Bytes>, cancel: CancellationToken) -> Result<()> {
        if let Err(e) = self.config.validate() {
            error!(path = ?self.config.path, error = %e, "Invalid line source configuration");
            return Err(TailerError::Config(e));
        }

        let mut watcher = match NativeWatcher::new(&self.config.path) {
            Ok(w) => w,
            Err(e) => {
                error!(error = %e, "Failed to establish file watch");
                return Err(e);
            }
        };

        info!(
            path = ?watcher.target(),
            backend = watcher.backend_name(),
            "File watcher initialized"
        );

        // Seed from whatever is already there so existing content is not replayed.
        match self.process_cycle(&output, &cancel).await {
            Ok(()) => {}
            Err(EmitError::Cancelled) | Err(EmitError::ChannelClosed) => return Ok(()),
        }

        let mut debounce = Debounce::new(self.config.debounce_interval);

        loop {
            select! {
                biased;

                _ = cancel.cancelled() => {
                    debounce.disarm();
                    debug!("Line source received shutdown signal");
                    break;
                }

                event = watcher.next() => match event {
                    Some(WatchEvent::Changed(kind)) => {
                        debug!(?kind, "File change detected");
                        debounce.arm();
                    }
                    Some(WatchEvent::Error(e)) => {
                        warn!(error = %e, "File watcher error");
                    }
                    None => {
                        warn!("File watcher closed unexpectedly, stopping line source");
                        break;
                    }
                },

                _ = debounce.fired() => {
                    match self.process_cycle(&output, &cancel).await {
                        Ok(()) => {}
                        Err(EmitError::Cancelled) => {
                            debug!("Cancelled while emitting lines, remaining lines abandoned");
                            break;
                        }
                        Err(EmitError::ChannelClosed) => {
                            warn!("Line source output closed, stopping line source");
                            break;
                        }
                    }
                }
            }
        }

        info!(path = ?self.config.path, "Line source stopped");
        Ok(())
    }

    /// Read the file, work out what is new, and emit it.
    async fn process_cycle(
        &mut self,
        output: &BoundedSender<Bytes>,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), EmitError> {
        let lines = match read_lines(&self.config.path).await {
            Ok(lines) => lines,
            Err(e) if e.is_not_found() => {
                debug!(path = ?self.config.path, "File not present yet");
                return Ok(());
            }
            Err(e) => {
                warn!(error = %e, "Failed to read file, skipping this cycle");
                return Ok(());
            }
        };

        let observation = self.tracker.observe(&lines);
        match &observation {
            Observation::Baseline(_) => {
                debug!(lines = lines.len(), "Established baseline signature");
            }
            Observation::Discontinuity(_) => {
                warn!(
                    path = ?self.config.path,
                    "File truncated, rotated, or rewritten; recovering from the last line"
                );
                self.metrics.discontinuities.add(1, &self.metrics.tags);
            }
            Observation::Appended(new_lines) => {
                debug!(new_lines = new_lines.len(), "Read appended lines");
            }
            Observation::Empty => {}
        }

        for line in observation.into_lines() {
            emit(output, line, cancel).await?;
            self.metrics.emitted.add(1, &self.metrics.tags);
        }

        Ok(())
    }
}

/// Read the whole file and split it into lines.
pub async fn read_lines(path: &Path) -> Result<Vec<Bytes>> {
    let content = tokio::fs::read(path)
        .await
        .map_err(|source| TailerError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(split_lines(&Bytes::from(content)))
}

async fn emit(
    output: &BoundedSender<Bytes>,
    line: Bytes,
    cancel: &CancellationToken,
) -> std::result::Result<(), EmitError> {
    select! {
        biased;

        _ = cancel.cancelled() => Err(EmitError::Cancelled),
        res = output.send(line) => res.map_err(|_| EmitError::ChannelClosed),
    }
}

/// Tail `path` with default settings until `cancel` fires.
///
/// The returned stream closes once tailing ends, immediately if the watch
/// cannot be established.
pub fn read_file_tail(path: impl Into<PathBuf>, cancel: CancellationToken) -> BoundedReceiver<Bytes> {
    LineSource::new(TailerConfig::new(path)).spawn(cancel)
}
