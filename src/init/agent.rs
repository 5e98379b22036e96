// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use tokio::select;
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout, timeout_at};
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tracing::{debug, error, info, warn};

use crate::buffer::AdaptiveBuffer;
use crate::delivery::{Dispatcher, Notifier};
use crate::init::args::AgentRun;
use crate::subscribers::SubscriberStore;
use crate::tailer::LineSource;
use crate::topology::adapter::forward_lines;

type TaskSet = JoinSet<Result<(), BoxError>>;

const SOURCE_EXIT_TIMEOUT: Duration = Duration::from_secs(1);
const DRAIN_TIMEOUT: Duration = Duration::from_secs(3);

/// Wires the line source, buffer, and dispatcher together and runs them until
/// cancelled.
pub struct Agent<N> {
    config: AgentRun,
    notifier: N,
    store: Option<SubscriberStore>,
}

impl<N: Notifier + 'static> Agent<N> {
    pub fn new(config: AgentRun, notifier: N) -> Self {
        Self {
            config,
            notifier,
            store: None,
        }
    }

    /// Use an already opened store instead of opening the configured path.
    pub fn with_store(mut self, store: SubscriberStore) -> Self {
        self.store = Some(store);
        self
    }

    pub async fn run(self, agent_cancel: CancellationToken) -> Result<(), BoxError> {
        let config = self.config;

        info!(path = ?config.path, "Starting tailrelay.");

        let tailer_config = config.tailer_config();
        tailer_config.validate()?;
        let buffer_config = config.buffer_config();

        let store = match self.store {
            Some(store) => store,
            None => SubscriberStore::open(&config.subscribers_path)?,
        };

        let mut sources_task_set = JoinSet::new();
        let mut delivery_task_set = JoinSet::new();

        let sources_cancel = CancellationToken::new();
        let buffer_cancel = CancellationToken::new();

        let buffer = AdaptiveBuffer::new(buffer_config, &buffer_cancel)?;
        buffer.start();

        let lines = LineSource::new(tailer_config).start(&mut sources_task_set, &sources_cancel);
        {
            let input = buffer.input();
            let cancel = sources_cancel.clone();
            sources_task_set.spawn(async move { forward_lines(lines, input, cancel).await });
        }

        let dispatcher = Dispatcher::new(store.clone(), self.notifier);
        let output = buffer.output();
        delivery_task_set.spawn(async move { dispatcher.run(output).await });

        let mut result = Ok(());
        select! {
            _ = agent_cancel.cancelled() => {
                debug!("Agent cancellation signaled.");
            },
            e = wait_for_any_task(&mut sources_task_set) => {
                match e {
                    Ok(()) => warn!("Line source exited before shutdown."),
                    Err(e) => result = Err(e),
                }
            },
            e = wait_for_any_task(&mut delivery_task_set) => {
                match e {
                    Ok(()) => warn!("Dispatcher exited before shutdown."),
                    Err(e) => result = Err(e),
                }
            },
        }

        // Sources first, so nothing new reaches the buffer while it drains.
        sources_cancel.cancel();
        let res =
            wait_for_tasks_until(&mut sources_task_set, Instant::now() + SOURCE_EXIT_TIMEOUT).await;
        if let Err(e) = res {
            if result.is_ok() {
                result = Err(e);
            } else {
                warn!(error = %e, "Line source did not shut down cleanly.");
            }
        }

        // Forced flush; only bounded here so a dead dispatcher cannot hang shutdown.
        if timeout(DRAIN_TIMEOUT, buffer.stop()).await.is_err() {
            error!("Timed out flushing buffer, remaining lines are lost.");
            delivery_task_set.abort_all();
        }

        let res = wait_for_tasks_until(&mut delivery_task_set, Instant::now() + DRAIN_TIMEOUT).await;
        if let Err(e) = res {
            warn!(error = %e, "Dispatcher did not shut down cleanly.");
        }

        store.flush()?;
        info!("tailrelay stopped.");

        result
    }
}

/// Resolves when the first task in the set finishes.
async fn wait_for_any_task(tasks: &mut TaskSet) -> Result<(), BoxError> {
    match tasks.join_next().await {
        Some(res) => res?,
        // Empty set: nothing can fail, so never resolve.
        None => std::future::pending().await,
    }
}

/// Join every remaining task, returning the last failure seen.
async fn wait_for_tasks_until(tasks: &mut TaskSet, deadline: Instant) -> Result<(), BoxError> {
    let mut result = Ok(());
    loop {
        match timeout_at(deadline, tasks.join_next()).await {
            Err(_) => return Err("timed out waiting for tasks to exit".into()),
            Ok(None) => return result,
            Ok(Some(Ok(Ok(())))) => {}
            Ok(Some(Ok(Err(e)))) => result = Err(e),
            Ok(Some(Err(e))) if e.is_cancelled() => {}
            Ok(Some(Err(e))) => result = Err(e.into()),
        }
    }
}
