// SPDX-License-Identifier: Apache-2.0

use opentelemetry::KeyValue;
use opentelemetry::metrics::Counter;
use tower::BoxError;
use tracing::{debug, info, warn};

use crate::bounded_channel::BoundedReceiver;
use crate::delivery::notifier::Notifier;
use crate::subscribers::{StoreError, SubscriberStore};
use crate::telemetry::get_meter;

/// Outcome of delivering one line to every current subscriber
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub sent: usize,
    pub failed: usize,
}

/// Drains the buffer output and fans each line out to all subscribers.
pub struct Dispatcher<N> {
    store: SubscriberStore,
    notifier: N,
    sent: Counter<u64>,
    failed: Counter<u64>,
    tags: [KeyValue; 1],
}

impl<N: Notifier> Dispatcher<N> {
    pub fn new(store: SubscriberStore, notifier: N) -> Self {
        let meter = get_meter();
        let tags = [KeyValue::new("notifier", notifier.name())];
        Self {
            store,
            notifier,
            sent: meter
                .u64_counter("tailrelay_delivery_sent")
                .with_description("Number of lines delivered to a subscriber.")
                .build(),
            failed: meter
                .u64_counter("tailrelay_delivery_failed")
                .with_description("Number of deliveries to a subscriber that failed.")
                .build(),
            tags,
        }
    }

    /// Run until `lines` closes. Delivery failures are logged and skipped; only
    /// a broken subscriber store ends the run early.
    pub async fn run(self, mut lines: BoundedReceiver<String>) -> Result<(), BoxError> {
        let mut total = DeliveryReport::default();

        while let Some(line) = lines.next().await {
            let report = self.deliver(&line).await?;
            total.sent += report.sent;
            total.failed += report.failed;
        }

        info!(
            sent = total.sent,
            failed = total.failed,
            notifier = self.notifier.name(),
            "Dispatcher finished, line stream closed"
        );
        Ok(())
    }

    /// Deliver one line to every subscriber registered right now.
    pub async fn deliver(&self, line: &str) -> Result<DeliveryReport, StoreError> {
        let recipients = self.store.subscribers()?;
        if recipients.is_empty() {
            debug!("No subscribers, line discarded");
            return Ok(DeliveryReport::default());
        }

        let mut report = DeliveryReport::default();
        for recipient in recipients {
            match self.notifier.notify(recipient, line).await {
                Ok(()) => {
                    report.sent += 1;
                    self.sent.add(1, &self.tags);
                }
                Err(e) => {
                    warn!(recipient, error = %e, "Failed to deliver line");
                    report.failed += 1;
                    self.failed.add(1, &self.tags);
                }
            }
        }

        Ok(report)
    }
}
