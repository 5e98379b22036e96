// SPDX-License-Identifier: Apache-2.0

use std::future::Future;

use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("recipient {recipient} rejected the message: {reason}")]
    Rejected { recipient: i64, reason: String },

    #[error("delivery transport failed: {0}")]
    Transport(String),
}

/// Sends one line to one recipient over some external channel.
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    fn notify(
        &self,
        recipient: i64,
        line: &str,
    ) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}

/// Writes every delivery to the log instead of an external service.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn notify(&self, recipient: i64, line: &str) -> Result<(), DeliveryError> {
        info!(recipient, line, "Delivered line");
        Ok(())
    }
}
