// SPDX-License-Identifier: Apache-2.0

//! Glue between the line source and string consumers.

use bytes::Bytes;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tracing::debug;

use crate::bounded_channel::{BoundedReceiver, BoundedSender};

fn to_text(line: &Bytes) -> String {
    String::from_utf8_lossy(line).into_owned()
}

/// Forward every line from `lines` into `sink` as text, one for one, until
/// `lines` closes or `cancel` fires. Invalid UTF-8 is replaced, never dropped.
///
/// # Example
///
/// ```rust
/// use bytes::Bytes;
/// use tailrelay::bounded_channel::bounded;
/// use tailrelay::topology::adapter::forward_lines;
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
///     let (line_tx, line_rx) = bounded(10);
///     let (text_tx, mut text_rx) = bounded(10);
///
///     line_tx.send(Bytes::from_static(b"hello")).await?;
///     drop(line_tx);
///
///     forward_lines(line_rx, text_tx, CancellationToken::new()).await?;
///     assert_eq!(Some("hello".to_string()), text_rx.next().await);
///     assert_eq!(None, text_rx.next().await);
///     Ok(())
/// }
/// ```
pub async fn forward_lines(
    mut lines: BoundedReceiver<Bytes>,
    sink: BoundedSender<String>,
    cancel: CancellationToken,
) -> Result<(), BoxError> {
    let mut forwarded: u64 = 0;

    loop {
        let line = select! {
            biased;

            _ = cancel.cancelled() => break,
            line = lines.next() => match line {
                Some(line) => line,
                None => break,
            },
        };

        select! {
            biased;

            _ = cancel.cancelled() => break,
            res = sink.send(to_text(&line)) => {
                if res.is_err() {
                    return Err("line sink closed before the line source finished".into());
                }
            }
        }
        forwarded += 1;
    }

    debug!(forwarded, "Line forwarder exiting");
    Ok(())
}

/// Drain a line stream into memory until it closes.
pub async fn collect_lines(mut lines: BoundedReceiver<Bytes>) -> Vec<String> {
    let mut collected = Vec::new();
    while let Some(line) = lines.next().await {
        collected.push(to_text(&line));
    }
    collected
}
