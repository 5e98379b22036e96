// SPDX-License-Identifier: Apache-2.0

//! Bounded queues connecting pipeline stages.
//!
//! A queue closes when its last sender is dropped. Receivers observe closure as
//! `None` once every buffered item has been drained, so ownership of the sender
//! is what decides who may close a stage's output.

use flume::{Receiver, Sender, TrySendError};
use std::fmt;

pub struct BoundedSender<T> {
    tx: Sender<T>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum SendError {
    Disconnected,
    Full,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Disconnected => write!(f, "channel disconnected"),
            SendError::Full => write!(f, "channel full"),
        }
    }
}

impl std::error::Error for SendError {}

impl<T> BoundedSender<T> {
    /// Waits for capacity, then enqueues the item.
    pub async fn send(&self, item: T) -> Result<(), SendError> {
        self.tx
            .send_async(item)
            .await
            .map_err(|_| SendError::Disconnected) // every receiver dropped
    }

    /// Enqueues without waiting. Safe to call from non-async callbacks.
    pub fn try_send(&self, item: T) -> Result<(), SendError> {
        match self.tx.try_send(item) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(SendError::Full),
            Err(TrySendError::Disconnected(_)) => Err(SendError::Disconnected),
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.tx.capacity()
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

impl<T> Clone for BoundedSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

pub struct BoundedReceiver<T> {
    rx: Receiver<T>,
}

impl<T> Clone for BoundedReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

impl<T> BoundedReceiver<T> {
    /// Returns `None` once the queue is closed and drained.
    pub async fn next(&mut self) -> Option<T> {
        self.rx.recv_async().await.ok()
    }

    /// Non-blocking receive. `None` when nothing is queued right now or the
    /// queue is closed.
    pub fn try_recv(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// True once every sender has been dropped. Buffered items may remain.
    pub fn is_disconnected(&self) -> bool {
        self.rx.is_disconnected()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

pub fn bounded<T>(size: usize) -> (BoundedSender<T>, BoundedReceiver<T>) {
    let (tx, rx) = flume::bounded::<T>(size);

    (BoundedSender { tx }, BoundedReceiver { rx })
}
