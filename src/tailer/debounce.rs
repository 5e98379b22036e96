// SPDX-License-Identifier: Apache-2.0

//! Resettable debounce timer.
//!
//! Every `arm` pushes the deadline a full window into the future. Re-arming
//! replaces the deadline of the same `Sleep`, so an earlier deadline can never
//! fire once it has been pushed back.

use std::pin::Pin;
use std::time::Duration;

use tokio::time::{Instant, Sleep, sleep};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    Idle,
    Armed,
    Fired,
}

pub struct Debounce {
    window: Duration,
    sleep: Pin<Box<Sleep>>,
    state: DebounceState,
}

impl Debounce {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            sleep: Box::pin(sleep(window)),
            state: DebounceState::Idle,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn state(&self) -> DebounceState {
        self.state
    }

    pub fn is_armed(&self) -> bool {
        self.state == DebounceState::Armed
    }

    /// Start the window, or restart it if already armed.
    pub fn arm(&mut self) {
        self.sleep.as_mut().reset(Instant::now() + self.window);
        self.state = DebounceState::Armed;
    }

    pub fn disarm(&mut self) {
        self.state = DebounceState::Idle;
    }

    /// Completes once an armed window elapses. Never completes while idle or
    /// after firing, until armed again. Cancel safe.
    pub async fn fired(&mut self) {
        if self.state != DebounceState::Armed {
            std::future::pending::<()>().await;
        }

        self.sleep.as_mut().await;
        self.state = DebounceState::Fired;
    }
}
