// SPDX-License-Identifier: Apache-2.0

//! Bounded, policy-driven batching between a producer and a consumer.

pub mod adaptive;
pub mod batch;
pub mod config;
pub mod error;

pub use adaptive::{AdaptiveBuffer, STALL_TIMEOUT};
pub use config::{BufferConfig, BufferPolicy};
pub use error::BufferError;
