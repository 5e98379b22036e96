// SPDX-License-Identifier: Apache-2.0

//! Delivery of relayed lines to subscribers.

pub mod dispatcher;
pub mod notifier;

pub use dispatcher::Dispatcher;
pub use notifier::{DeliveryError, LogNotifier, Notifier};
