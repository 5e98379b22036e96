// SPDX-License-Identifier: Apache-2.0

//! Recipients that relayed lines are delivered to.

pub mod error;
pub mod store;

pub use error::StoreError;
pub use store::{SubscriberStore, Subscription};
