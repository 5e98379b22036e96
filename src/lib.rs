// SPDX-License-Identifier: Apache-2.0

pub mod bounded_channel;
pub mod buffer;
pub mod delivery;
pub mod init;
pub mod subscribers;
pub mod tailer;
pub mod telemetry;
pub mod topology;
