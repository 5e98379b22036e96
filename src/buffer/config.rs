// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MAX_SIZE: usize = 100;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// What to do with a value that arrives while the batch is full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BufferPolicy {
    /// Flush the full batch, then accept the value. Also flushes as soon as
    /// the batch reaches its maximum size.
    #[default]
    BlockOnFull,
    /// Discard the incoming value
    DropNew,
    /// Evict the oldest batched value to make room
    DropOldest,
}

impl BufferPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            BufferPolicy::BlockOnFull => "block_on_full",
            BufferPolicy::DropNew => "drop_new",
            BufferPolicy::DropOldest => "drop_oldest",
        }
    }
}

impl fmt::Display for BufferPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BufferPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "block_on_full" | "blockonfull" => Ok(BufferPolicy::BlockOnFull),
            "drop_new" | "dropnew" => Ok(BufferPolicy::DropNew),
            "drop_oldest" | "dropoldest" => Ok(BufferPolicy::DropOldest),
            _ => Err(format!(
                "Invalid buffer policy '{}'. Valid options: block_on_full, drop_new, drop_oldest",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferConfig {
    /// Largest number of values held before the policy applies. Also the
    /// default capacity of the input and output queues.
    pub max_size: usize,
    /// Period of the flush timer
    pub flush_interval: Duration,
    pub policy: BufferPolicy,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            policy: BufferPolicy::default(),
        }
    }
}

impl BufferConfig {
    pub fn new(max_size: usize, flush_interval: Duration, policy: BufferPolicy) -> Self {
        Self {
            max_size,
            flush_interval,
            policy,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_size == 0 {
            return Err("Buffer max size must be greater than 0".to_string());
        }

        // tokio intervals panic on a zero period
        if self.flush_interval.is_zero() {
            return Err("Buffer flush interval must be greater than 0".to_string());
        }

        Ok(())
    }
}
