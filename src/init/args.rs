// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, ValueEnum};

use crate::buffer::{BufferConfig, BufferPolicy};
use crate::tailer::{FirstDiscovery, TailerConfig};

pub const DEFAULT_SUBSCRIBERS_PATH: &str = "./tailrelay_subscribers.json";

#[derive(Debug, Args, Clone)]
pub struct AgentRun {
    /// File to tail
    #[arg(long, env = "TAILRELAY_PATH")]
    pub path: PathBuf,

    /// Maximum number of lines held in the buffer before the policy applies
    #[arg(long, env = "TAILRELAY_BATCH_SIZE", default_value = "100")]
    pub batch_size: usize,

    /// Buffer flush interval in milliseconds
    #[arg(long, env = "TAILRELAY_FLUSH_INTERVAL_MS", default_value = "1000")]
    pub flush_interval_ms: u64,

    /// What to do with a line arriving while the buffer is full
    #[arg(
        value_enum,
        long,
        env = "TAILRELAY_POLICY",
        default_value = "block_on_full"
    )]
    pub policy: PolicyArg,

    /// Quiet period after a file change before the file is re-read, in milliseconds
    #[arg(long, env = "TAILRELAY_DEBOUNCE_INTERVAL_MS", default_value = "30")]
    pub debounce_interval_ms: u64,

    /// Emit the last line of the file when it is first seen instead of starting silently
    #[arg(long, env = "TAILRELAY_REPLAY_LAST_ON_DISCOVERY", default_value = "false")]
    pub replay_last_on_discovery: bool,

    /// Subscriber store location
    #[arg(long, env = "TAILRELAY_SUBSCRIBERS_PATH", default_value = DEFAULT_SUBSCRIBERS_PATH)]
    pub subscribers_path: PathBuf,
}

impl Default for AgentRun {
    fn default() -> Self {
        AgentRun {
            path: PathBuf::new(),
            batch_size: crate::buffer::config::DEFAULT_MAX_SIZE,
            flush_interval_ms: 1000,
            policy: PolicyArg::BlockOnFull,
            debounce_interval_ms: 30,
            replay_last_on_discovery: false,
            subscribers_path: PathBuf::from(DEFAULT_SUBSCRIBERS_PATH),
        }
    }
}

impl AgentRun {
    pub fn tailer_config(&self) -> TailerConfig {
        let first_discovery = if self.replay_last_on_discovery {
            FirstDiscovery::EmitLast
        } else {
            FirstDiscovery::Seed
        };

        TailerConfig::new(self.path.clone())
            .with_debounce_interval(Duration::from_millis(self.debounce_interval_ms))
            .with_first_discovery(first_discovery)
    }

    pub fn buffer_config(&self) -> BufferConfig {
        BufferConfig::new(
            self.batch_size,
            Duration::from_millis(self.flush_interval_ms),
            self.policy.into(),
        )
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, ValueEnum)]
pub enum PolicyArg {
    #[value(name = "block_on_full")]
    BlockOnFull,
    #[value(name = "drop_new")]
    DropNew,
    #[value(name = "drop_oldest")]
    DropOldest,
}

impl From<PolicyArg> for BufferPolicy {
    fn from(value: PolicyArg) -> Self {
        match value {
            PolicyArg::BlockOnFull => BufferPolicy::BlockOnFull,
            PolicyArg::DropNew => BufferPolicy::DropNew,
            PolicyArg::DropOldest => BufferPolicy::DropOldest,
        }
    }
}

/// Identifies one subscriber
#[derive(Debug, Args, Clone)]
pub struct SubscriberArgs {
    /// Subscriber id
    #[arg(long, allow_negative_numbers = true)]
    pub id: i64,

    /// Subscriber store location
    #[arg(long, env = "TAILRELAY_SUBSCRIBERS_PATH", default_value = DEFAULT_SUBSCRIBERS_PATH)]
    pub subscribers_path: PathBuf,
}

#[derive(Debug, Args, Clone)]
pub struct StoreArgs {
    /// Subscriber store location
    #[arg(long, env = "TAILRELAY_SUBSCRIBERS_PATH", default_value = DEFAULT_SUBSCRIBERS_PATH)]
    pub subscribers_path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct Cli {
        #[command(flatten)]
        run: AgentRun,
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["tailrelay", "--path", "/var/log/app.log"]).unwrap();
        let run = cli.run;

        assert_eq!(run.path, PathBuf::from("/var/log/app.log"));
        assert_eq!(run.batch_size, 100);
        assert_eq!(run.policy, PolicyArg::BlockOnFull);
        assert!(!run.replay_last_on_discovery);

        let buffer = run.buffer_config();
        assert_eq!(buffer.flush_interval, Duration::from_secs(1));
        assert_eq!(buffer.policy, BufferPolicy::BlockOnFull);

        let tailer = run.tailer_config();
        assert_eq!(tailer.debounce_interval, Duration::from_millis(30));
        assert_eq!(tailer.first_discovery, FirstDiscovery::Seed);
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::try_parse_from([
            "tailrelay",
            "--path",
            "app.log",
            "--batch-size",
            "2",
            "--policy",
            "drop_oldest",
            "--replay-last-on-discovery",
        ])
        .unwrap();

        assert_eq!(cli.run.buffer_config().max_size, 2);
        assert_eq!(cli.run.buffer_config().policy, BufferPolicy::DropOldest);
        assert_eq!(
            cli.run.tailer_config().first_discovery,
            FirstDiscovery::EmitLast
        );
    }

    #[test]
    fn test_cli_rejects_unknown_policy() {
        let res = Cli::try_parse_from(["tailrelay", "--path", "app.log", "--policy", "yolo"]);
        assert!(res.is_err());
    }
}
