// SPDX-License-Identifier: Apache-2.0

//! Configuration for the line source.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Quiet period after the last filesystem event before the file is re-read
pub const DEFAULT_DEBOUNCE_INTERVAL: Duration = Duration::from_millis(30);

/// Capacity of the queue between the line source and its consumer
pub const DEFAULT_OUTPUT_CAPACITY: usize = 200;

/// What to do the first time the file's content is observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FirstDiscovery {
    /// Record the current tail as the baseline without emitting anything.
    #[default]
    Seed,
    /// Record the baseline and emit the most recent line.
    EmitLast,
}

impl FromStr for FirstDiscovery {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "seed" => Ok(FirstDiscovery::Seed),
            "emit_last" | "emit-last" => Ok(FirstDiscovery::EmitLast),
            _ => Err(format!(
                "Invalid first discovery mode '{}'. Valid options: seed, emit_last",
                s
            )),
        }
    }
}

/// Configuration for a single-file line source
#[derive(Debug, Clone)]
pub struct TailerConfig {
    /// File to tail. Its parent directory must exist; the file itself need not.
    pub path: PathBuf,
    /// Debounce window used to coalesce bursts of write notifications
    pub debounce_interval: Duration,
    /// Capacity of the output queue
    pub output_capacity: usize,
    /// Behavior when the file content is seen for the first time
    pub first_discovery: FirstDiscovery,
}

impl TailerConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            debounce_interval: DEFAULT_DEBOUNCE_INTERVAL,
            output_capacity: DEFAULT_OUTPUT_CAPACITY,
            first_discovery: FirstDiscovery::default(),
        }
    }

    pub fn with_debounce_interval(mut self, debounce_interval: Duration) -> Self {
        self.debounce_interval = debounce_interval;
        self
    }

    pub fn with_output_capacity(mut self, output_capacity: usize) -> Self {
        self.output_capacity = output_capacity;
        self
    }

    pub fn with_first_discovery(mut self, first_discovery: FirstDiscovery) -> Self {
        self.first_discovery = first_discovery;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.path.as_os_str().is_empty() {
            return Err("A path to tail must be specified".to_string());
        }

        if self.path.file_name().is_none() {
            return Err(format!("Path {:?} does not name a file", self.path));
        }

        if self.output_capacity == 0 {
            return Err("Output capacity must be at least 1, got 0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TailerConfig::new("/var/log/app.log");
        assert_eq!(config.debounce_interval, Duration::from_millis(30));
        assert_eq!(config.output_capacity, 200);
        assert_eq!(config.first_discovery, FirstDiscovery::Seed);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_path() {
        let config = TailerConfig::new("");
        assert_eq!(
            config.validate(),
            Err("A path to tail must be specified".to_string())
        );
    }

    #[test]
    fn test_validate_rejects_directory_like_path() {
        let config = TailerConfig::new("/var/log/..");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let config = TailerConfig::new("app.log").with_output_capacity(0);
        assert_eq!(
            config.validate(),
            Err("Output capacity must be at least 1, got 0".to_string())
        );
    }

    #[test]
    fn test_first_discovery_from_str() {
        assert_eq!("seed".parse::<FirstDiscovery>().unwrap(), FirstDiscovery::Seed);
        assert_eq!(
            "EMIT_LAST".parse::<FirstDiscovery>().unwrap(),
            FirstDiscovery::EmitLast
        );
        assert_eq!(
            "emit-last".parse::<FirstDiscovery>().unwrap(),
            FirstDiscovery::EmitLast
        );
        assert!("replay".parse::<FirstDiscovery>().is_err());
    }
}
