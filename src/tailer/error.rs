// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TailerError {
    #[error("Failed to watch {path:?}: {reason}")]
    WatchInit { path: PathBuf, reason: String },

    #[error("Failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl TailerError {
    pub(crate) fn watch_init(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        TailerError::WatchInit {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// True when the watched file simply does not exist (yet).
    pub fn is_not_found(&self) -> bool {
        matches!(self, TailerError::Read { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

pub type Result<T> = std::result::Result<T, TailerError>;
