// SPDX-License-Identifier: Apache-2.0

//! JSON file-backed subscriber store.
//!
//! The whole set lives in memory behind a lock and is rewritten to disk after
//! every change. Writes go to a temp file that is then renamed over the store,
//! so a crash never leaves a half-written file behind.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::subscribers::error::{Result, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    subscriptions: BTreeMap<i64, Subscription>,
}

/// Shared handle to the subscriber set. Clones see the same state.
#[derive(Clone)]
pub struct SubscriberStore {
    path: PathBuf,
    state: Arc<RwLock<StoreState>>,
}

impl SubscriberStore {
    /// Open the store at `path`, creating an empty one if it does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let state = if path.exists() {
            let file = File::open(&path).map_err(|e| StoreError::io("open", &path, e))?;
            serde_json::from_reader(BufReader::new(file)).map_err(|source| StoreError::Parse {
                path: path.clone(),
                source,
            })?
        } else {
            StoreState::default()
        };

        info!(
            path = ?path,
            subscribers = state.subscriptions.len(),
            "Opened subscriber store"
        );

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(state)),
        })
    }

    /// A store that is never written to disk
    pub fn open_memory() -> Self {
        Self {
            path: PathBuf::new(),
            state: Arc::new(RwLock::new(StoreState::default())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Add a subscriber. Subscribing twice keeps the original subscription.
    pub fn subscribe(&self, user_id: i64) -> Result<Subscription> {
        let subscription = {
            let mut state = self
                .state
                .write()
                .map_err(|e| StoreError::Poisoned(e.to_string()))?;

            if let Some(existing) = state.subscriptions.get(&user_id) {
                return Ok(existing.clone());
            }

            let subscription = Subscription {
                user_id,
                created_at: Utc::now(),
            };
            state.subscriptions.insert(user_id, subscription.clone());
            subscription
        };

        debug!(user_id, "Added subscriber");
        self.flush()?;
        Ok(subscription)
    }

    /// Remove a subscriber. Returns false if they were not subscribed.
    pub fn unsubscribe(&self, user_id: i64) -> Result<bool> {
        let removed = self
            .state
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?
            .subscriptions
            .remove(&user_id)
            .is_some();

        if removed {
            debug!(user_id, "Removed subscriber");
            self.flush()?;
        }
        Ok(removed)
    }

    pub fn is_subscribed(&self, user_id: i64) -> Result<bool> {
        let state = self
            .state
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        Ok(state.subscriptions.contains_key(&user_id))
    }

    pub fn subscription(&self, user_id: i64) -> Result<Option<Subscription>> {
        let state = self
            .state
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        Ok(state.subscriptions.get(&user_id).cloned())
    }

    /// All subscriber ids, ascending
    pub fn subscribers(&self) -> Result<Vec<i64>> {
        let state = self
            .state
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        Ok(state.subscriptions.keys().copied().collect())
    }

    /// Write the current state to disk. No-op for in-memory stores.
    pub fn flush(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Ok(());
        }

        let state = self
            .state
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;

        atomic_write(&self.path, &state)
    }
}

fn atomic_write(path: &Path, state: &StoreState) -> Result<()> {
    use portable_atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| StoreError::io("create directory for", path, e))?;
        }
    }

    // Unique per process and per write, so concurrent flushes never share a temp file
    let unique_id = COUNTER.fetch_add(1, Ordering::SeqCst);
    let temp_path = path.with_extension(format!("tmp.{}.{}", std::process::id(), unique_id));

    let file = File::create(&temp_path).map_err(|e| StoreError::io("create temp file for", path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, state)?;
    writer
        .flush()
        .map_err(|e| StoreError::io("flush", path, e))?;
    drop(writer);

    fs::rename(&temp_path, path).map_err(|e| StoreError::io("replace", path, e))?;

    Ok(())
}
