// SPDX-License-Identifier: Apache-2.0

//! Native file system watcher using the `notify` crate.
//!
//! The parent directory of the target is watched rather than the file itself,
//! so the file may be created, replaced, or renamed into place after the watch
//! is established. Only events touching the target path are forwarded.
//!
//! Uses OS-level file system notifications:
//! - Linux: inotify
//! - macOS: FSEvents
//! - Windows: ReadDirectoryChangesW

use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::bounded_channel::{BoundedReceiver, bounded};
use crate::tailer::error::{Result, TailerError};

/// Events only wake the debounce timer, so a small queue is enough. When it
/// is full a wake-up is already pending and further events can be dropped.
const EVENT_QUEUE_SIZE: usize = 64;

/// Kind of change seen on the target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    /// File was created or moved into place
    Create,
    /// File content or metadata changed
    Modify,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Changed(FileEventKind),
    /// The backend reported an error after setup
    Error(String),
}

pub struct NativeWatcher {
    // Dropping the watcher drops the callback and with it the event sender.
    _watcher: RecommendedWatcher,
    events: BoundedReceiver<WatchEvent>,
    target: PathBuf,
}

impl NativeWatcher {
    /// Watch the directory containing `path`. Fails if that directory cannot
    /// be resolved or watched.
    pub fn new(path: &Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .ok_or_else(|| TailerError::watch_init(path, "path does not name a file"))?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let dir = dir
            .canonicalize()
            .map_err(|e| TailerError::watch_init(path, e))?;
        let target = dir.join(file_name);

        let (tx, rx) = bounded(EVENT_QUEUE_SIZE);
        let filter_target = target.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => match Self::convert_event(&event, &filter_target) {
                    Some(kind) => WatchEvent::Changed(kind),
                    None => return,
                },
                Err(e) => WatchEvent::Error(e.to_string()),
            };
            let _ = tx.try_send(event);
        })
        .map_err(|e| TailerError::watch_init(path, e))?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| TailerError::watch_init(path, e))?;

        Ok(Self {
            _watcher: watcher,
            events: rx,
            target,
        })
    }

    /// Keep create and modify events that touch the target
    fn convert_event(event: &Event, target: &Path) -> Option<FileEventKind> {
        let kind = match event.kind {
            EventKind::Create(_) => FileEventKind::Create,
            EventKind::Modify(_) => FileEventKind::Modify,
            _ => return None,
        };

        if event.paths.iter().any(|p| p == target) {
            Some(kind)
        } else {
            None
        }
    }

    /// Next relevant event. `None` only if the backend shut down.
    pub async fn next(&mut self) -> Option<WatchEvent> {
        self.events.next().await
    }

    /// The resolved path events are matched against
    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn backend_name(&self) -> &'static str {
        #[cfg(target_os = "linux")]
        {
            "inotify"
        }
        #[cfg(target_os = "macos")]
        {
            "FSEvents"
        }
        #[cfg(target_os = "windows")]
        {
            "ReadDirectoryChangesW"
        }
        #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
        {
            "native"
        }
    }
}
