// SPDX-License-Identifier: Apache-2.0

//! Single-file tailing.
//!
//! A [`LineSource`] watches one file and emits each line appended to it. After
//! every change it re-reads the whole file and uses a [`signature::Signature`]
//! of the last lines it saw to find where the new content starts. When the file
//! was truncated, rotated, or rewritten so that the signature no longer matches,
//! it emits only the last line.

pub mod config;
pub mod debounce;
pub mod error;
pub mod signature;
pub mod source;
pub mod tracker;
pub mod watcher;

pub use config::{FirstDiscovery, TailerConfig};
pub use error::TailerError;
pub use source::{LineSource, read_file_tail};
