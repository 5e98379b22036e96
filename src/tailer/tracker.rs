// SPDX-License-Identifier: Apache-2.0

//! Decides which lines of a freshly read file are new.

use bytes::Bytes;

use crate::tailer::config::FirstDiscovery;
use crate::tailer::signature::{Resume, Signature};

/// Outcome of comparing one full read of the file against the previous one
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// Content seen for the first time. Carries the newest line when the
    /// tracker is configured to announce discovery.
    Baseline(Option<Bytes>),
    /// Lines appended since the previous read, possibly none
    Appended(Vec<Bytes>),
    /// Previous position lost (truncation, rotation, rewrite); only the newest
    /// line is recovered
    Discontinuity(Bytes),
    /// The read produced no lines
    Empty,
}

impl Observation {
    pub fn into_lines(self) -> Vec<Bytes> {
        match self {
            Observation::Baseline(line) => line.into_iter().collect(),
            Observation::Appended(lines) => lines,
            Observation::Discontinuity(line) => vec![line],
            Observation::Empty => Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct TailTracker {
    signature: Option<Signature>,
    first_discovery: FirstDiscovery,
}

impl TailTracker {
    pub fn new(first_discovery: FirstDiscovery) -> Self {
        Self {
            signature: None,
            first_discovery,
        }
    }

    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    /// Compare a complete read of the file with the stored signature and
    /// rebuild the signature from the new tail.
    pub fn observe(&mut self, lines: &[Bytes]) -> Observation {
        let Some(last) = lines.last() else {
            // A file that is empty now is either brand new or mid-rewrite
            // (truncated, not yet written). Only the former becomes a baseline.
            if self.signature.is_none() {
                self.signature = Some(Signature::default());
            }
            return Observation::Empty;
        };

        let observation = match &self.signature {
            None => match self.first_discovery {
                FirstDiscovery::Seed => Observation::Baseline(None),
                FirstDiscovery::EmitLast => Observation::Baseline(Some(last.clone())),
            },
            Some(signature) => match signature.resume(lines) {
                Resume::From(idx) => Observation::Appended(lines[idx..].to_vec()),
                Resume::Discontinuity => Observation::Discontinuity(last.clone()),
            },
        };

        self.signature = Some(Signature::from_tail(lines));
        observation
    }
}
