// SPDX-License-Identifier: Apache-2.0

//! Trailing-line fingerprints used to find the previous read position after
//! the file has been rewritten underneath the watcher.

use bytes::Bytes;

/// Number of trailing lines kept as the resynchronization anchor
pub const SIGNATURE_SIZE: usize = 3;

/// Split file content into lines.
///
/// Lines are separated by `\n`; a trailing `\r` is stripped. A final newline
/// does not produce an empty last line. Slices share the input allocation.
pub fn split_lines(content: &Bytes) -> Vec<Bytes> {
    let mut lines = Vec::new();
    let mut start = 0;

    for (idx, byte) in content.iter().enumerate() {
        if *byte == b'\n' {
            lines.push(strip_cr(content.slice(start..idx)));
            start = idx + 1;
        }
    }

    if start < content.len() {
        lines.push(strip_cr(content.slice(start..)));
    }

    lines
}

fn strip_cr(line: Bytes) -> Bytes {
    if line.last() == Some(&b'\r') {
        line.slice(..line.len() - 1)
    } else {
        line
    }
}

/// Where new content starts relative to the previous signature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
    /// Lines at and after this index were not part of the previous read
    From(usize),
    /// The signature appears nowhere in the current content
    Discontinuity,
}

/// The last [`SIGNATURE_SIZE`] lines seen at the most recent successful read.
///
/// An empty signature is valid: it records that the file existed with no lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature {
    lines: Vec<Bytes>,
}

impl Signature {
    /// Build a signature from the tail of `lines`.
    pub fn from_tail(lines: &[Bytes]) -> Self {
        let start = lines.len().saturating_sub(SIGNATURE_SIZE);
        Self {
            lines: lines[start..].to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> &[Bytes] {
        &self.lines
    }

    /// Locate the newest contiguous run of `lines` equal to this signature,
    /// searching backward from the end.
    pub fn resume(&self, lines: &[Bytes]) -> Resume {
        if self.lines.is_empty() {
            return Resume::From(0);
        }

        let size = self.lines.len();
        if lines.len() < size {
            return Resume::Discontinuity;
        }

        (0..=lines.len() - size)
            .rev()
            .find(|&start| lines[start..start + size] == self.lines[..])
            .map(|start| Resume::From(start + size))
            .unwrap_or(Resume::Discontinuity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(items: &[&'static str]) -> Vec<Bytes> {
        items.iter().map(|s| Bytes::from_static(s.as_bytes())).collect()
    }

    #[test]
    fn test_split_lines_trailing_newline() {
        let content = Bytes::from_static(b"a\nb\nc\n");
        assert_eq!(split_lines(&content), lines(&["a", "b", "c"]));
    }

    #[test]
    fn test_split_lines_unterminated_last_line() {
        let content = Bytes::from_static(b"a\nb");
        assert_eq!(split_lines(&content), lines(&["a", "b"]));
    }

    #[test]
    fn test_split_lines_crlf_and_blank_lines() {
        let content = Bytes::from_static(b"a\r\n\r\nb\r\n");
        assert_eq!(split_lines(&content), lines(&["a", "", "b"]));
    }

    #[test]
    fn test_split_lines_empty() {
        assert!(split_lines(&Bytes::new()).is_empty());
    }

    #[test]
    fn test_signature_keeps_at_most_three_lines() {
        let sig = Signature::from_tail(&lines(&["1", "2", "3", "4", "5"]));
        assert_eq!(sig.len(), SIGNATURE_SIZE);
        assert_eq!(sig.lines(), &lines(&["3", "4", "5"])[..]);

        let short = Signature::from_tail(&lines(&["only"]));
        assert_eq!(short.len(), 1);

        assert!(Signature::from_tail(&[]).is_empty());
    }

    #[test]
    fn test_resume_after_append() {
        let sig = Signature::from_tail(&lines(&["old1", "old2"]));
        let current = lines(&["old1", "old2", "new1", "new2"]);
        assert_eq!(sig.resume(&current), Resume::From(2));
    }

    #[test]
    fn test_resume_without_changes() {
        let sig = Signature::from_tail(&lines(&["a", "b", "c"]));
        assert_eq!(sig.resume(&lines(&["a", "b", "c"])), Resume::From(3));
    }

    #[test]
    fn test_resume_picks_latest_match() {
        // The anchor appears twice; the newest occurrence wins so nothing is replayed.
        let sig = Signature::from_tail(&lines(&["x", "y"]));
        let current = lines(&["x", "y", "z", "x", "y", "new"]);
        assert_eq!(sig.resume(&current), Resume::From(5));
    }

    #[test]
    fn test_resume_detects_discontinuity() {
        let sig = Signature::from_tail(&lines(&["A", "B", "C"]));
        assert_eq!(
            sig.resume(&lines(&["X", "Y", "Z"])),
            Resume::Discontinuity
        );
    }

    #[test]
    fn test_resume_shorter_than_signature() {
        let sig = Signature::from_tail(&lines(&["A", "B", "C"]));
        assert_eq!(sig.resume(&lines(&["A"])), Resume::Discontinuity);
    }

    #[test]
    fn test_empty_signature_treats_everything_as_new() {
        let sig = Signature::default();
        assert_eq!(sig.resume(&lines(&["first"])), Resume::From(0));
    }
}
