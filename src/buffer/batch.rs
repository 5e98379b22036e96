// SPDX-License-Identifier: Apache-2.0

//! In-memory batch and admission policy.

use std::collections::VecDeque;
use std::mem;

use crate::buffer::config::BufferPolicy;

/// Result of offering one value to the batch
#[derive(Debug, PartialEq, Eq)]
pub enum Admission<T> {
    /// Appended; nothing needs to be flushed
    Accepted,
    /// These values must be flushed, in order. The new value has been
    /// accepted and is included unless it was left in the batch.
    Flush(Vec<T>),
    /// Batch was full; the incoming value was discarded
    Dropped(T),
    /// Batch was full; the oldest value was evicted for the incoming one
    Evicted(T),
}

#[derive(Debug)]
pub struct Batch<T> {
    items: VecDeque<T>,
    max_size: usize,
    policy: BufferPolicy,
}

impl<T> Batch<T> {
    pub fn new(max_size: usize, policy: BufferPolicy) -> Self {
        Self {
            items: VecDeque::with_capacity(max_size),
            max_size,
            policy,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.max_size
    }

    pub fn policy(&self) -> BufferPolicy {
        self.policy
    }

    /// Offer a value, applying the admission policy when the batch is full.
    ///
    /// Under `BlockOnFull` the batch is never left full: a full batch is
    /// handed back before the value is appended, and if the append fills the
    /// batch again it is handed back too.
    pub fn admit(&mut self, item: T) -> Admission<T> {
        match self.policy {
            BufferPolicy::BlockOnFull => {
                let mut flushed = if self.is_full() { self.take() } else { Vec::new() };

                self.items.push_back(item);
                if self.is_full() {
                    flushed.extend(self.items.drain(..));
                }

                if flushed.is_empty() {
                    Admission::Accepted
                } else {
                    Admission::Flush(flushed)
                }
            }
            BufferPolicy::DropNew => {
                if self.is_full() {
                    return Admission::Dropped(item);
                }
                self.items.push_back(item);
                Admission::Accepted
            }
            BufferPolicy::DropOldest => {
                let evicted = if self.is_full() {
                    self.items.pop_front()
                } else {
                    None
                };
                self.items.push_back(item);
                match evicted {
                    Some(old) => Admission::Evicted(old),
                    None => Admission::Accepted,
                }
            }
        }
    }

    /// Append without applying the policy. Hands the value back if the batch
    /// is already full.
    pub fn push_if_room(&mut self, item: T) -> Result<(), T> {
        if self.is_full() {
            return Err(item);
        }
        self.items.push_back(item);
        Ok(())
    }

    /// Remove and return everything, oldest first.
    pub fn take(&mut self) -> Vec<T> {
        let items = mem::replace(&mut self.items, VecDeque::with_capacity(self.max_size));
        items.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill<T>(batch: &mut Batch<T>, items: impl IntoIterator<Item = T>) -> Vec<Admission<T>> {
        items.into_iter().map(|i| batch.admit(i)).collect()
    }

    #[test]
    fn test_drop_new_discards_incoming() {
        let mut batch = Batch::new(2, BufferPolicy::DropNew);
        let res = fill(&mut batch, ["1", "2", "3"]);

        assert_eq!(
            res,
            vec![Admission::Accepted, Admission::Accepted, Admission::Dropped("3")]
        );
        assert_eq!(batch.take(), vec!["1", "2"]);
        assert!(batch.is_empty());
    }

    #[test]
    fn test_drop_oldest_evicts_front() {
        let mut batch = Batch::new(2, BufferPolicy::DropOldest);
        let res = fill(&mut batch, ["1", "2", "3"]);

        assert_eq!(res[2], Admission::Evicted("1"));
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.take(), vec!["2", "3"]);
    }

    #[test]
    fn test_block_on_full_flushes_eagerly() {
        let mut batch = Batch::new(2, BufferPolicy::BlockOnFull);

        assert_eq!(batch.admit("1"), Admission::Accepted);
        assert_eq!(batch.admit("2"), Admission::Flush(vec!["1", "2"]));
        assert!(batch.is_empty());

        assert_eq!(batch.admit("3"), Admission::Accepted);
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn test_block_on_full_with_single_slot() {
        let mut batch = Batch::new(1, BufferPolicy::BlockOnFull);

        assert_eq!(batch.admit("1"), Admission::Flush(vec!["1"]));
        assert_eq!(batch.admit("2"), Admission::Flush(vec!["2"]));
        assert!(!batch.is_full());
    }

    #[test]
    fn test_push_if_room_ignores_policy() {
        for policy in [
            BufferPolicy::BlockOnFull,
            BufferPolicy::DropNew,
            BufferPolicy::DropOldest,
        ] {
            let mut batch = Batch::new(2, policy);
            assert_eq!(batch.push_if_room("1"), Ok(()));
            assert_eq!(batch.push_if_room("2"), Ok(()));
            assert_eq!(batch.push_if_room("3"), Err("3"));
            assert_eq!(batch.take(), vec!["1", "2"], "{policy}");
        }
    }

    #[test]
    fn test_never_exceeds_max_size() {
        for policy in [
            BufferPolicy::BlockOnFull,
            BufferPolicy::DropNew,
            BufferPolicy::DropOldest,
        ] {
            let mut batch = Batch::new(3, policy);
            for i in 0..20 {
                batch.admit(i);
                assert!(batch.len() <= 3, "{policy} exceeded max size");
            }
        }
    }
}
