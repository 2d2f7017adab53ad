//! Publisher-confirm bookkeeping.

use std::collections::BTreeSet;

/// Result of [`Channel::wait_for_confirms`](super::Channel::wait_for_confirms).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// Every outstanding publish was acknowledged.
    AllAcked,
    /// The broker negatively acknowledged these sequence numbers since the
    /// previous wait.
    Nacked(BTreeSet<u64>),
    /// The timeout elapsed with publishes still unconfirmed.
    TimedOut,
}

/// Sequence numbers of publishes awaiting a confirm.
#[derive(Debug)]
pub(crate) struct ConfirmTracker {
    next_publish_seq: u64,
    unconfirmed: BTreeSet<u64>,
    nacked: BTreeSet<u64>,
}

impl Default for ConfirmTracker {
    fn default() -> Self {
        Self {
            next_publish_seq: 1,
            unconfirmed: BTreeSet::new(),
            nacked: BTreeSet::new(),
        }
    }
}

impl ConfirmTracker {
    pub(crate) fn next_publish_seq(&self) -> u64 { self.next_publish_seq }

    pub(crate) fn unconfirmed_count(&self) -> usize { self.unconfirmed.len() }

    /// Assign the next sequence number to a publish.
    pub(crate) fn record_publish(&mut self) -> u64 {
        let seq = self.next_publish_seq;
        self.next_publish_seq += 1;
        self.unconfirmed.insert(seq);
        seq
    }

    /// Forget a publish that never reached the wire.
    pub(crate) fn forget(&mut self, seq: u64) { self.unconfirmed.remove(&seq); }

    /// Apply a `basic.ack` or `basic.nack`.
    pub(crate) fn resolve(&mut self, delivery_tag: u64, multiple: bool, acked: bool) {
        let resolved = if multiple {
            let rest = match delivery_tag.checked_add(1) {
                Some(bound) => self.unconfirmed.split_off(&bound),
                None => BTreeSet::new(),
            };
            std::mem::replace(&mut self.unconfirmed, rest)
        } else if self.unconfirmed.remove(&delivery_tag) {
            BTreeSet::from([delivery_tag])
        } else {
            BTreeSet::new()
        };
        if !acked {
            self.nacked.extend(resolved);
        }
    }

    /// The outcome a waiter should return now, if any.
    pub(crate) fn settle(&mut self) -> Option<ConfirmOutcome> {
        if !self.nacked.is_empty() {
            return Some(ConfirmOutcome::Nacked(std::mem::take(&mut self.nacked)));
        }
        self.unconfirmed
            .is_empty()
            .then_some(ConfirmOutcome::AllAcked)
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn tracker() -> ConfirmTracker {
        let mut tracker = ConfirmTracker::default();
        for _ in 0..5 {
            tracker.record_publish();
        }
        tracker
    }

    #[rstest]
    fn sequence_starts_at_one() {
        let mut tracker = ConfirmTracker::default();
        assert_eq!(tracker.record_publish(), 1);
        assert_eq!(tracker.record_publish(), 2);
        assert_eq!(tracker.next_publish_seq(), 3);
    }

    #[rstest]
    #[case::single(3, false, 4)]
    #[case::multiple(3, true, 2)]
    #[case::multiple_all(u64::MAX, true, 0)]
    #[case::unknown(9, false, 5)]
    fn acks_remove_confirmed(
        mut tracker: ConfirmTracker,
        #[case] tag: u64,
        #[case] multiple: bool,
        #[case] left: usize,
    ) {
        tracker.resolve(tag, multiple, true);
        assert_eq!(tracker.unconfirmed_count(), left);
    }

    #[rstest]
    fn nack_settles_immediately(mut tracker: ConfirmTracker) {
        tracker.resolve(2, true, false);
        assert_eq!(
            tracker.settle(),
            Some(ConfirmOutcome::Nacked(BTreeSet::from([1, 2])))
        );
        assert_eq!(tracker.settle(), None);
    }

    #[rstest]
    fn all_acked_once_empty(mut tracker: ConfirmTracker) {
        assert_eq!(tracker.settle(), None);
        tracker.resolve(5, true, true);
        assert_eq!(tracker.settle(), Some(ConfirmOutcome::AllAcked));
    }
}
