//! State history buffer for delayed measurement updates.
//!
//! Holds the snapshots produced by each propagation step together with a
//! side-log of the raw propagation samples that produced them. The side-log
//! is what makes replay possible: a delayed correction re-runs the
//! propagation model on the original inputs, it does not interpolate
//! snapshots.

use std::collections::VecDeque;

use crate::error::{EstimatorError, Result};
use crate::estimator::snapshot::StateSnapshot;
use crate::measurement::PropagationSample;

/// Ordered snapshot history plus the propagation-sample log.
///
/// Invariants: snapshot timestamps are strictly ascending (an insertion at
/// the newest timestamp replaces it), and the retained span is kept at or
/// above the configured measurement-delay horizon by [`prune`](Self::prune).
#[derive(Debug, Default)]
pub struct StateHistoryBuffer {
    snapshots: VecDeque<StateSnapshot>,
    samples: VecDeque<PropagationSample>,
}

impl StateHistoryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a snapshot at the buffer tail.
    ///
    /// A snapshot at the newest timestamp replaces the existing entry.
    /// An older timestamp would break contiguity and is rejected.
    pub fn insert(&mut self, snapshot: StateSnapshot) -> Result<()> {
        match self.snapshots.back() {
            Some(newest) if snapshot.timestamp_ns() < newest.timestamp_ns() => {
                Err(EstimatorError::OutOfOrderInsertion {
                    sample_ns: snapshot.timestamp_ns(),
                    newest_ns: newest.timestamp_ns(),
                })
            }
            Some(newest) if snapshot.timestamp_ns() == newest.timestamp_ns() => {
                *self.snapshots.back_mut().unwrap() = snapshot;
                Ok(())
            }
            _ => {
                self.snapshots.push_back(snapshot);
                Ok(())
            }
        }
    }

    /// Log the raw propagation sample belonging to the snapshot just
    /// inserted. Same ordering discipline as [`insert`](Self::insert).
    pub fn record_sample(&mut self, sample: PropagationSample) {
        if let Some(newest) = self.samples.back() {
            if sample.timestamp_ns == newest.timestamp_ns {
                *self.samples.back_mut().unwrap() = sample;
                return;
            }
        }
        self.samples.push_back(sample);
    }

    /// Latest snapshot with `timestamp <= timestamp_ns`, or `None` when the
    /// buffer is empty or the requested time predates the oldest retained
    /// snapshot (the measurement is too late to apply).
    pub fn find_at_or_before(&self, timestamp_ns: u64) -> Option<&StateSnapshot> {
        let idx = self
            .snapshots
            .partition_point(|s| s.timestamp_ns() <= timestamp_ns);
        if idx == 0 {
            None
        } else {
            self.snapshots.get(idx - 1)
        }
    }

    /// Raw propagation samples strictly after `timestamp_ns`, in order.
    /// Cloned out so replay can rewrite snapshots while iterating.
    pub fn samples_after(&self, timestamp_ns: u64) -> Vec<PropagationSample> {
        let idx = self
            .samples
            .partition_point(|s| s.timestamp_ns <= timestamp_ns);
        self.samples.iter().skip(idx).copied().collect()
    }

    /// Overwrite the snapshot at exactly `timestamp_ns` with a replayed one.
    /// Returns false when no entry exists at that timestamp.
    pub fn overwrite_at(&mut self, snapshot: StateSnapshot) -> bool {
        let ts = snapshot.timestamp_ns();
        let idx = self.snapshots.partition_point(|s| s.timestamp_ns() < ts);
        match self.snapshots.get_mut(idx) {
            Some(slot) if slot.timestamp_ns() == ts => {
                *slot = snapshot;
                true
            }
            _ => false,
        }
    }

    /// Drop snapshots and logged samples older than `cutoff_ns`. The newest
    /// snapshot is always retained so lookups at the present never miss.
    pub fn prune(&mut self, cutoff_ns: u64) {
        while self.snapshots.len() > 1
            && self
                .snapshots
                .front()
                .is_some_and(|s| s.timestamp_ns() < cutoff_ns)
        {
            self.snapshots.pop_front();
        }
        while self
            .samples
            .front()
            .is_some_and(|s| s.timestamp_ns < cutoff_ns)
        {
            self.samples.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn oldest_timestamp_ns(&self) -> Option<u64> {
        self.snapshots.front().map(|s| s.timestamp_ns())
    }

    pub fn newest_timestamp_ns(&self) -> Option<u64> {
        self.snapshots.back().map(|s| s.timestamp_ns())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{DMatrix, DVector};

    fn snap(ts: u64, value: f64) -> StateSnapshot {
        StateSnapshot::new(
            DVector::from_vec(vec![value]),
            DMatrix::identity(1, 1),
            ts,
        )
    }

    fn sample(ts: u64) -> PropagationSample {
        PropagationSample::new(ts, Default::default(), Default::default())
    }

    #[test]
    fn test_find_at_or_before_exact_and_between() {
        let mut buf = StateHistoryBuffer::new();
        for ts in [10, 20, 30] {
            buf.insert(snap(ts, ts as f64)).unwrap();
        }

        assert_eq!(buf.find_at_or_before(20).unwrap().timestamp_ns(), 20);
        assert_eq!(buf.find_at_or_before(25).unwrap().timestamp_ns(), 20);
        assert_eq!(buf.find_at_or_before(99).unwrap().timestamp_ns(), 30);
    }

    #[test]
    fn test_find_at_or_before_too_early() {
        let mut buf = StateHistoryBuffer::new();
        buf.insert(snap(10, 0.0)).unwrap();

        assert!(buf.find_at_or_before(9).is_none());
        assert!(StateHistoryBuffer::new().find_at_or_before(10).is_none());
    }

    #[test]
    fn test_insert_equal_timestamp_replaces() {
        let mut buf = StateHistoryBuffer::new();
        buf.insert(snap(10, 1.0)).unwrap();
        buf.insert(snap(10, 2.0)).unwrap();

        assert_eq!(buf.len(), 1);
        assert_eq!(buf.find_at_or_before(10).unwrap().state()[0], 2.0);
    }

    #[test]
    fn test_insert_out_of_order_rejected() {
        let mut buf = StateHistoryBuffer::new();
        buf.insert(snap(20, 0.0)).unwrap();

        let err = buf.insert(snap(10, 0.0)).unwrap_err();
        assert!(matches!(
            err,
            EstimatorError::OutOfOrderInsertion {
                sample_ns: 10,
                newest_ns: 20
            }
        ));
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn test_samples_after_is_strict_and_ordered() {
        let mut buf = StateHistoryBuffer::new();
        for ts in [10, 20, 30, 40] {
            buf.record_sample(sample(ts));
        }

        let after: Vec<u64> = buf.samples_after(20).iter().map(|s| s.timestamp_ns).collect();
        assert_eq!(after, vec![30, 40]);
        assert!(buf.samples_after(40).is_empty());
    }

    #[test]
    fn test_overwrite_at_existing_timestamp() {
        let mut buf = StateHistoryBuffer::new();
        for ts in [10, 20, 30] {
            buf.insert(snap(ts, 0.0)).unwrap();
        }

        assert!(buf.overwrite_at(snap(20, 5.0)));
        assert_eq!(buf.find_at_or_before(20).unwrap().state()[0], 5.0);
        assert!(!buf.overwrite_at(snap(25, 1.0)));
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn test_prune_drops_old_keeps_newest() {
        let mut buf = StateHistoryBuffer::new();
        for ts in [10, 20, 30] {
            buf.insert(snap(ts, 0.0)).unwrap();
            buf.record_sample(sample(ts));
        }

        buf.prune(25);
        assert_eq!(buf.oldest_timestamp_ns(), Some(30));
        assert!(buf.samples_after(0).iter().all(|s| s.timestamp_ns >= 25));

        // Pruning past the newest entry still retains it.
        buf.prune(100);
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.newest_timestamp_ns(), Some(30));
    }
}
