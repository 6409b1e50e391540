use nalgebra::{DMatrix, DVector};

/// State and covariance captured at one propagation step.
///
/// Delayed visual updates require restoring the state to what it was when an
/// image was taken, applying the update there, and re-propagating to the
/// present. Snapshots are the restore points: immutable once buffered,
/// superseded only by inserting a replacement at the same timestamp.
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    state: DVector<f64>,
    covariance: DMatrix<f64>,
    timestamp_ns: u64,
}

impl StateSnapshot {
    /// The covariance dimension may differ from the state length under an
    /// error-state parameterization; only squareness is checked here.
    /// Symmetry/PSD is the producer's responsibility, established at
    /// construction and not re-validated per access.
    pub fn new(state: DVector<f64>, covariance: DMatrix<f64>, timestamp_ns: u64) -> Self {
        debug_assert_eq!(covariance.nrows(), covariance.ncols());
        Self {
            state,
            covariance,
            timestamp_ns,
        }
    }

    pub fn state(&self) -> &DVector<f64> {
        &self.state
    }

    pub fn covariance(&self) -> &DMatrix<f64> {
        &self.covariance
    }

    pub fn timestamp_ns(&self) -> u64 {
        self.timestamp_ns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_accessors() {
        let snap = StateSnapshot::new(
            DVector::from_vec(vec![1.0, 2.0]),
            DMatrix::identity(3, 3),
            42,
        );
        assert_eq!(snap.state().len(), 2);
        assert_eq!(snap.covariance().nrows(), 3);
        assert_eq!(snap.timestamp_ns(), 42);
    }
}
