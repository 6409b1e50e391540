//! Trait seam for the filter mathematics.
//!
//! The buffering/rollback/replay protocol is model-agnostic: the state
//! transition, the Kalman-style update and the reference-reset semantics are
//! supplied by a [`FilterModel`] implementation. The core only guarantees
//! that these functions are invoked with the right snapshots in the right
//! order, and that replay re-runs `propagate` on the original raw samples.

pub mod kinematic;

use nalgebra::{DMatrix, DVector, UnitQuaternion, Vector3};

use crate::measurement::{PropagationSample, VisualMeasurement};

pub use kinematic::KinematicModel;

/// Relative pose extracted from a state vector.
#[derive(Debug, Clone, Copy)]
pub struct RelativePose {
    pub translation: Vector3<f64>,
    pub rotation: UnitQuaternion<f64>,
}

/// External filter mathematics consumed by the core.
///
/// Implementations must be deterministic: replay correctness depends on
/// `propagate` producing identical output for identical inputs.
pub trait FilterModel: Send + 'static {
    /// Length of the state vector.
    fn state_dim(&self) -> usize;

    /// Dimension of the (square) covariance. May differ from
    /// [`state_dim`](Self::state_dim) under an error-state parameterization.
    fn covariance_dim(&self) -> usize;

    /// Initial state and covariance before any measurement has been fused.
    fn initial(&self) -> (DVector<f64>, DMatrix<f64>);

    /// Advance state and covariance across `dt_s` seconds using one raw
    /// propagation sample.
    fn propagate(
        &self,
        state: &DVector<f64>,
        covariance: &DMatrix<f64>,
        sample: &PropagationSample,
        dt_s: f64,
    ) -> (DVector<f64>, DMatrix<f64>);

    /// Fuse a visual measurement into the state at the measurement's
    /// timestamp (Kalman-style update). The core symmetrizes and
    /// PSD-checks the returned covariance.
    fn correct(
        &self,
        state: &DVector<f64>,
        covariance: &DMatrix<f64>,
        measurement: &VisualMeasurement,
    ) -> (DVector<f64>, DMatrix<f64>);

    /// Redefine the reference baseline: zero the relative offset while
    /// keeping whatever non-relative state (velocities, biases) the model
    /// carries.
    fn reset_reference(
        &self,
        state: &DVector<f64>,
        covariance: &DMatrix<f64>,
    ) -> (DVector<f64>, DMatrix<f64>);

    /// Extract the relative pose encoded in a state vector.
    fn pose(&self, state: &DVector<f64>) -> RelativePose;
}
