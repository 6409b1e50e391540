//! Simple kinematic dead-reckoning model.
//!
//! A deterministic constant-gain stand-in for the full relative MEKF, used by
//! the simulation binary and the protocol tests. State layout is
//! `[p(3), q(wxyz)(4), v(3)]` with a 9x9 error-state covariance
//! `[dp(3), dtheta(3), dv(3)]` — deliberately a different dimension than the
//! state vector, as an error-state filter would have.

use nalgebra::{DMatrix, DVector, Quaternion, UnitQuaternion, Vector3};

use crate::measurement::{PropagationSample, VisualMeasurement};

use super::{FilterModel, RelativePose};

const STATE_DIM: usize = 10;
const COVAR_DIM: usize = 9;

/// Dead-reckoning model with complementary-gain visual updates.
#[derive(Debug, Clone)]
pub struct KinematicModel {
    /// Process noise densities for position, attitude and velocity blocks.
    pub q_pos: f64,
    pub q_att: f64,
    pub q_vel: f64,
    /// Blend gain applied to altimeter readings on the z axis.
    pub altitude_gain: f64,
    /// Initial covariance diagonal.
    pub initial_var: f64,
}

impl Default for KinematicModel {
    fn default() -> Self {
        Self {
            q_pos: 1e-4,
            q_att: 1e-5,
            q_vel: 1e-3,
            altitude_gain: 0.1,
            initial_var: 1e-2,
        }
    }
}

fn position(state: &DVector<f64>) -> Vector3<f64> {
    Vector3::new(state[0], state[1], state[2])
}

fn rotation(state: &DVector<f64>) -> UnitQuaternion<f64> {
    UnitQuaternion::from_quaternion(Quaternion::new(state[3], state[4], state[5], state[6]))
}

fn velocity(state: &DVector<f64>) -> Vector3<f64> {
    Vector3::new(state[7], state[8], state[9])
}

fn pack(p: &Vector3<f64>, q: &UnitQuaternion<f64>, v: &Vector3<f64>) -> DVector<f64> {
    DVector::from_vec(vec![
        p.x, p.y, p.z, q.w, q.i, q.j, q.k, v.x, v.y, v.z,
    ])
}

impl FilterModel for KinematicModel {
    fn state_dim(&self) -> usize {
        STATE_DIM
    }

    fn covariance_dim(&self) -> usize {
        COVAR_DIM
    }

    fn initial(&self) -> (DVector<f64>, DMatrix<f64>) {
        let state = pack(
            &Vector3::zeros(),
            &UnitQuaternion::identity(),
            &Vector3::zeros(),
        );
        let covariance = DMatrix::identity(COVAR_DIM, COVAR_DIM) * self.initial_var;
        (state, covariance)
    }

    fn propagate(
        &self,
        state: &DVector<f64>,
        covariance: &DMatrix<f64>,
        sample: &PropagationSample,
        dt_s: f64,
    ) -> (DVector<f64>, DMatrix<f64>) {
        let q = rotation(state);
        let mut v = velocity(state);
        let mut p = position(state);

        // Body-frame specific force rotated into the reference frame; the
        // demo model assumes gravity-compensated accelerometer input.
        let accel_ref = q * sample.accel;
        p += v * dt_s + accel_ref * (0.5 * dt_s * dt_s);
        v += accel_ref * dt_s;
        let q = q * UnitQuaternion::from_scaled_axis(sample.gyro * dt_s);

        if let Some(alt) = sample.altitude {
            p.z += self.altitude_gain * (alt - p.z);
        }

        let mut cov = covariance.clone();
        for i in 0..3 {
            cov[(i, i)] += self.q_pos * dt_s;
            cov[(3 + i, 3 + i)] += self.q_att * dt_s;
            cov[(6 + i, 6 + i)] += self.q_vel * dt_s;
        }

        (pack(&p, &q, &v), cov)
    }

    fn correct(
        &self,
        state: &DVector<f64>,
        covariance: &DMatrix<f64>,
        measurement: &VisualMeasurement,
    ) -> (DVector<f64>, DMatrix<f64>) {
        // Scalar complementary gain from the relative sizes of the pose
        // covariance blocks. Not a Kalman gain; the flight filter supplies
        // the real update through this same seam.
        let prior_trace: f64 = (0..6).map(|i| covariance[(i, i)]).sum();
        let meas_trace: f64 = (0..6).map(|i| measurement.covariance[(i, i)]).sum();
        let gain = prior_trace / (prior_trace + meas_trace).max(f64::MIN_POSITIVE);

        let p = position(state);
        let q = rotation(state);
        let v = velocity(state);

        let p = p + gain * (measurement.translation - p);
        let q = q.slerp(&measurement.rotation, gain);

        let cov = covariance * (1.0 - gain);
        (pack(&p, &q, &v), cov)
    }

    fn reset_reference(
        &self,
        state: &DVector<f64>,
        _covariance: &DMatrix<f64>,
    ) -> (DVector<f64>, DMatrix<f64>) {
        // New baseline: zero relative offset, velocity carries over.
        let v = velocity(state);
        let state = pack(&Vector3::zeros(), &UnitQuaternion::identity(), &v);
        let covariance = DMatrix::identity(COVAR_DIM, COVAR_DIM) * self.initial_var;
        (state, covariance)
    }

    fn pose(&self, state: &DVector<f64>) -> RelativePose {
        RelativePose {
            translation: position(state),
            rotation: rotation(state),
        }
    }
}
