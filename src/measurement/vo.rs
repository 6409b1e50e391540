//! Visual odometry measurement types.
//!
//! The upstream correspondence pipeline delivers results in a flat wire
//! format ([`VoWireMessage`]). Working directly with that format is clumsy,
//! especially around the covariance block, so it is normalized exactly once
//! into [`VisualMeasurement`] at the system boundary.

use nalgebra::{Quaternion, SMatrix, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::{EstimatorError, Result};

/// 7x7 covariance of the measured transform (6-DOF pose plus one extra
/// row/column produced by the upstream estimator, carried opaquely).
pub type Matrix7 = SMatrix<f64, 7, 7>;

/// Number of elements in the flattened wire covariance block.
const WIRE_COVARIANCE_LEN: usize = 49;

/// Wire representation of one visual odometry result, as serialized by the
/// correspondence pipeline. Field layout mirrors the transport schema;
/// nothing downstream of [`VisualMeasurement::from_wire`] sees this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoWireMessage {
    pub timestamp_ns: u64,
    /// Translation between reference and current image, meters.
    pub translation: [f64; 3],
    /// Rotation quaternion as [x, y, z, w]. Not assumed normalized.
    pub rotation_xyzw: [f64; 4],
    /// Row-major 7x7 covariance of the transform. Carried as a `Vec`
    /// because serde does not derive for arrays past length 32; the length
    /// is validated during normalization.
    pub covariance: Vec<f64>,
    pub inliers: u32,
    pub corresponding: u32,
    /// Set by the producer when this image was promoted to reference.
    pub new_reference: bool,
    /// Sequence number of the image this result was computed from.
    pub image_number: u32,
    pub child_frame_id: String,
    pub parent_frame_id: String,
}

/// Normalized, ownership-independent visual odometry result.
///
/// Value type: copied freely between pipeline stages, consumed exactly once
/// by the filter core.
#[derive(Debug, Clone)]
pub struct VisualMeasurement {
    /// Time the image was captured (not when the result became available).
    pub timestamp_ns: u64,
    /// Translation from the reference camera frame to the current one.
    pub translation: Vector3<f64>,
    /// Rotation portion of the transform, normalized on conversion.
    pub rotation: UnitQuaternion<f64>,
    /// Covariance on the transform, treated opaquely by the core.
    pub covariance: Matrix7,
    pub inliers: u32,
    pub corresponding: u32,
    /// True when the producing pipeline already promoted this image to be
    /// the new reference frame.
    pub is_new_reference: bool,
    pub image_number: u32,
    pub child_frame_id: String,
    pub parent_frame_id: String,
}

impl VisualMeasurement {
    /// Normalize a wire message into the internal value type.
    ///
    /// Pure conversion: the covariance length is validated, the quaternion
    /// is renormalized and the covariance block is reshaped, nothing else
    /// is interpreted here.
    pub fn from_wire(msg: &VoWireMessage) -> Result<Self> {
        if msg.covariance.len() != WIRE_COVARIANCE_LEN {
            return Err(EstimatorError::MalformedMeasurement {
                len: msg.covariance.len(),
                expected: WIRE_COVARIANCE_LEN,
            });
        }

        let [x, y, z, w] = msg.rotation_xyzw;
        let rotation = UnitQuaternion::from_quaternion(Quaternion::new(w, x, y, z));
        let covariance = Matrix7::from_row_slice(&msg.covariance);

        Ok(Self {
            timestamp_ns: msg.timestamp_ns,
            translation: Vector3::from_row_slice(&msg.translation),
            rotation,
            covariance,
            inliers: msg.inliers,
            corresponding: msg.corresponding,
            is_new_reference: msg.new_reference,
            image_number: msg.image_number,
            child_frame_id: msg.child_frame_id.clone(),
            parent_frame_id: msg.parent_frame_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn wire_message() -> VoWireMessage {
        let mut covariance = vec![0.0; 49];
        for i in 0..7 {
            covariance[i * 7 + i] = 0.01;
        }
        // One off-diagonal pair to check row-major reshaping.
        covariance[1] = 0.5;
        covariance[7] = 0.5;

        VoWireMessage {
            timestamp_ns: 1_500_000_000,
            translation: [0.1, -0.2, 0.3],
            rotation_xyzw: [0.0, 0.0, 0.0, 1.0],
            covariance,
            inliers: 42,
            corresponding: 80,
            new_reference: false,
            image_number: 7,
            child_frame_id: "camera_current".into(),
            parent_frame_id: "camera_reference".into(),
        }
    }

    #[test]
    fn test_from_wire_normalizes_rotation() {
        let mut msg = wire_message();
        msg.rotation_xyzw = [0.0, 0.0, 2.0, 2.0];
        let m = VisualMeasurement::from_wire(&msg).unwrap();

        assert_relative_eq!(m.rotation.norm(), 1.0, epsilon = 1e-12);
        // 2*(0,0,s,s) normalizes to a 90 degree rotation about z.
        assert_relative_eq!(
            m.rotation.angle(),
            std::f64::consts::FRAC_PI_2,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_from_wire_reshapes_covariance_row_major() {
        let m = VisualMeasurement::from_wire(&wire_message()).unwrap();

        assert_relative_eq!(m.covariance[(0, 1)], 0.5, epsilon = 1e-12);
        assert_relative_eq!(m.covariance[(1, 0)], 0.5, epsilon = 1e-12);
        assert_relative_eq!(m.covariance[(3, 3)], 0.01, epsilon = 1e-12);
    }

    #[test]
    fn test_from_wire_copies_counts_and_frames() {
        let m = VisualMeasurement::from_wire(&wire_message()).unwrap();

        assert_eq!(m.inliers, 42);
        assert_eq!(m.corresponding, 80);
        assert_eq!(m.image_number, 7);
        assert!(!m.is_new_reference);
        assert_eq!(m.child_frame_id, "camera_current");
        assert_eq!(m.parent_frame_id, "camera_reference");
    }

    #[test]
    fn test_from_wire_rejects_wrong_covariance_length() {
        let mut msg = wire_message();
        msg.covariance.truncate(36);

        let err = VisualMeasurement::from_wire(&msg).unwrap_err();
        assert!(matches!(
            err,
            EstimatorError::MalformedMeasurement {
                len: 36,
                expected: 49
            }
        ));
    }
}
