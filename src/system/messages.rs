//! Outbound event types.
//!
//! These are emitted by the processing thread after every accepted
//! propagation step, correction and reference reset, independent of whatever
//! transport carries them further downstream.

use nalgebra::{DMatrix, UnitQuaternion, Vector3};

/// Relative pose estimate with uncertainty.
#[derive(Debug, Clone)]
pub struct RelativePoseEstimate {
    /// Timestamp of the state this estimate was extracted from.
    pub timestamp_ns: u64,
    /// Translation from the reference frame to the platform.
    pub translation: Vector3<f64>,
    pub rotation: UnitQuaternion<f64>,
    /// Full filter covariance at this timestamp.
    pub covariance: DMatrix<f64>,
}

/// Announcement that a frame was promoted to reference, for downstream
/// consumers that archive reference imagery.
#[derive(Debug, Clone, Copy)]
pub struct KeyframeAnnouncement {
    pub image_number: u32,
    pub is_reference: bool,
}

/// Everything the estimator emits, multiplexed onto one channel.
#[derive(Debug, Clone)]
pub enum EstimateEvent {
    Pose(RelativePoseEstimate),
    Keyframe(KeyframeAnnouncement),
}
