//! Estimator configuration.

use serde::Deserialize;

use crate::error::{EstimatorError, Result};

/// Configuration for the delayed-measurement filter core.
#[derive(Clone, Debug, Deserialize)]
pub struct EstimatorConfig {
    /// How far back the state history buffer must reach, in nanoseconds.
    /// Must cover the worst-case latency of the visual pipeline; measurements
    /// older than this are dropped as stale.
    #[serde(default = "default_retention_horizon_ns")]
    pub retention_horizon_ns: u64,

    /// Minimum feature correspondences for a visual measurement to be fused.
    #[serde(default = "default_min_correspondences")]
    pub min_correspondences: u32,

    /// Minimum inlier count for a visual measurement to be fused.
    #[serde(default = "default_min_inliers")]
    pub min_inliers: u32,

    /// Tolerance on the most negative eigenvalue of the corrected covariance.
    /// A correction pushing an eigenvalue below `-psd_tolerance` is treated
    /// as numeric instability and reverted.
    #[serde(default = "default_psd_tolerance")]
    pub psd_tolerance: f64,
}

fn default_retention_horizon_ns() -> u64 {
    // 2 s covers the visual pipeline worst case with margin.
    2_000_000_000
}

fn default_min_correspondences() -> u32 {
    20
}

fn default_min_inliers() -> u32 {
    10
}

fn default_psd_tolerance() -> f64 {
    1e-9
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            retention_horizon_ns: default_retention_horizon_ns(),
            min_correspondences: default_min_correspondences(),
            min_inliers: default_min_inliers(),
            psd_tolerance: default_psd_tolerance(),
        }
    }
}

impl EstimatorConfig {
    /// Validate the configuration. Called once at startup; failures are fatal.
    pub fn validate(&self) -> Result<()> {
        if self.retention_horizon_ns == 0 {
            return Err(EstimatorError::Config(
                "retention_horizon_ns must be non-zero".into(),
            ));
        }
        if self.min_inliers > self.min_correspondences {
            return Err(EstimatorError::Config(format!(
                "min_inliers ({}) exceeds min_correspondences ({})",
                self.min_inliers, self.min_correspondences
            )));
        }
        if self.psd_tolerance < 0.0 {
            return Err(EstimatorError::Config(
                "psd_tolerance must be non-negative".into(),
            ));
        }
        Ok(())
    }
}
