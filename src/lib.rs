//! Delayed-measurement relative pose estimation core.
//!
//! Fuses high-rate inertial propagation with low-rate, delayed visual
//! odometry: every propagation step is snapshotted into a state history
//! buffer, and when a visual measurement arrives (timestamped at image
//! capture, long before the result is ready) the filter rolls back to that
//! snapshot, applies the correction, and replays the buffered raw samples to
//! rebuild the present state. An asynchronous trigger can request that the
//! next visual frame become a new reference baseline.
//!
//! The filter mathematics live behind [`fusion::FilterModel`]; this crate
//! owns the buffering, rollback/replay, and reference-reset protocol.

pub mod config;
pub mod error;
pub mod estimator;
pub mod fusion;
pub mod measurement;
pub mod reference;
pub mod system;

pub use config::EstimatorConfig;
pub use error::{EstimatorError, Result};
