//! System wrapper: thread orchestration around the filter core.
//!
//! Realizes the single-writer discipline the core requires: all mutations
//! are serialized onto one processing thread fed by channels, while reset
//! requests cross threads through the lock-guarded controller only.

pub mod estimator_system;
pub mod messages;

pub use estimator_system::EstimatorSystem;
pub use messages::{EstimateEvent, KeyframeAnnouncement, RelativePoseEstimate};
