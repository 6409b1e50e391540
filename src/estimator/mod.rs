//! Filter core: snapshots, state history, and the delayed-update protocol.
//!
//! This module implements the rollback/replay mechanism around an external
//! filter model:
//! - Snapshot the state at every propagation step ([`StateSnapshot`])
//! - Retain snapshots and raw samples over the measurement-delay horizon
//!   ([`StateHistoryBuffer`])
//! - Roll back, correct, and replay when a delayed visual measurement
//!   arrives ([`RelativeFilterCore`])

pub mod core;
pub mod history;
pub mod phase;
pub mod snapshot;

pub use self::core::{FilterStats, MeasurementOutcome, RelativeFilterCore};
pub use history::StateHistoryBuffer;
pub use phase::FilterPhase;
pub use snapshot::StateSnapshot;
