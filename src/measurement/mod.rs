//! Inbound measurement types: high-rate propagation samples and low-rate
//! visual odometry results.
//!
//! Visual results cross a normalization boundary here: the wire-format
//! message ([`VoWireMessage`]) is converted once into the internal value type
//! ([`VisualMeasurement`]), isolating the filter core from transport schema
//! changes.

pub mod propagation;
pub mod vo;

pub use propagation::PropagationSample;
pub use vo::{Matrix7, VisualMeasurement, VoWireMessage};
