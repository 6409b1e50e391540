//! Error types for the relative estimator.

use thiserror::Error;

/// Errors surfaced by the estimator core and the system wrapper.
///
/// Recoverable measurement conditions (stale drops, quality rejections) are
/// not errors: they are reported through
/// [`MeasurementOutcome`](crate::estimator::MeasurementOutcome) and counted.
#[derive(Error, Debug)]
pub enum EstimatorError {
    /// A propagation sample arrived with a timestamp older than the newest
    /// buffered snapshot. The buffer must stay contiguous, so the sample is
    /// rejected rather than coerced into order.
    #[error(
        "out-of-order propagation sample: {sample_ns} ns precedes newest snapshot {newest_ns} ns"
    )]
    OutOfOrderInsertion { sample_ns: u64, newest_ns: u64 },

    /// A wire message failed normalization and was discarded.
    #[error("malformed visual measurement: covariance has {len} elements, expected {expected}")]
    MalformedMeasurement { len: usize, expected: usize },

    /// Invalid configuration, fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// The processing thread has exited and no longer accepts input.
    #[error("estimator system is shutting down")]
    ShuttingDown,
}

pub type Result<T> = std::result::Result<T, EstimatorError>;
