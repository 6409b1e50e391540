use nalgebra::Vector3;

/// Single high-rate propagation input: one IMU reading plus an optional
/// altimeter reading taken at the same instant.
///
/// Samples are retained in the state history buffer alongside the snapshots
/// they produce, because a delayed visual correction must re-run the
/// propagation model on these raw inputs rather than interpolate snapshots.
#[derive(Debug, Clone, Copy)]
pub struct PropagationSample {
    /// Capture time in nanoseconds.
    pub timestamp_ns: u64,
    /// Angular rate in body frame (rad/s).
    pub gyro: Vector3<f64>,
    /// Specific force in body frame (m/s^2).
    pub accel: Vector3<f64>,
    /// Altimeter reading (m), when one accompanied this sample.
    pub altitude: Option<f64>,
}

impl PropagationSample {
    pub fn new(timestamp_ns: u64, gyro: Vector3<f64>, accel: Vector3<f64>) -> Self {
        Self {
            timestamp_ns,
            gyro,
            accel,
            altitude: None,
        }
    }

    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = Some(altitude);
        self
    }
}
