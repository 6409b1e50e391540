//! Simulation driver for the delayed-measurement estimator.
//!
//! Generates a synthetic flight: 200 Hz IMU samples with noise, 2 Hz visual
//! odometry results that become available ~300 ms after their capture time,
//! an initial reference frame, and a mid-run reference reset request. Runs
//! everything through the `EstimatorSystem` and logs what the filter did.

use anyhow::Result;
use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use rel_mekf::fusion::KinematicModel;
use rel_mekf::measurement::{PropagationSample, VoWireMessage};
use rel_mekf::system::{EstimateEvent, EstimatorSystem};
use rel_mekf::EstimatorConfig;

const MS: u64 = 1_000_000;

/// IMU period: 5 ms (200 Hz).
const IMU_PERIOD_MS: u64 = 5;
/// Visual result period: 500 ms (2 Hz).
const VO_PERIOD_MS: u64 = 500;
/// Latency between image capture and the VO result being available.
const VO_LATENCY_MS: u64 = 300;
/// Simulated run length.
const RUN_MS: u64 = 10_000;

fn vo_message(capture_ms: u64, truth_x: f64, image_number: u32, rng: &mut StdRng) -> VoWireMessage {
    let mut covariance = vec![0.0; 49];
    for i in 0..7 {
        covariance[i * 7 + i] = 0.02;
    }
    VoWireMessage {
        timestamp_ns: capture_ms * MS,
        translation: [truth_x + rng.gen_range(-0.05..0.05), 0.0, 0.0],
        rotation_xyzw: [0.0, 0.0, 0.0, 1.0],
        covariance,
        inliers: rng.gen_range(25..80),
        corresponding: 90,
        new_reference: false,
        image_number,
        child_frame_id: "camera_current".into(),
        parent_frame_id: "camera_reference".into(),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut system = EstimatorSystem::new(
        KinematicModel::default(),
        EstimatorConfig::default(),
        0,
    )?;
    let mut rng = StdRng::seed_from_u64(7);

    // Truth: constant 0.1 m/s^2 acceleration along x.
    let accel_truth = 0.1;
    let truth_x = |t_s: f64| 0.5 * accel_truth * t_s * t_s;

    // VO results queued until their (delayed) availability time.
    let mut pending_vo: Vec<(u64, VoWireMessage)> = Vec::new();
    let mut image_number = 0u32;
    let mut pose_events = 0u64;
    let mut keyframes = 0u64;

    // The first frame seeds the reference baseline.
    let mut first = vo_message(0, 0.0, image_number, &mut rng);
    first.new_reference = true;
    system.push_measurement(first)?;

    for now_ms in (IMU_PERIOD_MS..=RUN_MS).step_by(IMU_PERIOD_MS as usize) {
        let gyro = Vector3::new(
            rng.gen_range(-1e-3..1e-3),
            rng.gen_range(-1e-3..1e-3),
            rng.gen_range(-1e-3..1e-3),
        );
        let accel = Vector3::new(accel_truth + rng.gen_range(-0.01..0.01), 0.0, 0.0);
        system.push_sample(PropagationSample::new(now_ms * MS, gyro, accel))?;

        // Capture a new image at the VO cadence; its result arrives later.
        if now_ms % VO_PERIOD_MS == 0 {
            image_number += 1;
            let msg = vo_message(
                now_ms,
                truth_x(now_ms as f64 * 1e-3),
                image_number,
                &mut rng,
            );
            pending_vo.push((now_ms + VO_LATENCY_MS, msg));
        }

        // Deliver VO results whose latency has elapsed.
        pending_vo.retain(|(available_ms, msg)| {
            if *available_ms <= now_ms {
                // The delivery itself can only fail at shutdown.
                let _ = system.push_measurement(msg.clone());
                false
            } else {
                true
            }
        });

        // Halfway through, an external trigger requests a new reference.
        if now_ms == RUN_MS / 2 {
            let ack = system.request_reference_reset();
            tracing::info!(ack, "reference reset requested");
        }

        while let Ok(event) = system.estimates().try_recv() {
            match event {
                EstimateEvent::Pose(_) => pose_events += 1,
                EstimateEvent::Keyframe(kf) => {
                    keyframes += 1;
                    tracing::info!(
                        image = kf.image_number,
                        "keyframe promoted to reference"
                    );
                }
            }
        }
    }

    let stats = system.shutdown().expect("processing thread panicked");
    tracing::info!(
        pose_events,
        keyframes,
        propagation_steps = stats.propagation_steps,
        corrections = stats.corrections_applied,
        references = stats.references_set,
        dropped_stale = stats.dropped_stale,
        rejected_low_quality = stats.rejected_low_quality,
        "simulation complete"
    );

    Ok(())
}
