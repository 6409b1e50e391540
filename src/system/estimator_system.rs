//! Estimator system: channels, processing thread, and shutdown.
//!
//! Three concurrent contexts feed the system: a high-rate propagation
//! source, the slow visual pipeline, and asynchronous reference-reset
//! triggers. The first two go through bounded channels into a single
//! processing thread that owns the filter core, so no propagation sample can
//! be appended while a replay is in progress. Only the reset flag crosses
//! threads directly, through its own lock.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded, never, select};

use crate::config::EstimatorConfig;
use crate::error::{EstimatorError, Result};
use crate::estimator::{FilterStats, MeasurementOutcome, RelativeFilterCore};
use crate::fusion::FilterModel;
use crate::measurement::{PropagationSample, VisualMeasurement, VoWireMessage};
use crate::reference::ReferenceResetController;

use super::messages::EstimateEvent;

/// Propagation samples queue deep enough to ride out a long replay.
const PROPAGATION_CHANNEL_CAPACITY: usize = 512;

/// Visual results are slow; a short queue suffices.
const VISUAL_CHANNEL_CAPACITY: usize = 16;

/// Outbound estimates. Sent with `try_send`: a stalled consumer loses
/// events rather than stalling the filter.
const ESTIMATE_CHANNEL_CAPACITY: usize = 1024;

/// Poll interval for the shutdown flag while the channels are idle.
const RECV_TIMEOUT: Duration = Duration::from_millis(50);

/// Owns the processing thread and the channel endpoints handed to sensor
/// producers and estimate consumers.
pub struct EstimatorSystem {
    prop_sender: Option<Sender<PropagationSample>>,
    vo_sender: Option<Sender<VoWireMessage>>,
    estimate_receiver: Receiver<EstimateEvent>,
    reset_controller: Arc<ReferenceResetController>,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<FilterStats>>,
}

impl EstimatorSystem {
    /// Build the core (configuration errors surface here, synchronously)
    /// and spawn the processing thread.
    pub fn new<M: FilterModel>(
        model: M,
        config: EstimatorConfig,
        start_ns: u64,
    ) -> Result<Self> {
        let reset_controller = Arc::new(ReferenceResetController::new());
        let core = RelativeFilterCore::new(model, config, reset_controller.clone(), start_ns)?;

        let (prop_sender, prop_receiver) = bounded::<PropagationSample>(PROPAGATION_CHANNEL_CAPACITY);
        let (vo_sender, vo_receiver) = bounded::<VoWireMessage>(VISUAL_CHANNEL_CAPACITY);
        let (estimate_sender, estimate_receiver) =
            bounded::<EstimateEvent>(ESTIMATE_CHANNEL_CAPACITY);

        let shutdown = Arc::new(AtomicBool::new(false));
        let worker = {
            let shutdown = shutdown.clone();
            thread::spawn(move || {
                run_processing_loop(core, prop_receiver, vo_receiver, estimate_sender, shutdown)
            })
        };

        Ok(Self {
            prop_sender: Some(prop_sender),
            vo_sender: Some(vo_sender),
            estimate_receiver,
            reset_controller,
            shutdown,
            worker: Some(worker),
        })
    }

    /// Queue one propagation sample. Blocks briefly when the channel is
    /// full (the filter is behind).
    pub fn push_sample(&self, sample: PropagationSample) -> Result<()> {
        self.prop_sender
            .as_ref()
            .ok_or(EstimatorError::ShuttingDown)?
            .send(sample)
            .map_err(|_| EstimatorError::ShuttingDown)
    }

    /// Queue one visual odometry result in wire form.
    pub fn push_measurement(&self, message: VoWireMessage) -> Result<()> {
        self.vo_sender
            .as_ref()
            .ok_or(EstimatorError::ShuttingDown)?
            .send(message)
            .map_err(|_| EstimatorError::ShuttingDown)
    }

    /// Request that the next visual frame become the new reference.
    /// Callable from any thread; returns the acknowledgment.
    pub fn request_reference_reset(&self) -> bool {
        self.reset_controller.request()
    }

    /// Handle for triggers that live on other threads.
    pub fn reset_controller(&self) -> Arc<ReferenceResetController> {
        self.reset_controller.clone()
    }

    /// Outbound pose estimates and keyframe announcements.
    pub fn estimates(&self) -> &Receiver<EstimateEvent> {
        &self.estimate_receiver
    }

    /// Stop the processing thread after it drains queued input, returning
    /// the final counters.
    pub fn shutdown(&mut self) -> Option<FilterStats> {
        self.shutdown.store(true, Ordering::SeqCst);
        // Dropping the senders disconnects the channels and wakes the
        // processing thread out of its select.
        self.prop_sender.take();
        self.vo_sender.take();
        self.worker.take().and_then(|w| w.join().ok())
    }
}

impl Drop for EstimatorSystem {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_processing_loop<M: FilterModel>(
    mut core: RelativeFilterCore<M>,
    prop_receiver: Receiver<PropagationSample>,
    vo_receiver: Receiver<VoWireMessage>,
    estimate_sender: Sender<EstimateEvent>,
    shutdown: Arc<AtomicBool>,
) -> FilterStats {
    tracing::info!("estimator processing thread started");

    let mut prop_rx = prop_receiver;
    let mut vo_rx = vo_receiver;
    let mut prop_connected = true;
    let mut vo_connected = true;

    loop {
        // Drain queued propagation samples before touching a visual result,
        // so a correction always sees every sample captured before it.
        while let Ok(sample) = prop_rx.try_recv() {
            handle_sample(&mut core, sample, &estimate_sender);
        }

        if !prop_connected && !vo_connected {
            break;
        }
        if shutdown.load(Ordering::SeqCst)
            && prop_rx.is_empty()
            && vo_rx.is_empty()
        {
            break;
        }

        select! {
            recv(prop_rx) -> msg => match msg {
                Ok(sample) => handle_sample(&mut core, sample, &estimate_sender),
                Err(_) => {
                    prop_connected = false;
                    prop_rx = never();
                }
            },
            recv(vo_rx) -> msg => match msg {
                Ok(message) => handle_measurement(&mut core, &message, &estimate_sender),
                Err(_) => {
                    vo_connected = false;
                    vo_rx = never();
                }
            },
            default(RECV_TIMEOUT) => {}
        }
    }

    let stats = core.stats();
    tracing::info!(
        propagation_steps = stats.propagation_steps,
        corrections = stats.corrections_applied,
        references = stats.references_set,
        dropped_stale = stats.dropped_stale,
        rejected_low_quality = stats.rejected_low_quality,
        "estimator processing thread exiting"
    );
    stats
}

fn handle_sample<M: FilterModel>(
    core: &mut RelativeFilterCore<M>,
    sample: PropagationSample,
    estimate_sender: &Sender<EstimateEvent>,
) {
    match core.on_propagation_sample(sample) {
        Ok(estimate) => emit(estimate_sender, EstimateEvent::Pose(estimate)),
        Err(err) => tracing::warn!("propagation sample rejected: {err}"),
    }
}

fn handle_measurement<M: FilterModel>(
    core: &mut RelativeFilterCore<M>,
    message: &VoWireMessage,
    estimate_sender: &Sender<EstimateEvent>,
) {
    let measurement = match VisualMeasurement::from_wire(message) {
        Ok(measurement) => measurement,
        Err(err) => {
            tracing::warn!("visual measurement discarded: {err}");
            return;
        }
    };
    match core.on_visual_measurement(measurement) {
        MeasurementOutcome::Fused(estimate) => {
            emit(estimate_sender, EstimateEvent::Pose(estimate));
        }
        MeasurementOutcome::ReferenceReset { estimate, keyframe } => {
            emit(estimate_sender, EstimateEvent::Keyframe(keyframe));
            emit(estimate_sender, EstimateEvent::Pose(estimate));
        }
        // Dropped/rejected outcomes are counted and logged inside the core.
        MeasurementOutcome::DroppedStale
        | MeasurementOutcome::RejectedLowQuality
        | MeasurementOutcome::RejectedUnstable
        | MeasurementOutcome::AwaitingReference => {}
    }
}

fn emit(sender: &Sender<EstimateEvent>, event: EstimateEvent) {
    // The filter must never block on a slow estimate consumer.
    if sender.try_send(event).is_err() {
        tracing::debug!("estimate consumer is behind, event dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::KinematicModel;
    use nalgebra::Vector3;

    const MS: u64 = 1_000_000;

    fn wire(ts_ms: u64, x: f64, new_reference: bool, image_number: u32) -> VoWireMessage {
        let mut covariance = vec![0.0; 49];
        for i in 0..7 {
            covariance[i * 7 + i] = 0.01;
        }
        VoWireMessage {
            timestamp_ns: ts_ms * MS,
            translation: [x, 0.0, 0.0],
            rotation_xyzw: [0.0, 0.0, 0.0, 1.0],
            covariance,
            inliers: 50,
            corresponding: 60,
            new_reference,
            image_number,
            child_frame_id: "camera_current".into(),
            parent_frame_id: "camera_reference".into(),
        }
    }

    fn recv_event(system: &EstimatorSystem) -> EstimateEvent {
        system
            .estimates()
            .recv_timeout(Duration::from_secs(5))
            .expect("processing thread should emit an event")
    }

    #[test]
    fn test_end_to_end_reference_then_samples_then_correction() {
        let mut system =
            EstimatorSystem::new(KinematicModel::default(), EstimatorConfig::default(), 0)
                .unwrap();

        // Reference frame first.
        system.push_measurement(wire(0, 0.0, true, 1)).unwrap();
        match recv_event(&system) {
            EstimateEvent::Keyframe(kf) => {
                assert!(kf.is_reference);
                assert_eq!(kf.image_number, 1);
            }
            other => panic!("expected keyframe announcement, got {other:?}"),
        }
        assert!(matches!(recv_event(&system), EstimateEvent::Pose(_)));

        // High-rate propagation at 1 kHz for 20 ms.
        for ts in 1..=20 {
            let sample = PropagationSample::new(
                ts * MS,
                Vector3::zeros(),
                Vector3::new(1.0, 0.0, 0.0),
            );
            system.push_sample(sample).unwrap();
        }
        for ts in 1..=20 {
            match recv_event(&system) {
                EstimateEvent::Pose(est) => assert_eq!(est.timestamp_ns, ts * MS),
                other => panic!("expected pose estimate, got {other:?}"),
            }
        }

        // Delayed correction timestamped 10 ms in the past.
        system.push_measurement(wire(10, 0.5, false, 2)).unwrap();
        match recv_event(&system) {
            EstimateEvent::Pose(est) => {
                // Replay brings the corrected state back to "now".
                assert_eq!(est.timestamp_ns, 20 * MS);
            }
            other => panic!("expected pose estimate, got {other:?}"),
        }

        let stats = system.shutdown().unwrap();
        assert_eq!(stats.propagation_steps, 20);
        assert_eq!(stats.references_set, 1);
        assert_eq!(stats.corrections_applied, 1);
    }

    #[test]
    fn test_reset_request_promotes_next_measurement() {
        let mut system =
            EstimatorSystem::new(KinematicModel::default(), EstimatorConfig::default(), 0)
                .unwrap();

        assert!(system.request_reference_reset());
        assert!(system.request_reference_reset()); // idempotent

        // Measurement does not carry the flag itself.
        system.push_measurement(wire(0, 0.0, false, 3)).unwrap();
        match recv_event(&system) {
            EstimateEvent::Keyframe(kf) => assert_eq!(kf.image_number, 3),
            other => panic!("expected keyframe announcement, got {other:?}"),
        }

        let stats = system.shutdown().unwrap();
        assert_eq!(stats.references_set, 1);
    }

    #[test]
    fn test_malformed_measurement_discarded() {
        let mut system =
            EstimatorSystem::new(KinematicModel::default(), EstimatorConfig::default(), 0)
                .unwrap();

        // Truncated covariance block fails normalization and is dropped
        // before it can reach the core.
        let mut bad = wire(0, 0.0, true, 1);
        bad.covariance.truncate(10);
        system.push_measurement(bad).unwrap();

        system.push_measurement(wire(0, 0.0, true, 2)).unwrap();
        match recv_event(&system) {
            EstimateEvent::Keyframe(kf) => assert_eq!(kf.image_number, 2),
            other => panic!("expected keyframe announcement, got {other:?}"),
        }

        let stats = system.shutdown().unwrap();
        assert_eq!(stats.references_set, 1);
    }

    #[test]
    fn test_push_after_shutdown_fails() {
        let mut system =
            EstimatorSystem::new(KinematicModel::default(), EstimatorConfig::default(), 0)
                .unwrap();
        system.shutdown();

        let sample = PropagationSample::new(MS, Vector3::zeros(), Vector3::zeros());
        assert!(matches!(
            system.push_sample(sample),
            Err(EstimatorError::ShuttingDown)
        ));
        assert!(matches!(
            system.push_measurement(wire(0, 0.0, false, 0)),
            Err(EstimatorError::ShuttingDown)
        ));
    }
}
