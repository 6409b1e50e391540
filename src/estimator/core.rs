//! Relative filter core: propagation, delayed-update rollback/replay, and
//! reference-frame resets.
//!
//! The core owns the current state and the history buffer. Propagation
//! samples advance "now" and snapshot into the buffer; a delayed visual
//! measurement rolls the state back to the snapshot at its capture time,
//! applies the external correction there, and replays the buffered raw
//! samples to reconstruct the present. Both entry points mutate shared
//! state, so the caller must serialize them onto one logical thread — a
//! replay is a critical section with respect to propagation ingestion.

use std::sync::Arc;

use nalgebra::DMatrix;

use crate::config::EstimatorConfig;
use crate::error::{EstimatorError, Result};
use crate::fusion::FilterModel;
use crate::measurement::{PropagationSample, VisualMeasurement};
use crate::reference::ReferenceResetController;
use crate::system::messages::{KeyframeAnnouncement, RelativePoseEstimate};

use super::history::StateHistoryBuffer;
use super::phase::FilterPhase;
use super::snapshot::StateSnapshot;

/// What happened to one visual measurement.
///
/// Every variant except `Fused` and `ReferenceReset` leaves the filter state
/// untouched; all are recoverable and counted in [`FilterStats`].
#[derive(Debug, Clone)]
pub enum MeasurementOutcome {
    /// Delayed correction applied and replayed to the present.
    Fused(RelativePoseEstimate),
    /// Measurement promoted its frame to the new reference baseline.
    ReferenceReset {
        estimate: RelativePoseEstimate,
        keyframe: KeyframeAnnouncement,
    },
    /// Timestamp predates the retained history; dropped.
    DroppedStale,
    /// Inlier or correspondence count below the configured minimum.
    RejectedLowQuality,
    /// Correction broke covariance positive-semidefiniteness; reverted.
    RejectedUnstable,
    /// No reference baseline exists yet and this frame did not set one.
    AwaitingReference,
}

/// Running counters over every outcome the core can produce.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterStats {
    pub propagation_steps: u64,
    pub corrections_applied: u64,
    pub references_set: u64,
    pub dropped_stale: u64,
    pub rejected_low_quality: u64,
    pub rejected_unstable: u64,
    pub dropped_awaiting_reference: u64,
}

/// The delayed-measurement filter core.
pub struct RelativeFilterCore<M: FilterModel> {
    model: M,
    config: EstimatorConfig,
    history: StateHistoryBuffer,
    current: StateSnapshot,
    phase: FilterPhase,
    reset_controller: Arc<ReferenceResetController>,
    stats: FilterStats,
}

impl<M: FilterModel> RelativeFilterCore<M> {
    /// Build a core around an external filter model.
    ///
    /// `start_ns` timestamps the initial snapshot. Dimension mismatches
    /// between the model's declared sizes and what [`FilterModel::initial`]
    /// returns are fatal configuration errors.
    pub fn new(
        model: M,
        config: EstimatorConfig,
        reset_controller: Arc<ReferenceResetController>,
        start_ns: u64,
    ) -> Result<Self> {
        config.validate()?;

        let (state, covariance) = model.initial();
        if state.len() != model.state_dim() {
            return Err(EstimatorError::Config(format!(
                "model initial state has length {}, expected {}",
                state.len(),
                model.state_dim()
            )));
        }
        if covariance.nrows() != model.covariance_dim()
            || covariance.ncols() != model.covariance_dim()
        {
            return Err(EstimatorError::Config(format!(
                "model initial covariance is {}x{}, expected {dim}x{dim}",
                covariance.nrows(),
                covariance.ncols(),
                dim = model.covariance_dim()
            )));
        }

        let current = StateSnapshot::new(state, covariance, start_ns);
        let mut history = StateHistoryBuffer::new();
        history.insert(current.clone())?;

        Ok(Self {
            model,
            config,
            history,
            current,
            phase: FilterPhase::AwaitingFirstReference,
            reset_controller,
            stats: FilterStats::default(),
        })
    }

    pub fn phase(&self) -> FilterPhase {
        self.phase
    }

    pub fn stats(&self) -> FilterStats {
        self.stats
    }

    pub fn current_timestamp_ns(&self) -> u64 {
        self.current.timestamp_ns()
    }

    /// Advance the filter with one high-rate sample.
    ///
    /// Snapshots the propagated state into the history buffer together with
    /// the raw sample, prunes entries beyond the retention horizon, and
    /// emits the new estimate. A sample older than the newest snapshot is
    /// rejected as [`EstimatorError::OutOfOrderInsertion`].
    pub fn on_propagation_sample(
        &mut self,
        sample: PropagationSample,
    ) -> Result<RelativePoseEstimate> {
        let now_ns = self.current.timestamp_ns();
        if sample.timestamp_ns < now_ns {
            return Err(EstimatorError::OutOfOrderInsertion {
                sample_ns: sample.timestamp_ns,
                newest_ns: now_ns,
            });
        }

        let dt_s = (sample.timestamp_ns - now_ns) as f64 * 1e-9;
        let (state, covariance) =
            self.model
                .propagate(self.current.state(), self.current.covariance(), &sample, dt_s);

        self.current = StateSnapshot::new(state, covariance, sample.timestamp_ns);
        self.history.insert(self.current.clone())?;
        self.history.record_sample(sample);

        let cutoff = sample
            .timestamp_ns
            .saturating_sub(self.config.retention_horizon_ns);
        self.history.prune(cutoff);

        self.stats.propagation_steps += 1;
        Ok(self.estimate_of(&self.current))
    }

    /// Handle one visual measurement: quality gate, reset consumption, then
    /// either baseline redefinition or delayed correction with replay.
    pub fn on_visual_measurement(&mut self, measurement: VisualMeasurement) -> MeasurementOutcome {
        if measurement.corresponding < self.config.min_correspondences
            || measurement.inliers < self.config.min_inliers
        {
            self.stats.rejected_low_quality += 1;
            tracing::debug!(
                inliers = measurement.inliers,
                corresponding = measurement.corresponding,
                image = measurement.image_number,
                "visual measurement below quality thresholds, dropped"
            );
            return MeasurementOutcome::RejectedLowQuality;
        }

        // Consumed exactly once per measurement. A reset requested while
        // this measurement is being processed applies to the next one.
        let reset_pending = self.reset_controller.consume_if_pending();
        if reset_pending || measurement.is_new_reference {
            return self.apply_reference_reset(&measurement);
        }

        if self.phase == FilterPhase::AwaitingFirstReference {
            self.stats.dropped_awaiting_reference += 1;
            tracing::debug!(
                image = measurement.image_number,
                "no reference baseline yet, measurement dropped"
            );
            return MeasurementOutcome::AwaitingReference;
        }

        self.apply_delayed_correction(&measurement)
    }

    fn apply_reference_reset(&mut self, measurement: &VisualMeasurement) -> MeasurementOutcome {
        // A reset redefines the baseline rather than correcting past state,
        // so there is no rollback or replay. The relative offset is zeroed
        // at the current snapshot and tracking continues from there.
        let (state, covariance) = self
            .model
            .reset_reference(self.current.state(), self.current.covariance());
        self.current = StateSnapshot::new(state, covariance, self.current.timestamp_ns());
        // Replaces the newest buffer entry at the same timestamp.
        self.history
            .insert(self.current.clone())
            .expect("replacing the newest snapshot cannot be out of order");

        self.phase = FilterPhase::Tracking;
        self.stats.references_set += 1;

        let keyframe = KeyframeAnnouncement {
            image_number: measurement.image_number,
            is_reference: true,
        };
        tracing::info!(
            image = measurement.image_number,
            timestamp_ns = measurement.timestamp_ns,
            "reference frame reset"
        );

        MeasurementOutcome::ReferenceReset {
            estimate: self.estimate_of(&self.current),
            keyframe,
        }
    }

    /// Snapshots exist only at propagation timestamps, so the correction is
    /// anchored at the latest snapshot at or before the measurement's
    /// capture time; the corrected snapshot keeps that anchor timestamp.
    fn apply_delayed_correction(&mut self, measurement: &VisualMeasurement) -> MeasurementOutcome {
        let anchor = match self.history.find_at_or_before(measurement.timestamp_ns) {
            Some(snapshot) => snapshot.clone(),
            None => {
                self.stats.dropped_stale += 1;
                tracing::warn!(
                    timestamp_ns = measurement.timestamp_ns,
                    oldest_ns = self.history.oldest_timestamp_ns(),
                    "measurement older than retained history, dropped"
                );
                return MeasurementOutcome::DroppedStale;
            }
        };

        let (state, covariance) =
            self.model
                .correct(anchor.state(), anchor.covariance(), measurement);
        let covariance = symmetrize(covariance);

        // A correction that breaks positive-semidefiniteness indicates
        // filter divergence; keep the pre-correction snapshot instead of
        // propagating a corrupted state.
        let min_eig = covariance
            .symmetric_eigenvalues()
            .iter()
            .fold(f64::INFINITY, |a, &b| a.min(b));
        if min_eig < -self.config.psd_tolerance {
            self.stats.rejected_unstable += 1;
            tracing::warn!(
                min_eigenvalue = min_eig,
                timestamp_ns = measurement.timestamp_ns,
                "correction lost covariance PSD, reverting to prior snapshot"
            );
            return MeasurementOutcome::RejectedUnstable;
        }

        let corrected = StateSnapshot::new(state, covariance, anchor.timestamp_ns());
        self.history.overwrite_at(corrected.clone());
        self.replay_from(corrected);

        self.stats.corrections_applied += 1;
        tracing::debug!(
            timestamp_ns = measurement.timestamp_ns,
            now_ns = self.current.timestamp_ns(),
            image = measurement.image_number,
            "delayed correction fused and replayed"
        );
        MeasurementOutcome::Fused(self.estimate_of(&self.current))
    }

    /// Re-run the propagation model over every raw sample recorded after the
    /// corrected snapshot, overwriting the superseded buffer entries. Must
    /// not be interleaved with propagation ingestion.
    fn replay_from(&mut self, corrected: StateSnapshot) {
        let mut state = corrected;
        for sample in self.history.samples_after(state.timestamp_ns()) {
            let dt_s = (sample.timestamp_ns - state.timestamp_ns()) as f64 * 1e-9;
            let (x, p) = self
                .model
                .propagate(state.state(), state.covariance(), &sample, dt_s);
            state = StateSnapshot::new(x, p, sample.timestamp_ns);
            self.history.overwrite_at(state.clone());
        }
        self.current = state;
    }

    fn estimate_of(&self, snapshot: &StateSnapshot) -> RelativePoseEstimate {
        let pose = self.model.pose(snapshot.state());
        RelativePoseEstimate {
            timestamp_ns: snapshot.timestamp_ns(),
            translation: pose.translation,
            rotation: pose.rotation,
            covariance: snapshot.covariance().clone(),
        }
    }
}

fn symmetrize(m: DMatrix<f64>) -> DMatrix<f64> {
    // Average with the transpose so floating-point asymmetry cannot
    // accumulate over repeated replay cycles.
    (&m + m.transpose()) * 0.5
}
