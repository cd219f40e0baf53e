//! A single stimulus-response trial: one solver run reduced to a firing probability.
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::core::cable::{Location, Morphology};
use crate::core::cluster::SpeciesProfiles;
use crate::core::solver::{
    CellContext, ChannelModels, MembraneSolver, PointCurrent, RunParams, VoltageTrace,
};
use crate::core::stimulus::StimulusEvent;
use crate::core::SPIKE_THRESHOLD;
use crate::error::CableError;

/// The outcome of one trial.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub struct TrialResult {
    pub spike_count: usize,
    pub num_stimuli: usize,
    pub firing_probability: f64,
}

impl TrialResult {
    /// The firing probability is the fraction of stimuli followed by a spike, at most 1,
    /// and 0 if there is no stimulus at all.
    pub fn new(spike_count: usize, num_stimuli: usize) -> Self {
        let firing_probability = if num_stimuli > 0 {
            (spike_count as f64 / num_stimuli as f64).min(1.0)
        } else {
            0.0
        };
        TrialResult {
            spike_count,
            num_stimuli,
            firing_probability,
        }
    }
}

/// A trial outcome together with the raw data it was computed from.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct TrialRecord {
    pub result: TrialResult,
    pub trace: VoltageTrace,
    /// Times (ms) of the detected spikes.
    pub spike_times: Vec<f64>,
    /// Onsets (ms) of the stimuli.
    pub stimulus_times: Vec<f64>,
}

/// Numerical and recording settings shared by all trials.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct TrialSettings {
    /// Integration time step (ms).
    pub dt: f64,
    /// Temperature (°C).
    pub celsius: f64,
    /// Initial membrane potential (mV).
    pub v_init: f64,
    /// Spike detection threshold (mV).
    pub threshold: f64,
    /// Where the stimuli are injected.
    pub stim_location: Location,
    /// Where the membrane potential is recorded.
    pub record_location: Location,
}

impl Default for TrialSettings {
    fn default() -> Self {
        TrialSettings {
            dt: 0.025,
            celsius: 6.3,
            v_init: -65.0,
            threshold: SPIKE_THRESHOLD,
            stim_location: Location::node(0.5),
            record_location: Location::node(0.5),
        }
    }
}

/// Returns the indices `i > 0` where the samples cross the threshold upward,
/// i.e., `v[i - 1] < threshold <= v[i]`. A plateau above threshold is counted once.
///
/// # Examples
///
/// ```rust
/// use rusty_cable::core::trial::detect_spikes;
///
/// assert_eq!(detect_spikes(&[0.0, 25.0, 25.0, 0.0, 25.0, 0.0], 20.0), vec![1, 4]);
/// ```
pub fn detect_spikes(samples: &[f64], threshold: f64) -> Vec<usize> {
    samples
        .iter()
        .tuple_windows()
        .positions(|(prev, next)| *prev < threshold && *next >= threshold)
        .map(|i| i + 1)
        .collect()
}

/// Drives one solver run per trial for a fixed cell morphology and channel models.
#[derive(Debug, Clone)]
pub struct TrialRunner<S: MembraneSolver> {
    solver: S,
    morphology: Morphology,
    channels: ChannelModels,
    settings: TrialSettings,
}

impl<S: MembraneSolver> TrialRunner<S> {
    /// Create a new trial runner.
    /// Returns an error if the morphology, the settings or the locations are invalid.
    pub fn build(
        solver: S,
        morphology: Morphology,
        channels: ChannelModels,
        settings: TrialSettings,
    ) -> Result<Self, CableError> {
        morphology.validate()?;
        morphology.segment_index(&settings.stim_location)?;
        morphology.segment_index(&settings.record_location)?;
        if !settings.threshold.is_finite() {
            return Err(CableError::ConfigurationError(format!(
                "Invalid spike threshold: {} (must be finite)",
                settings.threshold
            )));
        }
        RunParams {
            dt: settings.dt,
            celsius: settings.celsius,
            v_init: settings.v_init,
            stop_time: 0.0,
            record_segment: 0,
        }
        .validate()?;

        Ok(TrialRunner {
            solver,
            morphology,
            channels,
            settings,
        })
    }

    pub fn solver_ref(&self) -> &S {
        &self.solver
    }

    pub fn morphology(&self) -> &Morphology {
        &self.morphology
    }

    pub fn settings(&self) -> &TrialSettings {
        &self.settings
    }

    pub fn channels(&self) -> ChannelModels {
        self.channels
    }

    /// Run one trial and return its firing statistics.
    pub fn run(
        &self,
        profiles: &SpeciesProfiles,
        stimuli: &[StimulusEvent],
        total_time: f64,
    ) -> Result<TrialResult, CableError> {
        self.run_recorded(profiles, stimuli, total_time)
            .map(|record| record.result)
    }

    /// Run one trial and return its firing statistics along with the voltage trace,
    /// the spike times and the stimulus onsets.
    pub fn run_recorded(
        &self,
        profiles: &SpeciesProfiles,
        stimuli: &[StimulusEvent],
        total_time: f64,
    ) -> Result<TrialRecord, CableError> {
        // The cell only lives for the duration of this trial.
        let cell = CellContext::build(&self.morphology, self.channels, profiles)?;

        let stim_segment = cell.segment_index(&self.settings.stim_location)?;
        let record_segment = cell.segment_index(&self.settings.record_location)?;

        let currents: Vec<PointCurrent> = stimuli
            .iter()
            .map(|event| PointCurrent {
                segment: stim_segment,
                start: event.start,
                duration: event.duration(),
                amplitude: event.amplitude,
            })
            .collect();

        let params = RunParams {
            dt: self.settings.dt,
            celsius: self.settings.celsius,
            v_init: self.settings.v_init,
            stop_time: total_time,
            record_segment,
        };
        params.validate()?;

        let trace = self.solver.simulate(&cell, &currents, &params)?;
        if let Some(i) = trace.first_non_finite() {
            return Err(CableError::SimulationError(format!(
                "Non-finite membrane potential {} at t={} ms",
                trace.samples[i],
                trace.time(i)
            )));
        }

        let spikes = detect_spikes(&trace.samples, self.settings.threshold);
        let result = TrialResult::new(spikes.len(), stimuli.len());

        log::trace!(
            "Trial done: {} spikes for {} stimuli",
            result.spike_count,
            result.num_stimuli
        );

        Ok(TrialRecord {
            result,
            spike_times: spikes.iter().map(|&i| trace.time(i)).collect(),
            stimulus_times: stimuli.iter().map(|event| event.start).collect(),
            trace,
        })
    }
}
