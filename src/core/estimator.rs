//! Monte-Carlo estimation of firing probabilities over many seeded trials.
//!
//! Every trial is an independent task: it builds its own conductance profiles and its own
//! stimulus train from its seed, then runs one [`TrialRunner`] trial. Trials can be executed on a
//! fixed-size worker pool; outcomes are gathered and reduced on the calling thread only.
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::cluster::ClusterConfiguration;
use crate::core::solver::MembraneSolver;
use crate::core::stats::Summary;
use crate::core::stimulus::StimulusProtocol;
use crate::core::trial::{TrialRecord, TrialResult, TrialRunner};
use crate::error::CableError;

/// How trials are scheduled.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Execution {
    /// One trial after the other on the calling thread.
    #[default]
    Sequential,
    /// On a pool of `num_workers` threads, one trial per task.
    Parallel { num_workers: usize },
}

/// What to do when the solver fails on a trial.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the whole estimation with the error of the first failed trial.
    #[default]
    AbortAll,
    /// Record the failed trial and leave it out of the distribution.
    ExcludeAndContinue,
}

/// Parameters of a Monte-Carlo estimation.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct EstimatorSettings {
    pub num_trials: usize,
    /// Trial k uses the seed `base_seed + k`. Without a base seed, every trial draws a fresh seed.
    #[serde(default)]
    pub base_seed: Option<u64>,
    #[serde(default)]
    pub execution: Execution,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Keep the voltage trace and the stimulus onsets of the first trial.
    #[serde(default)]
    pub capture_representative: bool,
}

impl Default for EstimatorSettings {
    fn default() -> Self {
        EstimatorSettings {
            num_trials: 100,
            base_seed: None,
            execution: Execution::default(),
            failure_policy: FailurePolicy::default(),
            capture_representative: false,
        }
    }
}

impl EstimatorSettings {
    pub fn validate(&self) -> Result<(), CableError> {
        if let Execution::Parallel { num_workers: 0 } = self.execution {
            return Err(CableError::ConfigurationError(
                "Invalid parallel execution: 0 workers (must be positive)".to_string(),
            ));
        }
        Ok(())
    }
}

/// The unit of work sent to a worker.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct TrialTask {
    pub trial_index: usize,
    pub seed: u64,
}

/// The message sent back by a worker.
#[derive(Debug, PartialEq, Clone)]
pub struct TrialOutcome {
    pub trial_index: usize,
    pub seed: u64,
    pub result: Result<TrialResult, CableError>,
    pub record: Option<TrialRecord>,
}

/// A trial that failed and was left out of a distribution.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct TrialFailure {
    pub trial_index: usize,
    pub seed: u64,
    pub message: String,
}

/// The firing probabilities of all trials for one configuration and one stimulus amplitude.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct FiringProbabilityDistribution {
    pub configuration: String,
    /// Mean stimulus amplitude (nA).
    pub stim_amplitude: f64,
    /// Per-trial firing probabilities, in trial-index order.
    pub probabilities: Vec<f64>,
    /// Trial index of every probability.
    pub trial_indices: Vec<usize>,
    /// Seed of every probability.
    pub seeds: Vec<u64>,
    /// Trials excluded from the distribution.
    pub failures: Vec<TrialFailure>,
    /// Raw data of the first trial, if requested and if it succeeded.
    pub representative: Option<TrialRecord>,
}

impl FiringProbabilityDistribution {
    /// Returns the number of successful trials.
    pub fn len(&self) -> usize {
        self.probabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probabilities.is_empty()
    }

    /// Returns the mean firing probability, or `None` if no trial succeeded.
    pub fn mean(&self) -> Option<f64> {
        if self.probabilities.is_empty() {
            return None;
        }
        Some(self.probabilities.iter().sum::<f64>() / self.probabilities.len() as f64)
    }

    pub fn summary(&self) -> Option<Summary> {
        Summary::from_values(&self.probabilities)
    }
}

/// Estimates firing-probability distributions by repeating seeded trials.
///
/// # Examples
///
/// ```rust
/// use rusty_cable::core::cable::{Morphology, Section};
/// use rusty_cable::core::cluster::{ChannelDistribution, ClusterConfiguration};
/// use rusty_cable::core::estimator::{EstimatorSettings, MonteCarloEstimator};
/// use rusty_cable::core::solver::ChannelModels;
/// use rusty_cable::core::stimulus::StimulusProtocol;
/// use rusty_cable::core::trial::{TrialRunner, TrialSettings};
/// use rusty_cable::hines::solver::CableSolver;
///
/// let morphology = Morphology::node_only(Section {
///     length: 10.0,
///     diameter: 10.0,
///     num_segments: 5,
///     ..Section::default()
/// });
/// let runner = TrialRunner::build(
///     CableSolver,
///     morphology,
///     ChannelModels::default(),
///     TrialSettings::default(),
/// )
/// .unwrap();
/// let protocol = StimulusProtocol { total_time: 20.0, ..StimulusProtocol::default() };
/// let settings = EstimatorSettings {
///     num_trials: 4,
///     base_seed: Some(42),
///     ..EstimatorSettings::default()
/// };
/// let estimator = MonteCarloEstimator::new(runner, protocol, settings);
///
/// let configuration = ClusterConfiguration::new(
///     "uniform",
///     ChannelDistribution::Uniform { conductance: 0.12 },
///     ChannelDistribution::Uniform { conductance: 0.036 },
///     ChannelDistribution::Uniform { conductance: 3e-4 },
/// );
/// let distribution = estimator.estimate(&configuration, 0.5).unwrap();
/// assert_eq!(distribution.len(), 4);
/// assert_eq!(distribution.seeds, vec![42, 43, 44, 45]);
/// ```
#[derive(Debug, Clone)]
pub struct MonteCarloEstimator<S: MembraneSolver> {
    runner: TrialRunner<S>,
    protocol: StimulusProtocol,
    settings: EstimatorSettings,
}

impl<S: MembraneSolver> MonteCarloEstimator<S> {
    pub fn new(
        runner: TrialRunner<S>,
        protocol: StimulusProtocol,
        settings: EstimatorSettings,
    ) -> Self {
        MonteCarloEstimator {
            runner,
            protocol,
            settings,
        }
    }

    pub fn runner(&self) -> &TrialRunner<S> {
        &self.runner
    }

    pub fn protocol(&self) -> &StimulusProtocol {
        &self.protocol
    }

    pub fn settings(&self) -> &EstimatorSettings {
        &self.settings
    }

    /// Estimate the distribution of firing probabilities of a configuration at a given mean
    /// stimulus amplitude.
    pub fn estimate(
        &self,
        configuration: &ClusterConfiguration,
        stim_amplitude: f64,
    ) -> Result<FiringProbabilityDistribution, CableError> {
        self.estimate_with_base_seed(configuration, stim_amplitude, self.settings.base_seed)
    }

    /// Estimate several configurations at the same amplitude with paired seeds: trial k of every
    /// configuration sees the same stimulus train, so that only the conductance geometry differs.
    /// Without a configured base seed, a single base seed is drawn and shared by all
    /// configurations.
    pub fn compare(
        &self,
        configurations: &[ClusterConfiguration],
        stim_amplitude: f64,
    ) -> Result<Vec<FiringProbabilityDistribution>, CableError> {
        let base_seed = self.settings.base_seed.unwrap_or_else(rand::random::<u64>);
        log::info!(
            "Comparing {} configurations at {} nA with base seed {}",
            configurations.len(),
            stim_amplitude,
            base_seed
        );

        // Validate everything before running anything.
        for configuration in configurations {
            self.validate(configuration, stim_amplitude)?;
        }

        configurations
            .iter()
            .map(|configuration| {
                self.estimate_with_base_seed(configuration, stim_amplitude, Some(base_seed))
            })
            .collect()
    }

    /// Estimate one configuration at several mean stimulus amplitudes.
    pub fn sweep(
        &self,
        configuration: &ClusterConfiguration,
        stim_amplitudes: &[f64],
    ) -> Result<Vec<FiringProbabilityDistribution>, CableError> {
        for &stim_amplitude in stim_amplitudes {
            self.validate(configuration, stim_amplitude)?;
        }
        stim_amplitudes
            .iter()
            .map(|&stim_amplitude| self.estimate(configuration, stim_amplitude))
            .collect()
    }

    /// Check that every trial of the configuration can be set up.
    fn validate(
        &self,
        configuration: &ClusterConfiguration,
        stim_amplitude: f64,
    ) -> Result<(), CableError> {
        self.settings.validate()?;
        let domain = self.runner.morphology().node.domain()?;
        configuration.build_profiles(&domain)?;
        self.protocol.with_mean_amplitude(stim_amplitude).validate()
    }

    fn estimate_with_base_seed(
        &self,
        configuration: &ClusterConfiguration,
        stim_amplitude: f64,
        base_seed: Option<u64>,
    ) -> Result<FiringProbabilityDistribution, CableError> {
        self.validate(configuration, stim_amplitude)?;

        let tasks: Vec<TrialTask> = (0..self.settings.num_trials)
            .map(|trial_index| TrialTask {
                trial_index,
                seed: match base_seed {
                    Some(base_seed) => base_seed.wrapping_add(trial_index as u64),
                    None => rand::random::<u64>(),
                },
            })
            .collect();

        log::info!(
            "Estimating firing probability of '{}' at {} nA over {} trials ({:?})",
            configuration.name,
            stim_amplitude,
            tasks.len(),
            self.settings.execution
        );

        let protocol = self.protocol.with_mean_amplitude(stim_amplitude);
        let mut outcomes = match self.settings.execution {
            Execution::Sequential => tasks
                .iter()
                .map(|task| self.execute(task, configuration, &protocol))
                .collect::<Vec<TrialOutcome>>(),
            Execution::Parallel { num_workers } => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(num_workers)
                    .build()
                    .map_err(|e| CableError::ExecutionError(e.to_string()))?;
                pool.install(|| {
                    tasks
                        .par_iter()
                        .map(|task| self.execute(task, configuration, &protocol))
                        .collect::<Vec<TrialOutcome>>()
                })
            }
        };
        outcomes.sort_by_key(|outcome| outcome.trial_index);

        let distribution = self.reduce(configuration, stim_amplitude, outcomes)?;

        log::info!(
            "Estimation of '{}' at {} nA done: mean firing probability {:.4} \
             over {} trials ({} excluded)",
            configuration.name,
            stim_amplitude,
            distribution.mean().unwrap_or(f64::NAN),
            distribution.len(),
            distribution.failures.len()
        );

        Ok(distribution)
    }

    /// Run one trial with a fresh cell and a fresh stimulus train.
    fn execute(
        &self,
        task: &TrialTask,
        configuration: &ClusterConfiguration,
        protocol: &StimulusProtocol,
    ) -> TrialOutcome {
        let capture = self.settings.capture_representative && task.trial_index == 0;

        let run = || -> Result<(TrialResult, Option<TrialRecord>), CableError> {
            let domain = self.runner.morphology().node.domain()?;
            let profiles = configuration.build_profiles(&domain)?;
            let stimuli = protocol.generate(Some(task.seed))?;
            if capture {
                let record = self
                    .runner
                    .run_recorded(&profiles, &stimuli, protocol.total_time)?;
                Ok((record.result, Some(record)))
            } else {
                let result = self.runner.run(&profiles, &stimuli, protocol.total_time)?;
                Ok((result, None))
            }
        };

        let (result, record) = match run() {
            Ok((result, record)) => (Ok(result), record),
            Err(e) => (Err(e), None),
        };

        match &result {
            Ok(result) => log::debug!(
                "Trial {} (seed {}): {} spikes for {} stimuli",
                task.trial_index,
                task.seed,
                result.spike_count,
                result.num_stimuli
            ),
            Err(e) => log::debug!("Trial {} (seed {}) failed: {}", task.trial_index, task.seed, e),
        }

        TrialOutcome {
            trial_index: task.trial_index,
            seed: task.seed,
            result,
            record,
        }
    }

    /// Gather the outcomes (sorted by trial index) into a distribution according to the failure
    /// policy.
    fn reduce(
        &self,
        configuration: &ClusterConfiguration,
        stim_amplitude: f64,
        outcomes: Vec<TrialOutcome>,
    ) -> Result<FiringProbabilityDistribution, CableError> {
        let mut distribution = FiringProbabilityDistribution {
            configuration: configuration.name.clone(),
            stim_amplitude,
            probabilities: Vec::with_capacity(outcomes.len()),
            trial_indices: Vec::with_capacity(outcomes.len()),
            seeds: Vec::with_capacity(outcomes.len()),
            failures: vec![],
            representative: None,
        };

        for outcome in outcomes {
            match outcome.result {
                Ok(result) => {
                    distribution.probabilities.push(result.firing_probability);
                    distribution.trial_indices.push(outcome.trial_index);
                    distribution.seeds.push(outcome.seed);
                    if outcome.record.is_some() {
                        distribution.representative = outcome.record;
                    }
                }
                Err(e) => {
                    // Configuration errors are never excluded: every trial would hit them.
                    if e.is_configuration()
                        || self.settings.failure_policy == FailurePolicy::AbortAll
                    {
                        log::error!(
                            "Trial {} (seed {}) of '{}' failed: {}",
                            outcome.trial_index,
                            outcome.seed,
                            configuration.name,
                            e
                        );
                        return Err(e);
                    }
                    log::warn!(
                        "Trial {} (seed {}) of '{}' excluded: {}",
                        outcome.trial_index,
                        outcome.seed,
                        configuration.name,
                        e
                    );
                    distribution.failures.push(TrialFailure {
                        trial_index: outcome.trial_index,
                        seed: outcome.seed,
                        message: e.to_string(),
                    });
                }
            }
        }

        Ok(distribution)
    }
}
