//! Experiment files: the JSON configuration of a firing-probability experiment and its report.
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::core::cable::{Morphology, Section};
use crate::core::cluster::{ChannelDistribution, ClusterConfiguration};
use crate::core::estimator::{EstimatorSettings, FiringProbabilityDistribution, MonteCarloEstimator};
use crate::core::solver::{ChannelModels, MembraneSolver};
use crate::core::stats::{histogram, Summary};
use crate::core::stimulus::StimulusProtocol;
use crate::core::trial::{TrialRunner, TrialSettings};
use crate::error::CableError;

/// Number of bins of the firing-probability histograms in a report.
pub const NUM_HISTOGRAM_BINS: usize = 10;

/// Everything needed to run an experiment: every configuration is estimated at every amplitude.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    #[serde(default)]
    pub morphology: Morphology,
    #[serde(default)]
    pub channels: ChannelModels,
    #[serde(default)]
    pub trial: TrialSettings,
    #[serde(default)]
    pub protocol: StimulusProtocol,
    #[serde(default)]
    pub estimator: EstimatorSettings,
    pub configurations: Vec<ClusterConfiguration>,
    /// Mean stimulus amplitudes (nA).
    pub stim_amplitudes: Vec<f64>,
}

impl Default for ExperimentConfig {
    /// A Hodgkin-Huxley node with uniform channel densities.
    fn default() -> Self {
        ExperimentConfig {
            morphology: Morphology::node_only(Section {
                length: 10.0,
                diameter: 10.0,
                num_segments: 51,
                ..Section::default()
            }),
            channels: ChannelModels::default(),
            trial: TrialSettings::default(),
            protocol: StimulusProtocol::default(),
            estimator: EstimatorSettings::default(),
            configurations: vec![ClusterConfiguration::new(
                "uniform",
                ChannelDistribution::Uniform { conductance: 0.12 },
                ChannelDistribution::Uniform { conductance: 0.036 },
                ChannelDistribution::Uniform { conductance: 3e-4 },
            )],
            stim_amplitudes: vec![0.1],
        }
    }
}

impl ExperimentConfig {
    /// Check the parts of the experiment that are not checked by the estimator itself.
    pub fn validate(&self) -> Result<(), CableError> {
        self.estimator.validate()?;
        if self.configurations.is_empty() {
            return Err(CableError::ConfigurationError(
                "Invalid experiment: no configuration".to_string(),
            ));
        }
        if self.stim_amplitudes.is_empty() {
            return Err(CableError::ConfigurationError(
                "Invalid experiment: no stimulus amplitude".to_string(),
            ));
        }
        for (i, configuration) in self.configurations.iter().enumerate() {
            if self.configurations[..i]
                .iter()
                .any(|other| other.name == configuration.name)
            {
                return Err(CableError::ConfigurationError(format!(
                    "Invalid experiment: duplicate configuration name '{}'",
                    configuration.name
                )));
            }
        }
        Ok(())
    }

    /// Returns the hexadecimal SHA-256 digest of the configuration, used to name its report.
    pub fn hash(&self) -> Result<String, CableError> {
        let json = serde_json::to_string(self).map_err(|e| CableError::IOError(e.to_string()))?;
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Save the configuration to a file.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), CableError> {
        save_json(self, path)
    }

    /// Load a configuration from a file.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, CableError> {
        let file = File::open(path).map_err(|e| CableError::IOError(e.to_string()))?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).map_err(|e| CableError::IOError(e.to_string()))
    }
}

fn save_json<T: Serialize, P: AsRef<Path>>(value: &T, path: P) -> Result<(), CableError> {
    if let Some(parent) = path.as_ref().parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| CableError::IOError(e.to_string()))?;
        }
    }
    let file = File::create(path).map_err(|e| CableError::IOError(e.to_string()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .map_err(|e| CableError::IOError(e.to_string()))?;
    writer.flush().map_err(|e| CableError::IOError(e.to_string()))
}

/// A distribution with its summary statistics.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct DistributionReport {
    pub distribution: FiringProbabilityDistribution,
    /// `None` if no trial succeeded.
    pub summary: Option<Summary>,
    /// Counts over [`NUM_HISTOGRAM_BINS`] equal bins of [0, 1].
    pub histogram: Vec<usize>,
}

impl DistributionReport {
    pub fn new(distribution: FiringProbabilityDistribution) -> Result<Self, CableError> {
        let histogram = histogram(&distribution.probabilities, NUM_HISTOGRAM_BINS)?;
        Ok(DistributionReport {
            summary: distribution.summary(),
            histogram,
            distribution,
        })
    }
}

/// All configurations compared at one stimulus amplitude.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct AmplitudeReport {
    pub stim_amplitude: f64,
    pub distributions: Vec<DistributionReport>,
}

/// The outcome of an experiment.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ExperimentReport {
    /// Digest of the configuration the report was produced from.
    pub config_hash: String,
    /// The base seed of every comparison.
    pub base_seed: u64,
    pub amplitudes: Vec<AmplitudeReport>,
}

impl ExperimentReport {
    /// Returns the report of a configuration at an amplitude, if any.
    pub fn get(&self, configuration: &str, stim_amplitude: f64) -> Option<&DistributionReport> {
        self.amplitudes
            .iter()
            .find(|amplitude| amplitude.stim_amplitude == stim_amplitude)?
            .distributions
            .iter()
            .find(|report| report.distribution.configuration == configuration)
    }

    /// Save the report to a file, creating the parent directories if needed.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), CableError> {
        save_json(self, path)
    }

    /// Load a report from a file.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, CableError> {
        let file = File::open(path).map_err(|e| CableError::IOError(e.to_string()))?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).map_err(|e| CableError::IOError(e.to_string()))
    }
}

/// Run the experiment with the given solver: at every amplitude, all configurations are compared
/// with paired seeds. Without a configured base seed, one is drawn for the whole experiment and
/// recorded in the report, whose hash is that of the configuration with the drawn seed.
pub fn run_experiment<S: MembraneSolver>(
    config: &ExperimentConfig,
    solver: S,
) -> Result<ExperimentReport, CableError> {
    config.validate()?;

    let base_seed = config.estimator.base_seed.unwrap_or_else(rand::random::<u64>);
    let settings = EstimatorSettings {
        base_seed: Some(base_seed),
        ..config.estimator.clone()
    };
    // the digest of the configuration that reproduces the report
    let config_hash = ExperimentConfig {
        estimator: settings.clone(),
        ..config.clone()
    }
    .hash()?;

    let runner = TrialRunner::build(
        solver,
        config.morphology.clone(),
        config.channels,
        config.trial.clone(),
    )?;
    let estimator = MonteCarloEstimator::new(runner, config.protocol.clone(), settings);

    log::info!(
        "Experiment {}: {} configurations, {} amplitudes, base seed {}",
        config_hash,
        config.configurations.len(),
        config.stim_amplitudes.len(),
        base_seed
    );

    let amplitudes = config
        .stim_amplitudes
        .iter()
        .map(|&stim_amplitude| -> Result<AmplitudeReport, CableError> {
            let distributions = estimator
                .compare(&config.configurations, stim_amplitude)?
                .into_iter()
                .map(DistributionReport::new)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(AmplitudeReport {
                stim_amplitude,
                distributions,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ExperimentReport {
        config_hash,
        base_seed,
        amplitudes,
    })
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::core::cluster::ChannelCluster;
    use crate::core::estimator::Execution;
    use crate::core::solver::{CellContext, PointCurrent, RunParams, VoltageTrace};

    /// Fires once per stimulus above 0.5 nA.
    #[derive(Debug)]
    struct ThresholdSolver;

    impl MembraneSolver for ThresholdSolver {
        fn simulate(
            &self,
            _cell: &CellContext,
            currents: &[PointCurrent],
            params: &RunParams,
        ) -> Result<VoltageTrace, CableError> {
            let mut samples = vec![-65.0; params.num_steps() + 1];
            for current in currents.iter().filter(|c| c.amplitude > 0.5) {
                let i = (current.start / params.dt).round() as usize + 1;
                if i < samples.len() {
                    samples[i] = 30.0;
                }
            }
            Ok(VoltageTrace {
                dt: params.dt,
                samples,
            })
        }
    }

    fn config() -> ExperimentConfig {
        let clustered = ChannelDistribution::clustered(
            vec![
                ChannelCluster::build(2.5, 1.0, 2.0).unwrap(),
                ChannelCluster::build(7.5, 1.0, 2.0).unwrap(),
            ],
            true,
            0.12,
        );
        let mut config = ExperimentConfig::default();
        config.configurations.push(ClusterConfiguration::new(
            "2 Na clusters",
            clustered,
            ChannelDistribution::Uniform { conductance: 0.036 },
            ChannelDistribution::Uniform { conductance: 3e-4 },
        ));
        config.protocol.total_time = 50.0;
        config.protocol.std_amplitude = 0.0;
        config.estimator.num_trials = 3;
        config.estimator.base_seed = Some(7);
        config.stim_amplitudes = vec![0.1, 1.0];
        config
    }

    #[test]
    fn test_save_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("experiment.json");

        let config = config();
        config.save_to(&path).unwrap();
        assert_eq!(ExperimentConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_load_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("minimal.json");
        std::fs::write(
            &path,
            r#"{
                "configurations": [{
                    "name": "uniform",
                    "sodium": {"kind": "uniform", "conductance": 0.12},
                    "potassium": {"kind": "uniform", "conductance": 0.036},
                    "leak": {"kind": "uniform", "conductance": 0.0003}
                }],
                "stim_amplitudes": [0.1, 0.2]
            }"#,
        )
        .unwrap();

        let config = ExperimentConfig::load_from(&path).unwrap();
        assert_eq!(config.trial, TrialSettings::default());
        assert_eq!(config.estimator, EstimatorSettings::default());
        assert_eq!(config.morphology, Morphology::default());
        assert_eq!(config.stim_amplitudes, vec![0.1, 0.2]);
    }

    #[test]
    fn test_load_errors() {
        let dir = tempdir().unwrap();
        let result = ExperimentConfig::load_from(dir.path().join("missing.json"));
        assert!(matches!(result, Err(CableError::IOError(_))));

        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{\"stim_amplitudes\": [0.1]}").unwrap();
        assert!(matches!(
            ExperimentConfig::load_from(&path),
            Err(CableError::IOError(_))
        ));
    }

    #[test]
    fn test_hash() {
        let config = config();
        let hash = config.hash().unwrap();
        assert_eq!(hash.len(), 64);
        assert_eq!(config.clone().hash().unwrap(), hash);

        let mut other = config;
        other.estimator.num_trials += 1;
        assert_ne!(other.hash().unwrap(), hash);
    }

    #[test]
    fn test_validate() {
        assert_eq!(ExperimentConfig::default().validate(), Ok(()));

        let mut config = config();
        config.configurations[1].name = "uniform".to_string();
        assert!(config.validate().unwrap_err().is_configuration());

        let mut config = ExperimentConfig::default();
        config.stim_amplitudes.clear();
        assert!(config.validate().unwrap_err().is_configuration());

        let mut config = ExperimentConfig::default();
        config.estimator.execution = Execution::Parallel { num_workers: 0 };
        assert!(config.validate().unwrap_err().is_configuration());

        let mut config = ExperimentConfig::default();
        config.configurations.clear();
        assert!(run_experiment(&config, ThresholdSolver)
            .unwrap_err()
            .is_configuration());
    }

    #[test]
    fn test_run_experiment() {
        let config = config();
        let report = run_experiment(&config, ThresholdSolver).unwrap();

        assert_eq!(report.config_hash, config.hash().unwrap());
        assert_eq!(report.base_seed, 7);
        assert_eq!(report.amplitudes.len(), 2);

        let low = report.get("uniform", 0.1).unwrap();
        assert_eq!(low.distribution.probabilities, vec![0.0; 3]);
        assert_eq!(low.histogram[0], 3);

        let high = report.get("2 Na clusters", 1.0).unwrap();
        assert_eq!(high.distribution.probabilities, vec![1.0; 3]);
        assert_eq!(high.distribution.seeds, vec![7, 8, 9]);
        assert_eq!(high.summary.unwrap().mean, 1.0);
        assert_eq!(high.histogram[NUM_HISTOGRAM_BINS - 1], 3);

        assert!(report.get("uniform", 0.5).is_none());
        assert!(report.get("unknown", 1.0).is_none());

        let dir = tempdir().unwrap();
        let path = dir.path().join("reports").join(format!("{}.json", report.config_hash));
        report.save_to(&path).unwrap();
        assert_eq!(ExperimentReport::load_from(&path).unwrap(), report);
    }

    #[test]
    fn test_run_experiment_draws_base_seed() {
        let mut config = config();
        config.estimator.base_seed = None;
        let report = run_experiment(&config, ThresholdSolver).unwrap();
        let seeds = &report.get("uniform", 1.0).unwrap().distribution.seeds;
        assert_eq!(seeds[0], report.base_seed);
        assert_eq!(
            seeds,
            &report.get("2 Na clusters", 1.0).unwrap().distribution.seeds
        );

        // the hash names the configuration with the drawn seed
        assert_ne!(report.config_hash, config.hash().unwrap());
        let mut effective = config.clone();
        effective.estimator.base_seed = Some(report.base_seed);
        assert_eq!(report.config_hash, effective.hash().unwrap());
        assert_eq!(run_experiment(&effective, ThresholdSolver).unwrap(), report);

        // two unseeded runs do not share a report name
        let again = run_experiment(&config, ThresholdSolver).unwrap();
        assert_ne!(again.base_seed, report.base_seed);
        assert_ne!(again.config_hash, report.config_hash);
    }
}
