use rusty_cable::core::cable::{Internode, Location, Morphology, Section};
use rusty_cable::core::cluster::{ChannelCluster, ChannelDistribution, ClusterConfiguration};
use rusty_cable::core::estimator::{EstimatorSettings, Execution, MonteCarloEstimator};
use rusty_cable::core::solver::ChannelModels;
use rusty_cable::core::stimulus::StimulusProtocol;
use rusty_cable::core::trial::{TrialRunner, TrialSettings};
use rusty_cable::hines::solver::CableSolver;

const SEED: u64 = 42;

fn node() -> Section {
    Section {
        length: 10.0,
        diameter: 10.0,
        num_segments: 11,
        ..Section::default()
    }
}

fn uniform() -> ClusterConfiguration {
    ClusterConfiguration::new(
        "uniform",
        ChannelDistribution::Uniform { conductance: 0.12 },
        ChannelDistribution::Uniform { conductance: 0.036 },
        ChannelDistribution::Uniform { conductance: 3e-4 },
    )
}

fn clustered() -> ClusterConfiguration {
    let domain = node().domain().unwrap();
    ClusterConfiguration::new(
        "3 Na clusters",
        ChannelDistribution::evenly_spaced(3, 2.0, &domain, 0.12).unwrap(),
        ChannelDistribution::Uniform { conductance: 0.036 },
        ChannelDistribution::Uniform { conductance: 3e-4 },
    )
}

fn protocol(std_amplitude: f64) -> StimulusProtocol {
    StimulusProtocol {
        std_amplitude,
        interstim: 20.0,
        total_time: 100.0,
        ..StimulusProtocol::default()
    }
}

fn estimator(
    morphology: Morphology,
    protocol: StimulusProtocol,
    settings: EstimatorSettings,
) -> MonteCarloEstimator<CableSolver> {
    let runner = TrialRunner::build(
        CableSolver,
        morphology,
        ChannelModels::default(),
        TrialSettings::default(),
    )
    .unwrap();
    MonteCarloEstimator::new(runner, protocol, settings)
}

#[test]
fn test_estimation_is_reproducible() {
    let settings = EstimatorSettings {
        num_trials: 12,
        base_seed: Some(SEED),
        ..EstimatorSettings::default()
    };
    let estimator = estimator(Morphology::node_only(node()), protocol(0.2), settings);

    let first = estimator.estimate(&clustered(), 0.4).unwrap();
    let second = estimator.estimate(&clustered(), 0.4).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 12);
    assert_eq!(first.trial_indices, (0..12).collect::<Vec<usize>>());
    assert_eq!(first.seeds, (SEED..SEED + 12).collect::<Vec<u64>>());
    assert!(first.probabilities.iter().all(|p| (0.0..=1.0).contains(p)));
}

#[test]
fn test_parallel_matches_sequential() {
    let sequential = EstimatorSettings {
        num_trials: 12,
        base_seed: Some(SEED),
        ..EstimatorSettings::default()
    };
    let parallel = EstimatorSettings {
        execution: Execution::Parallel { num_workers: 4 },
        ..sequential.clone()
    };

    let expected = estimator(Morphology::node_only(node()), protocol(0.2), sequential)
        .estimate(&uniform(), 0.4)
        .unwrap();
    let actual = estimator(Morphology::node_only(node()), protocol(0.2), parallel)
        .estimate(&uniform(), 0.4)
        .unwrap();
    assert_eq!(actual, expected);
}

#[test]
fn test_extreme_amplitudes() {
    let settings = EstimatorSettings {
        num_trials: 3,
        base_seed: Some(SEED),
        ..EstimatorSettings::default()
    };
    let estimator = estimator(Morphology::node_only(node()), protocol(0.0), settings);

    let distributions = estimator.sweep(&uniform(), &[0.0, 5.0]).unwrap();
    assert_eq!(distributions[0].probabilities, vec![0.0; 3]);
    assert_eq!(distributions[1].probabilities, vec![1.0; 3]);
    assert_eq!(distributions[1].stim_amplitude, 5.0);
}

#[test]
fn test_paired_comparison() {
    let settings = EstimatorSettings {
        num_trials: 6,
        base_seed: None,
        ..EstimatorSettings::default()
    };
    let estimator = estimator(Morphology::node_only(node()), protocol(0.2), settings);

    // the same geometry under two names must give the same outcomes
    let mut twin = uniform();
    twin.name = "twin".to_string();

    let distributions = estimator
        .compare(&[uniform(), twin, clustered()], 0.4)
        .unwrap();
    assert_eq!(distributions.len(), 3);
    assert_eq!(distributions[0].seeds, distributions[1].seeds);
    assert_eq!(distributions[0].seeds, distributions[2].seeds);
    assert_eq!(distributions[0].probabilities, distributions[1].probabilities);
    assert_eq!(distributions[1].configuration, "twin");
}

#[test]
fn test_invalid_configuration_fails_fast() {
    let settings = EstimatorSettings {
        num_trials: 1000,
        base_seed: Some(SEED),
        ..EstimatorSettings::default()
    };
    let estimator = estimator(Morphology::node_only(node()), protocol(0.2), settings);

    let outside = ClusterConfiguration::new(
        "outside",
        ChannelDistribution::clustered(
            vec![ChannelCluster::build(20.0, 1.0, 1.0).unwrap()],
            true,
            0.12,
        ),
        ChannelDistribution::Uniform { conductance: 0.036 },
        ChannelDistribution::Uniform { conductance: 3e-4 },
    );
    let error = estimator.compare(&[uniform(), outside], 0.4).unwrap_err();
    assert!(error.is_configuration());

    let empty = ClusterConfiguration::new(
        "empty",
        ChannelDistribution::clustered(vec![], true, 0.12),
        ChannelDistribution::Uniform { conductance: 0.036 },
        ChannelDistribution::Uniform { conductance: 3e-4 },
    );
    assert!(estimator.estimate(&empty, 0.4).unwrap_err().is_configuration());
}

#[test]
fn test_representative_trace_with_internode() {
    let morphology = Morphology::with_internode(
        node(),
        Internode {
            section: Section {
                length: 100.0,
                diameter: 1.0,
                num_segments: 10,
                ..Section::default()
            },
            leak_conductance: 1e-6,
        },
    );
    let runner = TrialRunner::build(
        CableSolver,
        morphology,
        ChannelModels::default(),
        TrialSettings {
            record_location: Location::node(1.0),
            ..TrialSettings::default()
        },
    )
    .unwrap();
    let settings = EstimatorSettings {
        num_trials: 2,
        base_seed: Some(SEED),
        capture_representative: true,
        ..EstimatorSettings::default()
    };
    let estimator = MonteCarloEstimator::new(runner, protocol(0.0), settings);

    let distribution = estimator.estimate(&uniform(), 5.0).unwrap();
    let record = distribution.representative.unwrap();
    assert_eq!(record.trace.len(), 4001);
    assert_eq!(record.stimulus_times, vec![5.0, 25.0, 45.0, 65.0, 85.0]);
    assert_eq!(record.result.firing_probability, distribution.probabilities[0]);
    assert!(record.spike_times.iter().all(|t| *t > 5.0));
}
