//! This crate estimates how the spatial clustering of ion channels along a node of Ranvier shapes
//! its firing probability under stochastic stimulation.
//!
//! Channel densities are modeled as superpositions of Gaussian clusters ([`core::cluster`]) which
//! are turned into per-segment conductance profiles ([`core::profile`]). Every trial simulates the
//! node under a seeded train of current pulses ([`core::stimulus`]) with a membrane solver
//! ([`core::solver::MembraneSolver`], implemented by [`hines::solver::CableSolver`]) and counts the
//! evoked spikes ([`core::trial`]). Many independent trials make up a firing-probability
//! distribution ([`core::estimator`]).
//!
//! # Comparing Configurations
//!
//! ```rust
//! use rusty_cable::config::{run_experiment, ExperimentConfig};
//! use rusty_cable::core::cluster::{ChannelDistribution, ClusterConfiguration};
//! use rusty_cable::hines::solver::CableSolver;
//!
//! let mut config = ExperimentConfig::default();
//! let domain = config.morphology.node.domain().unwrap();
//! config.configurations.push(ClusterConfiguration::new(
//!     "5 Na clusters",
//!     ChannelDistribution::evenly_spaced(5, 1.0, &domain, 0.12).unwrap(),
//!     ChannelDistribution::Uniform { conductance: 0.036 },
//!     ChannelDistribution::Uniform { conductance: 3e-4 },
//! ));
//! config.protocol.total_time = 30.0;
//! config.estimator.num_trials = 2;
//! config.estimator.base_seed = Some(42);
//!
//! let report = run_experiment(&config, CableSolver).unwrap();
//! let uniform = report.get("uniform", 0.1).unwrap();
//! let clustered = report.get("5 Na clusters", 0.1).unwrap();
//!
//! // paired trials see the same stimulus trains
//! assert_eq!(uniform.distribution.seeds, clustered.distribution.seeds);
//! ```
pub mod config;
pub mod core;
pub mod error;
pub mod hines;
