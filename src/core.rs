//! Core module defining the building blocks of the firing-probability experiments.
//!
//! - [`cable`]: the discretized node and internode sections
//! - [`cluster`] and [`profile`]: Gaussian channel clusters and their conductance profiles
//! - [`stimulus`]: seeded stochastic stimulus trains
//! - [`solver`]: the interface to the membrane solver
//! - [`trial`]: one stimulus-response trial and spike detection
//! - [`estimator`]: Monte-Carlo estimation of firing-probability distributions
//! - [`stats`]: summaries of the estimated distributions
//!
//! # Examples
//!
//! ```
//! use rusty_cable::core::cable::CableDomain;
//! use rusty_cable::core::cluster::ChannelCluster;
//! use rusty_cable::core::profile::ConductanceProfile;
//!
//! let domain = CableDomain::new(101, 1.0).unwrap();
//! let clusters = vec![ChannelCluster::build(0.5, 1.0, 0.3).unwrap()];
//! let profile = ConductanceProfile::build(&clusters, &domain, false, 0.0).unwrap();
//!
//! // the profile peaks at the cluster center
//! assert_eq!(profile.max(), profile.values()[50]);
//! ```
pub mod cable;
pub mod cluster;
pub mod estimator;
pub mod profile;
pub mod solver;
pub mod stats;
pub mod stimulus;
pub mod trial;

/// Ratio between the width of a channel cluster and the standard deviation of its Gaussian density.
pub const SIGMA_FACTOR: f64 = 6.0;
/// The nominal membrane potential (mV) above which the node is considered to fire.
pub const SPIKE_THRESHOLD: f64 = 20.0;
