//! Synthesis of per-segment conductance profiles from channel clusters.
use serde::{Deserialize, Serialize};

use crate::core::cable::CableDomain;
use crate::core::cluster::ChannelCluster;
use crate::error::CableError;

/// A conductance density (S/cm²) for every segment of a cable domain.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ConductanceProfile {
    values: Vec<f64>,
}

impl ConductanceProfile {
    /// Build the profile obtained by superposing a Gaussian bump for every cluster.
    ///
    /// Every segment center `x` receives `height * exp(-0.5 * ((x - position) / sigma)^2)` from
    /// every cluster, with `sigma = width / SIGMA_FACTOR`. Overlapping clusters add up.
    ///
    /// If `normalize` is set, the profile is rescaled so that its spatial mean is exactly
    /// `target_conductance`. A profile with zero mean (e.g., no cluster at all) cannot be
    /// normalized.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use approx::assert_relative_eq;
    /// use rusty_cable::core::cable::CableDomain;
    /// use rusty_cable::core::cluster::ChannelCluster;
    /// use rusty_cable::core::profile::ConductanceProfile;
    ///
    /// let domain = CableDomain::new(100, 10.0).unwrap();
    /// let clusters = vec![
    ///     ChannelCluster::build(2.5, 1.0, 1.0).unwrap(),
    ///     ChannelCluster::build(7.5, 0.5, 2.0).unwrap(),
    /// ];
    ///
    /// let profile = ConductanceProfile::build(&clusters, &domain, true, 0.3).unwrap();
    /// assert_relative_eq!(profile.mean(), 0.3, epsilon = 1e-12);
    /// ```
    pub fn build(
        clusters: &[ChannelCluster],
        domain: &CableDomain,
        normalize: bool,
        target_conductance: f64,
    ) -> Result<Self, CableError> {
        if let Some(cluster) = clusters
            .iter()
            .find(|cluster| !(0.0..=domain.length()).contains(&cluster.position()))
        {
            return Err(CableError::ConfigurationError(format!(
                "Invalid cluster position: {} (must be in [0, {}])",
                cluster.position(),
                domain.length()
            )));
        }

        let values: Vec<f64> = domain
            .segment_centers()
            .map(|x| {
                clusters
                    .iter()
                    .fold(0.0, |acc, cluster| acc + cluster.density_at(x))
            })
            .collect();
        let mut profile = ConductanceProfile { values };

        if normalize {
            profile.normalize(target_conductance)?;
        }

        log::trace!(
            "Conductance profile built from {} clusters over {} segments (mean {:.3e} S/cm2)",
            clusters.len(),
            domain.num_segments(),
            profile.mean()
        );

        Ok(profile)
    }

    /// A profile with the same conductance density on every segment.
    pub fn uniform(domain: &CableDomain, conductance: f64) -> Result<Self, CableError> {
        if !(conductance.is_finite() && conductance >= 0.0) {
            return Err(CableError::ConfigurationError(format!(
                "Invalid uniform conductance: {} (must be non-negative and finite)",
                conductance
            )));
        }
        Ok(ConductanceProfile {
            values: vec![conductance; domain.num_segments()],
        })
    }

    /// Rescale the profile so that its spatial mean equals `target_conductance`.
    fn normalize(&mut self, target_conductance: f64) -> Result<(), CableError> {
        if !(target_conductance.is_finite() && target_conductance >= 0.0) {
            return Err(CableError::ConfigurationError(format!(
                "Invalid target conductance: {} (must be non-negative and finite)",
                target_conductance
            )));
        }
        let mean = self.mean();
        if mean == 0.0 {
            return Err(CableError::ConfigurationError(
                "cannot normalize a zero-mean profile".to_string(),
            ));
        }
        let scale = target_conductance / mean;
        self.values.iter_mut().for_each(|value| *value *= scale);
        Ok(())
    }

    /// Returns the conductance densities, one per segment.
    pub fn values(&self) -> &[f64] {
        &self.values[..]
    }

    /// Returns the number of segments covered by the profile.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the arithmetic mean over all segments.
    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    /// Returns the largest conductance density of the profile.
    pub fn max(&self) -> f64 {
        self.values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }
}

impl From<ConductanceProfile> for Vec<f64> {
    fn from(profile: ConductanceProfile) -> Self {
        profile.values
    }
}
