//! Channel clusters and the experimental configurations built from them.
use rand::Rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

use crate::core::cable::CableDomain;
use crate::core::profile::ConductanceProfile;
use crate::core::SIGMA_FACTOR;
use crate::error::CableError;

/// A localized group of ion channels, modeled as a Gaussian bump of conductance density.
#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct ChannelCluster {
    /// Center of the cluster along the cable (µm).
    position: f64,
    /// Peak conductance density (S/cm²), possibly zero or negative.
    height: f64,
    /// Nominal width of the cluster (µm), spanning `SIGMA_FACTOR` standard deviations.
    width: f64,
}

impl ChannelCluster {
    /// Create a new cluster.
    /// Returns an error if the width is not positive or if any value is not finite.
    pub fn build(position: f64, height: f64, width: f64) -> Result<Self, CableError> {
        if !position.is_finite() {
            return Err(CableError::ConfigurationError(format!(
                "Invalid cluster position: {} (must be finite)",
                position
            )));
        }
        if !height.is_finite() {
            return Err(CableError::ConfigurationError(format!(
                "Invalid cluster height: {} (must be finite)",
                height
            )));
        }
        if !(width.is_finite() && width > 0.0) {
            return Err(CableError::ConfigurationError(format!(
                "Invalid cluster width: {} (must be positive and finite)",
                width
            )));
        }
        Ok(ChannelCluster {
            position,
            height,
            width,
        })
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    /// Standard deviation of the Gaussian bump.
    pub fn sigma(&self) -> f64 {
        self.width / SIGMA_FACTOR
    }

    /// Conductance density contributed by the cluster at position `x`.
    pub fn density_at(&self, x: f64) -> f64 {
        let z = (x - self.position) / self.sigma();
        self.height * (-0.5 * z * z).exp()
    }
}

impl<'de> Deserialize<'de> for ChannelCluster {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct ChannelClusterData {
            position: f64,
            height: f64,
            width: f64,
        }

        let data = ChannelClusterData::deserialize(deserializer)?;
        ChannelCluster::build(data.position, data.height, data.width)
            .map_err(serde::de::Error::custom)
    }
}

/// The channel species a conductance profile is built for.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelSpecies {
    Sodium,
    Potassium,
    Leak,
}

impl std::fmt::Display for ChannelSpecies {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ChannelSpecies::Sodium => write!(f, "sodium"),
            ChannelSpecies::Potassium => write!(f, "potassium"),
            ChannelSpecies::Leak => write!(f, "leak"),
        }
    }
}

/// How the channels of one species are distributed along the node.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ChannelDistribution {
    /// The same conductance density on every segment.
    Uniform { conductance: f64 },
    /// A superposition of Gaussian clusters.
    Clustered {
        /// Declared number of clusters, checked against the actual list when present.
        #[serde(default)]
        num_clusters: Option<usize>,
        clusters: Vec<ChannelCluster>,
        #[serde(default)]
        normalize: bool,
        #[serde(default)]
        target_conductance: f64,
    },
}

impl ChannelDistribution {
    /// A distribution made of the given clusters.
    pub fn clustered(
        clusters: Vec<ChannelCluster>,
        normalize: bool,
        target_conductance: f64,
    ) -> Self {
        ChannelDistribution::Clustered {
            num_clusters: Some(clusters.len()),
            clusters,
            normalize,
            target_conductance,
        }
    }

    /// `num_clusters` clusters of the given width, evenly spaced along the domain
    /// (cluster k sits at the center of the k-th of `num_clusters` equal sub-intervals).
    /// The profile is normalized to `target_conductance`.
    pub fn evenly_spaced(
        num_clusters: usize,
        width: f64,
        domain: &CableDomain,
        target_conductance: f64,
    ) -> Result<Self, CableError> {
        let clusters = (0..num_clusters)
            .map(|k| {
                let position = (k as f64 + 0.5) / num_clusters as f64 * domain.length();
                ChannelCluster::build(position, 1.0, width)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::clustered(clusters, true, target_conductance))
    }

    /// `num_clusters` clusters of the given width at uniformly random positions along the domain.
    /// The profile is normalized to `target_conductance`.
    pub fn rand_positions<R: Rng>(
        num_clusters: usize,
        width: f64,
        domain: &CableDomain,
        target_conductance: f64,
        rng: &mut R,
    ) -> Result<Self, CableError> {
        let positions = Uniform::new_inclusive(0.0, domain.length());
        let clusters = (0..num_clusters)
            .map(|_| ChannelCluster::build(positions.sample(rng), 1.0, width))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::clustered(clusters, true, target_conductance))
    }

    /// Returns the number of clusters (zero for a uniform distribution).
    pub fn num_clusters(&self) -> usize {
        match self {
            ChannelDistribution::Uniform { .. } => 0,
            ChannelDistribution::Clustered { clusters, .. } => clusters.len(),
        }
    }

    /// Check the distribution against its declared cluster count.
    pub fn validate(&self, species: ChannelSpecies) -> Result<(), CableError> {
        if let ChannelDistribution::Clustered {
            num_clusters: Some(num_clusters),
            clusters,
            ..
        } = self
        {
            if *num_clusters != clusters.len() {
                return Err(CableError::ConfigurationError(format!(
                    "Invalid {} num_clusters: {} declared but {} clusters provided",
                    species,
                    num_clusters,
                    clusters.len()
                )));
            }
        }
        Ok(())
    }

    /// Build the conductance profile of the distribution over the given domain.
    pub fn profile(
        &self,
        species: ChannelSpecies,
        domain: &CableDomain,
    ) -> Result<ConductanceProfile, CableError> {
        self.validate(species)?;
        match self {
            ChannelDistribution::Uniform { conductance } => {
                ConductanceProfile::uniform(domain, *conductance)
            }
            ChannelDistribution::Clustered {
                clusters,
                normalize,
                target_conductance,
                ..
            } => ConductanceProfile::build(clusters, domain, *normalize, *target_conductance),
        }
        .map_err(|e| match e {
            CableError::ConfigurationError(msg) => {
                CableError::ConfigurationError(format!("{} profile: {}", species, msg))
            }
            e => e,
        })
    }
}

/// One profile per channel species, covering the node segments.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct SpeciesProfiles {
    pub sodium: ConductanceProfile,
    pub potassium: ConductanceProfile,
    pub leak: ConductanceProfile,
}

impl SpeciesProfiles {
    pub fn get(&self, species: ChannelSpecies) -> &ConductanceProfile {
        match species {
            ChannelSpecies::Sodium => &self.sodium,
            ChannelSpecies::Potassium => &self.potassium,
            ChannelSpecies::Leak => &self.leak,
        }
    }
}

/// A named experimental condition, e.g., "5 Na clusters, 20 K clusters".
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ClusterConfiguration {
    pub name: String,
    pub sodium: ChannelDistribution,
    pub potassium: ChannelDistribution,
    pub leak: ChannelDistribution,
}

impl ClusterConfiguration {
    pub fn new(
        name: &str,
        sodium: ChannelDistribution,
        potassium: ChannelDistribution,
        leak: ChannelDistribution,
    ) -> Self {
        ClusterConfiguration {
            name: name.to_string(),
            sodium,
            potassium,
            leak,
        }
    }

    /// Build the profile of every species over the given domain.
    /// Each species is built independently, with its own clusters, normalization flag and target.
    pub fn build_profiles(&self, domain: &CableDomain) -> Result<SpeciesProfiles, CableError> {
        Ok(SpeciesProfiles {
            sodium: self.sodium.profile(ChannelSpecies::Sodium, domain)?,
            potassium: self.potassium.profile(ChannelSpecies::Potassium, domain)?,
            leak: self.leak.profile(ChannelSpecies::Leak, domain)?,
        })
    }
}
