//! Cable geometry: the discretized 1-D domain and the cell morphology.
use serde::{Deserialize, Serialize};

use crate::error::CableError;

/// A 1-D domain of length `length` (µm) split into `num_segments` segments of equal length.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub struct CableDomain {
    num_segments: usize,
    length: f64,
}

impl CableDomain {
    /// Create a new cable domain.
    /// Returns an error if the number of segments is zero or if the length is not positive.
    pub fn new(num_segments: usize, length: f64) -> Result<Self, CableError> {
        if num_segments == 0 {
            return Err(CableError::ConfigurationError(
                "Invalid number of segments: 0 (must be positive)".to_string(),
            ));
        }
        if !(length.is_finite() && length > 0.0) {
            return Err(CableError::ConfigurationError(format!(
                "Invalid cable length: {} (must be positive and finite)",
                length
            )));
        }
        Ok(CableDomain {
            num_segments,
            length,
        })
    }

    /// Returns the number of segments.
    pub fn num_segments(&self) -> usize {
        self.num_segments
    }

    /// Returns the total length of the domain (µm).
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Returns the length of a single segment (µm).
    pub fn segment_length(&self) -> f64 {
        self.length / self.num_segments as f64
    }

    /// Returns the center of the i-th segment, i.e., `(i + 0.5) / N * L`.
    pub fn segment_center(&self, i: usize) -> f64 {
        (i as f64 + 0.5) / self.num_segments as f64 * self.length
    }

    /// An iterator over the segment centers, in order.
    pub fn segment_centers(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.num_segments).map(|i| self.segment_center(i))
    }

    /// Returns the index of the segment containing the normalized position `x` in [0, 1].
    /// The right end `x = 1` belongs to the last segment.
    pub fn segment_at(&self, x: f64) -> Result<usize, CableError> {
        if !(0.0..=1.0).contains(&x) {
            return Err(CableError::ConfigurationError(format!(
                "Invalid normalized position: {} (must be in [0, 1])",
                x
            )));
        }
        Ok(((x * self.num_segments as f64) as usize).min(self.num_segments - 1))
    }
}

/// An unbranched cylindrical section of membrane.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Section {
    /// Section length (µm).
    pub length: f64,
    /// Section diameter (µm).
    pub diameter: f64,
    /// Number of segments the section is split into.
    pub num_segments: usize,
    /// Axial resistivity (Ω·cm).
    pub axial_resistance: f64,
    /// Specific membrane capacitance (µF/cm²).
    pub capacitance: f64,
}

impl Section {
    /// Check that every dimension is positive and finite.
    pub fn validate(&self, name: &str) -> Result<(), CableError> {
        for (param, value) in [
            ("length", self.length),
            ("diameter", self.diameter),
            ("axial_resistance", self.axial_resistance),
            ("capacitance", self.capacitance),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(CableError::ConfigurationError(format!(
                    "Invalid {} {}: {} (must be positive and finite)",
                    name, param, value
                )));
            }
        }
        if self.num_segments == 0 {
            return Err(CableError::ConfigurationError(format!(
                "Invalid {} num_segments: 0 (must be positive)",
                name
            )));
        }
        Ok(())
    }

    /// The discretized domain spanned by the section.
    pub fn domain(&self) -> Result<CableDomain, CableError> {
        CableDomain::new(self.num_segments, self.length)
    }

    /// Lateral membrane area of one segment (cm²).
    pub fn segment_area(&self) -> f64 {
        let seg_length = self.length / self.num_segments as f64;
        std::f64::consts::PI * self.diameter * seg_length * 1e-8
    }

    /// Axial resistance (Ω) from the center of a segment to one of its ends.
    pub fn half_segment_resistance(&self) -> f64 {
        let half_length_cm = 0.5 * self.length / self.num_segments as f64 * 1e-4;
        let radius_cm = 0.5 * self.diameter * 1e-4;
        self.axial_resistance * half_length_cm / (std::f64::consts::PI * radius_cm * radius_cm)
    }
}

impl Default for Section {
    /// A node of Ranvier.
    fn default() -> Self {
        Section {
            length: 1.0,
            diameter: 1.0,
            num_segments: 1,
            axial_resistance: 100.0,
            capacitance: 1.0,
        }
    }
}

/// A passive (myelinated) section attached to the right end of the node.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Internode {
    pub section: Section,
    /// Uniform leak conductance density (S/cm²).
    pub leak_conductance: f64,
}

impl Internode {
    pub fn validate(&self) -> Result<(), CableError> {
        self.section.validate("internode")?;
        if !(self.leak_conductance.is_finite() && self.leak_conductance >= 0.0) {
            return Err(CableError::ConfigurationError(format!(
                "Invalid internode leak_conductance: {} (must be non-negative and finite)",
                self.leak_conductance
            )));
        }
        Ok(())
    }
}

/// The cell morphology: an excitable node, optionally followed by a passive internode.
#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
pub struct Morphology {
    pub node: Section,
    #[serde(default)]
    pub internode: Option<Internode>,
}

impl Morphology {
    /// A single-compartment model with the given node section.
    pub fn node_only(node: Section) -> Self {
        Morphology {
            node,
            internode: None,
        }
    }

    /// A two-compartment model with a node and a passive internode.
    pub fn with_internode(node: Section, internode: Internode) -> Self {
        Morphology {
            node,
            internode: Some(internode),
        }
    }

    pub fn validate(&self) -> Result<(), CableError> {
        self.node.validate("node")?;
        if let Some(internode) = &self.internode {
            internode.validate()?;
        }
        Ok(())
    }

    /// Total number of segments, node first then internode.
    pub fn num_segments(&self) -> usize {
        self.node.num_segments
            + self
                .internode
                .as_ref()
                .map_or(0, |internode| internode.section.num_segments)
    }

    /// Resolve a location into a global segment index (node segments come first).
    pub fn segment_index(&self, location: &Location) -> Result<usize, CableError> {
        match location.section {
            SectionKind::Node => self.node.domain()?.segment_at(location.x),
            SectionKind::Internode => match &self.internode {
                Some(internode) => Ok(self.node.num_segments
                    + internode.section.domain()?.segment_at(location.x)?),
                None => Err(CableError::ConfigurationError(
                    "Invalid location: the morphology has no internode".to_string(),
                )),
            },
        }
    }
}

/// The kind of section a location refers to.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    Node,
    Internode,
}

/// A point on the cell, given as a section and a normalized position in [0, 1] along it.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub struct Location {
    pub section: SectionKind,
    pub x: f64,
}

impl Location {
    pub fn node(x: f64) -> Self {
        Location {
            section: SectionKind::Node,
            x,
        }
    }

    pub fn internode(x: f64) -> Self {
        Location {
            section: SectionKind::Internode,
            x,
        }
    }
}
