//! Interface to the membrane solver integrating the cable equation.
//!
//! The solver itself is a collaborator: anything implementing [`MembraneSolver`] can be used to run
//! trials. The crate provides one implementation in [`crate::hines`].
use serde::{Deserialize, Serialize};

use crate::core::cable::{Location, Morphology};
use crate::core::cluster::SpeciesProfiles;
use crate::error::CableError;

/// Kinetics of the sodium-like current.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SodiumKinetics {
    /// Classical Hodgkin-Huxley m³h kinetics.
    #[default]
    HodgkinHuxley,
    /// Fast-activating sodium kinetics with a hyperpolarized activation range.
    FastSodium,
}

/// Kinetics of the potassium-like current.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PotassiumKinetics {
    /// Classical Hodgkin-Huxley n⁴ kinetics.
    #[default]
    HodgkinHuxley,
    /// Slow, non-inactivating potassium kinetics (M-type current).
    SlowPotassium,
}

/// The channel models inserted in the node, chosen once per cell construction.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ChannelModels {
    #[serde(default)]
    pub sodium: SodiumKinetics,
    #[serde(default)]
    pub potassium: PotassiumKinetics,
}

/// The state of one cell, owned by a single trial and discarded when the trial ends.
///
/// Segments are indexed globally: node segments first, then internode segments (if any).
#[derive(Debug, PartialEq, Clone)]
pub struct CellContext {
    morphology: Morphology,
    channels: ChannelModels,
    /// Sodium conductance density per segment (S/cm²).
    gna: Vec<f64>,
    /// Potassium conductance density per segment (S/cm²).
    gk: Vec<f64>,
    /// Leak conductance density per segment (S/cm²).
    gl: Vec<f64>,
}

impl CellContext {
    /// Build the cell from its morphology and the node conductance profiles.
    /// Internode segments (if any) only carry the internode leak.
    pub fn build(
        morphology: &Morphology,
        channels: ChannelModels,
        profiles: &SpeciesProfiles,
    ) -> Result<Self, CableError> {
        morphology.validate()?;

        let num_node_segments = morphology.node.num_segments;
        for (name, profile) in [
            ("sodium", &profiles.sodium),
            ("potassium", &profiles.potassium),
            ("leak", &profiles.leak),
        ] {
            if profile.len() != num_node_segments {
                return Err(CableError::ConfigurationError(format!(
                    "Invalid {} profile length: {} (the node has {} segments)",
                    name,
                    profile.len(),
                    num_node_segments
                )));
            }
        }

        let mut gna = profiles.sodium.values().to_vec();
        let mut gk = profiles.potassium.values().to_vec();
        let mut gl = profiles.leak.values().to_vec();

        if let Some(internode) = &morphology.internode {
            let num_internode_segments = internode.section.num_segments;
            gna.extend(std::iter::repeat(0.0).take(num_internode_segments));
            gk.extend(std::iter::repeat(0.0).take(num_internode_segments));
            gl.extend(std::iter::repeat(internode.leak_conductance).take(num_internode_segments));
        }

        Ok(CellContext {
            morphology: morphology.clone(),
            channels,
            gna,
            gk,
            gl,
        })
    }

    pub fn morphology(&self) -> &Morphology {
        &self.morphology
    }

    pub fn channels(&self) -> ChannelModels {
        self.channels
    }

    pub fn num_segments(&self) -> usize {
        self.gna.len()
    }

    pub fn gna(&self) -> &[f64] {
        &self.gna
    }

    pub fn gk(&self) -> &[f64] {
        &self.gk
    }

    pub fn gl(&self) -> &[f64] {
        &self.gl
    }

    /// Resolve a location on the cell into a global segment index.
    pub fn segment_index(&self, location: &Location) -> Result<usize, CableError> {
        self.morphology.segment_index(location)
    }
}

/// A current pulse injected into a segment.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub struct PointCurrent {
    pub segment: usize,
    /// Onset (ms).
    pub start: f64,
    /// Duration (ms).
    pub duration: f64,
    /// Amplitude (nA).
    pub amplitude: f64,
}

impl PointCurrent {
    /// Returns the mean injected current (nA) over `[t0, t1)`.
    ///
    /// The injected charge is conserved whatever the step: a pulse shorter than the step still
    /// delivers `amplitude * duration` in total.
    pub fn mean_current(&self, t0: f64, t1: f64) -> f64 {
        let overlap = (t1.min(self.start + self.duration) - t0.max(self.start)).max(0.0);
        if t1 > t0 {
            self.amplitude * overlap / (t1 - t0)
        } else {
            0.0
        }
    }
}

/// Maximum number of integration steps of a single run.
pub const MAX_STEPS: usize = 10_000_000;

/// Parameters of a single solver run.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct RunParams {
    /// Integration time step (ms).
    pub dt: f64,
    /// Temperature (°C).
    pub celsius: f64,
    /// Initial membrane potential (mV).
    pub v_init: f64,
    /// Stop time (ms).
    pub stop_time: f64,
    /// Segment where the membrane potential is recorded.
    pub record_segment: usize,
}

impl RunParams {
    pub fn validate(&self) -> Result<(), CableError> {
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(CableError::ConfigurationError(format!(
                "Invalid time step dt: {} (must be positive and finite)",
                self.dt
            )));
        }
        if !(self.stop_time.is_finite() && self.stop_time >= 0.0) {
            return Err(CableError::ConfigurationError(format!(
                "Invalid stop time: {} (must be non-negative and finite)",
                self.stop_time
            )));
        }
        if !self.celsius.is_finite() || !self.v_init.is_finite() {
            return Err(CableError::ConfigurationError(format!(
                "Invalid temperature or initial potential: {} °C, {} mV (must be finite)",
                self.celsius, self.v_init
            )));
        }
        if self.stop_time / self.dt > MAX_STEPS as f64 {
            return Err(CableError::ConfigurationError(format!(
                "Invalid run: {} ms at dt = {} ms exceeds {} steps",
                self.stop_time, self.dt, MAX_STEPS
            )));
        }
        Ok(())
    }

    /// Returns the number of integration steps from 0 to the stop time.
    pub fn num_steps(&self) -> usize {
        (self.stop_time / self.dt).round() as usize
    }
}

/// Membrane potential (mV) sampled every `dt` ms from t = 0.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct VoltageTrace {
    pub dt: f64,
    pub samples: Vec<f64>,
}

impl VoltageTrace {
    /// Returns the time of the i-th sample.
    pub fn time(&self, i: usize) -> f64 {
        i as f64 * self.dt
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Returns the index of the first non-finite sample, if any.
    pub fn first_non_finite(&self) -> Option<usize> {
        self.samples.iter().position(|v| !v.is_finite())
    }
}

/// A solver of the cable equation.
///
/// Implementations must be stateless across calls (all per-run state lives in the call),
/// so that a single solver can be shared by concurrent trials.
pub trait MembraneSolver: Sync {
    /// Integrate the membrane potential of the cell from t = 0 to `params.stop_time` with the
    /// given injected currents, and return the potential sampled at `params.record_segment`.
    fn simulate(
        &self,
        cell: &CellContext,
        currents: &[PointCurrent],
        params: &RunParams,
    ) -> Result<VoltageTrace, CableError>;
}

impl<S: MembraneSolver + ?Sized> MembraneSolver for &S {
    fn simulate(
        &self,
        cell: &CellContext,
        currents: &[PointCurrent],
        params: &RunParams,
    ) -> Result<VoltageTrace, CableError> {
        (**self).simulate(cell, currents, params)
    }
}
