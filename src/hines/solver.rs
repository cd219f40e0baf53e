//! Implicit integration of the cable equation on an unbranched chain of segments.
//!
//! Each step first advances the gates at the current potential (exponential update), then solves
//! the backward-Euler linear system for the new potentials. The system is tridiagonal and solved in
//! linear time with the Thomas algorithm. Injected currents are averaged over each step, so that a
//! pulse shorter than the step still delivers its whole charge.
//!
//! Units: mV, ms, S/cm² for conductance densities, cm² for areas, nA for injected currents.
//! Membrane currents are computed in mA and capacitances in mF, so that conductances are in S.
use itertools::Itertools;

use super::kinetics::Gating;
use super::{E_K, E_LEAK, E_NA};
use crate::core::cable::{Morphology, Section};
use crate::core::solver::{CellContext, MembraneSolver, PointCurrent, RunParams, VoltageTrace};
use crate::error::CableError;

/// Conversion factor from nA to mA.
const NA_TO_MA: f64 = 1e-6;

/// The reference solver: stateless, so it can be shared by any number of concurrent trials.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct CableSolver;

/// Electrical geometry of the segment chain.
#[derive(Debug, PartialEq, Clone)]
struct Geometry {
    /// Membrane area of each segment (cm²).
    area: Vec<f64>,
    /// Membrane capacitance of each segment (mF).
    capacitance: Vec<f64>,
    /// Axial conductance between segments i and i + 1 (S).
    axial: Vec<f64>,
}

impl Geometry {
    fn build(morphology: &Morphology) -> Self {
        let sections: Vec<&Section> = std::iter::once(&morphology.node)
            .chain(morphology.internode.as_ref().map(|internode| &internode.section))
            .collect();

        let mut area = Vec::new();
        let mut capacitance = Vec::new();
        let mut half_resistance = Vec::new();
        for section in sections {
            for _ in 0..section.num_segments {
                area.push(section.segment_area());
                capacitance.push(section.capacitance * section.segment_area() * 1e-3);
                half_resistance.push(section.half_segment_resistance());
            }
        }

        let axial = half_resistance
            .iter()
            .tuple_windows()
            .map(|(left, right)| 1.0 / (left + right))
            .collect();

        Geometry {
            area,
            capacitance,
            axial,
        }
    }
}

/// Solve the symmetric tridiagonal system with the given diagonal and off-diagonal `-coupling`.
/// The diagonal is overwritten and the right-hand side is replaced by the solution.
fn solve_tridiagonal(
    coupling: &[f64],
    diag: &mut [f64],
    rhs: &mut [f64],
) -> Result<(), CableError> {
    let n = diag.len();
    for i in 1..n {
        let w = -coupling[i - 1] / diag[i - 1];
        diag[i] += w * coupling[i - 1];
        rhs[i] -= w * rhs[i - 1];
    }

    if let Some(i) = diag.iter().position(|d| !(d.is_finite() && *d != 0.0)) {
        return Err(CableError::SimulationError(format!(
            "Singular cable system: pivot {} in segment {}",
            diag[i], i
        )));
    }

    rhs[n - 1] /= diag[n - 1];
    for i in (0..n - 1).rev() {
        rhs[i] = (rhs[i] + coupling[i] * rhs[i + 1]) / diag[i];
    }
    Ok(())
}

impl CableSolver {
    fn check(
        cell: &CellContext,
        currents: &[PointCurrent],
        params: &RunParams,
    ) -> Result<(), CableError> {
        params.validate()?;
        let num_segments = cell.num_segments();
        if params.record_segment >= num_segments {
            return Err(CableError::ConfigurationError(format!(
                "Invalid record segment: {} (the cell has {} segments)",
                params.record_segment, num_segments
            )));
        }
        if let Some(current) = currents.iter().find(|c| c.segment >= num_segments) {
            return Err(CableError::ConfigurationError(format!(
                "Invalid stimulus segment: {} (the cell has {} segments)",
                current.segment, num_segments
            )));
        }
        if let Some(current) = currents
            .iter()
            .find(|c| !(c.start.is_finite() && c.duration.is_finite() && c.amplitude.is_finite()))
        {
            return Err(CableError::ConfigurationError(format!(
                "Invalid stimulus: {:?} (must be finite)",
                current
            )));
        }
        Ok(())
    }
}

impl MembraneSolver for CableSolver {
    fn simulate(
        &self,
        cell: &CellContext,
        currents: &[PointCurrent],
        params: &RunParams,
    ) -> Result<VoltageTrace, CableError> {
        CableSolver::check(cell, currents, params)?;

        let geometry = Geometry::build(cell.morphology());
        let channels = cell.channels();
        let (dt, celsius) = (params.dt, params.celsius);
        let n = cell.num_segments();
        let num_steps = params.num_steps();

        let mut v = vec![params.v_init; n];
        let mut sodium = vec![channels.sodium.steady_state(params.v_init, celsius); n];
        let mut potassium = vec![channels.potassium.steady_state(params.v_init, celsius); n];

        let mut diag = vec![0.0; n];
        let mut samples = Vec::with_capacity(num_steps + 1);
        samples.push(v[params.record_segment]);

        for step in 0..num_steps {
            let (t0, t1) = (step as f64 * dt, (step + 1) as f64 * dt);

            for i in 0..n {
                channels.sodium.advance(&mut sodium[i], v[i], celsius, dt);
                channels.potassium.advance(&mut potassium[i], v[i], celsius, dt);

                let g_na = cell.gna()[i] * channels.sodium.open_fraction(&sodium[i]);
                let g_k = cell.gk()[i] * channels.potassium.open_fraction(&potassium[i]);
                let g_leak = cell.gl()[i];
                let c_dt = geometry.capacitance[i] / dt;

                diag[i] = c_dt + geometry.area[i] * (g_na + g_k + g_leak);
                // v becomes the right-hand side, then the solution
                v[i] = c_dt * v[i] + geometry.area[i] * (g_na * E_NA + g_k * E_K + g_leak * E_LEAK);
            }
            for (i, g) in geometry.axial.iter().enumerate() {
                diag[i] += g;
                diag[i + 1] += g;
            }
            for current in currents {
                v[current.segment] += current.mean_current(t0, t1) * NA_TO_MA;
            }

            solve_tridiagonal(&geometry.axial, &mut diag, &mut v)?;

            if let Some(i) = v.iter().position(|vi| !vi.is_finite()) {
                return Err(CableError::SimulationError(format!(
                    "Non-finite membrane potential {} in segment {} at t={} ms",
                    v[i],
                    i,
                    (step + 1) as f64 * dt
                )));
            }
            samples.push(v[params.record_segment]);
        }

        log::trace!(
            "Integrated {} segments over {} steps ({:?})",
            n,
            num_steps,
            channels
        );

        Ok(VoltageTrace { dt, samples })
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::core::cable::{Internode, Location};
    use crate::core::cluster::SpeciesProfiles;
    use crate::core::profile::ConductanceProfile;
    use crate::core::solver::{ChannelModels, PotassiumKinetics, SodiumKinetics};
    use crate::core::trial::detect_spikes;

    fn node() -> Section {
        Section {
            length: 10.0,
            diameter: 10.0,
            num_segments: 5,
            ..Section::default()
        }
    }

    fn profiles(gna: f64, gk: f64, gl: f64) -> SpeciesProfiles {
        let domain = node().domain().unwrap();
        SpeciesProfiles {
            sodium: ConductanceProfile::uniform(&domain, gna).unwrap(),
            potassium: ConductanceProfile::uniform(&domain, gk).unwrap(),
            leak: ConductanceProfile::uniform(&domain, gl).unwrap(),
        }
    }

    fn hh_cell(morphology: &Morphology, channels: ChannelModels) -> CellContext {
        CellContext::build(morphology, channels, &profiles(0.12, 0.036, 3e-4)).unwrap()
    }

    fn params(stop_time: f64, record_segment: usize) -> RunParams {
        RunParams {
            dt: 0.025,
            celsius: 6.3,
            v_init: -65.0,
            stop_time,
            record_segment,
        }
    }

    fn pulse(segment: usize, amplitude: f64) -> PointCurrent {
        PointCurrent {
            segment,
            start: 5.0,
            duration: 0.5,
            amplitude,
        }
    }

    #[test]
    fn test_solve_tridiagonal() {
        // [2 -1 0; -1 2 -1; 0 -1 2] x = [1 0 1] => x = [1 1 1]
        let mut diag = vec![2.0, 2.0, 2.0];
        let mut rhs = vec![1.0, 0.0, 1.0];
        solve_tridiagonal(&[1.0, 1.0], &mut diag, &mut rhs).unwrap();
        for x in rhs {
            assert_relative_eq!(x, 1.0, epsilon = 1e-12);
        }

        let mut diag = vec![4.0];
        let mut rhs = vec![2.0];
        solve_tridiagonal(&[], &mut diag, &mut rhs).unwrap();
        assert_relative_eq!(rhs[0], 0.5);

        let mut diag = vec![0.0];
        let mut rhs = vec![2.0];
        assert!(matches!(
            solve_tridiagonal(&[], &mut diag, &mut rhs),
            Err(CableError::SimulationError(_))
        ));
    }

    #[test]
    fn test_geometry() {
        let morphology = Morphology::with_internode(
            node(),
            Internode {
                section: Section {
                    length: 100.0,
                    diameter: 1.0,
                    num_segments: 2,
                    ..Section::default()
                },
                leak_conductance: 1e-6,
            },
        );
        let geometry = Geometry::build(&morphology);
        assert_eq!(geometry.area.len(), 7);
        assert_eq!(geometry.axial.len(), 6);
        assert_relative_eq!(geometry.area[0], std::f64::consts::PI * 10.0 * 2.0 * 1e-8);
        assert_relative_eq!(geometry.capacitance[0], geometry.area[0] * 1e-3);
        assert_relative_eq!(
            geometry.axial[0],
            1.0 / (2.0 * node().half_segment_resistance())
        );
        assert!(geometry.axial[5] < geometry.axial[4]);
    }

    #[test]
    fn test_rest_is_stable() {
        let morphology = Morphology::node_only(node());
        let cell = hh_cell(&morphology, ChannelModels::default());
        let trace = CableSolver.simulate(&cell, &[], &params(50.0, 2)).unwrap();

        assert_eq!(trace.len(), 2001);
        assert_eq!(trace.samples[0], -65.0);
        assert!(trace.samples.iter().all(|v| (v + 65.0).abs() < 1.0));
    }

    fn passive_cell() -> (Morphology, CellContext) {
        let morphology = Morphology::node_only(Section {
            num_segments: 1,
            ..node()
        });
        let domain = morphology.node.domain().unwrap();
        let profiles = SpeciesProfiles {
            sodium: ConductanceProfile::uniform(&domain, 0.0).unwrap(),
            potassium: ConductanceProfile::uniform(&domain, 0.0).unwrap(),
            leak: ConductanceProfile::uniform(&domain, 3e-4).unwrap(),
        };
        let cell = CellContext::build(&morphology, ChannelModels::default(), &profiles).unwrap();
        (morphology, cell)
    }

    #[test]
    fn test_passive_steady_state() {
        let (morphology, cell) = passive_cell();

        // relaxes to the leak reversal
        let trace = CableSolver.simulate(&cell, &[], &params(100.0, 0)).unwrap();
        assert_relative_eq!(*trace.samples.last().unwrap(), E_LEAK, epsilon = 1e-6);

        // V = E + I / (g A) under a constant current
        let current = PointCurrent {
            segment: 0,
            start: 0.0,
            duration: 1000.0,
            amplitude: 0.01,
        };
        let trace = CableSolver
            .simulate(
                &cell,
                &[current],
                &RunParams {
                    v_init: E_LEAK,
                    ..params(100.0, 0)
                },
            )
            .unwrap();
        let expected = E_LEAK + 0.01 * NA_TO_MA / (3e-4 * morphology.node.segment_area());
        assert_relative_eq!(*trace.samples.last().unwrap(), expected, epsilon = 1e-6);
    }

    #[test]
    fn test_suprathreshold_pulse() {
        let morphology = Morphology::node_only(node());
        let cell = hh_cell(&morphology, ChannelModels::default());
        let trace = CableSolver
            .simulate(&cell, &[pulse(2, 1.0)], &params(30.0, 2))
            .unwrap();
        assert_eq!(detect_spikes(&trace.samples, 20.0).len(), 1);
        assert!(trace.samples[..200].iter().all(|v| *v < -60.0));
    }

    #[test]
    fn test_pulse_shorter_than_step() {
        let (_, cell) = passive_cell();
        let within_step = PointCurrent {
            segment: 0,
            start: 5.005,
            duration: 0.01,
            amplitude: 2.5,
        };
        let full_step = PointCurrent {
            segment: 0,
            start: 5.0,
            duration: 0.025,
            amplitude: 1.0,
        };

        // the same charge lands in the same step
        let short = CableSolver.simulate(&cell, &[within_step], &params(20.0, 0)).unwrap();
        let long = CableSolver.simulate(&cell, &[full_step], &params(20.0, 0)).unwrap();
        assert!(short.samples[201] > short.samples[200] + 1.0);
        for (a, b) in short.samples.iter().zip(long.samples.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-9);
        }

        let morphology = Morphology::node_only(node());
        let cell = hh_cell(&morphology, ChannelModels::default());
        let brief = PointCurrent {
            segment: 2,
            start: 5.015,
            duration: 0.008,
            amplitude: 100.0,
        };
        let trace = CableSolver.simulate(&cell, &[brief], &params(30.0, 2)).unwrap();
        assert!(!detect_spikes(&trace.samples, 20.0).is_empty());
    }

    #[test]
    fn test_subthreshold_pulse() {
        let morphology = Morphology::node_only(node());
        let cell = hh_cell(&morphology, ChannelModels::default());
        let trace = CableSolver
            .simulate(&cell, &[pulse(2, 0.005)], &params(30.0, 2))
            .unwrap();
        assert!(detect_spikes(&trace.samples, 20.0).is_empty());
        let peak = trace.samples.iter().cloned().fold(f64::MIN, f64::max);
        assert!(peak > -65.0 && peak < -55.0);
    }

    #[test]
    fn test_internode_attenuates() {
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
        let cell = hh_cell(&morphology, ChannelModels::default());
        let far_end = morphology.segment_index(&Location::internode(0.99)).unwrap();

        let at_node = CableSolver
            .simulate(&cell, &[pulse(2, 1.0)], &params(30.0, 2))
            .unwrap();
        let at_internode = CableSolver
            .simulate(&cell, &[pulse(2, 1.0)], &params(30.0, far_end))
            .unwrap();

        assert!(!detect_spikes(&at_node.samples, 20.0).is_empty());
        let node_peak = at_node.samples.iter().cloned().fold(f64::MIN, f64::max);
        let internode_peak = at_internode.samples.iter().cloned().fold(f64::MIN, f64::max);
        assert!(internode_peak < node_peak);
        assert!(internode_peak > -65.0);
    }

    #[test]
    fn test_alternative_kinetics() {
        let morphology = Morphology::node_only(node());
        let channels = ChannelModels {
            sodium: SodiumKinetics::FastSodium,
            potassium: PotassiumKinetics::SlowPotassium,
        };
        let cell = hh_cell(&morphology, channels);

        let quiet = CableSolver.simulate(&cell, &[], &params(50.0, 2)).unwrap();
        assert!(detect_spikes(&quiet.samples, 20.0).is_empty());

        let driven = CableSolver
            .simulate(&cell, &[pulse(2, 1.0)], &params(30.0, 2))
            .unwrap();
        assert!(!detect_spikes(&driven.samples, 20.0).is_empty());
        assert_ne!(quiet.samples[..800], driven.samples[..800]);
    }

    #[test]
    fn test_invalid_inputs() {
        let morphology = Morphology::node_only(node());
        let cell = hh_cell(&morphology, ChannelModels::default());

        let result = CableSolver.simulate(&cell, &[], &params(10.0, 5));
        assert!(result.unwrap_err().is_configuration());

        let result = CableSolver.simulate(&cell, &[pulse(7, 1.0)], &params(10.0, 0));
        assert!(result.unwrap_err().is_configuration());

        let result = CableSolver.simulate(&cell, &[pulse(0, f64::NAN)], &params(10.0, 0));
        assert!(result.unwrap_err().is_configuration());

        let trace = CableSolver.simulate(&cell, &[], &params(0.0, 0)).unwrap();
        assert_eq!(trace.samples, vec![-65.0]);
    }
}
