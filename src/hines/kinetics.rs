//! Gating kinetics of the sodium-like and potassium-like currents.
//!
//! All rates are in 1/ms, potentials in mV and temperatures in °C. Gates are advanced with the
//! exponential (Rush-Larsen) update, exact for a fixed membrane potential over the time step.
use crate::core::solver::{PotassiumKinetics, SodiumKinetics};

/// Reference temperature of the Hodgkin-Huxley rates.
const HH_CELSIUS: f64 = 6.3;
/// Temperature coefficient of the Hodgkin-Huxley rates.
const HH_Q10: f64 = 3.0;
/// Reference temperature of the fast-sodium rates.
const FAST_NA_CELSIUS: f64 = 23.0;
/// Temperature coefficient of the fast-sodium rates.
const FAST_NA_Q10: f64 = 2.3;
/// Reference temperature of the slow-potassium rates.
const SLOW_K_CELSIUS: f64 = 36.0;
/// Temperature coefficient of the slow-potassium rates.
const SLOW_K_Q10: f64 = 3.0;

/// Returns the rate scaling factor at `celsius` for rates measured at `reference`
/// with the given Q10.
pub fn temperature_factor(celsius: f64, reference: f64, q10: f64) -> f64 {
    q10.powf((celsius - reference) / 10.0)
}

/// `x / (exp(x / y) - 1)`, continuous at `x = 0`.
fn vtrap(x: f64, y: f64) -> f64 {
    if (x / y).abs() < 1e-6 {
        y * (1.0 - x / y / 2.0)
    } else {
        x / ((x / y).exp() - 1.0)
    }
}

/// Steady state and time constant (ms) of a gating variable at a given potential.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct GateRates {
    pub inf: f64,
    pub tau: f64,
}

impl GateRates {
    /// Rates of a gate with opening rate `alpha` and closing rate `beta`, sped up by `factor`.
    pub fn from_alpha_beta(alpha: f64, beta: f64, factor: f64) -> Self {
        GateRates {
            inf: alpha / (alpha + beta),
            tau: 1.0 / (factor * (alpha + beta)),
        }
    }

    /// Rates of a gate with Boltzmann steady state and time constant `tau`
    /// at the reference temperature.
    pub fn from_inf_tau(inf: f64, tau: f64, factor: f64) -> Self {
        GateRates {
            inf,
            tau: tau / factor,
        }
    }

    /// Advance the gate over `dt` ms.
    pub fn relax(&self, x: f64, dt: f64) -> f64 {
        self.inf + (x - self.inf) * (-dt / self.tau).exp()
    }
}

fn boltzmann(v: f64, v_half: f64, slope: f64) -> f64 {
    1.0 / (1.0 + (-(v - v_half) / slope).exp())
}

/// A channel model with its own gating variables.
pub trait Gating {
    type State: Copy + std::fmt::Debug;

    /// The gates at equilibrium for a fixed potential.
    fn steady_state(&self, v: f64, celsius: f64) -> Self::State;

    /// Advance the gates over `dt` ms at a fixed potential.
    fn advance(&self, state: &mut Self::State, v: f64, celsius: f64, dt: f64);

    /// Fraction of open channels.
    fn open_fraction(&self, state: &Self::State) -> f64;
}

impl SodiumKinetics {
    /// Rates of the activation (m) and inactivation (h) gates.
    pub fn rates(&self, v: f64, celsius: f64) -> (GateRates, GateRates) {
        match self {
            SodiumKinetics::HodgkinHuxley => {
                let factor = temperature_factor(celsius, HH_CELSIUS, HH_Q10);
                let m = GateRates::from_alpha_beta(
                    0.1 * vtrap(-(v + 40.0), 10.0),
                    4.0 * (-(v + 65.0) / 18.0).exp(),
                    factor,
                );
                let h = GateRates::from_alpha_beta(
                    0.07 * (-(v + 65.0) / 20.0).exp(),
                    1.0 / ((-(v + 35.0) / 10.0).exp() + 1.0),
                    factor,
                );
                (m, h)
            }
            SodiumKinetics::FastSodium => {
                let factor = temperature_factor(celsius, FAST_NA_CELSIUS, FAST_NA_Q10);
                let m = GateRates::from_inf_tau(
                    boltzmann(v, -52.0, 5.0),
                    0.02 + 0.12 * (-((v + 52.0) / 25.0).powi(2)).exp(),
                    factor,
                );
                let h = GateRates::from_inf_tau(
                    boltzmann(v, -62.0, -6.2),
                    0.3 + 2.5 * (-((v + 62.0) / 20.0).powi(2)).exp(),
                    factor,
                );
                (m, h)
            }
        }
    }
}

impl Gating for SodiumKinetics {
    /// (m, h)
    type State = [f64; 2];

    fn steady_state(&self, v: f64, celsius: f64) -> Self::State {
        let (m, h) = self.rates(v, celsius);
        [m.inf, h.inf]
    }

    fn advance(&self, state: &mut Self::State, v: f64, celsius: f64, dt: f64) {
        let (m, h) = self.rates(v, celsius);
        state[0] = m.relax(state[0], dt);
        state[1] = h.relax(state[1], dt);
    }

    fn open_fraction(&self, state: &Self::State) -> f64 {
        state[0] * state[0] * state[0] * state[1]
    }
}

impl PotassiumKinetics {
    /// Rates of the activation (n) gate.
    pub fn rates(&self, v: f64, celsius: f64) -> GateRates {
        match self {
            PotassiumKinetics::HodgkinHuxley => GateRates::from_alpha_beta(
                0.01 * vtrap(-(v + 55.0), 10.0),
                0.125 * (-(v + 65.0) / 80.0).exp(),
                temperature_factor(celsius, HH_CELSIUS, HH_Q10),
            ),
            PotassiumKinetics::SlowPotassium => GateRates::from_inf_tau(
                boltzmann(v, -35.0, 10.0),
                1000.0 / (3.3 * ((v + 35.0) / 20.0).exp() + (-(v + 35.0) / 20.0).exp()),
                temperature_factor(celsius, SLOW_K_CELSIUS, SLOW_K_Q10),
            ),
        }
    }
}

impl Gating for PotassiumKinetics {
    /// n
    type State = f64;

    fn steady_state(&self, v: f64, celsius: f64) -> Self::State {
        self.rates(v, celsius).inf
    }

    fn advance(&self, state: &mut Self::State, v: f64, celsius: f64, dt: f64) {
        *state = self.rates(v, celsius).relax(*state, dt);
    }

    fn open_fraction(&self, state: &Self::State) -> f64 {
        match self {
            PotassiumKinetics::HodgkinHuxley => state.powi(4),
            PotassiumKinetics::SlowPotassium => *state,
        }
    }
}
