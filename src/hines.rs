//! Reference membrane solver: implicit integration of the cable equation with Hodgkin-Huxley-type
//! channels.
pub mod kinetics;
pub mod solver;

/// Sodium reversal potential (mV).
pub const E_NA: f64 = 50.0;
/// Potassium reversal potential (mV).
pub const E_K: f64 = -77.0;
/// Leak reversal potential (mV).
pub const E_LEAK: f64 = -54.3;
