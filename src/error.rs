//! Error module for the Rusty Cable library.
use std::error::Error;
use std::fmt;

/// Error types for the library.
#[derive(Debug, PartialEq, Clone)]
pub enum CableError {
    /// Error for invalid or contradictory inputs, detected before any simulation starts,
    /// e.g., zero-mean normalization target, non-positive morphology dimensions or cluster width.
    ConfigurationError(String),
    /// Error for a solver run that did not produce a usable result, e.g., non-finite voltage
    /// samples.
    SimulationError(String),
    /// Error while setting up the parallel execution of trials.
    ExecutionError(String),
    /// Error for I/O operations.
    IOError(String),
}

impl fmt::Display for CableError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CableError::ConfigurationError(e) => write!(f, "Configuration error: {}", e),
            CableError::SimulationError(e) => write!(f, "Simulation error: {}", e),
            CableError::ExecutionError(e) => write!(f, "Execution error: {}", e),
            CableError::IOError(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl Error for CableError {}

impl CableError {
    /// Returns true if the error was raised before any solver work, i.e., it is a configuration
    /// error.
    pub fn is_configuration(&self) -> bool {
        matches!(self, CableError::ConfigurationError(_))
    }
}
