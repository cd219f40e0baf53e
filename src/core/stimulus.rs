//! Stochastic stimulus trains: regularly timed current pulses with Gaussian amplitudes.
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::error::CableError;

/// Maximum number of pulses in a train.
pub const MAX_STIMULI: usize = 1_000_000;

/// A current pulse injected between `start` and `end` (ms) with the given amplitude (nA).
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub struct StimulusEvent {
    pub start: f64,
    pub end: f64,
    pub amplitude: f64,
}

impl StimulusEvent {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// The timing and amplitude statistics of a stimulus train.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct StimulusProtocol {
    /// Mean pulse amplitude (nA).
    pub mean_amplitude: f64,
    /// Standard deviation of the pulse amplitude (nA).
    pub std_amplitude: f64,
    /// Onset of the first pulse (ms).
    pub delay: f64,
    /// Time between consecutive pulse onsets (ms).
    pub interstim: f64,
    /// Pulse duration (ms).
    pub duration: f64,
    /// Simulated time (ms); no pulse starts at or after it.
    pub total_time: f64,
}

impl Default for StimulusProtocol {
    fn default() -> Self {
        StimulusProtocol {
            mean_amplitude: 0.1,
            std_amplitude: 0.01,
            delay: 5.0,
            interstim: 10.0,
            duration: 0.1,
            total_time: 100.0,
        }
    }
}

impl StimulusProtocol {
    /// The same protocol with another mean amplitude.
    pub fn with_mean_amplitude(&self, mean_amplitude: f64) -> Self {
        StimulusProtocol {
            mean_amplitude,
            ..self.clone()
        }
    }

    /// Check that the protocol describes a finite train of pulses.
    pub fn validate(&self) -> Result<(), CableError> {
        for (param, value) in [
            ("mean_amplitude", self.mean_amplitude),
            ("std_amplitude", self.std_amplitude),
            ("delay", self.delay),
            ("interstim", self.interstim),
            ("duration", self.duration),
            ("total_time", self.total_time),
        ] {
            if !value.is_finite() {
                return Err(CableError::ConfigurationError(format!(
                    "Invalid stimulus {}: {} (must be finite)",
                    param, value
                )));
            }
        }
        if self.interstim <= 0.0 {
            return Err(CableError::ConfigurationError(format!(
                "Invalid stimulus interstim: {} (must be positive)",
                self.interstim
            )));
        }
        if self.duration < 0.0 {
            return Err(CableError::ConfigurationError(format!(
                "Invalid stimulus duration: {} (must be non-negative)",
                self.duration
            )));
        }
        if self.std_amplitude < 0.0 {
            return Err(CableError::ConfigurationError(format!(
                "Invalid stimulus std_amplitude: {} (must be non-negative)",
                self.std_amplitude
            )));
        }
        if self.num_stimuli() > MAX_STIMULI {
            return Err(CableError::ConfigurationError(format!(
                "Invalid stimulus train: more than {} pulses in [{}, {}) every {} ms",
                MAX_STIMULI, self.delay, self.total_time, self.interstim
            )));
        }
        Ok(())
    }

    /// Pulse onsets `delay + k * interstim` before `total_time`, at most `MAX_STIMULI + 1` of them.
    fn onsets(&self) -> impl Iterator<Item = f64> + '_ {
        let bound = ((self.total_time - self.delay) / self.interstim).ceil().max(0.0) as usize;
        (0..=bound.min(MAX_STIMULI))
            .map(move |k| self.delay + k as f64 * self.interstim)
            .take_while(move |start| *start < self.total_time)
    }

    /// Returns the number of pulses in the train, i.e., the number of onsets in
    /// [delay, total_time).
    pub fn num_stimuli(&self) -> usize {
        self.onsets().count()
    }

    /// Generate a stimulus train.
    ///
    /// Pulses start at `delay`, `delay + interstim`, ... as long as the onset is before
    /// `total_time`. Every amplitude is an independent draw from a normal distribution, floored at
    /// zero. The draws are fully determined by `seed`; without a seed, a fresh seed is taken from
    /// the entropy source.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rusty_cable::core::stimulus::StimulusProtocol;
    ///
    /// let protocol = StimulusProtocol {
    ///     mean_amplitude: 0.2,
    ///     std_amplitude: 0.05,
    ///     delay: 1.0,
    ///     interstim: 2.0,
    ///     duration: 0.5,
    ///     total_time: 10.0,
    /// };
    ///
    /// let events = protocol.generate(Some(42)).unwrap();
    /// assert_eq!(events.len(), 5);
    /// assert_eq!(events, protocol.generate(Some(42)).unwrap());
    /// assert!(events.iter().all(|event| event.amplitude >= 0.0));
    /// ```
    pub fn generate(&self, seed: Option<u64>) -> Result<Vec<StimulusEvent>, CableError> {
        self.validate()?;

        let seed = seed.unwrap_or_else(rand::random::<u64>);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let normal = Normal::new(self.mean_amplitude, self.std_amplitude)
            .map_err(|e| CableError::ConfigurationError(e.to_string()))?;

        let events: Vec<StimulusEvent> = self
            .onsets()
            .map(|start| StimulusEvent {
                start,
                end: start + self.duration,
                amplitude: normal.sample(&mut rng).max(0.0),
            })
            .collect();

        log::trace!(
            "{} stimuli sampled with seed {} (mean amplitude {} nA)",
            events.len(),
            seed,
            self.mean_amplitude
        );

        Ok(events)
    }
}

/// Free-function form of [`StimulusProtocol::generate`].
pub fn generate(
    mean_amplitude: f64,
    std_amplitude: f64,
    delay: f64,
    interstim: f64,
    total_time: f64,
    duration: f64,
    seed: Option<u64>,
) -> Result<Vec<StimulusEvent>, CableError> {
    StimulusProtocol {
        mean_amplitude,
        std_amplitude,
        delay,
        interstim,
        duration,
        total_time,
    }
    .generate(seed)
}
