//! Summary statistics over firing-probability distributions.
use serde::{Deserialize, Serialize};

use crate::error::CableError;

/// Location and spread of a collection of values.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    /// Unbiased sample standard deviation (zero for a single value).
    pub std: f64,
    pub min: f64,
    pub median: f64,
    pub max: f64,
}

impl Summary {
    /// Summarize the values. Returns `None` if there is no value.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let count = values.len();
        let mean = values.iter().sum::<f64>() / count as f64;
        let std = if count > 1 {
            let ss = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>();
            (ss / (count - 1) as f64).sqrt()
        } else {
            0.0
        };

        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let median = if count % 2 == 1 {
            sorted[count / 2]
        } else {
            0.5 * (sorted[count / 2 - 1] + sorted[count / 2])
        };

        Some(Summary {
            count,
            mean,
            std,
            min: sorted[0],
            median,
            max: sorted[count - 1],
        })
    }

    /// Standard error of the mean.
    pub fn sem(&self) -> f64 {
        self.std / (self.count as f64).sqrt()
    }
}

/// Count the probabilities falling into `num_bins` equal bins over [0, 1].
/// The last bin is closed, so that a probability of exactly 1 is counted.
pub fn histogram(probabilities: &[f64], num_bins: usize) -> Result<Vec<usize>, CableError> {
    if num_bins == 0 {
        return Err(CableError::ConfigurationError(
            "Invalid number of bins: 0 (must be positive)".to_string(),
        ));
    }
    if let Some(p) = probabilities.iter().find(|p| !(0.0..=1.0).contains(*p)) {
        return Err(CableError::ConfigurationError(format!(
            "Invalid probability: {} (must be in [0, 1])",
            p
        )));
    }

    let mut counts = vec![0; num_bins];
    for p in probabilities {
        let bin = ((p * num_bins as f64) as usize).min(num_bins - 1);
        counts[bin] += 1;
    }
    Ok(counts)
}
