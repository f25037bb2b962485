//! Bias sweep: brute-force evaluation of evenly spaced candidate biases.
//!
//! Cheap enough to run alongside the calibrator and shows the trade-off it
//! hides: larger biases push the top pitches past `v_ref`.

use std::cmp::Ordering;
use std::ops::RangeInclusive;

use super::calibrator::{Evaluation, check_max_bias, evaluate};
use super::quantizer::Dac;
use crate::error::CalibrationError;

pub struct SweepResult {
    pub points: Vec<Evaluation>,
}

/// Evaluate `steps` biases `max_bias * i / steps`, `i` in `0..steps`.
pub fn sweep(
    dac: &Dac,
    pitches: RangeInclusive<u8>,
    max_bias: f64,
    steps: usize,
) -> Result<SweepResult, CalibrationError> {
    check_max_bias(max_bias)?;
    let points = (0..steps)
        .map(|i| evaluate(dac, pitches.clone(), max_bias * i as f64 / steps as f64))
        .collect();
    Ok(SweepResult { points })
}

impl SweepResult {
    /// Candidate covering the most pitches, lowest mean error among those.
    pub fn best(&self) -> Option<&Evaluation> {
        let max = self.points.iter().map(|p| p.coverage).max()?;
        self.points
            .iter()
            .filter(|p| p.coverage == max && p.mean_abs_cents.is_some())
            .min_by(|a, b| by_mean(a, b))
    }

    /// Candidate with the lowest mean error, whatever its coverage.
    pub fn lowest_mean(&self) -> Option<&Evaluation> {
        self.points
            .iter()
            .filter(|p| p.mean_abs_cents.is_some())
            .min_by(|a, b| by_mean(a, b))
    }
}

fn by_mean(a: &Evaluation, b: &Evaluation) -> Ordering {
    a.mean_abs_cents
        .partial_cmp(&b.mean_abs_cents)
        .unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_are_evenly_spaced() {
        let dac = Dac::new(8.0, 12).unwrap();
        let result = sweep(&dac, 0..=127, 1.0, 4).unwrap();
        let biases: Vec<f64> = result.points.iter().map(|p| p.bias).collect();
        assert_eq!(biases, vec![0.0, 0.25, 0.5, 0.75]);
    }

    #[test]
    fn coverage_never_grows_with_bias() {
        let dac = Dac::new(8.0, 12).unwrap();
        let result = sweep(&dac, 0..=127, 1.0, 256).unwrap();
        for pair in result.points.windows(2) {
            assert!(pair[1].coverage <= pair[0].coverage, "{:?}", pair);
        }
        assert_eq!(result.points[0].coverage, 97);
    }

    #[test]
    fn best_keeps_coverage_over_mean() {
        // At 8 V the lowest mean sits at a bias that drops the top pitches.
        let dac = Dac::new(8.0, 12).unwrap();
        let result = sweep(&dac, 0..=127, 1.0, 4096).unwrap();

        let best = result.best().unwrap();
        assert_eq!(best.coverage, 97);
        assert_eq!(best.bias, 0.0);

        let lowest = result.lowest_mean().unwrap();
        assert_eq!(lowest.coverage, 86);
        assert!((lowest.bias - 0.9165).abs() < 1e-3, "bias {}", lowest.bias);
        assert!(lowest.mean_abs_cents.unwrap() < best.mean_abs_cents.unwrap());
    }

    #[test]
    fn best_beats_zero_bias() {
        let dac = Dac::new(5.0, 12).unwrap();
        let result = sweep(&dac, 0..=127, 1.0, 1024).unwrap();
        let zero = result.points[0].mean_abs_cents.unwrap();
        assert!(result.lowest_mean().unwrap().mean_abs_cents.unwrap() <= zero);

        let best = result.best().unwrap();
        assert_eq!(best.coverage, 61);
        assert!(best.mean_abs_cents.unwrap() <= zero);
    }

    #[test]
    fn empty_sweep() {
        let dac = Dac::new(5.0, 12).unwrap();
        let result = sweep(&dac, 0..=127, 1.0, 0).unwrap();
        assert!(result.points.is_empty());
        assert!(result.best().is_none());
        assert!(result.lowest_mean().is_none());
    }

    #[test]
    fn rejects_bad_max_bias() {
        let dac = Dac::new(5.0, 12).unwrap();
        for max_bias in [0.0, -1.0, f64::NAN] {
            assert!(matches!(
                sweep(&dac, 0..=127, max_bias, 8),
                Err(CalibrationError::InvalidMaxBias { .. })
            ));
        }
    }
}
