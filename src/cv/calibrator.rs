//! Bias calibration: learns one voltage offset, shared by every pitch,
//! that minimizes the mean absolute tuning error after quantization.
//!
//! The offset is a constant shift of the whole CV output (the oscillator's
//! coarse tune absorbs it), so error is always measured against the biased
//! target. Rounding has no useful derivative, so each step differentiates
//! through [`Dac::quantize_relaxed`] and updates an unconstrained parameter
//! with Adam. The effective bias is `max_bias * sigmoid(theta)`.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::quantizer::Dac;
use super::voltage::pitch_to_voltage;
use crate::error::CalibrationError;

/// Optimizer hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CalibratorSettings {
    pub iterations: usize,
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    /// Upper bound of the bias, in volts.
    pub max_bias: f64,
    /// Starting value of the unconstrained parameter.
    pub initial_theta: f64,
    /// Log progress every N iterations (0 disables).
    pub log_every: usize,
}

impl Default for CalibratorSettings {
    fn default() -> Self {
        CalibratorSettings {
            iterations: 2000,
            learning_rate: 0.01,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            max_bias: 1.0,
            initial_theta: 0.0,
            log_every: 100,
        }
    }
}

impl CalibratorSettings {
    pub fn validate(&self) -> Result<(), CalibrationError> {
        if self.iterations == 0 {
            return Err(CalibrationError::ZeroIterations);
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(CalibrationError::InvalidLearningRate { lr: self.learning_rate });
        }
        check_max_bias(self.max_bias)
    }
}

pub(crate) fn check_max_bias(max_bias: f64) -> Result<(), CalibrationError> {
    if !(max_bias.is_finite() && max_bias > 0.0) {
        return Err(CalibrationError::InvalidMaxBias { max_bias });
    }
    Ok(())
}

/// Exact (table-generation) tuning quality at one bias.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub bias: f64,
    /// Pitches whose code is in range.
    pub coverage: usize,
    /// Mean absolute cents over the covered pitches; `None` if none are.
    pub mean_abs_cents: Option<f64>,
}

/// Quantize every pitch at `bias` with exact rounding and average the
/// absolute error over in-range codes.
pub fn evaluate(dac: &Dac, pitches: RangeInclusive<u8>, bias: f64) -> Evaluation {
    let mut coverage = 0usize;
    let mut total = 0.0;
    for pitch in pitches {
        let q = dac.quantize(pitch_to_voltage(pitch as f64) + bias);
        if q.in_range {
            coverage += 1;
            total += q.cents_error().abs();
        }
    }
    Evaluation {
        bias,
        coverage,
        mean_abs_cents: (coverage > 0).then(|| total / coverage as f64),
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Adam first/second moment accumulators.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Moments {
    m: f64,
    v: f64,
    t: i32,
}

/// Everything that changes between iterations.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibratorState {
    pub theta: f64,
    pub moments: Moments,
}

/// What a single iteration did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    /// Parameter updated. `objective` and `bias` are the pre-update values.
    Updated { objective: f64, bias: f64, coverage: usize },
    /// No pitch was in range at the current bias; nothing changed.
    Skipped { bias: f64 },
}

/// Outcome of a full calibration run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Calibration {
    /// Best bias seen, zero-bias baseline included.
    pub bias: f64,
    /// Exact mean absolute cents at `bias`.
    pub objective: f64,
    pub coverage: usize,
    /// Exact mean absolute cents with no bias, if any pitch is in range.
    pub baseline_objective: Option<f64>,
    pub final_bias: f64,
    pub final_objective: Option<f64>,
    pub iterations: usize,
    pub skipped: usize,
}

impl Calibration {
    /// Cents of mean error removed relative to no bias.
    pub fn improvement(&self) -> Option<f64> {
        self.baseline_objective.map(|base| base - self.objective)
    }
}

pub struct Calibrator {
    dac: Dac,
    pitches: RangeInclusive<u8>,
    settings: CalibratorSettings,
    state: CalibratorState,
}

impl Calibrator {
    pub fn new(
        dac: Dac,
        pitches: RangeInclusive<u8>,
        settings: CalibratorSettings,
    ) -> Result<Self, CalibrationError> {
        settings.validate()?;
        let state = CalibratorState {
            theta: settings.initial_theta,
            moments: Moments::default(),
        };
        Ok(Calibrator { dac, pitches, settings, state })
    }

    pub fn state(&self) -> &CalibratorState {
        &self.state
    }

    /// Effective bias for the current state, in `(0, max_bias)`.
    pub fn bias(&self) -> f64 {
        self.settings.max_bias * sigmoid(self.state.theta)
    }

    /// One optimizer iteration.
    pub fn step(&mut self) -> Step {
        let s = sigmoid(self.state.theta);
        let bias = self.settings.max_bias * s;

        let mut coverage = 0usize;
        let mut total = 0.0;
        let mut grad = 0.0;
        for pitch in self.pitches.clone() {
            let r = self.dac.quantize_relaxed(pitch_to_voltage(pitch as f64) + bias);
            if !r.in_range {
                continue;
            }
            coverage += 1;
            total += r.cents_error().abs();
            grad += r.abs_cents_gradient();
        }

        if coverage == 0 {
            return Step::Skipped { bias };
        }

        let n = coverage as f64;
        // chain rule through bias = max_bias * sigmoid(theta)
        let d_theta = (grad / n) * self.settings.max_bias * s * (1.0 - s);
        self.state.theta = adam_update(&self.settings, &mut self.state.moments, self.state.theta, d_theta);

        Step::Updated { objective: total / n, bias, coverage }
    }

    /// Run the full iteration budget and return the best bias found.
    pub fn run(mut self) -> Result<Calibration, CalibrationError> {
        let baseline = evaluate(&self.dac, self.pitches.clone(), 0.0);
        let mut best = baseline;
        let mut skipped = 0usize;

        for i in 0..self.settings.iterations {
            match self.step() {
                Step::Updated { objective, bias, coverage } => {
                    let exact = evaluate(&self.dac, self.pitches.clone(), bias);
                    if is_better(&exact, &best) {
                        best = exact;
                    }
                    if self.settings.log_every > 0 && i % self.settings.log_every == 0 {
                        debug!(
                            "iteration {i:5}: error {objective:0.5} cents, bias {bias:0.5} V, {coverage} in range"
                        );
                    }
                }
                Step::Skipped { bias } => {
                    skipped += 1;
                    warn!("iteration {i}: no pitch in range at bias {bias:0.5} V, step skipped");
                }
            }
        }

        let last = evaluate(&self.dac, self.pitches.clone(), self.bias());
        if is_better(&last, &best) {
            best = last;
        }

        let Some(objective) = best.mean_abs_cents else {
            return Err(CalibrationError::NoPitchesInRange);
        };

        info!(
            "calibrated bias {:0.5} V: {objective:0.5} cents mean error over {} pitches",
            best.bias, best.coverage
        );

        Ok(Calibration {
            bias: best.bias,
            objective,
            coverage: best.coverage,
            baseline_objective: baseline.mean_abs_cents,
            final_bias: last.bias,
            final_objective: last.mean_abs_cents,
            iterations: self.settings.iterations,
            skipped,
        })
    }
}

fn is_better(candidate: &Evaluation, current: &Evaluation) -> bool {
    match (candidate.mean_abs_cents, current.mean_abs_cents) {
        (Some(c), Some(b)) => c < b,
        (Some(_), None) => true,
        _ => false,
    }
}

fn adam_update(settings: &CalibratorSettings, moments: &mut Moments, param: f64, grad: f64) -> f64 {
    moments.t = moments.t.saturating_add(1);
    moments.m = settings.beta1 * moments.m + (1.0 - settings.beta1) * grad;
    moments.v = settings.beta2 * moments.v + (1.0 - settings.beta2) * grad * grad;
    let m_hat = moments.m / (1.0 - settings.beta1.powi(moments.t));
    let v_hat = moments.v / (1.0 - settings.beta2.powi(moments.t));
    param - settings.learning_rate * m_hat / (v_hat.sqrt() + settings.epsilon)
}
