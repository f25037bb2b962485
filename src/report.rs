//! Human-readable tuning diagnostics.

use std::fmt;
use std::ops::RangeInclusive;

use serde::Serialize;

use crate::cv::calibrator::Calibration;
use crate::cv::quantizer::Dac;
use crate::cv::sweep::SweepResult;
use crate::cv::voltage::{pitch_to_voltage, voltage_to_pitch};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PitchLine {
    InRange {
        pitch: u8,
        code: u32,
        /// Pitch the DAC plays, with the bias taken back out.
        nearest_pitch: f64,
        cents: f64,
    },
    OutOfRange {
        pitch: u8,
        code: i64,
    },
}

/// Per-pitch tuning at one bias.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TuningReport {
    pub lines: Vec<PitchLine>,
    pub bias: f64,
    pub bits: u32,
}

impl TuningReport {
    pub fn new(dac: &Dac, pitches: RangeInclusive<u8>, bias: f64) -> Self {
        let lines = pitches
            .map(|pitch| {
                let q = dac.quantize(pitch_to_voltage(pitch as f64) + bias);
                match q.valid_code() {
                    Some(code) => PitchLine::InRange {
                        pitch,
                        code,
                        nearest_pitch: voltage_to_pitch(q.voltage - bias),
                        cents: q.cents_error(),
                    },
                    None => PitchLine::OutOfRange { pitch, code: q.code },
                }
            })
            .collect();
        TuningReport { lines, bias, bits: dac.bits() }
    }

    pub fn valid_count(&self) -> usize {
        self.in_range_cents().count()
    }

    /// Mean absolute cents over in-range pitches.
    pub fn mean_abs_cents(&self) -> Option<f64> {
        let n = self.valid_count();
        (n > 0).then(|| self.in_range_cents().map(f64::abs).sum::<f64>() / n as f64)
    }

    /// Largest absolute error over in-range pitches.
    pub fn max_abs_cents(&self) -> Option<f64> {
        self.in_range_cents().map(f64::abs).reduce(f64::max)
    }

    fn in_range_cents(&self) -> impl Iterator<Item = f64> + '_ {
        self.lines.iter().filter_map(|l| match l {
            PitchLine::InRange { cents, .. } => Some(*cents),
            PitchLine::OutOfRange { .. } => None,
        })
    }
}

impl fmt::Display for TuningReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            match line {
                PitchLine::InRange { pitch, nearest_pitch, cents, .. } => {
                    writeln!(f, "Noteon: {pitch:3}, Nearest: {nearest_pitch:0.3}, Cents: {cents:0.5}")?
                }
                PitchLine::OutOfRange { pitch, .. } => {
                    writeln!(f, "Noteon: {pitch:3}, DAC value exceeds {}-bit range", self.bits)?
                }
            }
        }
        match (self.mean_abs_cents(), self.max_abs_cents()) {
            (Some(mean), Some(max)) => writeln!(
                f,
                "\nAverage Cents: {mean:0.5} (max {max:0.5}) over {} pitches, bias {:0.5} V",
                self.valid_count(),
                self.bias
            ),
            _ => writeln!(f, "\nNo pitch in range"),
        }
    }
}

impl fmt::Display for SweepResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for p in &self.points {
            match p.mean_abs_cents {
                Some(mean) => writeln!(
                    f,
                    "Bias: {:0.5} V, Coverage: {:3}, Average Cents: {mean:0.5}",
                    p.bias, p.coverage
                )?,
                None => writeln!(f, "Bias: {:0.5} V, Coverage: {:3}", p.bias, p.coverage)?,
            }
        }
        if let Some(best) = self.best() {
            writeln!(
                f,
                "\nBest at full coverage: bias {:0.5} V, {} pitches",
                best.bias, best.coverage
            )?;
        }
        Ok(())
    }
}

impl fmt::Display for Calibration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Bias: {:0.5} V, Error: {:0.5} cents over {} pitches",
            self.bias, self.objective, self.coverage
        )?;
        if let Some(base) = self.baseline_objective {
            write!(f, " (uncalibrated {base:0.5})")?;
        }
        if self.skipped > 0 {
            write!(f, ", {} of {} steps skipped", self.skipped, self.iterations)?;
        }
        Ok(())
    }
}
