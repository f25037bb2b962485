//! DAC quantization model.
//!
//! A [`Dac`] spans `0..=v_ref` volts in `2^bits` evenly spaced codes.
//! [`Dac::quantize`] is the exact nearest-code rounding used to build the
//! table; [`Dac::quantize_relaxed`] is the floor/ceil two-branch form the
//! calibrator differentiates through.

use serde::{Deserialize, Serialize};

use super::voltage::{CENTS_PER_VOLT, voltage_to_pitch};
use crate::error::DacError;

/// Widest supported DAC. Keeps every code and shifted register value exact in `f64`.
pub const MAX_BITS: u32 = 24;

/// Reference voltage and resolution of a DAC channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DacParams", into = "DacParams")]
pub struct Dac {
    v_ref: f64,
    bits: u32,
}

/// Unvalidated wire form of [`Dac`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DacParams {
    v_ref: f64,
    bits: u32,
}

impl Dac {
    pub fn new(v_ref: f64, bits: u32) -> Result<Self, DacError> {
        if !(v_ref.is_finite() && v_ref > 0.0) {
            return Err(DacError::InvalidReference { v_ref });
        }
        if bits == 0 || bits > MAX_BITS {
            return Err(DacError::InvalidBits { bits });
        }
        Ok(Dac { v_ref, bits })
    }

    pub fn v_ref(&self) -> f64 {
        self.v_ref
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Number of codes, `2^bits`.
    pub fn levels(&self) -> u32 {
        1 << self.bits
    }

    pub fn max_code(&self) -> u32 {
        self.levels() - 1
    }

    /// Voltage step per code.
    pub fn lsb(&self) -> f64 {
        self.v_ref / self.max_code() as f64
    }

    /// Whether `code` can be written to the DAC.
    pub fn contains(&self, code: i64) -> bool {
        (0..self.levels() as i64).contains(&code)
    }

    /// Nearest code to `voltage`, rounding half to even.
    ///
    /// Out-of-range results are reported through [`Quantized::in_range`],
    /// never clamped. A non-finite voltage is never in range.
    pub fn quantize(&self, voltage: f64) -> Quantized {
        let lsb = self.lsb();
        let code = (voltage / lsb).round_ties_even() as i64;
        Quantized {
            code,
            voltage: code as f64 * lsb,
            requested: voltage,
            in_range: voltage.is_finite() && self.contains(code),
        }
    }

    /// Two-candidate quantization: floor and ceil codes, keeping whichever
    /// voltage is closer to the request. Exactly at the midpoint the upper
    /// candidate wins.
    pub fn quantize_relaxed(&self, voltage: f64) -> Relaxed {
        let lsb = self.lsb();
        let raw = voltage / lsb;
        let lower_code = raw.floor();
        let upper_code = raw.ceil();
        let lower = lower_code * lsb;
        let upper = upper_code * lsb;

        let pick_lower = (lower - voltage).abs() < (upper - voltage).abs();
        let (code, nearest) = if pick_lower {
            (lower_code as i64, lower)
        } else {
            (upper_code as i64, upper)
        };

        Relaxed {
            lower,
            upper,
            nearest,
            requested: voltage,
            in_range: voltage.is_finite() && self.contains(code),
            code,
        }
    }
}

impl TryFrom<DacParams> for Dac {
    type Error = DacError;

    fn try_from(p: DacParams) -> Result<Self, Self::Error> {
        Dac::new(p.v_ref, p.bits)
    }
}

impl From<Dac> for DacParams {
    fn from(d: Dac) -> Self {
        DacParams { v_ref: d.v_ref, bits: d.bits }
    }
}

/// Result of exact quantization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantized {
    /// Rounded code. May lie outside the DAC range; check `in_range`.
    pub code: i64,
    /// Voltage the code produces, `code * lsb`.
    pub voltage: f64,
    /// Voltage that was asked for.
    pub requested: f64,
    pub in_range: bool,
}

impl Quantized {
    /// Signed tuning error of the produced voltage, in cents.
    pub fn cents_error(&self) -> f64 {
        CENTS_PER_VOLT * (self.voltage - self.requested)
    }

    /// Pitch the DAC actually plays.
    pub fn nearest_pitch(&self) -> f64 {
        voltage_to_pitch(self.voltage)
    }

    /// The code, if it is writable.
    pub fn valid_code(&self) -> Option<u32> {
        self.in_range.then_some(self.code as u32)
    }
}

/// Result of two-branch quantization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Relaxed {
    /// Floor candidate voltage.
    pub lower: f64,
    /// Ceil candidate voltage.
    pub upper: f64,
    /// The selected candidate.
    pub nearest: f64,
    pub requested: f64,
    pub code: i64,
    pub in_range: bool,
}

impl Relaxed {
    pub fn cents_error(&self) -> f64 {
        CENTS_PER_VOLT * (self.nearest - self.requested)
    }

    /// Derivative of `|cents_error|` with respect to the requested voltage.
    ///
    /// Both candidates are piecewise constant in the input, so only the
    /// `- requested` term contributes. Zero error has zero gradient.
    pub fn abs_cents_gradient(&self) -> f64 {
        let cents = self.cents_error();
        if cents == 0.0 {
            0.0
        } else {
            -CENTS_PER_VOLT * cents.signum()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cv::voltage::{MAX_PITCH, pitch_to_voltage};

    #[test]
    fn rejects_bad_parameters() {
        assert_eq!(Dac::new(0.0, 12), Err(DacError::InvalidReference { v_ref: 0.0 }));
        assert!(Dac::new(-5.0, 12).is_err());
        assert!(Dac::new(f64::NAN, 12).is_err());
        assert!(Dac::new(f64::INFINITY, 12).is_err());
        assert_eq!(Dac::new(5.0, 0), Err(DacError::InvalidBits { bits: 0 }));
        assert_eq!(Dac::new(5.0, 25), Err(DacError::InvalidBits { bits: 25 }));
        assert!(Dac::new(5.0, 1).is_ok());
        assert!(Dac::new(5.0, 24).is_ok());
    }

    #[test]
    fn derived_quantities() {
        let dac = Dac::new(8.0, 12).unwrap();
        assert_eq!(dac.levels(), 4096);
        assert_eq!(dac.max_code(), 4095);
        assert_eq!(dac.lsb(), 8.0 / 4095.0);
        assert!(dac.contains(0));
        assert!(dac.contains(4095));
        assert!(!dac.contains(4096));
        assert!(!dac.contains(-1));
    }

    #[test]
    fn zero_volts_is_code_zero() {
        for (v_ref, bits) in [(5.0, 12), (8.0, 12), (1.0, 1), (10.0, 16), (3.3, 24)] {
            let dac = Dac::new(v_ref, bits).unwrap();
            let q = dac.quantize(0.0);
            assert_eq!(q.code, 0, "v_ref {v_ref} bits {bits}");
            assert!(q.in_range);
            assert_eq!(q.cents_error(), 0.0);
        }
    }

    #[test]
    fn pitch_zero_at_8v_12bit() {
        let dac = Dac::new(8.0, 12).unwrap();
        let q = dac.quantize(pitch_to_voltage(0.0));
        assert_eq!(q.valid_code(), Some(0));
        assert_eq!(q.cents_error(), 0.0);
    }

    #[test]
    fn middle_c_at_5v_12bit() {
        let dac = Dac::new(5.0, 12).unwrap();
        let lsb = dac.lsb();
        let q = dac.quantize(pitch_to_voltage(60.0));
        assert_eq!(q.code, (5.0 / lsb).round() as i64);
        assert!(q.code < 4096);
        assert!(q.in_range);
        assert_eq!(q.cents_error(), 1200.0 * (q.code as f64 * lsb - 5.0));
    }

    #[test]
    fn above_reference_is_out_of_range() {
        let dac = Dac::new(5.0, 12).unwrap();
        let q = dac.quantize(pitch_to_voltage(61.0));
        assert!(q.code >= 4096, "code {}", q.code);
        assert!(!q.in_range);
        assert_eq!(q.valid_code(), None);
    }

    #[test]
    fn midpoint_rounds_to_even() {
        // 16/12 V at 8V/12-bit sits exactly on code 682.5
        let dac = Dac::new(8.0, 12).unwrap();
        let v = pitch_to_voltage(16.0);
        assert_eq!(v / dac.lsb(), 682.5);
        assert_eq!(dac.quantize(v).code, 682);
        assert_eq!(dac.quantize(pitch_to_voltage(48.0)).code, 2048);
    }

    #[test]
    fn error_bounded_by_half_lsb() {
        for (v_ref, bits) in [(5.0, 12), (8.0, 12), (10.0, 8), (2.5, 16)] {
            let dac = Dac::new(v_ref, bits).unwrap();
            let half = dac.lsb() / 2.0;
            let max_cents = CENTS_PER_VOLT * half;
            for i in 0..=1000 {
                let v = v_ref * i as f64 / 1000.0;
                let q = dac.quantize(v);
                assert!((q.voltage - v).abs() <= half * (1.0 + 1e-9), "v {v}");
                assert!(q.cents_error().abs() <= max_cents * (1.0 + 1e-9), "v {v}");
            }
        }
    }

    #[test]
    fn codes_are_monotonic_in_pitch() {
        let dac = Dac::new(8.0, 12).unwrap();
        let mut last = i64::MIN;
        for p in 0..=MAX_PITCH {
            let code = dac.quantize(pitch_to_voltage(p as f64)).code;
            assert!(code >= last, "pitch {p}: {code} < {last}");
            last = code;
        }
    }

    #[test]
    fn relaxed_matches_exact_off_midpoint() {
        let dac = Dac::new(5.0, 12).unwrap();
        for i in 0..2000 {
            let v = 5.0 * i as f64 / 1999.0 + 0.000_123;
            let exact = dac.quantize(v);
            let relaxed = dac.quantize_relaxed(v);
            assert!(relaxed.upper - relaxed.lower <= dac.lsb() * (1.0 + 1e-9));
            assert_eq!(relaxed.code, exact.code, "v {v}");
            assert!((relaxed.cents_error() - exact.cents_error()).abs() < 1e-9);
        }
    }

    #[test]
    fn relaxed_midpoint_takes_upper() {
        // lsb is exactly 1 V
        let dac = Dac::new(15.0, 4).unwrap();
        let r = dac.quantize_relaxed(2.5);
        assert_eq!((r.lower, r.upper), (2.0, 3.0));
        assert_eq!(r.code, 3);
        assert_eq!(r.nearest, 3.0);
        assert_eq!(dac.quantize(2.5).code, 2);
    }

    #[test]
    fn non_finite_voltage_is_out_of_range() {
        let dac = Dac::new(5.0, 12).unwrap();
        for v in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(!dac.quantize(v).in_range, "{v}");
            assert_eq!(dac.quantize(v).valid_code(), None);
            assert!(!dac.quantize_relaxed(v).in_range, "{v}");
        }
    }

    #[test]
    fn relaxed_gradient_sign() {
        let dac = Dac::new(8.0, 12).unwrap();
        let lsb = dac.lsb();
        // Request slightly above a code: nearest is below, error negative.
        let above = dac.quantize_relaxed(100.0 * lsb + lsb * 0.1);
        assert!(above.cents_error() < 0.0);
        assert_eq!(above.abs_cents_gradient(), CENTS_PER_VOLT);

        let below = dac.quantize_relaxed(100.0 * lsb - lsb * 0.1);
        assert!(below.cents_error() > 0.0);
        assert_eq!(below.abs_cents_gradient(), -CENTS_PER_VOLT);

        let exact = dac.quantize_relaxed(0.0);
        assert_eq!(exact.abs_cents_gradient(), 0.0);
    }

    #[test]
    fn serde_validates() {
        let dac: Dac = serde_json::from_str(r#"{"vRef": 8.0, "bits": 12}"#).unwrap();
        assert_eq!(dac, Dac::new(8.0, 12).unwrap());
        assert!(serde_json::from_str::<Dac>(r#"{"vRef": -1.0, "bits": 12}"#).is_err());
        let json = serde_json::to_string(&dac).unwrap();
        assert!(json.contains("\"vRef\""));
    }
}
