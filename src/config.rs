//! Run configuration: a JSON file, overridden field by field from the
//! command line.
//!
//! The reference voltage and bit depth have no defaults: they describe the
//! target hardware and must be stated explicitly.

use std::ops::RangeInclusive;

use ariadne::{Config as ReportConfig, Label, Report, ReportKind, Source};
use serde::{Deserialize, Serialize};

use crate::cv::calibrator::CalibratorSettings;
use crate::cv::quantizer::Dac;
use crate::cv::voltage::MAX_PITCH;
use crate::error::{ConfigError, CvError};
use crate::table::{HeaderFormat, OutOfRangePolicy};

/// Example `cvtune.json`:
///
/// ```json
/// {
///   "vRef": 5.0,
///   "bits": 12,
///   "pitchHigh": 60,
///   "policy": "truncate",
///   "header": { "arrayName": "pitch_lookup", "registerBits": 16 },
///   "calibrator": { "iterations": 2000, "learningRate": 0.01 }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub v_ref: Option<f64>,
    pub bits: Option<u32>,
    pub pitch_low: u8,
    pub pitch_high: u8,
    pub policy: OutOfRangePolicy,
    /// Learn a bias before building the table.
    pub calibrate: bool,
    pub header: HeaderFormat,
    pub calibrator: CalibratorSettings,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            v_ref: None,
            bits: None,
            pitch_low: 0,
            pitch_high: MAX_PITCH,
            policy: OutOfRangePolicy::default(),
            calibrate: true,
            header: HeaderFormat::default(),
            calibrator: CalibratorSettings::default(),
        }
    }
}

impl Config {
    pub fn from_json(source: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(source).map_err(|e| {
            let text = e.to_string();
            let message = match text.rfind(" at line ") {
                Some(i) => text[..i].to_string(),
                None => text,
            };
            ConfigError::Parse { message, line: e.line(), column: e.column() }
        })
    }

    pub fn dac(&self) -> Result<Dac, CvError> {
        let v_ref = self.v_ref.ok_or(ConfigError::Missing { field: "vRef" })?;
        let bits = self.bits.ok_or(ConfigError::Missing { field: "bits" })?;
        Ok(Dac::new(v_ref, bits)?)
    }

    pub fn pitches(&self) -> Result<RangeInclusive<u8>, ConfigError> {
        let (low, high) = (self.pitch_low, self.pitch_high);
        if low > high || high > MAX_PITCH {
            return Err(ConfigError::InvalidPitchRange { low, high });
        }
        Ok(low..=high)
    }
}

/// Render a configuration error against its source text. Parse errors get
/// a labelled snippet; anything else is its plain message.
pub fn render_diagnostic(path: &str, source: &str, err: &ConfigError) -> String {
    let ConfigError::Parse { message, line, column } = err else {
        return err.to_string();
    };

    let offset = char_offset(source, *line, *column);
    let end = (offset + 1).min(source.chars().count());
    let span = offset.min(end)..end;

    let mut buf = Vec::new();
    let written = Report::build(ReportKind::Error, (path, span.clone()))
        .with_config(ReportConfig::default().with_color(false))
        .with_message("invalid configuration")
        .with_label(Label::new((path, span)).with_message(message))
        .finish()
        .write((path, Source::from(source)), &mut buf);

    match written {
        Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
        Err(_) => err.to_string(),
    }
}

/// Char offset of a 1-based line/column position.
fn char_offset(source: &str, line: usize, column: usize) -> usize {
    let before: usize = source
        .split_inclusive('\n')
        .take(line.saturating_sub(1))
        .map(|l| l.chars().count())
        .sum();
    (before + column.saturating_sub(1)).min(source.chars().count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DacError;

    #[test]
    fn defaults_for_omitted_fields() {
        let cfg = Config::from_json(r#"{ "vRef": 8.0, "bits": 12 }"#).unwrap();
        assert_eq!(cfg.pitches().unwrap(), 0..=127);
        assert_eq!(cfg.policy, OutOfRangePolicy::Truncate);
        assert!(cfg.calibrate);
        assert_eq!(cfg.header, HeaderFormat::default());
        assert_eq!(cfg.calibrator.iterations, 2000);
        assert_eq!(cfg.dac().unwrap(), Dac::new(8.0, 12).unwrap());
    }

    #[test]
    fn nested_sections() {
        let cfg = Config::from_json(
            r#"{
                "vRef": 5.0,
                "bits": 12,
                "pitchLow": 12,
                "pitchHigh": 72,
                "policy": "skip",
                "calibrate": false,
                "header": { "arrayName": "cv_table", "registerBits": 12 },
                "calibrator": { "iterations": 10, "learningRate": 0.05 }
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.pitches().unwrap(), 12..=72);
        assert_eq!(cfg.policy, OutOfRangePolicy::Skip);
        assert!(!cfg.calibrate);
        assert_eq!(cfg.header.array_name, "cv_table");
        assert_eq!(cfg.header.register_bits, 12);
        assert_eq!(cfg.calibrator.iterations, 10);
        assert_eq!(cfg.calibrator.learning_rate, 0.05);
        assert_eq!(cfg.calibrator.beta1, 0.9);
    }

    #[test]
    fn hardware_must_be_stated() {
        let cfg = Config::default();
        assert_eq!(cfg.dac(), Err(CvError::Config(ConfigError::Missing { field: "vRef" })));
        let cfg = Config { v_ref: Some(5.0), ..Default::default() };
        assert_eq!(cfg.dac(), Err(CvError::Config(ConfigError::Missing { field: "bits" })));
        let cfg = Config { v_ref: Some(-1.0), bits: Some(12), ..Default::default() };
        assert_eq!(cfg.dac(), Err(CvError::Dac(DacError::InvalidReference { v_ref: -1.0 })));
    }

    #[test]
    fn invalid_pitch_range() {
        let cfg = Config { pitch_low: 60, pitch_high: 12, ..Default::default() };
        assert_eq!(cfg.pitches(), Err(ConfigError::InvalidPitchRange { low: 60, high: 12 }));
        let cfg = Config { pitch_high: 200, ..Default::default() };
        assert!(cfg.pitches().is_err());
    }

    #[test]
    fn parse_error_position() {
        let src = "{\n  \"vRef\": 5.0,\n  \"bits\": twelve\n}";
        let err = Config::from_json(src).unwrap_err();
        let ConfigError::Parse { line, message, .. } = &err else {
            panic!("expected parse error, got {err:?}");
        };
        assert_eq!(*line, 3);
        assert!(!message.contains("at line"));

        let rendered = render_diagnostic("cvtune.json", src, &err);
        assert!(rendered.contains("invalid configuration"), "{rendered}");
        assert!(rendered.contains("cvtune.json"), "{rendered}");
        assert!(rendered.contains(message.as_str()), "{rendered}");
    }

    #[test]
    fn unknown_policy_is_rejected() {
        let err = Config::from_json(r#"{ "policy": "wrap" }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn json_roundtrip() {
        let cfg = Config { v_ref: Some(8.0), bits: Some(12), ..Default::default() };
        let json = serde_json::to_string_pretty(&cfg).unwrap();
        assert!(json.contains("\"vRef\""));
        assert_eq!(Config::from_json(&json).unwrap(), cfg);
    }

    #[test]
    fn char_offsets() {
        let src = "ab\ncd\nef";
        assert_eq!(char_offset(src, 1, 1), 0);
        assert_eq!(char_offset(src, 2, 2), 4);
        assert_eq!(char_offset(src, 3, 9), 8);
    }
}
