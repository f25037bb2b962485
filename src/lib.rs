pub mod config;
pub mod cv;
pub mod error;
pub mod report;
pub mod table;

use serde::Serialize;
use wasm_bindgen::prelude::*;

use crate::config::Config;
use crate::cv::calibrator::{Calibration, Calibrator};
use crate::cv::quantizer::Dac;
use crate::error::CvError;
use crate::report::TuningReport;
use crate::table::LookupTable;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Everything one run produces.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Generated {
    pub dac: Dac,
    /// `None` when calibration is disabled.
    pub calibration: Option<Calibration>,
    /// Bias the table was built with.
    pub bias: f64,
    pub table: LookupTable,
    pub report: TuningReport,
    /// The bare `uint16_t` array literal.
    pub array: String,
    /// The complete header file.
    pub header: String,
}

/// Calibrate (if enabled), build the table and render it.
pub fn generate(config: &Config) -> Result<Generated, CvError> {
    let dac = config.dac()?;
    let pitches = config.pitches()?;

    let calibration = if config.calibrate {
        let calibrator = Calibrator::new(dac, pitches.clone(), config.calibrator.clone())?;
        Some(calibrator.run()?)
    } else {
        None
    };
    let bias = calibration.as_ref().map_or(0.0, |c| c.bias);

    let table = LookupTable::build(&dac, pitches.clone(), bias, config.policy);
    let report = TuningReport::new(&dac, pitches, bias);
    let array = config.header.render_array(&table)?;
    let header = config.header.render_header(&table, &dac)?;

    Ok(Generated { dac, calibration, bias, table, report, array, header })
}

fn parse_config(config_json: &str) -> Result<Config, JsValue> {
    Config::from_json(config_json).map_err(|e| JsValue::from_str(&format!("{e}")))
}

/// WASM-exposed: return the cvtune version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// WASM-exposed: generate the C header for a JSON configuration.
#[wasm_bindgen]
pub fn generate_header(config_json: &str) -> Result<String, JsValue> {
    let config = parse_config(config_json)?;
    let generated = generate(&config).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    Ok(generated.header)
}

/// WASM-exposed: run the full pipeline and return its results as a JS object.
#[wasm_bindgen]
pub fn calibrate(config_json: &str) -> Result<JsValue, JsValue> {
    let config = parse_config(config_json)?;
    let generated = generate(&config).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    serde_wasm_bindgen::to_value(&generated).map_err(|e| JsValue::from_str(&format!("{e}")))
}
