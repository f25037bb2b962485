//! Control-voltage math: pitch/voltage law, DAC quantization and bias
//! calibration.
//!
//! Everything here is pure computation over `f64`. The same code backs the
//! CLI generator and the WASM bindings.

pub mod calibrator;
pub mod quantizer;
pub mod sweep;
pub mod voltage;
