//! Lookup table construction and C header emission.
//!
//! Codes are recomputed with exact rounding at the chosen bias, then
//! shifted into the most significant bits of the DAC's input register and
//! printed as a `uint16_t` array, 12 values (one octave) per line.

use std::fmt::Write;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cv::quantizer::Dac;
use crate::cv::voltage::pitch_to_voltage;
use crate::error::EmitError;

/// Values per output line.
pub const VALUES_PER_LINE: usize = 12;

/// Widest register a `uint16_t` table can hold.
pub const MAX_REGISTER_BITS: u32 = 16;

/// What to do with a pitch whose code is out of range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutOfRangePolicy {
    /// Stop at the first unreachable pitch; every higher pitch is dropped.
    #[default]
    Truncate,
    /// Drop only the unreachable pitches.
    Skip,
}

impl FromStr for OutOfRangePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "truncate" => Ok(OutOfRangePolicy::Truncate),
            "skip" => Ok(OutOfRangePolicy::Skip),
            other => Err(format!("unknown policy '{other}' (expected 'truncate' or 'skip')")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TableEntry {
    pub pitch: u8,
    pub code: u32,
}

/// Per-pitch DAC codes, one entry per included pitch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupTable {
    pub entries: Vec<TableEntry>,
    /// Pitches left out of the table, in input order.
    pub excluded: Vec<u8>,
    pub bias: f64,
    pub bits: u32,
}

impl LookupTable {
    /// Quantize `pitches` in the order given.
    pub fn build(
        dac: &Dac,
        pitches: impl IntoIterator<Item = u8>,
        bias: f64,
        policy: OutOfRangePolicy,
    ) -> Self {
        let mut entries = Vec::new();
        let mut excluded = Vec::new();
        let mut pitches = pitches.into_iter();

        while let Some(pitch) = pitches.next() {
            let q = dac.quantize(pitch_to_voltage(pitch as f64) + bias);
            match q.valid_code() {
                Some(code) => entries.push(TableEntry { pitch, code }),
                None => {
                    excluded.push(pitch);
                    if policy == OutOfRangePolicy::Truncate {
                        warn!(
                            "pitch {pitch}: code {} exceeds {}-bit range, truncating table",
                            q.code,
                            dac.bits()
                        );
                        excluded.extend(pitches.by_ref());
                        break;
                    }
                    warn!("pitch {pitch}: code {} exceeds {}-bit range, skipped", q.code, dac.bits());
                }
            }
        }

        LookupTable { entries, excluded, bias, bits: dac.bits() }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn codes(&self) -> Vec<u32> {
        self.entries.iter().map(|e| e.code).collect()
    }
}

/// How the table is laid out for the firmware.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HeaderFormat {
    pub array_name: String,
    /// Width of the DAC input register the codes are left-aligned in.
    pub register_bits: u32,
}

impl Default for HeaderFormat {
    fn default() -> Self {
        HeaderFormat {
            array_name: "pitch_lookup".to_string(),
            register_bits: 16,
        }
    }
}

impl HeaderFormat {
    /// Codes shifted left by `register_bits - bits`.
    pub fn register_values(&self, table: &LookupTable) -> Result<Vec<u16>, EmitError> {
        if table.bits > self.register_bits || self.register_bits > MAX_REGISTER_BITS {
            return Err(EmitError::RegisterTooNarrow {
                bits: table.bits,
                register_bits: self.register_bits,
            });
        }
        let shift = self.register_bits - table.bits;

        table
            .entries
            .iter()
            .map(|e| {
                let value = (e.code as u64) << shift;
                if value >> self.register_bits != 0 {
                    return Err(EmitError::RegisterOverflow {
                        pitch: e.pitch,
                        value,
                        register_bits: self.register_bits,
                    });
                }
                Ok(value as u16)
            })
            .collect()
    }

    /// `uint16_t <name>[N] = { ... };`
    pub fn render_array(&self, table: &LookupTable) -> Result<String, EmitError> {
        self.render_with_storage(table, "")
    }

    /// A complete header: include guard, `<NAME>_SIZE` and a `static const` array.
    pub fn render_header(&self, table: &LookupTable, dac: &Dac) -> Result<String, EmitError> {
        let array = self.render_with_storage(table, "static const ")?;
        let upper = self.array_name.to_uppercase();

        let mut out = String::new();
        let _ = writeln!(out, "#ifndef {upper}_H");
        let _ = writeln!(out, "#define {upper}_H");
        out.push('\n');
        out.push_str("#include <stdint.h>\n\n");
        let _ = writeln!(
            out,
            "// {} V reference, {}-bit DAC, bias {:0.5} V",
            dac.v_ref(),
            dac.bits(),
            table.bias
        );
        let _ = writeln!(out, "#define {upper}_SIZE {}", table.len());
        out.push('\n');
        out.push_str(&array);
        out.push('\n');
        let _ = writeln!(out, "#endif");
        Ok(out)
    }

    fn render_with_storage(&self, table: &LookupTable, storage: &str) -> Result<String, EmitError> {
        if !is_c_identifier(&self.array_name) {
            return Err(EmitError::InvalidArrayName { name: self.array_name.clone() });
        }
        if table.is_empty() {
            return Err(EmitError::EmptyTable);
        }
        let values = self.register_values(table)?;

        let mut out = String::new();
        let _ = writeln!(out, "{storage}uint16_t {}[{}] = {{", self.array_name, values.len());
        let last = values.len() - 1;
        for (line_no, line) in values.chunks(VALUES_PER_LINE).enumerate() {
            out.push_str("    ");
            for (i, value) in line.iter().enumerate() {
                let index = line_no * VALUES_PER_LINE + i;
                let _ = write!(out, "0x{value:04X}");
                if index != last {
                    out.push(',');
                    if i + 1 != line.len() {
                        out.push(' ');
                    }
                }
            }
            out.push('\n');
        }
        out.push_str("};\n");
        Ok(out)
    }
}

fn is_c_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
