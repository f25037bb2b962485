use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum CvError {
    Dac(DacError),
    Calibration(CalibrationError),
    Emit(EmitError),
    Config(ConfigError),
}

/// Invalid DAC parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum DacError {
    InvalidReference { v_ref: f64 },
    InvalidBits { bits: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// No pitch quantizes to a valid code, at any bias tried.
    NoPitchesInRange,
    ZeroIterations,
    InvalidLearningRate { lr: f64 },
    InvalidMaxBias { max_bias: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum EmitError {
    /// The DAC resolution does not fit in the target register.
    RegisterTooNarrow { bits: u32, register_bits: u32 },
    /// A shifted code does not fit in the register.
    RegisterOverflow { pitch: u8, value: u64, register_bits: u32 },
    InvalidArrayName { name: String },
    EmptyTable,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    Parse { message: String, line: usize, column: usize },
    Missing { field: &'static str },
    InvalidPitchRange { low: u8, high: u8 },
}

impl fmt::Display for CvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CvError::Dac(e) => write!(f, "DAC error: {e}"),
            CvError::Calibration(e) => write!(f, "Calibration error: {e}"),
            CvError::Emit(e) => write!(f, "Emit error: {e}"),
            CvError::Config(e) => write!(f, "Config error: {e}"),
        }
    }
}

impl std::error::Error for CvError {}

impl fmt::Display for DacError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DacError::InvalidReference { v_ref } => {
                write!(f, "reference voltage must be positive and finite, got {v_ref}")
            }
            DacError::InvalidBits { bits } => write!(f, "bit depth must be in 1..=24, got {bits}"),
        }
    }
}

impl std::error::Error for DacError {}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationError::NoPitchesInRange => {
                write!(f, "no pitch is representable at this reference voltage and bit depth")
            }
            CalibrationError::ZeroIterations => write!(f, "iteration count must be at least 1"),
            CalibrationError::InvalidLearningRate { lr } => {
                write!(f, "learning rate must be positive and finite, got {lr}")
            }
            CalibrationError::InvalidMaxBias { max_bias } => {
                write!(f, "max bias must be positive and finite, got {max_bias}")
            }
        }
    }
}

impl std::error::Error for CalibrationError {}

impl fmt::Display for EmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmitError::RegisterTooNarrow { bits, register_bits } => write!(
                f,
                "{bits}-bit codes do not fit a {register_bits}-bit register (max 16)"
            ),
            EmitError::RegisterOverflow { pitch, value, register_bits } => write!(
                f,
                "pitch {pitch}: value 0x{value:X} overflows a {register_bits}-bit register"
            ),
            EmitError::InvalidArrayName { name } => {
                write!(f, "'{name}' is not a valid C identifier")
            }
            EmitError::EmptyTable => write!(f, "no pitch fits in the DAC range; nothing to emit"),
        }
    }
}

impl std::error::Error for EmitError {}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Parse { message, line, column } => {
                write!(f, "{message} at line {line} column {column}")
            }
            ConfigError::Missing { field } => write!(f, "missing required setting '{field}'"),
            ConfigError::InvalidPitchRange { low, high } => {
                write!(f, "invalid pitch range {low}..={high} (must be ascending, max 127)")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<DacError> for CvError {
    fn from(e: DacError) -> Self {
        CvError::Dac(e)
    }
}

impl From<CalibrationError> for CvError {
    fn from(e: CalibrationError) -> Self {
        CvError::Calibration(e)
    }
}

impl From<EmitError> for CvError {
    fn from(e: EmitError) -> Self {
        CvError::Emit(e)
    }
}

impl From<ConfigError> for CvError {
    fn from(e: ConfigError) -> Self {
        CvError::Config(e)
    }
}
