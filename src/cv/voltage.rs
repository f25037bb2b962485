//! 1V/octave pitch ↔ voltage law.

/// Semitones per volt at 1V/octave.
pub const SEMITONES_PER_VOLT: f64 = 12.0;

/// Cents per semitone.
pub const CENTS_PER_SEMITONE: f64 = 100.0;

/// Cents per volt (1200: one octave).
pub const CENTS_PER_VOLT: f64 = CENTS_PER_SEMITONE * SEMITONES_PER_VOLT;

/// Highest MIDI note number.
pub const MAX_PITCH: u8 = 127;

/// Voltage for a (possibly fractional) pitch.
pub fn pitch_to_voltage(pitch: f64) -> f64 {
    pitch / SEMITONES_PER_VOLT
}

/// Pitch for a voltage. Exact inverse of [`pitch_to_voltage`].
pub fn voltage_to_pitch(voltage: f64) -> f64 {
    voltage * SEMITONES_PER_VOLT
}

/// Tuning error of `input_pitch` against `target_pitch`, in cents.
pub fn pitch_tracking(input_pitch: f64, target_pitch: f64) -> f64 {
    CENTS_PER_SEMITONE * (input_pitch - target_pitch)
}
