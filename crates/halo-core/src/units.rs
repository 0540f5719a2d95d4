//! Sample unit transforms.
//!
//! Raw acquisition samples are unsigned 16-bit ADC codes centred on 32768.
//! The processor consumes one byte per sample covering -1000 µV to +1040 µV
//! in 8 µV steps.

/// ADC code for 0 µV.
pub const MIDPOINT_CODE: i32 = 32768;

/// Microvolts per ADC code step.
pub const MICROVOLTS_PER_CODE: f32 = 0.195;

/// Microvolt value mapped to waveform byte 0.
pub const WAVEFORM_OFFSET_UV: f32 = 1000.0;

/// Microvolts per waveform byte step.
pub const WAVEFORM_STEP_UV: f32 = 8.0;

/// Convert a raw ADC code to microvolts.
pub fn code_to_microvolts(code: i32) -> f32 {
    (code - MIDPOINT_CODE) as f32 * MICROVOLTS_PER_CODE
}

/// Convert microvolts to a waveform byte, rounded to the nearest step and
/// clamped to 0..=255.
pub fn microvolts_to_waveform_byte(microvolts: f32) -> u8 {
    let scaled = ((microvolts + WAVEFORM_OFFSET_UV) / WAVEFORM_STEP_UV).round();
    scaled.clamp(0.0, 255.0) as u8
}

/// Convert a waveform byte back to microvolts (`byte * 8 - 1000`).
pub fn waveform_byte_to_microvolts(byte: u8) -> f32 {
    f32::from(byte) * WAVEFORM_STEP_UV - WAVEFORM_OFFSET_UV
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn midpoint_is_zero_microvolts() {
        assert_eq!(code_to_microvolts(32768), 0.0);
        assert!((code_to_microvolts(32868) - 19.5).abs() < 1e-4);
        assert!((code_to_microvolts(0) + 6389.76).abs() < 1e-2);
    }

    #[test]
    fn waveform_bytes_round_and_clamp() {
        assert_eq!(microvolts_to_waveform_byte(0.0), 125);
        assert_eq!(microvolts_to_waveform_byte(-1000.0), 0);
        // 3.9 / 8 rounds down, 4.1 / 8 rounds up
        assert_eq!(microvolts_to_waveform_byte(-996.1), 0);
        assert_eq!(microvolts_to_waveform_byte(-995.9), 1);
        assert_eq!(microvolts_to_waveform_byte(-5000.0), 0);
        assert_eq!(microvolts_to_waveform_byte(5000.0), 255);
    }

    #[test]
    fn waveform_byte_inverse() {
        assert_eq!(waveform_byte_to_microvolts(0), -1000.0);
        assert_eq!(waveform_byte_to_microvolts(125), 0.0);
        assert_eq!(waveform_byte_to_microvolts(255), 1040.0);
    }
}
