//! Statistics computed over a response buffer.

/// Buffers shorter than this are never treated as a test pattern.
pub const MIN_TEST_PATTERN_LEN: usize = 10;

/// Number of leading bytes inspected for the test pattern.
pub const TEST_PATTERN_WINDOW: usize = 100;

/// Variance that maps to full activity (128^2).
pub const FULL_SCALE_VARIANCE: f64 = 16384.0;

/// Whether the buffer starts with the processor's self-test counter: every
/// byte in the first [`TEST_PATTERN_WINDOW`] bytes is the previous byte plus
/// one, wrapping at 256.
pub fn is_test_pattern(data: &[u8]) -> bool {
    if data.len() < MIN_TEST_PATTERN_LEN {
        return false;
    }
    let window = &data[..data.len().min(TEST_PATTERN_WINDOW)];
    window
        .windows(2)
        .all(|pair| pair[1] == pair[0].wrapping_add(1))
}

/// Population variance of the byte values. Zero for an empty buffer.
pub fn byte_variance(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let n = data.len() as f64;
    let mean = data.iter().map(|&b| f64::from(b)).sum::<f64>() / n;
    data.iter()
        .map(|&b| {
            let d = f64::from(b) - mean;
            d * d
        })
        .sum::<f64>()
        / n
}

/// Activity level in [0, 1]: variance scaled by [`FULL_SCALE_VARIANCE`].
pub fn activity_level(data: &[u8]) -> f64 {
    (byte_variance(data) / FULL_SCALE_VARIANCE).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_pattern_detected() {
        let data: Vec<u8> = (0..64).collect();
        assert!(is_test_pattern(&data));

        // Wraps at 256
        let wrapped: Vec<u8> = (250u16..270).map(|v| (v % 256) as u8).collect();
        assert!(is_test_pattern(&wrapped));
    }

    #[test]
    fn only_the_first_hundred_bytes_matter() {
        let mut data: Vec<u8> = (0..=255).collect();
        data[150] = 0;
        assert!(is_test_pattern(&data));
        data[50] = 0;
        assert!(!is_test_pattern(&data));
    }

    #[test]
    fn short_buffers_are_not_patterns() {
        let data: Vec<u8> = (0..9).collect();
        assert!(!is_test_pattern(&data));
        let data: Vec<u8> = (0..10).collect();
        assert!(is_test_pattern(&data));
    }

    #[test]
    fn variance_and_activity() {
        assert_eq!(byte_variance(&[]), 0.0);
        assert_eq!(byte_variance(&[7; 32]), 0.0);
        // Half 0, half 255: variance 127.5^2
        let data: Vec<u8> = [0u8, 255].repeat(50);
        assert!((byte_variance(&data) - 16256.25).abs() < 1e-9);
        assert!((activity_level(&data) - 16256.25 / 16384.0).abs() < 1e-12);
        assert!(activity_level(&data) < 1.0);
    }
}
