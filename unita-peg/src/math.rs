//! Deterministic scaled-integer arithmetic for the control loop.
//!
//! No floating point appears anywhere on this path; prices, gains, and
//! caps are integers against named scales. Realistic operand ranges
//! (supply ≤ 2^80 units times per-epoch caps) sit far below 128-bit
//! limits, so an overflow is a bug and the checked arithmetic panics
//! instead of wrapping.

pub use unita_types::units::{COIN_SCALE, PPM_SCALE, PRICE_SCALE, TARGET_PRICE};

/// `(a * b) / scale` with the multiply done in 128-bit width and the
/// division truncated toward zero.
pub fn scaled_mul(a: i128, b: i128, scale: i128) -> i128 {
    a.checked_mul(b)
        .and_then(|product| product.checked_div(scale))
        .expect("scaled_mul overflow")
}

/// Absolute price deviation from `target`, in parts per million.
pub fn deviation_ppm(price_scaled: i64, target: i64) -> i64 {
    let deviation = (price_scaled as i128 - target as i128).abs();
    scaled_mul(deviation, PPM_SCALE as i128, target as i128) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaled_mul_divides_after_full_width_multiply() {
        assert_eq!(scaled_mul(50_000, 50_000, PPM_SCALE as i128), 2_500);
        // A multiply that would overflow 64 bits survives in 128.
        assert_eq!(
            scaled_mul(i64::MAX as i128, 1_000_000, 1_000_000),
            i64::MAX as i128
        );
    }

    #[test]
    fn division_truncates_toward_zero() {
        assert_eq!(scaled_mul(-7, 2, 4), -3);
        assert_eq!(scaled_mul(7, 2, 4), 3);
        assert_eq!(scaled_mul(-1, 1, 2), 0);
    }

    #[test]
    fn deviation_is_symmetric_around_target() {
        assert_eq!(deviation_ppm(1_050_000, TARGET_PRICE), 50_000);
        assert_eq!(deviation_ppm(950_000, TARGET_PRICE), 50_000);
        assert_eq!(deviation_ppm(TARGET_PRICE, TARGET_PRICE), 0);
        assert_eq!(deviation_ppm(1_600_000, TARGET_PRICE), 600_000);
    }
}
