//! Conversions between real values and fixed-point integers.
//!
//! A fixed-point number `i` with exponent `e` represents the real value `i * 2^e`.

/// Widest fixed-point word, fixed-point values are held in an `i64`.
pub const MAX_FIXED_WIDTH: u64 = 64;

/// The smallest exponent for which `value` still fits in a signed integer of `width` bits.
/// Widths below 2 are treated as 2.
pub fn fixed_point_exponent(value: f64, width: u64) -> i64 {
    if value == 0.0 {
        return 0;
    }
    let width = width.clamp(2, MAX_FIXED_WIDTH) as i32;
    let max_int = 2f64.powi(width - 1) - 1.0;
    (value.abs() / max_int).log2().ceil() as i64
}

pub fn float_to_fixed(value: f64, exponent: i64) -> i64 {
    (value * 2f64.powi(-exponent as i32)).round() as i64
}

pub fn fixed_to_float(value: i64, exponent: i64) -> f64 {
    value as f64 * 2f64.powi(exponent as i32)
}

#[cfg(test)]
mod test {
    use crate::util::fixed::{fixed_point_exponent, fixed_to_float, float_to_fixed, MAX_FIXED_WIDTH};

    #[test]
    fn exponent_fits_value() {
        for &value in &[1e-9, 0.37, 1.0, 3.5, -12.25, 1e6] {
            for width in [8, 16, 25] {
                let exp = fixed_point_exponent(value, width);
                let fixed = float_to_fixed(value, exp);
                let max_int = (1i64 << (width - 1)) - 1;
                assert!(fixed.abs() <= max_int, "value {value} width {width}");
                // one exponent less would overflow
                assert!(float_to_fixed(value, exp - 1).abs() > max_int / 2);
            }
        }
        assert_eq!(fixed_point_exponent(0.0, 16), 0);
    }

    #[test]
    fn any_width_is_total() {
        assert_eq!(fixed_point_exponent(1.0, 0), fixed_point_exponent(1.0, 2));
        assert_eq!(fixed_point_exponent(1.0, 200), fixed_point_exponent(1.0, MAX_FIXED_WIDTH));
        assert_eq!(fixed_point_exponent(1.0, 64), -63);
    }

    #[test]
    fn roundtrip_precision() {
        let exp = fixed_point_exponent(2.0, 18);
        let back = fixed_to_float(float_to_fixed(1.2345, exp), exp);
        assert!((back - 1.2345).abs() <= 2f64.powi(exp as i32));
    }
}
