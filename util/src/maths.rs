//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Map a value from one range into another.
pub fn lin_map<T>(source_range: (T, T), target_range: (T, T), value: T) -> T
where
    T: Float,
{
    target_range.0
        + ((value - source_range.0) * (target_range.1 - target_range.0)
            / (source_range.1 - source_range.0))
}

/// Limit a value to `[min, max]`.
///
/// NaN is passed through unchanged.
pub fn clamp<T>(value: T, min: T, max: T) -> T
where
    T: Float,
{
    if value > max {
        max
    } else if value < min {
        min
    } else {
        value
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_lin_map() {
        // A slider at the top of its travel (-1) is full speed
        assert_eq!(lin_map((1.0, -1.0), (0.0, 1.0), -1.0), 1.0);
        assert_eq!(lin_map((1.0, -1.0), (0.0, 1.0), 1.0), 0.0);
        assert_eq!(lin_map((1.0, -1.0), (0.0, 1.0), 0.0), 0.5);
    }

    #[test]
    fn test_clamp() {
        assert_eq!(clamp(1.5f64, 0.0, 1.0), 1.0);
        assert_eq!(clamp(-0.1f64, 0.0, 1.0), 0.0);
        assert_eq!(clamp(0.3f64, 0.0, 1.0), 0.3);
        assert!(clamp(std::f64::NAN, 0.0, 1.0).is_nan());
    }
}
