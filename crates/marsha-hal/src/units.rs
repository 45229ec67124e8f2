//! Angle unit conversions.
//!
//! The firmware speaks degrees scaled into raw units; everything above the
//! HAL speaks radians.  Both directions are pure and stateless.

use std::f64::consts::PI;

const DEG_PER_RAD: f64 = 180.0 / PI;
const RAD_PER_DEG: f64 = PI / 180.0;

/// Convert radians to degrees.
#[inline]
pub fn rad_to_deg(rad: f64) -> f64 {
    rad * DEG_PER_RAD
}

/// Convert degrees to radians.
#[inline]
pub fn deg_to_rad(deg: f64) -> f64 {
    deg * RAD_PER_DEG
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn known_angles() {
        assert!((rad_to_deg(PI) - 180.0).abs() < 1e-12);
        assert!((rad_to_deg(-PI / 2.0) + 90.0).abs() < 1e-12);
        assert!((deg_to_rad(360.0) - 2.0 * PI).abs() < 1e-12);
        assert_eq!(deg_to_rad(0.0), 0.0);
    }

    proptest! {
        #[test]
        fn rad_deg_rad_roundtrip(x in -4.0 * PI..4.0 * PI) {
            let back = deg_to_rad(rad_to_deg(x));
            prop_assert!((back - x).abs() <= 4.0 * f64::EPSILON * x.abs().max(1.0));
        }

        #[test]
        fn deg_rad_deg_roundtrip(d in -720.0..720.0f64) {
            let back = rad_to_deg(deg_to_rad(d));
            prop_assert!((back - d).abs() <= 4.0 * f64::EPSILON * d.abs().max(1.0));
        }
    }
}
