//! Per-joint conversion between raw device units and joint angles.
//!
//! Every arm joint has a linear calibration:
//!
//! ```text
//! read:  ticks ─(− zero_offset_ticks, ÷ ticks_per_degree)─▶ degrees ─▶ radians
//! write: radians ─▶ degrees ─(× steps_per_degree, round)─▶ steps
//! ```
//!
//! Raw samples whose magnitude exceeds `max_abs_ticks` are rejected as
//! malformed instead of being turned into a joint angle.

use marsha_types::{ArmError, JointArray, JointId};
use serde::{Deserialize, Serialize};

use crate::units::{deg_to_rad, rad_to_deg};

/// 12-bit absolute encoder, one revolution per 4096 ticks.
const DEFAULT_TICKS_PER_DEGREE: f64 = 4096.0 / 360.0;
/// 200-step motor with 16x micro-stepping.
const DEFAULT_STEPS_PER_DEGREE: f64 = 3200.0 / 360.0;

/// Linear raw-unit calibration for one arm joint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JointCalibration {
    /// Encoder ticks per degree of joint rotation.
    pub ticks_per_degree: f64,
    /// Actuator steps per degree of joint rotation.
    pub steps_per_degree: f64,
    /// Encoder reading at the joint's zero angle.
    pub zero_offset_ticks: i64,
    /// Largest plausible raw sample magnitude.
    pub max_abs_ticks: i64,
    /// Lower command limit in radians.
    pub min_rad: f64,
    /// Upper command limit in radians.
    pub max_rad: f64,
}

impl Default for JointCalibration {
    fn default() -> Self {
        Self {
            ticks_per_degree: DEFAULT_TICKS_PER_DEGREE,
            steps_per_degree: DEFAULT_STEPS_PER_DEGREE,
            zero_offset_ticks: 0,
            max_abs_ticks: 4096,
            min_rad: -std::f64::consts::PI,
            max_rad: std::f64::consts::PI,
        }
    }
}

impl JointCalibration {
    /// Check that the calibration describes a usable conversion.
    ///
    /// # Errors
    ///
    /// Returns [`ArmError::Config`] for non-positive or non-finite scales,
    /// a non-positive sample bound, or an empty command range.
    pub fn validate(&self, joint: JointId) -> Result<(), ArmError> {
        let scale_ok = |v: f64| v.is_finite() && v > 0.0;
        if !scale_ok(self.ticks_per_degree) || !scale_ok(self.steps_per_degree) {
            return Err(ArmError::Config(format!(
                "{joint}: ticks_per_degree and steps_per_degree must be positive"
            )));
        }
        if self.max_abs_ticks <= 0 {
            return Err(ArmError::Config(format!(
                "{joint}: max_abs_ticks must be positive"
            )));
        }
        if !(self.min_rad.is_finite() && self.max_rad.is_finite() && self.min_rad < self.max_rad) {
            return Err(ArmError::Config(format!(
                "{joint}: joint limits [{}, {}] are not a valid range",
                self.min_rad, self.max_rad
            )));
        }
        Ok(())
    }

    /// Reject samples outside the plausible raw range.
    ///
    /// # Errors
    ///
    /// Returns [`ArmError::DeviceReadFailure`] when `|ticks| > max_abs_ticks`.
    pub fn validate_sample(&self, joint: JointId, ticks: i64) -> Result<i64, ArmError> {
        if ticks.unsigned_abs() > self.max_abs_ticks.unsigned_abs() {
            return Err(ArmError::DeviceReadFailure {
                joint,
                details: format!(
                    "sample {ticks} exceeds plausible range ±{}",
                    self.max_abs_ticks
                ),
            });
        }
        Ok(ticks)
    }

    /// Convert an encoder sample to a joint angle in radians.
    pub fn ticks_to_rad(&self, ticks: i64) -> f64 {
        let degrees = (ticks - self.zero_offset_ticks) as f64 / self.ticks_per_degree;
        deg_to_rad(degrees)
    }

    /// Convert a joint angle in radians to the nearest actuator step count.
    pub fn rad_to_steps(&self, rad: f64) -> i64 {
        (rad_to_deg(rad) * self.steps_per_degree).round() as i64
    }

    /// Convert an actuator step count back to radians.
    pub fn steps_to_rad(&self, steps: i64) -> f64 {
        deg_to_rad(steps as f64 / self.steps_per_degree)
    }

    /// Clamp a command into `[min_rad, max_rad]`.
    pub fn clamp(&self, rad: f64) -> f64 {
        rad.clamp(self.min_rad, self.max_rad)
    }
}

/// Joint-space values that the gripper reports for its two states.
///
/// The gripper has no encoder; its position is the one implied by the last
/// acknowledged grip command.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GripperCalibration {
    pub open_rad: f64,
    pub closed_rad: f64,
}

impl Default for GripperCalibration {
    fn default() -> Self {
        Self {
            open_rad: 0.0,
            closed_rad: 0.8,
        }
    }
}

impl GripperCalibration {
    /// Commands at or past the midpoint between open and closed mean "close".
    pub fn close_threshold_rad(&self) -> f64 {
        (self.open_rad + self.closed_rad) / 2.0
    }

    /// `true` when `cmd_rad` lies on the closed side of the threshold.
    pub fn wants_closed(&self, cmd_rad: f64) -> bool {
        let threshold = self.close_threshold_rad();
        if self.closed_rad >= self.open_rad {
            cmd_rad >= threshold
        } else {
            cmd_rad <= threshold
        }
    }
}

/// Validate every arm joint in a calibration table.
///
/// The gripper slot is ignored; see [`GripperCalibration`].
pub fn validate_table(table: &JointArray<JointCalibration>) -> Result<(), ArmError> {
    JointId::ARM
        .into_iter()
        .try_for_each(|joint| table[joint].validate(joint))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_calibration() -> JointCalibration {
        JointCalibration {
            ticks_per_degree: 10.0,
            steps_per_degree: 10.0,
            ..JointCalibration::default()
        }
    }

    #[test]
    fn ticks_to_rad_applies_offset_and_scale() {
        let cal = JointCalibration {
            zero_offset_ticks: 100,
            ..unit_calibration()
        };
        // 1000 ticks − 100 offset = 900 ticks = 90°.
        let rad = cal.ticks_to_rad(1000);
        assert!((rad - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn rad_to_steps_rounds_to_nearest() {
        let cal = unit_calibration();
        assert_eq!(cal.rad_to_steps(std::f64::consts::FRAC_PI_2), 900);
        assert_eq!(cal.rad_to_steps(deg_to_rad(0.04)), 0);
        assert_eq!(cal.rad_to_steps(deg_to_rad(0.06)), 1);
        assert_eq!(cal.rad_to_steps(deg_to_rad(-0.06)), -1);
    }

    #[test]
    fn steps_to_rad_inverts_rad_to_steps_on_step_grid() {
        let cal = JointCalibration::default();
        for steps in [-1600_i64, -1, 0, 1, 799, 1600] {
            assert_eq!(cal.rad_to_steps(cal.steps_to_rad(steps)), steps);
        }
    }

    #[test]
    fn sample_bound_is_enforced() {
        let cal = JointCalibration {
            max_abs_ticks: 500,
            ..unit_calibration()
        };
        assert_eq!(cal.validate_sample(JointId::Joint1, -500).unwrap(), -500);
        assert!(matches!(
            cal.validate_sample(JointId::Joint1, 501),
            Err(ArmError::DeviceReadFailure {
                joint: JointId::Joint1,
                ..
            })
        ));
        assert!(cal.validate_sample(JointId::Joint1, i64::MIN).is_err());
    }

    #[test]
    fn validate_rejects_bad_scales_and_limits() {
        assert!(JointCalibration::default().validate(JointId::Joint2).is_ok());

        let zero_scale = JointCalibration {
            steps_per_degree: 0.0,
            ..JointCalibration::default()
        };
        assert!(matches!(
            zero_scale.validate(JointId::Joint2),
            Err(ArmError::Config(_))
        ));

        let inverted = JointCalibration {
            min_rad: 1.0,
            max_rad: -1.0,
            ..JointCalibration::default()
        };
        assert!(inverted.validate(JointId::Joint2).is_err());

        let mut table = JointArray::splat(JointCalibration::default());
        assert!(validate_table(&table).is_ok());
        table[JointId::Joint6].max_abs_ticks = 0;
        assert!(validate_table(&table).is_err());
        // The gripper slot is not part of the arm table.
        table[JointId::Joint6].max_abs_ticks = 10;
        table[JointId::Gripper].ticks_per_degree = -1.0;
        assert!(validate_table(&table).is_ok());
    }

    #[test]
    fn gripper_threshold_handles_both_orientations() {
        let grip = GripperCalibration::default();
        assert!(!grip.wants_closed(0.1));
        assert!(grip.wants_closed(0.4));
        assert!(grip.wants_closed(0.8));

        let reversed = GripperCalibration {
            open_rad: 0.8,
            closed_rad: 0.0,
        };
        assert!(reversed.wants_closed(0.1));
        assert!(!reversed.wants_closed(0.7));
    }
}
