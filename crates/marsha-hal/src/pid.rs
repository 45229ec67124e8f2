//! Per-joint PID (Proportional–Integral–Derivative) position controller.
//!
//! The controller computes a correction that drives a measured joint angle
//! toward a target.  The caller supplies the measurement and elapsed time and
//! decides what to do with the output.
//!
//! # Example
//!
//! ```rust
//! use marsha_hal::pid::{Pid, PidGains};
//!
//! let mut pid = Pid::new(PidGains { kp: 1.0, ki: 0.1, kd: 0.05 });
//!
//! let output = pid.update(0.5, 0.0, 0.01); // target 0.5 rad, at 0 rad, dt 10 ms
//! assert!(output > 0.0);
//! ```

use serde::{Deserialize, Serialize};

/// Controller gains.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: 1.0,
            ki: 0.0,
            kd: 0.0,
        }
    }
}

/// A tunable PID controller with output clamping and anti-windup.
#[derive(Debug, Clone)]
pub struct Pid {
    gains: PidGains,
    integral: f64,
    last_error: Option<f64>,
    output_min: f64,
    output_max: f64,
}

impl Pid {
    /// Create a controller with unclamped output.
    pub fn new(gains: PidGains) -> Self {
        Self {
            gains,
            integral: 0.0,
            last_error: None,
            output_min: f64::NEG_INFINITY,
            output_max: f64::INFINITY,
        }
    }

    /// Clamp the output (and the integral contribution) to `[min, max]`.
    pub fn with_output_limits(mut self, min: f64, max: f64) -> Self {
        self.output_min = min;
        self.output_max = max;
        self
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }

    /// Compute the next output for `target` given `measurement`.
    ///
    /// `dt` is in seconds.  Returns `0.0` without touching internal state if
    /// `dt` is not positive.
    pub fn update(&mut self, target: f64, measurement: f64, dt: f64) -> f64 {
        if dt <= 0.0 {
            return 0.0;
        }
        let PidGains { kp, ki, kd } = self.gains;
        let error = target - measurement;

        let p = kp * error;

        self.integral += error * dt;
        let i = (ki * self.integral).clamp(self.output_min, self.output_max);
        if ki.abs() > f64::EPSILON {
            self.integral = i / ki;
        }

        let d = match self.last_error {
            Some(prev) => kd * (error - prev) / dt,
            None => 0.0,
        };
        self.last_error = Some(error);

        (p + i + d).clamp(self.output_min, self.output_max)
    }

    /// Clear the integral accumulator and derivative memory.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last_error = None;
    }
}
