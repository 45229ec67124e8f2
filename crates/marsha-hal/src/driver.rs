//! `JointDriver` trait for the six step-driven arm joints.
//!
//! A driver owns one joint's encoder input and step output in raw device
//! units.  Unit conversion, limits, and failure accounting live in the
//! [`HardwareIOAdapter`][crate::adapter::HardwareIOAdapter]; drivers only move
//! integers to and from the device.

use marsha_types::{ArmError, JointId};

/// Raw-unit I/O channel for one arm joint.
pub trait JointDriver: Send {
    /// The joint this driver is wired to.
    fn joint(&self) -> JointId;

    /// Sample the joint encoder.
    ///
    /// # Errors
    ///
    /// Returns [`ArmError::DeviceReadFailure`] when the device does not
    /// answer or answers with garbage.
    fn read_ticks(&mut self) -> Result<i64, ArmError>;

    /// Publish an absolute step target on the joint's command channel.
    ///
    /// # Errors
    ///
    /// Returns [`ArmError::DeviceWriteFailure`] when the command cannot be
    /// delivered.
    fn command_steps(&mut self, steps: i64) -> Result<(), ArmError>;

    /// Stop the joint where it is.
    ///
    /// # Errors
    ///
    /// Returns [`ArmError::DeviceWriteFailure`] when the hold signal cannot be
    /// delivered.
    fn hold(&mut self) -> Result<(), ArmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal in-process driver used only for tests.
    struct MockDriver {
        joint: JointId,
        ticks: i64,
        held: bool,
    }

    impl JointDriver for MockDriver {
        fn joint(&self) -> JointId {
            self.joint
        }

        fn read_ticks(&mut self) -> Result<i64, ArmError> {
            Ok(self.ticks)
        }

        fn command_steps(&mut self, steps: i64) -> Result<(), ArmError> {
            self.ticks = steps;
            self.held = false;
            Ok(())
        }

        fn hold(&mut self) -> Result<(), ArmError> {
            self.held = true;
            Ok(())
        }
    }

    #[test]
    fn mock_driver_command_then_read() {
        let mut driver: Box<dyn JointDriver> = Box::new(MockDriver {
            joint: JointId::Joint2,
            ticks: 0,
            held: false,
        });
        assert_eq!(driver.joint(), JointId::Joint2);
        driver.command_steps(-42).unwrap();
        assert_eq!(driver.read_ticks().unwrap(), -42);
        driver.hold().unwrap();
    }
}
