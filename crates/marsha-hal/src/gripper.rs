//! `Gripper` trait for the binary open/close end effector.
//!
//! The gripper does not take step targets.  It is driven with a
//! [`GripCommand`] and reports the last command the device acknowledged.

use marsha_types::{ArmError, GripCommand};

/// A discrete open/close gripper channel.
pub trait Gripper: Send {
    /// Drive the gripper open or closed.
    ///
    /// # Errors
    ///
    /// Returns [`ArmError::DeviceWriteFailure`] if the command cannot be
    /// delivered.
    fn command(&mut self, command: GripCommand) -> Result<(), ArmError>;

    /// The last command the device acknowledged.
    fn state(&self) -> GripCommand;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MockGripper {
        state: GripCommand,
    }

    impl Gripper for MockGripper {
        fn command(&mut self, command: GripCommand) -> Result<(), ArmError> {
            self.state = command;
            Ok(())
        }

        fn state(&self) -> GripCommand {
            self.state
        }
    }

    #[test]
    fn mock_gripper_toggle() {
        let mut gripper = MockGripper::default();
        assert_eq!(gripper.state(), GripCommand::Open);

        gripper.command(GripCommand::Close).unwrap();
        assert_eq!(gripper.state(), GripCommand::Close);

        gripper.command(GripCommand::Open).unwrap();
        assert_eq!(gripper.state(), GripCommand::Open);
    }
}
