//! [`DeviceRegistry`] – collects joint drivers and the gripper before the
//! adapter takes ownership of them.
//!
//! Drivers may be registered in any order.  [`DeviceRegistry::build`] checks
//! that the arm is complete (one driver per arm joint plus a gripper) and
//! hands the devices over as [`ArmDevices`], with the joint drivers sorted
//! into [`JointId::ARM`] order.

use marsha_types::{ArmError, JointArray, JointId};
use tracing::warn;

use crate::driver::JointDriver;
use crate::gripper::Gripper;

/// The complete, validated set of devices for one arm.
pub struct ArmDevices {
    /// One driver per arm joint, in [`JointId::ARM`] order.
    pub joints: Vec<Box<dyn JointDriver>>,
    pub gripper: Box<dyn Gripper>,
}

impl std::fmt::Debug for ArmDevices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let joints: Vec<JointId> = self.joints.iter().map(|d| d.joint()).collect();
        f.debug_struct("ArmDevices")
            .field("joints", &joints)
            .field("gripper", &self.gripper.state())
            .finish()
    }
}

/// Builder-style registry for arm devices.
#[derive(Default)]
pub struct DeviceRegistry {
    joints: JointArray<Option<Box<dyn JointDriver>>>,
    gripper: Option<Box<dyn Gripper>>,
}

impl DeviceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the driver for the joint it reports via
    /// [`JointDriver::joint`].  A driver already registered for that joint is
    /// replaced.
    ///
    /// # Errors
    ///
    /// Returns [`ArmError::Config`] if the driver claims the gripper joint,
    /// which must be registered with [`DeviceRegistry::register_gripper`].
    pub fn register_joint(&mut self, driver: Box<dyn JointDriver>) -> Result<(), ArmError> {
        let joint = driver.joint();
        if joint.is_gripper() {
            return Err(ArmError::Config(
                "the gripper is not a step-driven joint; use register_gripper".to_string(),
            ));
        }
        if self.joints[joint].replace(driver).is_some() {
            warn!(%joint, "replacing previously registered joint driver");
        }
        Ok(())
    }

    /// Register the gripper device, replacing any previous one.
    pub fn register_gripper(&mut self, gripper: Box<dyn Gripper>) {
        if self.gripper.replace(gripper).is_some() {
            warn!("replacing previously registered gripper");
        }
    }

    /// Joints that still lack a driver.
    pub fn missing(&self) -> Vec<JointId> {
        let mut missing: Vec<JointId> = JointId::ARM
            .into_iter()
            .filter(|j| self.joints[*j].is_none())
            .collect();
        if self.gripper.is_none() {
            missing.push(JointId::Gripper);
        }
        missing
    }

    /// Consume the registry and return the devices in fixed joint order.
    ///
    /// # Errors
    ///
    /// Returns [`ArmError::Config`] listing every joint without a device.
    pub fn build(mut self) -> Result<ArmDevices, ArmError> {
        let missing = self.missing();
        if !missing.is_empty() {
            return Err(ArmError::Config(format!(
                "arm is incomplete, no device registered for {missing:?}"
            )));
        }
        let joints = JointId::ARM
            .into_iter()
            .filter_map(|j| self.joints[j].take())
            .collect();
        let gripper = self
            .gripper
            .take()
            .ok_or_else(|| ArmError::Config("no gripper registered".to_string()))?;
        Ok(ArmDevices { joints, gripper })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marsha_types::GripCommand;

    struct NullDriver(JointId);

    impl JointDriver for NullDriver {
        fn joint(&self) -> JointId {
            self.0
        }
        fn read_ticks(&mut self) -> Result<i64, ArmError> {
            Ok(0)
        }
        fn command_steps(&mut self, _steps: i64) -> Result<(), ArmError> {
            Ok(())
        }
        fn hold(&mut self) -> Result<(), ArmError> {
            Ok(())
        }
    }

    struct NullGripper;

    impl Gripper for NullGripper {
        fn command(&mut self, _command: GripCommand) -> Result<(), ArmError> {
            Ok(())
        }
        fn state(&self) -> GripCommand {
            GripCommand::Open
        }
    }

    #[test]
    fn build_orders_joints_regardless_of_registration_order() {
        let mut registry = DeviceRegistry::new();
        for joint in JointId::ARM.into_iter().rev() {
            registry.register_joint(Box::new(NullDriver(joint))).unwrap();
        }
        registry.register_gripper(Box::new(NullGripper));

        let devices = registry.build().unwrap();
        let order: Vec<JointId> = devices.joints.iter().map(|d| d.joint()).collect();
        assert_eq!(order, JointId::ARM.to_vec());
    }

    #[test]
    fn build_reports_missing_devices() {
        let mut registry = DeviceRegistry::new();
        registry.register_joint(Box::new(NullDriver(JointId::Joint1))).unwrap();
        assert_eq!(registry.missing().len(), 6);

        let msg = match registry.build() {
            Err(ArmError::Config(msg)) => msg,
            other => panic!("expected a config error, got {:?}", other.map(|_| ())),
        };
        assert!(msg.contains("Joint2"));
        assert!(msg.contains("Gripper"));
    }

    #[test]
    fn gripper_cannot_register_as_joint() {
        let mut registry = DeviceRegistry::new();
        assert!(matches!(
            registry.register_joint(Box::new(NullDriver(JointId::Gripper))),
            Err(ArmError::Config(_))
        ));
    }
}
