//! In-process simulated arm for tests and hardware-free runs.
//!
//! [`SimArm`] builds a complete [`ArmDevices`] set through a
//! [`DeviceRegistry`] and hands back [`SimArmHandles`] that share state with
//! the drivers, so a test can script faults and observe every command the
//! adapter sent.
//!
//! # Stub behaviour
//!
//! | Device | Behaviour |
//! |---|---|
//! | [`SimJointDriver`] | A step target moves the encoder to `steps × ticks_per_step`; reads return the encoder. |
//! | [`SimGripper`] | Acknowledges every command; `state()` returns the last one. |
//!
//! Scripted faults: failed reads, corrupt (out-of-range) samples, failed
//! writes.  Each is consumed one call at a time.
//!
//! # Example
//!
//! ```rust
//! use marsha_hal::calibration::JointCalibration;
//! use marsha_hal::sim::SimArm;
//! use marsha_types::{JointArray, JointId};
//!
//! let (devices, handles) = SimArm::new(&JointArray::splat(JointCalibration::default()))
//!     .build()
//!     .unwrap();
//! assert_eq!(devices.joints.len(), 6);
//! handles.joint(JointId::Joint1).unwrap().set_ticks(128);
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use marsha_types::{ArmError, GripCommand, JointArray, JointId};

use crate::calibration::JointCalibration;
use crate::driver::JointDriver;
use crate::gripper::Gripper;
use crate::registry::{ArmDevices, DeviceRegistry};

/// Encoder value returned for a corrupt sample; far outside any sane bound.
const CORRUPT_SAMPLE: i64 = i64::MAX / 2;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated joint
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct SimJointState {
    ticks: i64,
    ticks_per_step: f64,
    commands: Vec<i64>,
    holds: usize,
    fail_reads: u32,
    corrupt_reads: u32,
    fail_writes: u32,
}

/// A simulated step-driven joint with an absolute encoder.
pub struct SimJointDriver {
    joint: JointId,
    state: Arc<Mutex<SimJointState>>,
}

/// Test-side view of a [`SimJointDriver`].
#[derive(Clone)]
pub struct SimJointHandle {
    joint: JointId,
    state: Arc<Mutex<SimJointState>>,
}

impl SimJointDriver {
    /// Create a driver and its handle.  `ticks_per_step` links the command
    /// channel to the encoder.
    pub fn new(joint: JointId, ticks_per_step: f64) -> (Box<Self>, SimJointHandle) {
        let state = Arc::new(Mutex::new(SimJointState {
            ticks_per_step,
            ..SimJointState::default()
        }));
        let handle = SimJointHandle {
            joint,
            state: Arc::clone(&state),
        };
        (Box::new(Self { joint, state }), handle)
    }
}

impl JointDriver for SimJointDriver {
    fn joint(&self) -> JointId {
        self.joint
    }

    fn read_ticks(&mut self) -> Result<i64, ArmError> {
        let mut s = lock(&self.state);
        if s.fail_reads > 0 {
            s.fail_reads -= 1;
            return Err(ArmError::DeviceReadFailure {
                joint: self.joint,
                details: "simulated encoder timeout".to_string(),
            });
        }
        if s.corrupt_reads > 0 {
            s.corrupt_reads -= 1;
            return Ok(CORRUPT_SAMPLE);
        }
        Ok(s.ticks)
    }

    fn command_steps(&mut self, steps: i64) -> Result<(), ArmError> {
        let mut s = lock(&self.state);
        if s.fail_writes > 0 {
            s.fail_writes -= 1;
            return Err(ArmError::DeviceWriteFailure {
                joint: self.joint,
                details: "simulated command channel failure".to_string(),
            });
        }
        s.commands.push(steps);
        s.ticks = (steps as f64 * s.ticks_per_step).round() as i64;
        Ok(())
    }

    fn hold(&mut self) -> Result<(), ArmError> {
        lock(&self.state).holds += 1;
        Ok(())
    }
}

impl SimJointHandle {
    pub fn joint(&self) -> JointId {
        self.joint
    }

    pub fn ticks(&self) -> i64 {
        lock(&self.state).ticks
    }

    /// Move the encoder as if the joint were pushed by hand.
    pub fn set_ticks(&self, ticks: i64) {
        lock(&self.state).ticks = ticks;
    }

    /// Every step target received, oldest first.
    pub fn commands(&self) -> Vec<i64> {
        lock(&self.state).commands.clone()
    }

    pub fn last_command(&self) -> Option<i64> {
        lock(&self.state).commands.last().copied()
    }

    pub fn hold_count(&self) -> usize {
        lock(&self.state).holds
    }

    /// Make the next `n` reads fail.
    pub fn fail_next_reads(&self, n: u32) {
        lock(&self.state).fail_reads = n;
    }

    /// Make the next `n` reads return an out-of-range sample.
    pub fn corrupt_next_reads(&self, n: u32) {
        lock(&self.state).corrupt_reads = n;
    }

    /// Make the next `n` step commands fail.
    pub fn fail_next_writes(&self, n: u32) {
        lock(&self.state).fail_writes = n;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated gripper
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct SimGripperState {
    state: GripCommand,
    commands: Vec<GripCommand>,
    fail_writes: u32,
}

/// A simulated gripper that records every command.
pub struct SimGripper {
    state: Arc<Mutex<SimGripperState>>,
}

#[derive(Clone)]
pub struct SimGripperHandle {
    state: Arc<Mutex<SimGripperState>>,
}

impl SimGripper {
    /// Create an open gripper and its handle.
    pub fn new() -> (Box<Self>, SimGripperHandle) {
        let state = Arc::new(Mutex::new(SimGripperState::default()));
        let handle = SimGripperHandle {
            state: Arc::clone(&state),
        };
        (Box::new(Self { state }), handle)
    }
}

impl Gripper for SimGripper {
    fn command(&mut self, command: GripCommand) -> Result<(), ArmError> {
        let mut s = lock(&self.state);
        if s.fail_writes > 0 {
            s.fail_writes -= 1;
            return Err(ArmError::DeviceWriteFailure {
                joint: JointId::Gripper,
                details: "simulated gripper fault".to_string(),
            });
        }
        s.state = command;
        s.commands.push(command);
        Ok(())
    }

    fn state(&self) -> GripCommand {
        lock(&self.state).state
    }
}

impl SimGripperHandle {
    pub fn state(&self) -> GripCommand {
        lock(&self.state).state
    }

    pub fn commands(&self) -> Vec<GripCommand> {
        lock(&self.state).commands.clone()
    }

    pub fn fail_next_writes(&self, n: u32) {
        lock(&self.state).fail_writes = n;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimArm
// ────────────────────────────────────────────────────────────────────────────

/// Builder for a fully simulated arm.
///
/// Each joint's `ticks_per_step` is derived from its calibration so a command
/// of `n` steps reads back as the same angle.
pub struct SimArm {
    ticks_per_step: JointArray<f64>,
}

/// Handles onto every device of a [`SimArm`].
#[derive(Clone)]
pub struct SimArmHandles {
    joints: Vec<SimJointHandle>,
    gripper: SimGripperHandle,
}

impl SimArm {
    pub fn new(calibration: &JointArray<JointCalibration>) -> Self {
        Self {
            ticks_per_step: JointArray::from_fn(|j| {
                let cal = &calibration[j];
                cal.ticks_per_degree / cal.steps_per_degree
            }),
        }
    }

    /// Register every device and return them with their handles.
    ///
    /// # Errors
    ///
    /// Propagates [`DeviceRegistry::build`] errors.
    pub fn build(self) -> Result<(ArmDevices, SimArmHandles), ArmError> {
        let mut registry = DeviceRegistry::new();
        let mut joints = Vec::with_capacity(JointId::ARM.len());
        for joint in JointId::ARM {
            let (driver, handle) = SimJointDriver::new(joint, self.ticks_per_step[joint]);
            registry.register_joint(driver)?;
            joints.push(handle);
        }
        let (gripper, gripper_handle) = SimGripper::new();
        registry.register_gripper(gripper);

        let devices = registry.build()?;
        Ok((
            devices,
            SimArmHandles {
                joints,
                gripper: gripper_handle,
            },
        ))
    }
}

impl SimArmHandles {
    /// Handle for an arm joint; `None` for the gripper.
    pub fn joint(&self, joint: JointId) -> Option<&SimJointHandle> {
        self.joints.iter().find(|h| h.joint == joint)
    }

    pub fn joints(&self) -> &[SimJointHandle] {
        &self.joints
    }

    pub fn gripper(&self) -> &SimGripperHandle {
        &self.gripper
    }
}
