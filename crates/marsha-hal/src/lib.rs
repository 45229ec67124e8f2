//! `marsha-hal` – Hardware Abstraction Layer for the arm.
//!
//! Turns joint-space commands in radians into raw device units and back,
//! once per control cycle, and stops the arm when the devices stop answering.
//!
//! # Modules
//!
//! - [`adapter`] – [`HardwareIOAdapter`]: read / compute / write cycle,
//!   stale-sample handling, fail-safe halt.
//! - [`arbiter`] – [`ActuatorArbiter`]: who may drive the actuators right now.
//! - [`calibration`] – per-joint tick / step scales and command limits.
//! - [`controller`] – identity, hold, and PID joint controllers.
//! - [`driver`] / [`gripper`] – device traits implemented by drivers.
//! - [`fault_guard`] – consecutive-failure detector.
//! - [`pid`] – scalar PID used by the position controller.
//! - [`registry`] – collects drivers and checks the arm is complete.
//! - [`sim`] – simulated devices for tests and hardware-free runs.
//! - [`units`] – radians ↔ degrees.

pub mod adapter;
pub mod arbiter;
pub mod calibration;
pub mod controller;
pub mod driver;
pub mod fault_guard;
pub mod gripper;
pub mod pid;
pub mod registry;
pub mod sim;
pub mod units;

pub use adapter::{
    AdapterConfig, AdapterStats, CycleReport, HardwareIOAdapter, ReadReport, Tick, WriteReport,
};
pub use arbiter::{ActuatorArbiter, ActuatorLease};
pub use calibration::{GripperCalibration, JointCalibration};
pub use controller::{HoldController, IdentityController, JointController, PidPositionController};
pub use driver::JointDriver;
pub use gripper::Gripper;
pub use registry::{ArmDevices, DeviceRegistry};
