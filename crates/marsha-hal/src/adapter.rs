//! [`HardwareIOAdapter`] – the read/compute/write bridge between a fixed-rate
//! control loop and the arm's devices.
//!
//! # Cycle
//!
//! ```text
//! read()  : ticks ─▶ validate ─▶ rad ─▶ JointState (pos, vel, effort = 0)
//! compute : JointController fills cmd from JointState
//! write() : cmd ─▶ finite? ─▶ clamp ─▶ steps ─▶ JointDriver::command_steps
//!           cmd[gripper] ─▶ Open / Close ─▶ Gripper::command (on change only)
//! ```
//!
//! # Failure policy
//!
//! A failed or implausible encoder sample never reaches `pos`: the joint keeps
//! its last-known position, is flagged stale, and is listed in the
//! [`ReadReport`].  Every joint channel has its own [`FailureGuard`] for reads
//! and one for writes.  When any guard's run of consecutive failures exceeds
//! `failure_threshold` the adapter latches a fail-safe halt: every arm joint
//! is sent [`JointDriver::hold`], writes are refused, and
//! [`ArmError::FailSafeHalt`] is returned until [`HardwareIOAdapter::reset_halt`]
//! is called.
//!
//! While a trajectory holds the [`ActuatorArbiter`], cycle writes are deferred
//! and counted instead of competing for the actuators.

use std::sync::Arc;
use std::time::Duration;

use marsha_types::{ArmError, GripCommand, JointArray, JointId, JointState};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::arbiter::ActuatorArbiter;
use crate::calibration::{GripperCalibration, JointCalibration, validate_table};
use crate::controller::JointController;
use crate::driver::JointDriver;
use crate::fault_guard::FailureGuard;
use crate::gripper::Gripper;
use crate::registry::ArmDevices;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration and reports
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct AdapterConfig {
    /// Nominal control period; the velocity estimate divides by it.
    pub period: Duration,
    /// Largest number of consecutive failures tolerated on one channel.
    pub failure_threshold: u32,
    pub calibration: JointArray<JointCalibration>,
    pub gripper: GripperCalibration,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(10),
            failure_threshold: 5,
            calibration: JointArray::splat(JointCalibration::default()),
            gripper: GripperCalibration::default(),
        }
    }
}

/// One control cycle as scheduled by the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub sequence: u64,
    /// Time since the previous tick.
    pub dt: Duration,
    /// Periods that elapsed without a tick because the loop woke late.
    pub missed: u64,
}

/// Result of one [`HardwareIOAdapter::read`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadReport {
    /// Joints whose position is last-known rather than freshly sampled.
    pub stale: Vec<JointId>,
}

impl ReadReport {
    pub fn is_fresh(&self) -> bool {
        self.stale.is_empty()
    }
}

/// Result of one [`HardwareIOAdapter::write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteReport {
    /// Commands went out.  `joints` counts accepted step commands; `gripper`
    /// is the grip command sent this cycle, if it changed.
    Dispatched {
        joints: usize,
        gripper: Option<GripCommand>,
    },
    /// A trajectory holds the actuators; nothing was sent.
    Deferred,
}

/// Result of one [`HardwareIOAdapter::update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub sequence: u64,
    pub missed: u64,
    pub stale: Vec<JointId>,
    pub write: WriteReport,
}

/// Lifetime counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterStats {
    pub cycles: u64,
    pub missed_cycles: u64,
    pub deferred_writes: u64,
    /// Reads that left at least one joint stale.
    pub stale_reads: u64,
    pub read_failures: u64,
    pub write_failures: u64,
    pub halts: u64,
    pub halted: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// HardwareIOAdapter
// ─────────────────────────────────────────────────────────────────────────────

pub struct HardwareIOAdapter {
    joints: Vec<Box<dyn JointDriver>>,
    gripper: Box<dyn Gripper>,
    config: AdapterConfig,
    arbiter: Arc<ActuatorArbiter>,

    state: JointState,
    cmd: JointArray<f64>,
    /// `true` once a joint has produced at least one good sample.
    sampled: JointArray<bool>,
    stale: JointArray<bool>,
    read_guards: JointArray<FailureGuard>,
    write_guards: JointArray<FailureGuard>,
    last_grip_sent: GripCommand,
    /// Arbiter trajectory generation the controller was last synced to.
    synced_generation: u64,

    halt_reason: Option<String>,
    stats: AdapterStats,
}

impl HardwareIOAdapter {
    /// Take ownership of `devices` and share `arbiter` with the motion side.
    ///
    /// # Errors
    ///
    /// Returns [`ArmError::Config`] if any arm joint's calibration is
    /// unusable or the control period is zero.
    pub fn new(
        devices: ArmDevices,
        config: AdapterConfig,
        arbiter: Arc<ActuatorArbiter>,
    ) -> Result<Self, ArmError> {
        validate_table(&config.calibration)?;
        if config.period.is_zero() {
            return Err(ArmError::Config("control period must be non-zero".to_string()));
        }

        let ArmDevices { joints, gripper } = devices;
        let last_grip_sent = gripper.state();
        let guard = FailureGuard::new(config.failure_threshold);

        let mut state = JointState::default();
        state.position[JointId::Gripper] = grip_position(&config.gripper, last_grip_sent);

        info!(
            period_ms = config.period.as_millis() as u64,
            failure_threshold = config.failure_threshold,
            "hardware adapter ready"
        );

        let synced_generation = arbiter.trajectory_generation();

        Ok(Self {
            joints,
            gripper,
            arbiter,
            cmd: state.position,
            state,
            sampled: JointArray::splat(false),
            stale: JointArray::splat(false),
            read_guards: JointArray::from_fn(|_| guard.clone()),
            write_guards: JointArray::from_fn(|_| guard.clone()),
            last_grip_sent,
            synced_generation,
            halt_reason: None,
            stats: AdapterStats::default(),
            config,
        })
    }

    /// Sample every joint into [`joint_state`](Self::joint_state).
    ///
    /// Reading continues while halted so telemetry stays live.
    ///
    /// # Errors
    ///
    /// Returns [`ArmError::FailSafeHalt`] when a joint's consecutive read
    /// failures exceed the threshold.
    pub fn read(&mut self) -> Result<ReadReport, ArmError> {
        let period = self.config.period.as_secs_f64();
        let mut stale = Vec::new();
        let mut tripped: Option<String> = None;

        for driver in self.joints.iter_mut() {
            let joint = driver.joint();
            let cal = &self.config.calibration[joint];
            let sample = driver
                .read_ticks()
                .and_then(|ticks| cal.validate_sample(joint, ticks));

            match sample {
                Ok(ticks) => {
                    let pos = cal.ticks_to_rad(ticks);
                    self.state.velocity[joint] = if self.sampled[joint] && !self.stale[joint] {
                        (pos - self.state.position[joint]) / period
                    } else {
                        0.0
                    };
                    self.state.position[joint] = pos;
                    self.sampled[joint] = true;
                    self.stale[joint] = false;
                    self.read_guards[joint].record_success();
                }
                Err(err) => {
                    self.stats.read_failures += 1;
                    self.state.velocity[joint] = 0.0;
                    self.stale[joint] = true;
                    stale.push(joint);
                    debug!(%joint, error = %err, "joint sample rejected");
                    if self.read_guards[joint].record_failure() && tripped.is_none() {
                        tripped = Some(format!(
                            "{joint}: {} consecutive read failures, last: {err}",
                            self.read_guards[joint].consecutive()
                        ));
                    }
                }
            }
        }

        self.state.position[JointId::Gripper] =
            grip_position(&self.config.gripper, self.gripper.state());
        self.state.velocity[JointId::Gripper] = 0.0;
        self.state.effort = JointArray::splat(0.0);

        if !stale.is_empty() {
            self.stats.stale_reads += 1;
            warn!(joints = ?stale, "stale sensor data; using last-known positions");
        }
        if let Some(reason) = tripped {
            return Err(self.trip(reason));
        }
        Ok(ReadReport { stale })
    }

    /// Send the current commands to the devices.
    ///
    /// # Errors
    ///
    /// - [`ArmError::FailSafeHalt`] while halted, or when this write pushes a
    ///   channel past the failure threshold.
    /// - [`ArmError::InvalidCommand`] for a non-finite command; this also
    ///   latches the halt.
    pub fn write(&mut self) -> Result<WriteReport, ArmError> {
        if let Some(reason) = &self.halt_reason {
            return Err(ArmError::FailSafeHalt {
                reason: reason.clone(),
            });
        }

        let arbiter = Arc::clone(&self.arbiter);
        let Some(_lease) = arbiter.try_acquire_for_control() else {
            self.stats.deferred_writes += 1;
            debug!("trajectory holds the actuators; cycle write deferred");
            return Ok(WriteReport::Deferred);
        };

        let non_finite = self
            .cmd
            .iter()
            .find(|(_, v)| !v.is_finite())
            .map(|(joint, v)| (joint, *v));
        if let Some((joint, value)) = non_finite {
            let reason = format!("non-finite command {value} for {joint}");
            self.trip(reason.clone());
            return Err(ArmError::InvalidCommand(reason));
        }

        let mut sent = 0;
        let mut tripped: Option<String> = None;

        for driver in self.joints.iter_mut() {
            let joint = driver.joint();
            let cal = &self.config.calibration[joint];
            let target = cal.clamp(self.cmd[joint]);
            if target != self.cmd[joint] {
                debug!(%joint, requested = self.cmd[joint], clamped = target, "command clamped to joint limits");
            }
            match driver.command_steps(cal.rad_to_steps(target)) {
                Ok(()) => {
                    sent += 1;
                    self.write_guards[joint].record_success();
                }
                Err(err) => {
                    self.stats.write_failures += 1;
                    warn!(%joint, error = %err, "joint command failed");
                    if self.write_guards[joint].record_failure() && tripped.is_none() {
                        tripped = Some(format!(
                            "{joint}: {} consecutive write failures, last: {err}",
                            self.write_guards[joint].consecutive()
                        ));
                    }
                }
            }
        }

        let grip = if self.config.gripper.wants_closed(self.cmd[JointId::Gripper]) {
            GripCommand::Close
        } else {
            GripCommand::Open
        };
        let mut grip_sent = None;
        if grip != self.last_grip_sent {
            match self.gripper.command(grip) {
                Ok(()) => {
                    self.last_grip_sent = grip;
                    grip_sent = Some(grip);
                    self.write_guards[JointId::Gripper].record_success();
                    debug!(command = ?grip, "gripper command sent");
                }
                Err(err) => {
                    self.stats.write_failures += 1;
                    warn!(error = %err, "gripper command failed");
                    if self.write_guards[JointId::Gripper].record_failure() && tripped.is_none() {
                        tripped = Some(format!("gripper: repeated write failures, last: {err}"));
                    }
                }
            }
        }

        if let Some(reason) = tripped {
            return Err(self.trip(reason));
        }
        Ok(WriteReport::Dispatched {
            joints: sent,
            gripper: grip_sent,
        })
    }

    /// Run one read → compute → write cycle.
    ///
    /// When a trajectory lease was released since the previous cycle, the
    /// controller is [resynced](JointController::resync) to the measured state
    /// before it computes, so it does not pull the arm back to where it was.
    ///
    /// # Errors
    ///
    /// Propagates the first error from [`read`](Self::read) or
    /// [`write`](Self::write).
    pub fn update(
        &mut self,
        tick: &Tick,
        controller: &mut dyn JointController,
    ) -> Result<CycleReport, ArmError> {
        self.stats.cycles += 1;
        if tick.missed > 0 {
            self.stats.missed_cycles += tick.missed;
            warn!(
                sequence = tick.sequence,
                missed = tick.missed,
                total_missed = self.stats.missed_cycles,
                "control cycle overrun"
            );
        }

        let read = self.read()?;
        let generation = self.arbiter.trajectory_generation();
        if generation != self.synced_generation {
            debug!(generation, "trajectory finished; controller resynced to measured state");
            controller.resync(&self.state);
            self.synced_generation = generation;
        }
        controller.compute(&self.state, tick.dt, &mut self.cmd);
        let write = self.write()?;

        Ok(CycleReport {
            sequence: tick.sequence,
            missed: tick.missed,
            stale: read.stale,
            write,
        })
    }

    /// Latch a fail-safe halt from outside the cycle, e.g. an operator stop.
    pub fn halt(&mut self, reason: impl Into<String>) -> ArmError {
        self.trip(reason.into())
    }

    /// Operator acknowledgement: clear the halt latch and every guard.
    pub fn reset_halt(&mut self) {
        if let Some(reason) = self.halt_reason.take() {
            info!(%reason, "fail-safe halt cleared");
        }
        self.stats.halted = false;
        self.arbiter.clear_halt();
        self.read_guards.iter_mut().for_each(|(_, g)| g.reset());
        self.write_guards.iter_mut().for_each(|(_, g)| g.reset());
    }

    /// Send `hold()` to every arm joint.
    ///
    /// Every joint is attempted even if an earlier one fails.
    ///
    /// # Errors
    ///
    /// Returns the first [`ArmError::DeviceWriteFailure`] encountered.
    pub fn hold_all(&mut self) -> Result<(), ArmError> {
        let mut first_err = None;
        for driver in self.joints.iter_mut() {
            if let Err(err) = driver.hold() {
                error!(joint = %driver.joint(), error = %err, "hold command failed");
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    pub fn joint_state(&self) -> &JointState {
        &self.state
    }

    pub fn commands(&self) -> &JointArray<f64> {
        &self.cmd
    }

    /// Direct access to the command buffer for callers driving
    /// [`write`](Self::write) without a controller.
    pub fn commands_mut(&mut self) -> &mut JointArray<f64> {
        &mut self.cmd
    }

    pub fn stats(&self) -> AdapterStats {
        self.stats
    }

    pub fn is_halted(&self) -> bool {
        self.halt_reason.is_some()
    }

    pub fn halt_reason(&self) -> Option<&str> {
        self.halt_reason.as_deref()
    }

    /// Joints currently reporting last-known data.
    pub fn stale_joints(&self) -> Vec<JointId> {
        self.stale
            .iter()
            .filter(|(_, s)| **s)
            .map(|(j, _)| j)
            .collect()
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    fn trip(&mut self, reason: String) -> ArmError {
        if self.halt_reason.is_none() {
            error!(%reason, "fail-safe halt latched; holding all joints");
            self.stats.halts += 1;
            self.stats.halted = true;
            // Failures here are logged by hold_all; the halt stands regardless.
            let _ = self.hold_all();
            self.arbiter.latch_halt(&reason);
            self.halt_reason = Some(reason.clone());
        }
        ArmError::FailSafeHalt { reason }
    }
}

fn grip_position(cal: &GripperCalibration, state: GripCommand) -> f64 {
    match state {
        GripCommand::Open => cal.open_rad,
        GripCommand::Close => cal.closed_rad,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{HoldController, IdentityController};
    use crate::sim::{SimArm, SimArmHandles};

    fn adapter_with(config: AdapterConfig) -> (HardwareIOAdapter, SimArmHandles, Arc<ActuatorArbiter>) {
        let (devices, handles) = SimArm::new(&config.calibration).build().unwrap();
        let arbiter = Arc::new(ActuatorArbiter::new());
        let adapter = HardwareIOAdapter::new(devices, config, Arc::clone(&arbiter)).unwrap();
        (adapter, handles, arbiter)
    }

    fn adapter() -> (HardwareIOAdapter, SimArmHandles, Arc<ActuatorArbiter>) {
        adapter_with(AdapterConfig::default())
    }

    fn tick(sequence: u64) -> Tick {
        Tick {
            sequence,
            dt: Duration::from_millis(10),
            missed: 0,
        }
    }

    #[test]
    fn identity_cycle_writes_back_what_was_read() {
        let (mut adapter, handles, _) = adapter();
        let cal = adapter.config().calibration[JointId::Joint3];
        handles.joint(JointId::Joint3).unwrap().set_ticks(1000);

        let report = adapter.update(&tick(0), &mut IdentityController).unwrap();
        assert!(report.stale.is_empty());
        assert_eq!(
            report.write,
            WriteReport::Dispatched {
                joints: 6,
                gripper: None
            }
        );

        let expected = cal.rad_to_steps(cal.ticks_to_rad(1000));
        assert_eq!(handles.joint(JointId::Joint3).unwrap().last_command(), Some(expected));
        assert_eq!(handles.joint(JointId::Joint1).unwrap().last_command(), Some(0));
    }

    #[test]
    fn velocity_is_finite_difference_over_period() {
        let (mut adapter, handles, _) = adapter();
        let j1 = handles.joint(JointId::Joint1).unwrap();
        let cal = adapter.config().calibration[JointId::Joint1];

        adapter.read().unwrap();
        assert_eq!(adapter.joint_state().velocity[JointId::Joint1], 0.0);

        j1.set_ticks(100);
        adapter.read().unwrap();
        let expected = cal.ticks_to_rad(100) / 0.010;
        assert!((adapter.joint_state().velocity[JointId::Joint1] - expected).abs() < 1e-9);
        assert!(adapter.joint_state().effort.iter().all(|(_, e)| *e == 0.0));
    }

    #[test]
    fn failed_sample_keeps_last_known_position_and_marks_stale() {
        let (mut adapter, handles, _) = adapter();
        let j2 = handles.joint(JointId::Joint2).unwrap();
        j2.set_ticks(500);
        adapter.read().unwrap();
        let known = adapter.joint_state().position[JointId::Joint2];

        j2.set_ticks(900);
        j2.fail_next_reads(1);
        let report = adapter.read().unwrap();
        assert_eq!(report.stale, vec![JointId::Joint2]);
        assert_eq!(adapter.joint_state().position[JointId::Joint2], known);
        assert_eq!(adapter.joint_state().velocity[JointId::Joint2], 0.0);
        assert_eq!(adapter.stale_joints(), vec![JointId::Joint2]);

        // The next good sample clears the flag but does not derive velocity
        // across the gap.
        let report = adapter.read().unwrap();
        assert!(report.is_fresh());
        assert_eq!(adapter.joint_state().velocity[JointId::Joint2], 0.0);
        assert_eq!(adapter.stats().stale_reads, 1);
    }

    #[test]
    fn corrupt_sample_is_rejected() {
        let (mut adapter, handles, _) = adapter();
        handles.joint(JointId::Joint6).unwrap().corrupt_next_reads(1);
        let report = adapter.read().unwrap();
        assert_eq!(report.stale, vec![JointId::Joint6]);
        assert_eq!(adapter.joint_state().position[JointId::Joint6], 0.0);
        assert_eq!(adapter.stats().read_failures, 1);
    }

    #[test]
    fn consecutive_read_failures_latch_halt_and_block_writes() {
        let config = AdapterConfig {
            failure_threshold: 2,
            ..AdapterConfig::default()
        };
        let (mut adapter, handles, _) = adapter_with(config);
        let j4 = handles.joint(JointId::Joint4).unwrap();
        j4.fail_next_reads(3);

        assert!(adapter.update(&tick(0), &mut IdentityController).is_ok());
        assert!(adapter.update(&tick(1), &mut IdentityController).is_ok());
        let commands_before = j4.commands().len();

        let err = adapter.update(&tick(2), &mut IdentityController).unwrap_err();
        assert!(matches!(err, ArmError::FailSafeHalt { .. }));
        assert!(adapter.is_halted());
        assert!(handles.joints().iter().all(|h| h.hold_count() == 1));

        // Nothing reaches the actuators once halted, even with clean reads.
        assert!(matches!(
            adapter.update(&tick(3), &mut IdentityController),
            Err(ArmError::FailSafeHalt { .. })
        ));
        assert_eq!(j4.commands().len(), commands_before);
        assert_eq!(adapter.stats().halts, 1);
        assert!(adapter.stats().halted);
    }

    #[test]
    fn reset_halt_resumes_commanding() {
        let config = AdapterConfig {
            failure_threshold: 0,
            ..AdapterConfig::default()
        };
        let (mut adapter, handles, arbiter) = adapter_with(config);
        handles.joint(JointId::Joint1).unwrap().fail_next_reads(1);
        assert!(adapter.read().is_err());
        assert!(adapter.write().is_err());

        assert!(arbiter.is_halted());

        adapter.reset_halt();
        assert!(!adapter.is_halted());
        assert!(!arbiter.is_halted());
        assert!(adapter.halt_reason().is_none());
        assert!(adapter.update(&tick(1), &mut IdentityController).is_ok());
    }

    #[test]
    fn write_failures_feed_the_guard() {
        let config = AdapterConfig {
            failure_threshold: 1,
            ..AdapterConfig::default()
        };
        let (mut adapter, handles, _) = adapter_with(config);
        handles.joint(JointId::Joint5).unwrap().fail_next_writes(2);

        assert!(adapter.write().is_ok());
        assert!(matches!(adapter.write(), Err(ArmError::FailSafeHalt { .. })));
        assert_eq!(adapter.stats().write_failures, 2);
    }

    #[test]
    fn write_is_deferred_while_trajectory_holds_actuators() {
        let (mut adapter, handles, arbiter) = adapter();
        let lease = arbiter.acquire_for_trajectory().unwrap();

        let report = adapter.update(&tick(0), &mut IdentityController).unwrap();
        assert_eq!(report.write, WriteReport::Deferred);
        assert!(handles.joint(JointId::Joint1).unwrap().commands().is_empty());
        assert_eq!(adapter.stats().deferred_writes, 1);

        drop(lease);
        let report = adapter.update(&tick(1), &mut IdentityController).unwrap();
        assert!(matches!(report.write, WriteReport::Dispatched { joints: 6, .. }));
    }

    #[test]
    fn gripper_is_commanded_only_on_change() {
        let (mut adapter, handles, _) = adapter();
        let closed = adapter.config().gripper.closed_rad;

        adapter.commands_mut()[JointId::Gripper] = closed;
        assert_eq!(
            adapter.write().unwrap(),
            WriteReport::Dispatched {
                joints: 6,
                gripper: Some(GripCommand::Close)
            }
        );
        adapter.write().unwrap();
        adapter.write().unwrap();
        assert_eq!(handles.gripper().commands(), vec![GripCommand::Close]);

        // The read side now reports the closed position.
        adapter.read().unwrap();
        assert_eq!(adapter.joint_state().position[JointId::Gripper], closed);

        adapter.commands_mut()[JointId::Gripper] = 0.0;
        adapter.write().unwrap();
        assert_eq!(
            handles.gripper().commands(),
            vec![GripCommand::Close, GripCommand::Open]
        );
    }

    #[test]
    fn non_finite_command_halts() {
        let (mut adapter, handles, _) = adapter();
        adapter.commands_mut()[JointId::Joint2] = f64::NAN;
        assert!(matches!(adapter.write(), Err(ArmError::InvalidCommand(_))));
        assert!(adapter.is_halted());
        assert!(handles.joint(JointId::Joint2).unwrap().commands().is_empty());
    }

    #[test]
    fn commands_are_clamped_to_joint_limits() {
        let (mut adapter, handles, _) = adapter();
        let cal = adapter.config().calibration[JointId::Joint1];
        adapter.commands_mut()[JointId::Joint1] = 10.0;
        adapter.write().unwrap();
        assert_eq!(
            handles.joint(JointId::Joint1).unwrap().last_command(),
            Some(cal.rad_to_steps(cal.max_rad))
        );
    }

    #[test]
    fn missed_cycles_are_counted() {
        let (mut adapter, _, _) = adapter();
        let late = Tick {
            sequence: 7,
            dt: Duration::from_millis(40),
            missed: 3,
        };
        let report = adapter.update(&late, &mut HoldController::new()).unwrap();
        assert_eq!(report.missed, 3);
        adapter.update(&tick(8), &mut HoldController::new()).unwrap();
        let stats = adapter.stats();
        assert_eq!(stats.cycles, 2);
        assert_eq!(stats.missed_cycles, 3);
    }

    #[test]
    fn rejects_bad_configuration() {
        let (devices, _) = SimArm::new(&JointArray::splat(JointCalibration::default()))
            .build()
            .unwrap();
        let config = AdapterConfig {
            period: Duration::ZERO,
            ..AdapterConfig::default()
        };
        assert!(matches!(
            HardwareIOAdapter::new(devices, config, Arc::new(ActuatorArbiter::new())),
            Err(ArmError::Config(_))
        ));
    }

    #[test]
    fn halt_blocks_trajectory_leases() {
        let config = AdapterConfig {
            failure_threshold: 0,
            ..AdapterConfig::default()
        };
        let (mut adapter, handles, arbiter) = adapter_with(config);
        handles.joint(JointId::Joint1).unwrap().fail_next_reads(u32::MAX);

        assert!(matches!(adapter.read(), Err(ArmError::FailSafeHalt { .. })));
        assert!(matches!(
            arbiter.acquire_for_trajectory(),
            Err(ArmError::FailSafeHalt { .. })
        ));

        adapter.halt("operator stop");
        assert_eq!(arbiter.halt_reason(), adapter.halt_reason().map(str::to_string));
    }

    #[test]
    fn controller_is_resynced_after_a_trajectory() {
        let (mut adapter, handles, arbiter) = adapter();
        let j2 = handles.joint(JointId::Joint2).unwrap();
        let cal = adapter.config().calibration[JointId::Joint2];
        let mut hold = HoldController::new();

        adapter.update(&tick(0), &mut hold).unwrap();
        assert_eq!(j2.last_command(), Some(0));

        // A trajectory moves joint 2 while it owns the actuators.
        let lease = arbiter.acquire_for_trajectory().unwrap();
        j2.set_ticks(2048);
        let report = adapter.update(&tick(1), &mut hold).unwrap();
        assert_eq!(report.write, WriteReport::Deferred);
        drop(lease);

        // The hold follows the arm to its new position instead of undoing the move.
        adapter.update(&tick(2), &mut hold).unwrap();
        let expected = cal.rad_to_steps(cal.ticks_to_rad(2048));
        assert_eq!(j2.last_command(), Some(expected));
        assert_eq!(hold.latched().map(|p| p[JointId::Joint2]), Some(cal.ticks_to_rad(2048)));
    }
}
