//! Joint controllers run by [`HardwareIOAdapter::update`][crate::adapter::HardwareIOAdapter::update]
//! between the read and write halves of each control cycle.
//!
//! | Controller | Command |
//! |---|---|
//! | [`IdentityController`] | `cmd = pos`; echoes the last read back to the actuators |
//! | [`HoldController`] | latches the first position it sees and keeps commanding it |
//! | [`PidPositionController`] | `cmd = pos + clamp(pid(target, pos), ±max_step)` |
//!
//! After a planned trajectory moves the arm, the adapter calls
//! [`JointController::resync`] so stateful controllers adopt the new
//! position as their reference.

use std::time::Duration;

use marsha_types::{JointArray, JointId, JointState};

use crate::pid::{Pid, PidGains};

/// Computes one cycle's joint commands from the freshest joint state.
pub trait JointController: Send {
    /// Fill `cmd` (radians, one slot per joint) from `state`.
    ///
    /// `dt` is the time since the previous cycle, including any missed
    /// periods.
    fn compute(&mut self, state: &JointState, dt: Duration, cmd: &mut JointArray<f64>);

    /// The arm was moved by someone else; take `state` as the new reference.
    fn resync(&mut self, _state: &JointState) {}
}

impl<C: JointController + ?Sized> JointController for Box<C> {
    fn compute(&mut self, state: &JointState, dt: Duration, cmd: &mut JointArray<f64>) {
        (**self).compute(state, dt, cmd);
    }

    fn resync(&mut self, state: &JointState) {
        (**self).resync(state);
    }
}

/// Pass-through controller: commands whatever was just read.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityController;

impl JointController for IdentityController {
    fn compute(&mut self, state: &JointState, _dt: Duration, cmd: &mut JointArray<f64>) {
        *cmd = state.position;
    }
}

/// Holds the arm at the first position it observes.
#[derive(Debug, Default, Clone)]
pub struct HoldController {
    latched: Option<JointArray<f64>>,
}

impl HoldController {
    pub fn new() -> Self {
        Self::default()
    }

    /// The latched hold position, once the first cycle has run.
    pub fn latched(&self) -> Option<&JointArray<f64>> {
        self.latched.as_ref()
    }

    /// Forget the latched position; the next cycle latches again.
    pub fn release(&mut self) {
        self.latched = None;
    }
}

impl JointController for HoldController {
    fn compute(&mut self, state: &JointState, _dt: Duration, cmd: &mut JointArray<f64>) {
        *cmd = *self.latched.get_or_insert(state.position);
    }

    fn resync(&mut self, state: &JointState) {
        self.latched = Some(state.position);
    }
}

/// Per-joint PID around a set-point.
///
/// The PID output is treated as a position increment and limited to
/// `max_step_rad` per cycle, so a large set-point change is approached at a
/// bounded rate rather than commanded in one jump.
///
/// Until a target is set, the first observed position becomes the target.
#[derive(Debug, Clone)]
pub struct PidPositionController {
    pids: JointArray<Pid>,
    targets: JointArray<f64>,
    seeded: bool,
    max_step_rad: f64,
}

impl PidPositionController {
    /// All joints share `gains`.  Each PID's raw output is also limited to
    /// `±max_step_rad`, which bounds its integral term.
    pub fn new(gains: PidGains, max_step_rad: f64) -> Self {
        let max_step_rad = max_step_rad.abs();
        Self {
            pids: JointArray::from_fn(|_| {
                Pid::new(gains).with_output_limits(-max_step_rad, max_step_rad)
            }),
            targets: JointArray::splat(0.0),
            seeded: false,
            max_step_rad,
        }
    }

    pub fn set_target(&mut self, joint: JointId, target_rad: f64) {
        self.seed_targets_if_unset(JointArray::splat(0.0));
        self.targets[joint] = target_rad;
    }

    pub fn set_targets(&mut self, targets: JointArray<f64>) {
        self.targets = targets;
        self.seeded = true;
    }

    fn seed_targets_if_unset(&mut self, targets: JointArray<f64>) {
        if !self.seeded {
            self.targets = targets;
            self.seeded = true;
        }
    }

    pub fn targets(&self) -> &JointArray<f64> {
        &self.targets
    }

    /// Reset every joint's integral and derivative memory.
    pub fn reset(&mut self) {
        self.pids.iter_mut().for_each(|(_, pid)| pid.reset());
    }
}

impl JointController for PidPositionController {
    fn compute(&mut self, state: &JointState, dt: Duration, cmd: &mut JointArray<f64>) {
        self.seed_targets_if_unset(state.position);
        let dt = dt.as_secs_f64();
        for (joint, pid) in self.pids.iter_mut() {
            let pos = state.position[joint];
            let step = pid
                .update(self.targets[joint], pos, dt)
                .clamp(-self.max_step_rad, self.max_step_rad);
            cmd[joint] = pos + step;
        }
    }

    fn resync(&mut self, state: &JointState) {
        self.set_targets(state.position);
        self.reset();
    }
}
