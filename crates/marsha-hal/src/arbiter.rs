//! [`ActuatorArbiter`] – single-writer lock over the joint command channels.
//!
//! Two producers want the actuators: the motion dispatcher while it executes a
//! trajectory, and the periodic control loop.  They must never interleave
//! commands, so both go through this arbiter.
//!
//! | Caller | Method | On contention |
//! |---|---|---|
//! | Dispatcher | [`ActuatorArbiter::acquire_for_trajectory`] | blocks until free |
//! | Control loop | [`ActuatorArbiter::try_acquire_for_control`] | returns `None`, cycle write is deferred |
//!
//! The control loop must not block on a trajectory that can take seconds, so
//! it only ever tries.
//!
//! # Fail-safe halt
//!
//! The arbiter also carries the hardware adapter's halt latch.  While it is
//! set, trajectory leases are refused with [`ArmError::FailSafeHalt`], so
//! planned motion stops together with the control loop.
//!
//! # Trajectory generation
//!
//! Every released trajectory lease bumps
//! [`trajectory_generation`](ActuatorArbiter::trajectory_generation).  The
//! control side compares it between cycles to notice that the arm was moved
//! behind its back.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use marsha_types::ArmError;
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct ActuatorArbiter {
    lock: Mutex<()>,
    trajectory_active: AtomicBool,
    generation: AtomicU64,
    halt: Mutex<Option<String>>,
}

/// Exclusive right to command the actuators.  Released on drop.
#[must_use = "the lease is released as soon as it is dropped"]
pub struct ActuatorLease<'a> {
    _guard: MutexGuard<'a, ()>,
    arbiter: &'a ActuatorArbiter,
    trajectory: bool,
}

impl Drop for ActuatorLease<'_> {
    fn drop(&mut self) {
        if self.trajectory {
            self.arbiter.generation.fetch_add(1, Ordering::AcqRel);
            self.arbiter.trajectory_active.store(false, Ordering::Release);
        }
    }
}

impl ActuatorArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the actuators are free and claim them for a trajectory.
    ///
    /// # Errors
    ///
    /// Returns [`ArmError::FailSafeHalt`] while the halt latch is set,
    /// including a halt latched while this call was waiting.
    pub fn acquire_for_trajectory(&self) -> Result<ActuatorLease<'_>, ArmError> {
        let guard = self.lock.lock().unwrap_or_else(|poisoned| {
            warn!("actuator lock poisoned by a panicked holder; recovering");
            poisoned.into_inner()
        });
        if let Some(reason) = self.halt_reason() {
            return Err(ArmError::FailSafeHalt { reason });
        }
        self.trajectory_active.store(true, Ordering::Release);
        Ok(ActuatorLease {
            _guard: guard,
            arbiter: self,
            trajectory: true,
        })
    }

    /// Claim the actuators for one control cycle if nobody holds them.
    pub fn try_acquire_for_control(&self) -> Option<ActuatorLease<'_>> {
        let guard = match self.lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => {
                warn!("actuator lock poisoned by a panicked holder; recovering");
                poisoned.into_inner()
            }
            Err(TryLockError::WouldBlock) => return None,
        };
        Some(ActuatorLease {
            _guard: guard,
            arbiter: self,
            trajectory: false,
        })
    }

    /// `true` while a trajectory lease is outstanding.
    pub fn is_trajectory_active(&self) -> bool {
        self.trajectory_active.load(Ordering::Acquire)
    }

    /// Number of trajectory leases released so far.
    pub fn trajectory_generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Set the halt latch.  The first reason wins until [`clear_halt`](Self::clear_halt).
    pub fn latch_halt(&self, reason: &str) {
        let mut halt = self.halt.lock().unwrap_or_else(PoisonError::into_inner);
        if halt.is_none() {
            *halt = Some(reason.to_string());
        }
    }

    pub fn clear_halt(&self) {
        if let Some(reason) = self.halt.lock().unwrap_or_else(PoisonError::into_inner).take() {
            info!(%reason, "trajectory execution re-enabled");
        }
    }

    pub fn halt_reason(&self) -> Option<String> {
        self.halt.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn is_halted(&self) -> bool {
        self.halt_reason().is_some()
    }
}
