//! [`PoseCommandDispatcher`] – turns inbound pose commands into arm motion.
//!
//! Each command runs one transaction against the planning backend:
//!
//! ```text
//! goal set ─▶ plan ─┬─ SUCCESS ─▶ acquire arbiter ─▶ execute (once) ─▶ Executed
//!                   └─ FAILURE ─▶ report, drop command ───────────────▶ PlanningFailed
//! ```
//!
//! A trajectory is never executed unless its plan succeeded.  There is no
//! backlog: a failed command is reported and forgotten, and the dispatcher is
//! immediately ready for the next one.
//!
//! # Concurrency
//!
//! The backend sits behind a mutex held for the whole set/plan/execute
//! transaction, so commands arriving on several worker threads are served
//! one at a time and never interleave.  Queries take the same mutex and
//! therefore wait behind an executing trajectory.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use marsha_hal::ActuatorArbiter;
//! use marsha_motion::{PoseCommandDispatcher, SimPlanner, SimPlannerConfig};
//! use marsha_types::{MotionStatus, Point, Pose, Quaternion};
//!
//! let dispatcher = PoseCommandDispatcher::new(
//!     SimPlanner::new(SimPlannerConfig::default()),
//!     Arc::new(ActuatorArbiter::new()),
//! );
//!
//! let goal = Pose::new(Point::new(0.3, 0.0, 0.5), Quaternion::IDENTITY);
//! let status = dispatcher.handle_pose_command(goal).unwrap();
//! assert!(matches!(status, MotionStatus::Executed { .. }));
//! assert_eq!(dispatcher.handle_pose_query().unwrap(), goal);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use marsha_hal::ActuatorArbiter;
use marsha_middleware::{EventBus, Topic};
use marsha_types::{ArmError, Event, EventPayload, MotionStatus, PlanResult, Pose};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::planner::PlanningBackend;

const EVENT_SOURCE: &str = "marsha-motion::dispatcher";

/// Snapshot of the dispatcher's lifetime counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherStats {
    pub commands_received: u64,
    /// Commands refused before planning (non-finite pose).
    pub commands_rejected: u64,
    pub plans_failed: u64,
    pub executions_completed: u64,
    pub executions_failed: u64,
    pub queries_answered: u64,
}

#[derive(Default)]
struct Counters {
    commands_received: AtomicU64,
    commands_rejected: AtomicU64,
    plans_failed: AtomicU64,
    executions_completed: AtomicU64,
    executions_failed: AtomicU64,
    queries_answered: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

// ─────────────────────────────────────────────────────────────────────────────
// PoseCommandDispatcher
// ─────────────────────────────────────────────────────────────────────────────

/// Serialising front end for a [`PlanningBackend`].
///
/// Shared by reference (or `Arc`) between command workers; all methods take
/// `&self`.
pub struct PoseCommandDispatcher<B: PlanningBackend> {
    backend: Mutex<B>,
    arbiter: Arc<ActuatorArbiter>,
    bus: Option<EventBus>,
    counters: Counters,
}

impl<B: PlanningBackend> PoseCommandDispatcher<B> {
    /// Take exclusive ownership of `backend`.  `arbiter` is the lease shared
    /// with the hardware control loop.
    pub fn new(backend: B, arbiter: Arc<ActuatorArbiter>) -> Self {
        Self {
            backend: Mutex::new(backend),
            arbiter,
            bus: None,
            counters: Counters::default(),
        }
    }

    /// Publish motion status and pose reports on `bus`.
    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Plan to `pose` and, only if planning succeeds, execute the result.
    ///
    /// # Errors
    ///
    /// - [`ArmError::InvalidCommand`] if any pose component is not finite.
    /// - [`ArmError::PlanningFailure`] if the backend could not plan; nothing
    ///   was executed.
    /// - [`ArmError::ExecutionFailure`] if the planned trajectory failed to
    ///   run, or the actuators are in a fail-safe halt (nothing is executed).
    #[instrument(skip(self, pose), fields(goal = %pose))]
    pub fn handle_pose_command(&self, pose: Pose) -> Result<MotionStatus, ArmError> {
        bump(&self.counters.commands_received);

        if !pose.is_finite() {
            bump(&self.counters.commands_rejected);
            warn!("rejecting pose command with non-finite components");
            return Err(ArmError::InvalidCommand(format!(
                "pose has non-finite components: {pose}"
            )));
        }

        let mut backend = self.lock_backend();
        backend.set_pose_target(&pose);

        let trajectory = match backend.plan() {
            PlanResult::Success(trajectory) => trajectory,
            PlanResult::Failure(reason) => {
                bump(&self.counters.plans_failed);
                warn!(%reason, "planning failed; command dropped");
                self.report(MotionStatus::PlanningFailed {
                    reason: reason.clone(),
                });
                return Err(ArmError::PlanningFailure(reason));
            }
        };

        let waypoints = trajectory.len();
        let _lease = match self.arbiter.acquire_for_trajectory() {
            Ok(lease) => lease,
            Err(err) => {
                bump(&self.counters.executions_failed);
                let reason = err.to_string();
                error!(%reason, "actuators halted; trajectory not executed");
                self.report(MotionStatus::ExecutionFailed {
                    reason: reason.clone(),
                });
                return Err(ArmError::ExecutionFailure(reason));
            }
        };
        info!(
            waypoints,
            duration_ms = trajectory.duration().as_millis() as u64,
            "plan succeeded; executing"
        );

        match backend.execute(&trajectory) {
            Ok(()) => {
                bump(&self.counters.executions_completed);
                info!(waypoints, "execution complete");
                let status = MotionStatus::Executed { waypoints };
                self.report(status.clone());
                Ok(status)
            }
            Err(err) => {
                bump(&self.counters.executions_failed);
                let reason = match err {
                    ArmError::ExecutionFailure(reason) => reason,
                    other => other.to_string(),
                };
                error!(%reason, "execution failed");
                self.report(MotionStatus::ExecutionFailed {
                    reason: reason.clone(),
                });
                Err(ArmError::ExecutionFailure(reason))
            }
        }
    }

    /// Report the current end-effector pose.  Never moves the arm.
    ///
    /// # Errors
    ///
    /// Propagates the backend's error if the pose is unavailable.
    #[instrument(skip(self))]
    pub fn handle_pose_query(&self) -> Result<Pose, ArmError> {
        let pose = self.lock_backend().current_pose()?;
        bump(&self.counters.queries_answered);
        info!("{pose}");
        if let Some(bus) = &self.bus {
            bus.publish_to(
                Topic::PoseReports,
                Event::new(EVENT_SOURCE, EventPayload::PoseReport(pose)),
            );
        }
        Ok(pose)
    }

    pub fn stats(&self) -> DispatcherStats {
        let c = &self.counters;
        DispatcherStats {
            commands_received: c.commands_received.load(Ordering::Relaxed),
            commands_rejected: c.commands_rejected.load(Ordering::Relaxed),
            plans_failed: c.plans_failed.load(Ordering::Relaxed),
            executions_completed: c.executions_completed.load(Ordering::Relaxed),
            executions_failed: c.executions_failed.load(Ordering::Relaxed),
            queries_answered: c.queries_answered.load(Ordering::Relaxed),
        }
    }

    fn lock_backend(&self) -> MutexGuard<'_, B> {
        self.backend.lock().unwrap_or_else(|poisoned| {
            warn!("planning backend lock poisoned by a panicked worker; recovering");
            poisoned.into_inner()
        })
    }

    fn report(&self, status: MotionStatus) {
        if let Some(bus) = &self.bus {
            let delivered = bus.publish_to(
                Topic::MotionStatus,
                Event::new(EVENT_SOURCE, EventPayload::MotionStatus(status)),
            );
            debug!(delivered, "motion status published");
        }
    }
}
