//! `PlanningBackend` trait for the motion planner behind the dispatcher.
//!
//! A backend holds one pose target at a time, turns it into a joint-space
//! [`Trajectory`] on request, and executes trajectories on the arm.  Backends
//! are stateful and not re-entrant; the
//! [`PoseCommandDispatcher`][crate::dispatcher::PoseCommandDispatcher] owns
//! exactly one and serialises every call to it.

use marsha_types::{ArmError, PlanResult, Pose, Trajectory};

/// A motion-planning service capable of reaching end-effector poses.
pub trait PlanningBackend: Send {
    /// Replace the current goal.
    fn set_pose_target(&mut self, pose: &Pose);

    /// Plan from the current state to the goal set by
    /// [`set_pose_target`](Self::set_pose_target).
    fn plan(&mut self) -> PlanResult;

    /// Run `trajectory` on the arm.  Blocks until the motion has finished.
    ///
    /// # Errors
    ///
    /// Returns [`ArmError::ExecutionFailure`] if the motion is aborted or
    /// rejected by the controller.
    fn execute(&mut self, trajectory: &Trajectory) -> Result<(), ArmError>;

    /// Current end-effector pose.
    ///
    /// # Errors
    ///
    /// Returns an error when the arm state is unavailable.
    fn current_pose(&mut self) -> Result<Pose, ArmError>;
}
