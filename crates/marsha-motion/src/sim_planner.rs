//! [`SimPlanner`] – in-process planning backend for tests and
//! hardware-free runs.
//!
//! The reachable workspace is a sphere of `reach_radius_m` around the arm
//! base.  A goal is rejected when it lies outside the sphere, contains
//! non-finite values, or carries a quaternion whose norm is off by more than
//! `quaternion_tolerance`.
//!
//! Accepted goals are mapped to joint angles with a closed-form stand-in for
//! inverse kinematics (base yaw, shoulder elevation, elbow extension, and the
//! goal orientation's roll/pitch/yaw on the wrist).  The trajectory linearly
//! interpolates from the current joint vector to that goal in `waypoints`
//! equal steps.  Executing it sleeps for `execution_ms` and then adopts the
//! goal as the current pose.

use std::f64::consts::FRAC_PI_2;
use std::time::Duration;

use marsha_types::{
    ArmError, JointArray, JointId, PlanResult, Pose, Quaternion, Trajectory, TrajectoryPoint,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::planner::PlanningBackend;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimPlannerConfig {
    /// Radius of the reachable sphere around the base, in metres.
    pub reach_radius_m: f64,
    /// Waypoints per trajectory; at least one is always produced.
    pub waypoints: usize,
    /// Simulated execution time of a whole trajectory.
    pub execution_ms: u64,
    /// Allowed deviation of the goal quaternion's norm from 1.
    pub quaternion_tolerance: f64,
}

impl Default for SimPlannerConfig {
    fn default() -> Self {
        Self {
            reach_radius_m: 0.8,
            waypoints: 10,
            execution_ms: 0,
            quaternion_tolerance: 1e-3,
        }
    }
}

pub struct SimPlanner {
    config: SimPlannerConfig,
    current_pose: Pose,
    current_joints: JointArray<f64>,
    target: Option<Pose>,
    /// Goal of the last successful plan, adopted on execute.
    planned: Option<Pose>,
}

impl SimPlanner {
    /// Start at the origin with every joint at zero.
    pub fn new(config: SimPlannerConfig) -> Self {
        Self {
            config,
            current_pose: Pose::default(),
            current_joints: JointArray::splat(0.0),
            target: None,
            planned: None,
        }
    }

    pub fn current_joints(&self) -> &JointArray<f64> {
        &self.current_joints
    }

    fn check_goal(&self, goal: &Pose) -> Result<(), String> {
        if !goal.is_finite() {
            return Err("goal pose has non-finite components".to_string());
        }
        let distance = goal.position.norm();
        if distance > self.config.reach_radius_m {
            return Err(format!(
                "goal is {distance:.3} m from the base, beyond the {:.3} m reach",
                self.config.reach_radius_m
            ));
        }
        let norm = goal.orientation.norm();
        if (norm - 1.0).abs() > self.config.quaternion_tolerance {
            return Err(format!("orientation quaternion is not unit length (norm {norm:.4})"));
        }
        Ok(())
    }

    fn goal_joints(&self, goal: &Pose) -> JointArray<f64> {
        let p = goal.position;
        let radial = p.x.hypot(p.y);
        let (roll, pitch, yaw) = euler(&goal.orientation);

        let mut joints = self.current_joints;
        joints[JointId::Joint1] = p.y.atan2(p.x);
        joints[JointId::Joint2] = p.z.atan2(radial);
        joints[JointId::Joint3] = FRAC_PI_2 * (1.0 - p.norm() / self.config.reach_radius_m);
        joints[JointId::Joint4] = roll;
        joints[JointId::Joint5] = pitch;
        joints[JointId::Joint6] = yaw;
        joints
    }
}

/// Roll, pitch, yaw (ZYX convention) of a unit quaternion.
fn euler(q: &Quaternion) -> (f64, f64, f64) {
    let roll = (2.0 * (q.w * q.x + q.y * q.z)).atan2(1.0 - 2.0 * (q.x * q.x + q.y * q.y));
    let pitch = (2.0 * (q.w * q.y - q.z * q.x)).clamp(-1.0, 1.0).asin();
    let yaw = (2.0 * (q.w * q.z + q.x * q.y)).atan2(1.0 - 2.0 * (q.y * q.y + q.z * q.z));
    (roll, pitch, yaw)
}

impl PlanningBackend for SimPlanner {
    fn set_pose_target(&mut self, pose: &Pose) {
        self.target = Some(*pose);
    }

    fn plan(&mut self) -> PlanResult {
        self.planned = None;
        let Some(goal) = self.target else {
            return PlanResult::Failure("no pose target set".to_string());
        };
        if let Err(reason) = self.check_goal(&goal) {
            return PlanResult::Failure(reason);
        }

        let start = self.current_joints;
        let end = self.goal_joints(&goal);
        let steps = self.config.waypoints.max(1);
        let total = Duration::from_millis(self.config.execution_ms);

        let points = (1..=steps)
            .map(|i| {
                let s = i as f64 / steps as f64;
                TrajectoryPoint {
                    positions: JointArray::from_fn(|j| start[j] + (end[j] - start[j]) * s),
                    time_from_start: total * i as u32 / steps as u32,
                }
            })
            .collect();

        debug!(waypoints = steps, "sim plan computed");
        self.planned = Some(goal);
        PlanResult::Success(Trajectory::new(points))
    }

    fn execute(&mut self, trajectory: &Trajectory) -> Result<(), ArmError> {
        let Some(last) = trajectory.points.last() else {
            return Err(ArmError::ExecutionFailure("empty trajectory".to_string()));
        };
        let duration = trajectory.duration();
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
        self.current_joints = last.positions;
        if let Some(goal) = self.planned.take() {
            self.current_pose = goal;
        }
        Ok(())
    }

    fn current_pose(&mut self) -> Result<Pose, ArmError> {
        Ok(self.current_pose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marsha_types::Point;

    fn planner() -> SimPlanner {
        SimPlanner::new(SimPlannerConfig::default())
    }

    fn pose(x: f64, y: f64, z: f64) -> Pose {
        Pose::new(Point::new(x, y, z), Quaternion::IDENTITY)
    }

    #[test]
    fn plans_reachable_goal_with_configured_waypoints() {
        let mut p = planner();
        p.set_pose_target(&pose(0.3, 0.0, 0.5));
        let PlanResult::Success(traj) = p.plan() else {
            panic!("goal within reach must plan");
        };
        assert_eq!(traj.len(), 10);
        // Base yaw is zero for a goal on the +x axis.
        assert!(traj.points[9].positions[JointId::Joint1].abs() < 1e-12);
        // First waypoint is a tenth of the way there.
        let end = traj.points[9].positions[JointId::Joint2];
        assert!((traj.points[0].positions[JointId::Joint2] - end / 10.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_goal_outside_reach() {
        let mut p = planner();
        p.set_pose_target(&pose(1.0, 1.0, 1.0));
        match p.plan() {
            PlanResult::Failure(reason) => assert!(reason.contains("reach")),
            PlanResult::Success(_) => panic!("goal beyond reach must not plan"),
        }
    }

    #[test]
    fn rejects_non_unit_quaternion() {
        let mut p = planner();
        p.set_pose_target(&Pose::new(
            Point::new(0.1, 0.1, 0.1),
            Quaternion::new(2.0, 0.0, 0.0, 0.0),
        ));
        assert!(!p.plan().is_success());
    }

    #[test]
    fn plan_without_target_fails() {
        assert!(!planner().plan().is_success());
    }

    #[test]
    fn execute_adopts_goal_pose() {
        let mut p = planner();
        let goal = pose(0.2, -0.2, 0.3);
        p.set_pose_target(&goal);
        let PlanResult::Success(traj) = p.plan() else {
            panic!("goal within reach must plan");
        };
        p.execute(&traj).unwrap();
        assert_eq!(p.current_pose().unwrap(), goal);
        assert_eq!(*p.current_joints(), traj.points[9].positions);
    }

    #[test]
    fn execute_rejects_empty_trajectory() {
        let mut p = planner();
        assert!(matches!(
            p.execute(&Trajectory::default()),
            Err(ArmError::ExecutionFailure(_))
        ));
    }

    #[test]
    fn zero_waypoints_still_yields_one_point() {
        let mut p = SimPlanner::new(SimPlannerConfig {
            waypoints: 0,
            execution_ms: 40,
            ..SimPlannerConfig::default()
        });
        p.set_pose_target(&pose(0.3, 0.0, 0.5));
        let PlanResult::Success(traj) = p.plan() else {
            panic!("goal within reach must plan");
        };
        assert_eq!(traj.len(), 1);
        assert_eq!(traj.duration(), Duration::from_millis(40));
    }
}
