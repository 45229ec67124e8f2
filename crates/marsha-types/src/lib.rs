use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod joint;

pub use joint::{ARM_JOINT_COUNT, GripCommand, JOINT_COUNT, JointArray, JointId, JointState};

/// Cartesian position in metres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance from the origin.
    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// Orientation quaternion.  Unit norm is expected but not enforced here.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Quaternion {
    pub const IDENTITY: Self = Self {
        w: 1.0,
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    pub fn norm(&self) -> f64 {
        (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// End-effector pose: position plus orientation.
///
/// This is also the payload of the inbound `pos_cmd` message.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub position: Point,
    pub orientation: Quaternion,
}

impl Pose {
    pub const fn new(position: Point, orientation: Quaternion) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// `true` when every component is a finite number.
    pub fn is_finite(&self) -> bool {
        [
            self.position.x,
            self.position.y,
            self.position.z,
            self.orientation.w,
            self.orientation.x,
            self.orientation.y,
            self.orientation.z,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = &self.position;
        let o = &self.orientation;
        write!(
            f,
            "Position [x: {:.6} y: {:.6} z: {:.6}] Orientation [x: {:.6} y: {:.6} z: {:.6} w: {:.6}]",
            p.x, p.y, p.z, o.x, o.y, o.z, o.w
        )
    }
}

/// One waypoint of a joint-space trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    pub positions: JointArray<f64>,
    pub time_from_start: Duration,
}

/// Time-parameterized joint trajectory produced by the planning backend.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Trajectory {
    pub points: Vec<TrajectoryPoint>,
}

impl Trajectory {
    pub fn new(points: Vec<TrajectoryPoint>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Time stamp of the last waypoint, or zero for an empty trajectory.
    pub fn duration(&self) -> Duration {
        self.points
            .last()
            .map(|p| p.time_from_start)
            .unwrap_or_default()
    }
}

/// Outcome of one planning request.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanResult {
    Success(Trajectory),
    Failure(String),
}

impl PlanResult {
    pub fn is_success(&self) -> bool {
        matches!(self, PlanResult::Success(_))
    }
}

/// Reported result of a single pose command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MotionStatus {
    Executed { waypoints: usize },
    PlanningFailed { reason: String },
    ExecutionFailed { reason: String },
}

/// Unified event wrapper for the telemetry bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "marsha-motion::dispatcher"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Stamp a new event with a fresh id and the current time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data routed over the telemetry bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// Answer to a `get_state` query.
    PoseReport(Pose),
    MotionStatus(MotionStatus),
    JointStates(JointState),
    /// Joints whose latest sample could not be read; positions are last-known.
    StaleSensorData { joints: Vec<JointId> },
    HardwareFault {
        component: String,
        code: u32,
        message: String,
    },
    /// The control loop woke up late and skipped `missed` cycles.
    CycleOverrun { missed: u64 },
}

/// Error taxonomy shared by the dispatcher, the hardware adapter, and glue.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArmError {
    #[error("Planning failed: {0}")]
    PlanningFailure(String),

    #[error("Execution failed: {0}")]
    ExecutionFailure(String),

    #[error("Device read failed on {joint}: {details}")]
    DeviceReadFailure { joint: JointId, details: String },

    #[error("Device write failed on {joint}: {details}")]
    DeviceWriteFailure { joint: JointId, details: String },

    #[error("Stale sensor data on {joints:?}")]
    StaleSensorData { joints: Vec<JointId> },

    #[error("Fail-safe halt: {reason}")]
    FailSafeHalt { reason: String },

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Parsing Error: {0}")]
    Parsing(String),

    #[error("Channel Error: {0}")]
    Channel(String),

    #[error("Configuration Error: {0}")]
    Config(String),
}
