//! `marsha-motion` – pose command handling.
//!
//! # Modules
//!
//! - [`dispatcher`] – [`PoseCommandDispatcher`]: plan → execute, with
//!   execution gated on plan success, and current-pose queries.
//! - [`planner`] – the [`PlanningBackend`] trait a motion planner implements.
//! - [`sim_planner`] – [`SimPlanner`], an in-process backend with a spherical
//!   workspace.

pub mod dispatcher;
pub mod planner;
pub mod sim_planner;

pub use dispatcher::{DispatcherStats, PoseCommandDispatcher};
pub use planner::PlanningBackend;
pub use sim_planner::{SimPlanner, SimPlannerConfig};
