//! `marsha-runtime` – process-level wiring for the arm.
//!
//! # Modules
//!
//! - [`control_loop`] – [`ControlLoop`]: runs
//!   [`HardwareIOAdapter::update`][marsha_hal::HardwareIOAdapter::update] at a
//!   fixed period on a dedicated thread, counts missed periods, and publishes
//!   joint states and fault alerts on the event bus.
//! - [`command_server`] – [`CommandServer`]: a bounded queue in front of
//!   [`PoseCommandDispatcher`][marsha_motion::PoseCommandDispatcher].  A fixed
//!   number of workers handle messages concurrently; arrivals beyond the queue
//!   capacity are dropped and counted.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: global
//!   `tracing` subscriber with optional OTLP span export.
//!
//! Hardware writes from the two paths are serialized by the shared
//! [`ActuatorArbiter`][marsha_hal::ActuatorArbiter]: trajectory execution
//! waits for it, while the control loop skips its write for a cycle.

pub mod command_server;
pub mod control_loop;
pub mod telemetry;

pub use command_server::{
    CommandOutcome, CommandSender, CommandServer, CommandServerConfig, ServerStats,
};
pub use control_loop::{ControlLoop, ControlLoopConfig, ControlLoopSummary};
pub use telemetry::{TracerProviderGuard, init_tracing};
