//! `marsha-middleware` – transport glue.
//!
//! Moves data between the motion layer and the outside world without caring
//! about its meaning.
//!
//! # Modules
//!
//! - [`bus`] – topic-based telemetry bus built on Tokio broadcast channels.
//!   Pose reports, motion status, joint states, and alerts flow through it.
//! - [`wire`] – JSON codec for inbound `pos_cmd` / `get_state` frames.

pub mod bus;
pub mod wire;

pub use bus::{EventBus, Topic, TopicReceiver};
pub use wire::{InboundMessage, MAX_MESSAGE_BYTES};
