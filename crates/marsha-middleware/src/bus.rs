//! Headless, topic-based publish/subscribe telemetry bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the publisher.  Publishing is synchronous, so both the control-loop thread
//! and blocking command workers can publish without a runtime handle.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::PoseReports`] | Answers to `get_state` queries |
//! | [`Topic::MotionStatus`] | Outcome of every pose command |
//! | [`Topic::JointStates`] | Periodic joint-space snapshots from the control loop |
//! | [`Topic::SystemAlerts`] | Stale sensors, device faults, fail-safe halts, overruns |

use marsha_types::Event;
use tokio::sync::broadcast;
use tracing::warn;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Routing lanes on the telemetry bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    PoseReports,
    MotionStatus,
    JointStates,
    SystemAlerts,
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    pose_reports: broadcast::Sender<Event>,
    motion_status: broadcast::Sender<Event>,
    joint_states: broadcast::Sender<Event>,
    system_alerts: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every topic channel independently.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero (a tokio broadcast restriction).
    pub fn new(capacity: usize) -> Self {
        let (pose_reports, _) = broadcast::channel(capacity);
        let (motion_status, _) = broadcast::channel(capacity);
        let (joint_states, _) = broadcast::channel(capacity);
        let (system_alerts, _) = broadcast::channel(capacity);
        Self {
            pose_reports,
            motion_status,
            joint_states,
            system_alerts,
        }
    }

    /// Publish `event` to the given [`Topic`] channel.
    ///
    /// Returns the number of active receivers that were handed the event.
    /// No subscriber is a normal condition for telemetry and yields `0`.
    pub fn publish_to(&self, topic: Topic, event: Event) -> usize {
        self.topic_sender(topic).send(event).unwrap_or(0)
    }

    /// Subscribe to a specific [`Topic`] channel.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    /// Number of receivers currently listening on `topic`.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.topic_sender(topic).receiver_count()
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::PoseReports => &self.pose_reports,
            Topic::MotionStatus => &self.motion_status,
            Topic::JointStates => &self.joint_states,
            Topic::SystemAlerts => &self.system_alerts,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// A receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Lagged receivers skip the dropped events with a warning.  Returns
    /// `None` once the bus has shut down.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = ?self.topic, lagged_by = n, "TopicReceiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking receive, usable from plain threads and tests.
    ///
    /// Returns `None` when no event is buffered or the bus is closed.
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!(topic = ?self.topic, lagged_by = n, "TopicReceiver lagged");
                }
                Err(_) => return None,
            }
        }
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marsha_types::{EventPayload, JointId, MotionStatus};

    fn make_event(source: &str) -> Event {
        Event::new(
            source,
            EventPayload::MotionStatus(MotionStatus::Executed { waypoints: 2 }),
        )
    }

    #[test]
    fn publish_without_subscribers_is_not_an_error() {
        let bus = EventBus::default();
        assert_eq!(bus.publish_to(Topic::PoseReports, make_event("test")), 0);
    }

    #[tokio::test]
    async fn topic_multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut subscriber1 = bus.subscribe_to(Topic::MotionStatus);
        let mut subscriber2 = bus.subscribe_to(Topic::MotionStatus);

        let event = make_event("marsha-motion::dispatcher");
        assert_eq!(bus.publish_to(Topic::MotionStatus, event.clone()), 2);

        let recv1 = subscriber1.recv().await.expect("subscriber 1 must receive");
        let recv2 = subscriber2.recv().await.expect("subscriber 2 must receive");
        assert_eq!(recv1.id, event.id);
        assert_eq!(recv2.id, event.id);
    }

    #[tokio::test]
    async fn topic_subscriber_does_not_receive_other_topic_events() {
        let bus = EventBus::default();
        let mut alerts = bus.subscribe_to(Topic::SystemAlerts);

        bus.publish_to(Topic::JointStates, make_event("marsha-runtime::control_loop"));

        let result =
            tokio::time::timeout(std::time::Duration::from_millis(50), alerts.recv()).await;
        assert!(
            result.is_err(),
            "SystemAlerts subscriber must not receive a JointStates event"
        );
    }

    #[test]
    fn try_recv_skips_lagged_events() {
        let bus = EventBus::new(4);
        let mut slow = bus.subscribe_to(Topic::SystemAlerts);
        for _ in 0..32 {
            bus.publish_to(
                Topic::SystemAlerts,
                Event::new(
                    "flood",
                    EventPayload::StaleSensorData {
                        joints: vec![JointId::Joint1],
                    },
                ),
            );
        }
        // The receiver recovers from the lag and still yields the newest events.
        assert!(slow.try_recv().is_some());
        assert_eq!(slow.topic(), Topic::SystemAlerts);
    }

    #[test]
    fn try_recv_empty_returns_none() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe_to(Topic::PoseReports);
        assert!(rx.try_recv().is_none());
        assert_eq!(bus.subscriber_count(Topic::PoseReports), 1);
    }
}
