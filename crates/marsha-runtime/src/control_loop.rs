//! [`ControlLoop`] – fixed-rate hardware cycle on a dedicated OS thread.
//!
//! Each period the loop builds a [`Tick`] and runs
//! [`HardwareIOAdapter::update`] with the configured [`JointController`].
//!
//! # Timing
//!
//! Deadlines are absolute (`next += period`), so scheduling jitter does not
//! accumulate.  When the thread wakes one or more full periods after its
//! deadline, the skipped periods are counted, carried in the tick as
//! `missed`, and published as a [`EventPayload::CycleOverrun`] alert.  The
//! schedule then resumes from the current period; missed cycles are never
//! run back to back to catch up.
//!
//! # Telemetry
//!
//! | Condition | Topic | Payload |
//! |---|---|---|
//! | every `joint_state_every` cycles | [`Topic::JointStates`] | [`EventPayload::JointStates`] |
//! | stale joints in a read, halted or not | [`Topic::SystemAlerts`] | [`EventPayload::StaleSensorData`] |
//! | overrun | [`Topic::SystemAlerts`] | [`EventPayload::CycleOverrun`] |
//! | halt latched / cycle error | [`Topic::SystemAlerts`] | [`EventPayload::HardwareFault`] |
//!
//! # Shutdown
//!
//! The loop polls a shared `AtomicBool` once per cycle.  On exit it sends
//! `hold()` to every joint through the adapter.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use marsha_hal::{AdapterStats, HardwareIOAdapter, JointController, Tick};
use marsha_middleware::{EventBus, Topic};
use marsha_types::{ArmError, Event, EventPayload};
use tracing::{debug, error, info, warn};

const EVENT_SOURCE: &str = "marsha-runtime::control_loop";
const THREAD_NAME: &str = "marsha-control";

/// Fault code for a latched fail-safe halt.
pub const FAULT_CODE_HALT: u32 = 1;
/// Fault code for any other failed cycle.
pub const FAULT_CODE_CYCLE: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlLoopConfig {
    pub period: Duration,
    /// Publish a joint-state snapshot every this many cycles; 0 disables.
    pub joint_state_every: u32,
    /// Stop after this many cycles.  `None` runs until shutdown.
    pub max_cycles: Option<u64>,
}

impl Default for ControlLoopConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(10),
            joint_state_every: 10,
            max_cycles: None,
        }
    }
}

/// What the loop did before it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlLoopSummary {
    pub cycles: u64,
    pub overruns: u64,
    pub adapter: AdapterStats,
}

/// Handle to a running control-loop thread.
pub struct ControlLoop {
    shutdown: Arc<AtomicBool>,
    handle: JoinHandle<ControlLoopSummary>,
}

impl ControlLoop {
    /// Start the loop on its own named thread.
    ///
    /// Setting `shutdown` (or calling [`ControlLoop::stop`]) ends it at the
    /// next cycle boundary.
    ///
    /// # Errors
    ///
    /// Returns [`ArmError::Config`] for a zero period and
    /// [`ArmError::Channel`] if the OS refuses to create the thread.
    pub fn spawn<C>(
        adapter: HardwareIOAdapter,
        controller: C,
        config: ControlLoopConfig,
        bus: EventBus,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self, ArmError>
    where
        C: JointController + 'static,
    {
        if config.period.is_zero() {
            return Err(ArmError::Config("control period must be non-zero".to_string()));
        }
        let flag = Arc::clone(&shutdown);
        let handle = std::thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || run(adapter, controller, &config, &bus, &flag))
            .map_err(|e| ArmError::Channel(format!("failed to spawn control loop: {e}")))?;
        Ok(Self { shutdown, handle })
    }

    /// `true` once the thread has returned.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Request shutdown and wait for the thread.
    ///
    /// # Errors
    ///
    /// Returns [`ArmError::Channel`] if the loop thread panicked.
    pub fn stop(self) -> Result<ControlLoopSummary, ArmError> {
        self.shutdown.store(true, Ordering::Release);
        self.join()
    }

    /// Wait for the thread without requesting shutdown.
    ///
    /// # Errors
    ///
    /// Returns [`ArmError::Channel`] if the loop thread panicked.
    pub fn join(self) -> Result<ControlLoopSummary, ArmError> {
        self.handle
            .join()
            .map_err(|_| ArmError::Channel("control loop thread panicked".to_string()))
    }
}

/// Run the loop on the calling thread until `shutdown` is set or
/// `max_cycles` is reached.
pub fn run<C: JointController>(
    mut adapter: HardwareIOAdapter,
    mut controller: C,
    config: &ControlLoopConfig,
    bus: &EventBus,
    shutdown: &AtomicBool,
) -> ControlLoopSummary {
    let period = config.period;
    let mut next = Instant::now() + period;
    let mut last = Instant::now();
    let mut sequence: u64 = 0;
    let mut overruns: u64 = 0;
    let mut halt_reported = false;

    info!(period_ms = period.as_millis() as u64, "control loop started");

    while !shutdown.load(Ordering::Acquire) {
        if config.max_cycles.is_some_and(|max| sequence >= max) {
            break;
        }

        let now = Instant::now();
        if now < next {
            std::thread::sleep(next - now);
        }
        let woke = Instant::now();

        let missed = missed_periods(woke.saturating_duration_since(next), period);
        if missed > 0 {
            overruns += 1;
            next += period.saturating_mul(u32::try_from(missed).unwrap_or(u32::MAX));
            publish(bus, Topic::SystemAlerts, EventPayload::CycleOverrun { missed });
        }
        next += period;

        let tick = Tick {
            sequence,
            dt: woke.saturating_duration_since(last),
            missed,
        };
        last = woke;

        // A failed cycle still read every joint first.
        let stale = match adapter.update(&tick, &mut controller) {
            Ok(report) => {
                if halt_reported && !adapter.is_halted() {
                    info!("adapter resumed after halt");
                    halt_reported = false;
                }
                report.stale
            }
            Err(ArmError::FailSafeHalt { reason }) => {
                if !halt_reported {
                    publish(
                        bus,
                        Topic::SystemAlerts,
                        EventPayload::HardwareFault {
                            component: "marsha-hal::adapter".to_string(),
                            code: FAULT_CODE_HALT,
                            message: reason,
                        },
                    );
                    halt_reported = true;
                }
                adapter.stale_joints()
            }
            Err(err) => {
                error!(sequence, error = %err, "control cycle failed");
                publish(
                    bus,
                    Topic::SystemAlerts,
                    EventPayload::HardwareFault {
                        component: "marsha-hal::adapter".to_string(),
                        code: FAULT_CODE_CYCLE,
                        message: err.to_string(),
                    },
                );
                halt_reported |= adapter.is_halted();
                adapter.stale_joints()
            }
        };
        if !stale.is_empty() {
            publish(
                bus,
                Topic::SystemAlerts,
                EventPayload::StaleSensorData { joints: stale },
            );
        }

        if config.joint_state_every > 0 && sequence % u64::from(config.joint_state_every) == 0 {
            publish(
                bus,
                Topic::JointStates,
                EventPayload::JointStates(*adapter.joint_state()),
            );
        }
        sequence += 1;
    }

    if let Err(err) = adapter.hold_all() {
        warn!(error = %err, "hold on shutdown did not reach every joint");
    }
    let stats = adapter.stats();
    info!(
        cycles = sequence,
        missed_cycles = stats.missed_cycles,
        deferred_writes = stats.deferred_writes,
        halted = stats.halted,
        "control loop stopped; joints held"
    );

    ControlLoopSummary {
        cycles: sequence,
        overruns,
        adapter: stats,
    }
}

/// Whole periods contained in `late`.
fn missed_periods(late: Duration, period: Duration) -> u64 {
    let missed = late.as_nanos() / period.as_nanos().max(1);
    u64::try_from(missed).unwrap_or(u64::MAX)
}

fn publish(bus: &EventBus, topic: Topic, payload: EventPayload) {
    let delivered = bus.publish_to(topic, Event::new(EVENT_SOURCE, payload));
    debug!(?topic, delivered, "control loop event published");
}

#[cfg(test)]
mod tests {
    use super::*;
    use marsha_hal::sim::{SimArm, SimArmHandles};
    use marsha_hal::{ActuatorArbiter, AdapterConfig, HoldController, IdentityController};
    use marsha_types::{JointArray, JointId, JointState};

    fn sim_adapter(config: AdapterConfig) -> (HardwareIOAdapter, SimArmHandles) {
        let (devices, handles) = SimArm::new(&config.calibration).build().unwrap();
        let adapter =
            HardwareIOAdapter::new(devices, config, Arc::new(ActuatorArbiter::new())).unwrap();
        (adapter, handles)
    }

    fn fast_config(max_cycles: Option<u64>) -> ControlLoopConfig {
        ControlLoopConfig {
            period: Duration::from_millis(2),
            joint_state_every: 1,
            max_cycles,
        }
    }

    #[test]
    fn missed_periods_counts_whole_periods() {
        let p = Duration::from_millis(10);
        assert_eq!(missed_periods(Duration::ZERO, p), 0);
        assert_eq!(missed_periods(Duration::from_millis(9), p), 0);
        assert_eq!(missed_periods(Duration::from_millis(10), p), 1);
        assert_eq!(missed_periods(Duration::from_millis(35), p), 3);
    }

    #[test]
    fn runs_cycles_publishes_states_and_holds_on_exit() {
        let (adapter, handles) = sim_adapter(AdapterConfig::default());
        let bus = EventBus::default();
        let mut states = bus.subscribe_to(Topic::JointStates);
        let shutdown = AtomicBool::new(false);

        let summary = run(adapter, IdentityController, &fast_config(Some(5)), &bus, &shutdown);

        assert_eq!(summary.cycles, 5);
        assert_eq!(summary.adapter.cycles, 5);
        assert!(handles.joints().iter().all(|h| h.hold_count() == 1));
        assert!(handles.joints().iter().all(|h| h.commands().len() == 5));

        let mut received = 0;
        while let Some(event) = states.try_recv() {
            assert!(matches!(event.payload, EventPayload::JointStates(_)));
            received += 1;
        }
        assert_eq!(received, 5);
    }

    /// Sleeps through several periods on its first cycle.
    struct StallOnce {
        stalled: bool,
        stall: Duration,
    }

    impl JointController for StallOnce {
        fn compute(&mut self, state: &JointState, _dt: Duration, cmd: &mut JointArray<f64>) {
            if !self.stalled {
                self.stalled = true;
                std::thread::sleep(self.stall);
            }
            *cmd = state.position;
        }
    }

    #[test]
    fn overrun_is_counted_and_reported() {
        let (adapter, _) = sim_adapter(AdapterConfig::default());
        let bus = EventBus::default();
        let mut alerts = bus.subscribe_to(Topic::SystemAlerts);
        let shutdown = AtomicBool::new(false);
        let controller = StallOnce {
            stalled: false,
            stall: Duration::from_millis(30),
        };
        let config = ControlLoopConfig {
            period: Duration::from_millis(5),
            joint_state_every: 0,
            max_cycles: Some(3),
        };

        let summary = run(adapter, controller, &config, &bus, &shutdown);

        assert!(summary.overruns >= 1);
        assert!(summary.adapter.missed_cycles >= 4);
        let overrun = std::iter::from_fn(|| alerts.try_recv())
            .find_map(|e| match e.payload {
                EventPayload::CycleOverrun { missed } => Some(missed),
                _ => None,
            })
            .expect("an overrun alert must be published");
        assert!(overrun >= 4);
    }

    #[test]
    fn halt_is_reported_once() {
        let config = AdapterConfig {
            failure_threshold: 0,
            ..AdapterConfig::default()
        };
        let (adapter, handles) = sim_adapter(config);
        handles.joint(JointId::Joint3).unwrap().fail_next_reads(u32::MAX);
        let bus = EventBus::default();
        let mut alerts = bus.subscribe_to(Topic::SystemAlerts);
        let shutdown = AtomicBool::new(false);

        let summary = run(adapter, HoldController::new(), &fast_config(Some(4)), &bus, &shutdown);
        assert!(summary.adapter.halted);
        assert_eq!(summary.adapter.halts, 1);

        let faults = std::iter::from_fn(|| alerts.try_recv())
            .filter(|e| {
                matches!(
                    e.payload,
                    EventPayload::HardwareFault {
                        code: FAULT_CODE_HALT,
                        ..
                    }
                )
            })
            .count();
        assert_eq!(faults, 1);
        // No step command ever went out.
        assert!(handles.joints().iter().all(|h| h.commands().is_empty()));
    }

    #[test]
    fn stale_joints_are_reported_while_halted() {
        let config = AdapterConfig {
            failure_threshold: 0,
            ..AdapterConfig::default()
        };
        let (adapter, handles) = sim_adapter(config);
        handles.joint(JointId::Joint3).unwrap().fail_next_reads(u32::MAX);
        let bus = EventBus::default();
        let mut alerts = bus.subscribe_to(Topic::SystemAlerts);
        let shutdown = AtomicBool::new(false);

        let summary = run(adapter, IdentityController, &fast_config(Some(5)), &bus, &shutdown);
        assert!(summary.adapter.halted);

        let stale: Vec<Vec<JointId>> = std::iter::from_fn(|| alerts.try_recv())
            .filter_map(|e| match e.payload {
                EventPayload::StaleSensorData { joints } => Some(joints),
                _ => None,
            })
            .collect();
        // The tripping cycle and every halted cycle after it.
        assert_eq!(stale.len(), 5);
        assert!(stale.iter().all(|joints| joints == &vec![JointId::Joint3]));
    }

    #[test]
    fn spawned_loop_stops_on_request() {
        let (adapter, handles) = sim_adapter(AdapterConfig::default());
        let shutdown = Arc::new(AtomicBool::new(false));
        let control = ControlLoop::spawn(
            adapter,
            IdentityController,
            fast_config(None),
            EventBus::default(),
            Arc::clone(&shutdown),
        )
        .unwrap();

        std::thread::sleep(Duration::from_millis(30));
        assert!(!control.is_finished());
        let summary = control.stop().unwrap();

        assert!(shutdown.load(Ordering::Acquire));
        assert!(summary.cycles > 0);
        assert!(handles.joints().iter().all(|h| h.hold_count() == 1));
    }

    #[test]
    fn zero_period_is_rejected() {
        let (adapter, _) = sim_adapter(AdapterConfig::default());
        let config = ControlLoopConfig {
            period: Duration::ZERO,
            ..ControlLoopConfig::default()
        };
        assert!(matches!(
            ControlLoop::spawn(
                adapter,
                IdentityController,
                config,
                EventBus::default(),
                Arc::new(AtomicBool::new(false)),
            ),
            Err(ArmError::Config(_))
        ));
    }
}
