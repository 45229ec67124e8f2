//! [`CommandServer`] – bounded, concurrent intake for pose commands and
//! queries.
//!
//! ```text
//! transport ──try_send──▶ mpsc (queue_capacity) ──▶ receive loop
//!                 │ full: drop + count              │ semaphore (worker_threads)
//!                 ▼                                 ▼
//!            overload loss                  spawn_blocking ─▶ PoseCommandDispatcher
//! ```
//!
//! The receive loop never runs dispatcher code itself.  Each message is
//! handed to Tokio's blocking pool, so a trajectory that takes seconds to
//! execute occupies one worker and nothing else.  At most `worker_threads`
//! messages are in flight; while they are, the queue absorbs bursts up to
//! `queue_capacity` and anything beyond that is dropped and counted.
//!
//! # Panics
//!
//! [`CommandServer::spawn`] must be called from within a Tokio runtime.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use marsha_middleware::InboundMessage;
use marsha_motion::{PlanningBackend, PoseCommandDispatcher};
use marsha_types::{ArmError, MotionStatus, Pose};
use serde::{Deserialize, Serialize};
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandServerConfig {
    /// Messages buffered before new arrivals are dropped.
    pub queue_capacity: usize,
    /// Messages handled concurrently.
    pub worker_threads: usize,
}

impl Default for CommandServerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
            worker_threads: 4,
        }
    }
}

/// Result of handling one inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Motion(MotionStatus),
    Pose(Pose),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStats {
    pub accepted: u64,
    /// Rejected because the queue was full.
    pub dropped: u64,
    pub handled: u64,
    /// Handled, but the dispatcher returned an error.
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    accepted: AtomicU64,
    dropped: AtomicU64,
    handled: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> ServerStats {
        ServerStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            handled: self.handled.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Cloneable producer side of the command queue.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::Sender<InboundMessage>,
    counters: Arc<Counters>,
}

impl CommandSender {
    /// Enqueue without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`ArmError::Channel`] when the queue is full (the message is
    /// dropped and counted) or the server has shut down.
    pub fn try_send(&self, message: InboundMessage) -> Result<(), ArmError> {
        match self.tx.try_send(message) {
            Ok(()) => {
                self.counters.accepted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = self.counters.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(dropped, "command queue full; message dropped");
                Err(ArmError::Channel("command queue full".to_string()))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(ArmError::Channel("command server has shut down".to_string()))
            }
        }
    }
}

pub struct CommandServer {
    sender: CommandSender,
    counters: Arc<Counters>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl CommandServer {
    /// Start the receive loop on the current Tokio runtime.
    ///
    /// Zero capacities are raised to one.
    pub fn spawn<B>(dispatcher: Arc<PoseCommandDispatcher<B>>, config: CommandServerConfig) -> Self
    where
        B: PlanningBackend + 'static,
    {
        let queue_capacity = config.queue_capacity.max(1);
        let workers = config.worker_threads.max(1);
        let (tx, rx) = mpsc::channel(queue_capacity);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let counters = Arc::new(Counters::default());

        info!(queue_capacity, workers, "command server started");
        let task = tokio::spawn(receive_loop(
            rx,
            shutdown_rx,
            dispatcher,
            Arc::clone(&counters),
            workers,
        ));

        Self {
            sender: CommandSender {
                tx,
                counters: Arc::clone(&counters),
            },
            counters,
            shutdown,
            task,
        }
    }

    pub fn sender(&self) -> CommandSender {
        self.sender.clone()
    }

    pub fn stats(&self) -> ServerStats {
        self.counters.snapshot()
    }

    /// Stop taking messages from the queue and wait for in-flight handlers.
    ///
    /// Messages still queued are discarded.
    pub async fn shutdown(self) -> ServerStats {
        // The receive loop may already have exited; nothing to signal then.
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "command receive loop ended abnormally");
        }
        let stats = self.counters.snapshot();
        info!(
            accepted = stats.accepted,
            dropped = stats.dropped,
            handled = stats.handled,
            failed = stats.failed,
            "command server stopped"
        );
        stats
    }
}

async fn receive_loop<B>(
    mut rx: mpsc::Receiver<InboundMessage>,
    mut shutdown: watch::Receiver<bool>,
    dispatcher: Arc<PoseCommandDispatcher<B>>,
    counters: Arc<Counters>,
    workers: usize,
) where
    B: PlanningBackend + 'static,
{
    let permits = Arc::new(Semaphore::new(workers));

    loop {
        let message = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            message = rx.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        let permit = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            permit = Arc::clone(&permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let dispatcher = Arc::clone(&dispatcher);
        let counters = Arc::clone(&counters);
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let outcome = handle(&dispatcher, message);
            counters.handled.fetch_add(1, Ordering::Relaxed);
            match outcome {
                Ok(outcome) => debug!(?outcome, "message handled"),
                Err(err) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    debug!(error = %err, "message handled with error");
                }
            }
        });
    }

    // Wait for every worker to hand its permit back.
    let in_flight = u32::try_from(workers).unwrap_or(u32::MAX);
    if permits.acquire_many(in_flight).await.is_err() {
        warn!("worker semaphore closed while draining");
    }
}

fn handle<B: PlanningBackend>(
    dispatcher: &PoseCommandDispatcher<B>,
    message: InboundMessage,
) -> Result<CommandOutcome, ArmError> {
    match message {
        InboundMessage::PoseCommand(pose) => dispatcher
            .handle_pose_command(pose)
            .map(CommandOutcome::Motion),
        InboundMessage::PoseQuery => dispatcher.handle_pose_query().map(CommandOutcome::Pose),
    }
}
