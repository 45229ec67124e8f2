//! `marsha` – arm motion node.
//!
//! Boots the full motion layer against simulated hardware:
//!
//! 1. Loads `~/.marsha/config.toml`, writing the defaults on first run.
//!    `MARSHA_*` environment overrides apply in every case.
//! 2. Starts the fixed-rate control loop with the configured controller
//!    (`identity` unless `control.controller` says otherwise) and the pose
//!    command server.
//! 3. Reads rosbridge-style JSON frames from stdin, one per line, and feeds
//!    them to the command server.  Motion results, pose reports, and alerts
//!    from the event bus are echoed to stdout.
//! 4. On Ctrl-C or end of input, publishes an emergency alert, stops the
//!    control loop (every joint is sent `hold()`), and drains in-flight
//!    commands.

mod config;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Notify;
use tracing::{info, warn};

use marsha_hal::sim::SimArm;
use marsha_hal::{ActuatorArbiter, HardwareIOAdapter};
use marsha_middleware::{EventBus, Topic, TopicReceiver, wire};
use marsha_motion::{PoseCommandDispatcher, SimPlanner};
use marsha_runtime::{CommandServer, ControlLoop};
use marsha_types::{ArmError, Event, EventPayload, MotionStatus};

const EVENT_SOURCE: &str = "marsha-cli";
const EMERGENCY_STOP_CODE: u32 = 911;

fn main() {
    let _telemetry = marsha_runtime::init_tracing("marsha");

    print_banner();

    let (cfg, origin) = config::load();
    match origin {
        config::ConfigOrigin::File => println!(
            "  Config loaded from {}",
            config::config_path().display().to_string().bold()
        ),
        config::ConfigOrigin::Missing => match config::save(&config::Config::default()) {
            Ok(()) => println!(
                "  {} Default config written to {}",
                "✓".green().bold(),
                config::config_path().display().to_string().bold()
            ),
            Err(e) => println!("{}: {}", "Error saving config".red(), e),
        },
        config::ConfigOrigin::Invalid(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
        }
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start async runtime".red(), e);
            std::process::exit(1);
        }
    };

    let result = runtime.block_on(run(cfg));
    // A pending stdin read would otherwise keep the runtime alive.
    runtime.shutdown_background();
    if let Err(e) = result {
        eprintln!("{}: {}", "Fatal".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cfg: config::Config) -> Result<(), ArmError> {
    let bus = EventBus::default();
    let arbiter = Arc::new(ActuatorArbiter::new());
    let shutdown = Arc::new(AtomicBool::new(false));
    let stop = Arc::new(Notify::new());

    // ── Hardware side ─────────────────────────────────────────────────────
    let adapter_config = cfg.adapter_config().map_err(ArmError::Config)?;
    let (devices, _sim) = SimArm::new(&adapter_config.calibration).build()?;
    let adapter = HardwareIOAdapter::new(devices, adapter_config, Arc::clone(&arbiter))?;
    info!(controller = ?cfg.control.controller, "control loop controller selected");
    let control = ControlLoop::spawn(
        adapter,
        cfg.controller(),
        cfg.control_loop_config(),
        bus.clone(),
        Arc::clone(&shutdown),
    )?;

    // ── Motion side ───────────────────────────────────────────────────────
    let dispatcher = Arc::new(
        PoseCommandDispatcher::new(SimPlanner::new(cfg.planner.clone()), arbiter)
            .with_bus(bus.clone()),
    );
    let server = CommandServer::spawn(dispatcher, cfg.server_config());

    let printers = [Topic::MotionStatus, Topic::PoseReports, Topic::SystemAlerts]
        .map(|topic| tokio::spawn(print_events(bus.subscribe_to(topic))));

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let bus_ctrlc = bus.clone();
    let shutdown_ctrlc = Arc::clone(&shutdown);
    let stop_ctrlc = Arc::clone(&stop);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – halting the arm …".yellow().bold());
        bus_ctrlc.publish_to(Topic::SystemAlerts, emergency_stop_event());
        shutdown_ctrlc.store(true, Ordering::SeqCst);
        stop_ctrlc.notify_one();
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; Ctrl-C will not halt the arm");
    }

    println!();
    println!(
        "  Send one JSON frame per line, e.g. {}",
        r#"{"op":"get_state"}"#.bold().cyan()
    );
    println!();

    // ── stdin transport ───────────────────────────────────────────────────
    let sender = server.sender();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = stop.notified() => break,
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("stdin closed");
                break;
            }
            Err(e) => {
                warn!(error = %e, "stdin read failed");
                break;
            }
        };
        let frame = line.trim();
        if frame.is_empty() {
            continue;
        }
        match wire::decode(frame).and_then(|message| sender.try_send(message)) {
            Ok(()) => {}
            Err(e) => println!("  {} {}", "✗".red().bold(), e),
        }
    }

    // ── Shutdown ──────────────────────────────────────────────────────────
    if !shutdown.swap(true, Ordering::SeqCst) {
        bus.publish_to(Topic::SystemAlerts, emergency_stop_event());
    }
    let summary = tokio::task::spawn_blocking(move || control.stop())
        .await
        .map_err(|e| ArmError::Channel(format!("control loop join failed: {e}")))??;
    let stats = server.shutdown().await;
    for printer in printers {
        printer.abort();
    }

    println!();
    println!(
        "  {} {} cycles ({} overruns), {} commands handled, {} dropped",
        "✓".green().bold(),
        summary.cycles,
        summary.overruns,
        stats.handled,
        stats.dropped
    );
    if summary.adapter.halted {
        println!("  {}", "Arm ended in fail-safe halt.".red());
    }
    println!("{}", "  ✓ Exiting marsha.".green());
    Ok(())
}

fn emergency_stop_event() -> Event {
    Event::new(
        EVENT_SOURCE,
        EventPayload::HardwareFault {
            component: "cli".to_string(),
            code: EMERGENCY_STOP_CODE,
            message: "EMERGENCY_STOP: operator shutdown".to_string(),
        },
    )
}

async fn print_events(mut rx: TopicReceiver) {
    while let Some(event) = rx.recv().await {
        match event.payload {
            EventPayload::MotionStatus(MotionStatus::Executed { waypoints }) => {
                println!("  {} executed ({} waypoints)", "✓".green().bold(), waypoints);
            }
            EventPayload::MotionStatus(MotionStatus::PlanningFailed { reason }) => {
                println!("  {} planning failed: {}", "✗".red().bold(), reason);
            }
            EventPayload::MotionStatus(MotionStatus::ExecutionFailed { reason }) => {
                println!("  {} execution failed: {}", "✗".red().bold(), reason);
            }
            EventPayload::PoseReport(pose) => println!("  {}", pose.to_string().cyan()),
            EventPayload::StaleSensorData { joints } => {
                let names: Vec<&str> = joints.iter().map(|j| j.name()).collect();
                println!("  {} stale sensor data: {}", "⚠".yellow(), names.join(", "));
            }
            EventPayload::CycleOverrun { missed } => {
                println!("  {} control loop missed {} cycle(s)", "⚠".yellow(), missed);
            }
            EventPayload::HardwareFault { component, code, message } => {
                println!("  {} [{} #{}] {}", "⚠".red().bold(), component, code, message);
            }
            EventPayload::JointStates(_) => {}
        }
    }
}

fn print_banner() {
    println!();
    println!("{}", r#"   __  ___                 __        "#.bold().cyan());
    println!("{}", r#"  /  |/  /__ ________ ___ / /  ___ _ "#.bold().cyan());
    println!("{}", r#" / /|_/ / _ `/ __(_-</ _ \/ _ \/ _ `/ "#.bold().cyan());
    println!("{}", r#"/_/  /_/\_,_/_/ /___/_//_/_//_/\_,_/  "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "marsha".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Arm motion node");
    println!();
}
