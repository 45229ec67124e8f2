//! Node configuration – reads/writes `~/.marsha/config.toml`.
//!
//! ```toml
//! [control]
//! period_ms = 10
//! failure_threshold = 5
//! joint_state_every = 10
//! controller = "pid"        # identity (default) | hold | pid
//! max_step_rad = 0.05
//!
//! [control.pid]
//! kp = 0.8
//!
//! [server]
//! worker_threads = 4
//! queue_capacity = 1000
//!
//! [calibration.default]
//! ticks_per_degree = 11.377777777777778
//!
//! [calibration.joints.joint_2]
//! zero_offset_ticks = 512
//!
//! [planner]
//! reach_radius_m = 0.8
//! ```
//!
//! Every field has a default, so a partial file (or none at all) is valid.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use marsha_hal::pid::PidGains;
use marsha_hal::{
    AdapterConfig, GripperCalibration, HoldController, IdentityController, JointCalibration,
    JointController, PidPositionController,
};
use marsha_motion::SimPlannerConfig;
use marsha_runtime::{CommandServerConfig, ControlLoopConfig};
use marsha_types::{JointArray, JointId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlSection {
    /// Control-loop period in milliseconds.
    pub period_ms: u64,
    /// Consecutive device failures tolerated before the fail-safe halt.
    pub failure_threshold: u32,
    /// Publish joint states every this many cycles; 0 disables.
    pub joint_state_every: u32,
    /// What the control loop commands between trajectories.
    pub controller: ControllerKind,
    /// Gains for `controller = "pid"`.
    pub pid: PidGains,
    /// Largest per-cycle position step the PID controller may command.
    pub max_step_rad: f64,
}

impl Default for ControlSection {
    fn default() -> Self {
        Self {
            period_ms: 10,
            failure_threshold: 5,
            joint_state_every: 10,
            controller: ControllerKind::default(),
            pid: PidGains::default(),
            max_step_rad: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerKind {
    /// Echo the measured position.
    #[default]
    Identity,
    /// Hold the position latched at start and after each trajectory.
    Hold,
    /// Servo toward the last trajectory end point.
    Pid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub worker_threads: usize,
    pub queue_capacity: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        let defaults = CommandServerConfig::default();
        Self {
            worker_threads: defaults.worker_threads,
            queue_capacity: defaults.queue_capacity,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSection {
    /// Applied to every arm joint without an override.
    pub default: JointCalibration,
    /// Per-joint overrides keyed by joint name (`joint_1` … `joint_6`).
    pub joints: BTreeMap<String, JointCalibration>,
    pub gripper: GripperCalibration,
}

impl CalibrationSection {
    /// Resolve the per-joint table.
    ///
    /// Fails on unknown joint names and on an entry for `gripper_joint`,
    /// which is configured under `[calibration.gripper]` instead.
    pub fn table(&self) -> Result<JointArray<JointCalibration>, String> {
        let mut table = JointArray::splat(self.default);
        for (name, calibration) in &self.joints {
            let joint: JointId = name
                .parse()
                .map_err(|_| format!("Unknown joint '{}' in [calibration.joints]", name))?;
            if joint.is_gripper() {
                return Err(format!(
                    "'{}' is not an arm joint; use [calibration.gripper]",
                    name
                ));
            }
            table[joint] = *calibration;
        }
        Ok(table)
    }
}

/// Persisted node configuration stored in `~/.marsha/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub control: ControlSection,
    pub server: ServerSection,
    pub calibration: CalibrationSection,
    pub planner: SimPlannerConfig,
}

impl Config {
    pub fn control_period(&self) -> Duration {
        Duration::from_millis(self.control.period_ms)
    }

    pub fn adapter_config(&self) -> Result<AdapterConfig, String> {
        Ok(AdapterConfig {
            period: self.control_period(),
            failure_threshold: self.control.failure_threshold,
            calibration: self.calibration.table()?,
            gripper: self.calibration.gripper,
        })
    }

    pub fn control_loop_config(&self) -> ControlLoopConfig {
        ControlLoopConfig {
            period: self.control_period(),
            joint_state_every: self.control.joint_state_every,
            max_cycles: None,
        }
    }

    /// Build the controller selected by `control.controller`.
    pub fn controller(&self) -> Box<dyn JointController> {
        match self.control.controller {
            ControllerKind::Identity => Box::new(IdentityController),
            ControllerKind::Hold => Box::new(HoldController::new()),
            ControllerKind::Pid => Box::new(PidPositionController::new(
                self.control.pid,
                self.control.max_step_rad,
            )),
        }
    }

    pub fn server_config(&self) -> CommandServerConfig {
        CommandServerConfig {
            queue_capacity: self.server.queue_capacity,
            worker_threads: self.server.worker_threads,
        }
    }
}

/// Return the path to `~/.marsha/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".marsha").join("config.toml")
}

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigOrigin {
    File,
    /// No file yet; built-in defaults.
    Missing,
    /// The file could not be used; built-in defaults.
    Invalid(String),
}

/// Load `~/.marsha/config.toml`, falling back to defaults.
///
/// `MARSHA_*` overrides are applied whichever way the config was obtained.
pub fn load() -> (Config, ConfigOrigin) {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> (Config, ConfigOrigin) {
    let (mut cfg, origin) = match read_from(path) {
        Ok(Some(cfg)) => (cfg, ConfigOrigin::File),
        Ok(None) => (Config::default(), ConfigOrigin::Missing),
        Err(e) => (Config::default(), ConfigOrigin::Invalid(e)),
    };
    apply_env_overrides(&mut cfg);
    (cfg, origin)
}

/// Parse the file at `path` without environment overrides.
pub(crate) fn read_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    toml::from_str(&raw)
        .map(Some)
        .map_err(|e| format!("Failed to parse config: {}", e))
}

/// Apply `MARSHA_*` environment variable overrides to `cfg`.
///
/// Values that do not parse are ignored.
///
/// | Variable | Config field |
/// |---|---|
/// | `MARSHA_CONTROL_PERIOD_MS` | `control.period_ms` |
/// | `MARSHA_FAILURE_THRESHOLD` | `control.failure_threshold` |
/// | `MARSHA_WORKER_THREADS` | `server.worker_threads` |
/// | `MARSHA_QUEUE_CAPACITY` | `server.queue_capacity` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("MARSHA_CONTROL_PERIOD_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.control.period_ms = ms;
    }
    if let Ok(v) = std::env::var("MARSHA_FAILURE_THRESHOLD")
        && let Ok(n) = v.parse::<u32>()
    {
        cfg.control.failure_threshold = n;
    }
    if let Ok(v) = std::env::var("MARSHA_WORKER_THREADS")
        && let Ok(n) = v.parse::<usize>()
    {
        cfg.server.worker_threads = n;
    }
    if let Ok(v) = std::env::var("MARSHA_QUEUE_CAPACITY")
        && let Ok(n) = v.parse::<usize>()
    {
        cfg.server.queue_capacity = n;
    }
}

/// Save the config to disk, creating `~/.marsha/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
