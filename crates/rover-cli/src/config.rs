//! Daemon configuration – reads/writes `~/.rover/config.toml`.
//!
//! ```toml
//! log_format = "compact"
//!
//! [controller]
//! port = 9000
//! obstacle_threshold_cm = 15.0
//! fault_policy = "terminate"
//!
//! [bench]
//! distances_cm = [40.0, 30.0, 12.0, -1.0]
//! repeat = true
//! ```
//!
//! `[bench]` scripts the simulated sonar used when no robot is attached; a
//! non-positive distance stands for a ping with no echo.

use std::fs;
use std::path::{Path, PathBuf};

use rover_types::{ControllerConfig, FaultPolicy};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `compact` or `json`; `ROVER_LOG_FORMAT` wins when set.
    pub log_format: String,
    pub controller: ControllerConfig,
    pub bench: BenchConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_format: "compact".to_string(),
            controller: ControllerConfig::default(),
            bench: BenchConfig::default(),
        }
    }
}

/// Simulated peripherals for bench runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub distances_cm: Vec<f32>,
    /// Replay `distances_cm` forever.
    pub repeat: bool,
    /// Display init attempts that fail before the panel answers.
    pub display_init_failures: u32,
}

impl BenchConfig {
    /// Sonar script in [`SimBoard`][rover_hal::sim::SimBoard] form.
    pub fn sonar_script(&self) -> Vec<Option<f32>> {
        self.distances_cm
            .iter()
            .map(|cm| (*cm > 0.0).then_some(*cm))
            .collect()
    }
}

/// Return the path to `~/.rover/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".rover").join("config.toml")
}

/// Load the config with environment overrides applied and validate it.
///
/// Returns the config and whether the file was missing, in which case the
/// overrides are applied to the defaults.
pub fn load() -> Result<(Config, bool), String> {
    load_with(&config_path(), |key| std::env::var(key).ok())
}

pub(crate) fn load_with(
    path: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(Config, bool), String> {
    let (mut cfg, first_run) = match load_from(path)? {
        Some(cfg) => (cfg, false),
        None => (Config::default(), true),
    };
    apply_overrides(&mut cfg, lookup)?;
    cfg.controller.validate().map_err(|e| e.to_string())?;
    Ok((cfg, first_run))
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `ROVER_*` overrides, looking each variable up with `lookup`.
///
/// | Variable | Config field |
/// |---|---|
/// | `ROVER_PORT` | `controller.port` |
/// | `ROVER_FAULT_POLICY` | `controller.fault_policy` |
/// | `ROVER_THRESHOLD_CM` | `controller.obstacle_threshold_cm` |
///
/// A value that does not parse is an error rather than silently ignored.
pub fn apply_overrides(
    cfg: &mut Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), String> {
    if let Some(v) = lookup("ROVER_PORT") {
        cfg.controller.port = v
            .trim()
            .parse()
            .map_err(|_| format!("ROVER_PORT: `{v}` is not a port"))?;
    }
    if let Some(v) = lookup("ROVER_FAULT_POLICY") {
        cfg.controller.fault_policy = v
            .parse::<FaultPolicy>()
            .map_err(|e| format!("ROVER_FAULT_POLICY: {e}"))?;
    }
    if let Some(v) = lookup("ROVER_THRESHOLD_CM") {
        let cm: f32 = v
            .trim()
            .parse()
            .map_err(|_| format!("ROVER_THRESHOLD_CM: `{v}` is not a number"))?;
        if cm.is_nan() || cm <= 0.0 {
            return Err(format!("ROVER_THRESHOLD_CM: {cm} must be positive"));
        }
        cfg.controller.obstacle_threshold_cm = cm;
    }
    Ok(())
}

/// Save the config to `~/.rover/config.toml`.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))
}
