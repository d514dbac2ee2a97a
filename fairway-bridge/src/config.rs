//! Configuration for the bridge service.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use fairway_core::simulator::DeviceIdentity;
use fairway_core::{BridgeError, DispatchOptions, ModifierTable, SessionConfig, SimulatorOptions};
use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Launch monitor listener.
    pub monitor: MonitorConfig,
    /// Simulator connection.
    pub simulator: SimulatorConfig,
    /// Shot log.
    pub storage: StorageConfig,
    /// Fan-out behaviour.
    pub dispatch: DispatchConfig,
    /// Multipliers in effect at startup.
    pub modifiers: ModifierTable,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Supported launch monitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LaunchMonitorKind {
    #[default]
    GarminR10,
}

/// Supported simulators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SimulatorKind {
    #[default]
    Gspro,
}

impl SimulatorKind {
    /// Whether the simulator expects spin axis in the signed ±90° form.
    pub fn signed_spin_axis(self) -> bool {
        match self {
            Self::Gspro => true,
        }
    }
}

/// Launch monitor listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub kind: LaunchMonitorKind,
    /// Address to listen on for the device.
    pub bind_address: String,
    pub port: u16,
    /// Seconds between device pings.
    pub heartbeat_interval_secs: u64,
    /// Seconds a ping may go unanswered before disconnecting.
    pub ping_timeout_secs: u64,
    pub shot_complete_delay_ms: u64,
    pub disarm_delay_ms: u64,
    pub arm_delay_ms: u64,
}

/// Simulator connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub kind: SimulatorKind,
    pub address: String,
    pub port: u16,
    pub device_id: String,
    pub units: String,
    pub api_version: String,
    /// Seconds between heartbeat messages.
    pub heartbeat_interval_secs: u64,
}

/// Shot log configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// CSV file receiving one row per shot.
    pub shot_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Forward adjusted club data. `false` sends the raw values.
    pub send_adjusted_club: bool,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Console,
    Json,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    pub format: LogFormat,
    /// Optional log file path. If empty, logs to stderr.
    pub file: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            kind: LaunchMonitorKind::default(),
            bind_address: "0.0.0.0".into(),
            port: 2483,
            heartbeat_interval_secs: 10,
            ping_timeout_secs: 3,
            shot_complete_delay_ms: 300,
            disarm_delay_ms: 700,
            arm_delay_ms: 1000,
        }
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        let identity = DeviceIdentity::default();
        Self {
            kind: SimulatorKind::default(),
            address: "127.0.0.1".into(),
            port: 921,
            device_id: identity.device_id,
            units: identity.units,
            api_version: identity.api_version,
            heartbeat_interval_secs: 5,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            shot_file: PathBuf::from("./shots.csv"),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            send_adjusted_club: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::default(),
            file: String::new(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

/// Where a loaded configuration came from. Reported once logging is up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File,
    Missing,
    /// The file exists but did not parse; defaults are in effect.
    Invalid(String),
}

impl BridgeConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> (Self, ConfigSource) {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(_) => return (Self::default(), ConfigSource::Missing),
        };
        match toml::from_str(&contents) {
            Ok(config) => (config, ConfigSource::File),
            Err(e) => (Self::default(), ConfigSource::Invalid(e.to_string())),
        }
    }

    pub fn monitor_addr(&self) -> Result<SocketAddr, BridgeError> {
        socket_addr(&self.monitor.bind_address, self.monitor.port)
    }

    /// Host and port of the simulator. The host may be a name.
    pub fn simulator_endpoint(&self) -> (&str, u16) {
        (&self.simulator.address, self.simulator.port)
    }

    pub fn session_config(&self) -> SessionConfig {
        let m = &self.monitor;
        SessionConfig {
            heartbeat_interval: Duration::from_secs(m.heartbeat_interval_secs.max(1)),
            ping_timeout: Duration::from_secs(m.ping_timeout_secs.max(1)),
            shot_complete_delay: Duration::from_millis(m.shot_complete_delay_ms),
            disarm_delay: Duration::from_millis(m.disarm_delay_ms),
            arm_delay: Duration::from_millis(m.arm_delay_ms),
            signed_spin_axis: self.simulator.kind.signed_spin_axis(),
        }
    }

    pub fn simulator_options(&self) -> SimulatorOptions {
        let s = &self.simulator;
        SimulatorOptions {
            identity: DeviceIdentity {
                device_id: s.device_id.clone(),
                units: s.units.clone(),
                api_version: s.api_version.clone(),
            },
            heartbeat_interval: Duration::from_secs(s.heartbeat_interval_secs.max(1)),
        }
    }

    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            send_adjusted_club: self.dispatch.send_adjusted_club,
        }
    }
}

fn socket_addr(host: &str, port: u16) -> Result<SocketAddr, BridgeError> {
    let ip: IpAddr = host
        .parse()
        .map_err(|e| BridgeError::Validation(format!("invalid address {host:?}: {e}")))?;
    Ok(SocketAddr::new(ip, port))
}

// ── Tests ────────────────────────────────────────────────────────
