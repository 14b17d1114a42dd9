use crate::error::{Error, Result};
use crate::registry::DEFAULT_REQUEST_TIMEOUT;
use crate::scanner::{ScanConfig, DEFAULT_HOSTS, DEFAULT_PORTS, DEFAULT_SCAN_TIMEOUT, DEFAULT_SUBNET};
use crate::store::STATE_FILE;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable overriding the subnet to sweep ("" or "none" disables it)
pub const ENV_SUBNET: &str = "RPMANAGER_SUBNET";

/// Environment variable overriding the port list (comma separated)
pub const ENV_PORTS: &str = "RPMANAGER_PORTS";

/// Environment variable overriding the data directory
pub const ENV_DATA_DIR: &str = "RPMANAGER_DATA_DIR";

/// Environment variable overriding the per-candidate scan timeout
pub const ENV_SCAN_TIMEOUT_MS: &str = "RPMANAGER_SCAN_TIMEOUT_MS";

/// Configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub scan: ScanSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub device: DeviceSection,
}

#[derive(Debug, Deserialize, Default)]
pub struct ScanSection {
    pub hosts: Option<Vec<String>>,
    /// Subnet in CIDR form (e.g. "192.168.1.0/24"); empty disables the sweep
    pub subnet: Option<String>,
    pub ports: Option<Vec<u16>>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct StorageSection {
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
pub struct DeviceSection {
    /// Timeout for function listing and calls
    pub request_timeout_ms: Option<u64>,
}

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub scan: ScanConfig,
    pub data_dir: PathBuf,
    pub request_timeout: Duration,
    /// Highest-priority source that contributed a value
    pub source: ConfigSource,
}

impl ManagerConfig {
    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join(STATE_FILE)
    }
}

/// Where the configuration came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// Using default hardcoded values
    Default,
    /// Loaded from config file
    ConfigFile,
    /// Loaded from environment variables
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::ConfigFile => write!(f, "config file"),
            ConfigSource::Environment => write!(f, "environment variable"),
        }
    }
}

/// Get the path to the configuration file
fn get_config_file_path() -> Option<PathBuf> {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .map(|p| p.join("rpmanager").join("config.toml"))
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".local").join("share")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rpmanager")
}

/// Load configuration from the config file
fn load_config_file() -> Option<ConfigFile> {
    let path = get_config_file_path()?;

    if !path.exists() {
        return None;
    }

    match fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::debug!("Loaded config from {:?}", path);
                Some(config)
            }
            Err(e) => {
                tracing::warn!("Failed to parse config file {:?}: {}", path, e);
                None
            }
        },
        Err(e) => {
            tracing::warn!("Failed to read config file {:?}: {}", path, e);
            None
        }
    }
}

/// Load configuration with priority:
/// 1. Environment variables (RPMANAGER_*)
/// 2. Config file (~/.config/rpmanager/config.toml)
/// 3. Default values
pub fn load_config() -> Result<ManagerConfig> {
    let file = load_config_file();
    resolve(file, |name| std::env::var(name).ok())
}

/// Combine an optional config file with environment lookups.
///
/// `env` returns the value of an environment variable, if set.
pub fn resolve(file: Option<ConfigFile>, env: impl Fn(&str) -> Option<String>) -> Result<ManagerConfig> {
    let mut source = ConfigSource::Default;
    let mut scan = ScanConfig::default();
    let mut data_dir = default_data_dir();
    let mut request_timeout = DEFAULT_REQUEST_TIMEOUT;

    if let Some(file) = file {
        if let Some(hosts) = file.scan.hosts {
            scan.hosts = hosts;
            source = ConfigSource::ConfigFile;
        }
        if let Some(subnet) = file.scan.subnet {
            scan.subnet = non_empty_subnet(&subnet);
            source = ConfigSource::ConfigFile;
        }
        if let Some(ports) = file.scan.ports {
            scan.ports = ports;
            source = ConfigSource::ConfigFile;
        }
        if let Some(ms) = file.scan.timeout_ms {
            scan.timeout = Duration::from_millis(ms);
            source = ConfigSource::ConfigFile;
        }
        if let Some(dir) = file.storage.data_dir {
            data_dir = dir;
            source = ConfigSource::ConfigFile;
        }
        if let Some(ms) = file.device.request_timeout_ms {
            request_timeout = Duration::from_millis(ms);
            source = ConfigSource::ConfigFile;
        }
    }

    if let Some(subnet) = env(ENV_SUBNET) {
        tracing::info!("Using subnet from environment variable: {}", subnet);
        scan.subnet = non_empty_subnet(&subnet);
        source = ConfigSource::Environment;
    }
    if let Some(ports) = env(ENV_PORTS) {
        scan.ports = parse_ports(&ports)?;
        source = ConfigSource::Environment;
    }
    if let Some(dir) = env(ENV_DATA_DIR).filter(|d| !d.trim().is_empty()) {
        data_dir = PathBuf::from(dir.trim());
        source = ConfigSource::Environment;
    }
    if let Some(ms) = env(ENV_SCAN_TIMEOUT_MS) {
        let ms: u64 = ms
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{} must be a number of milliseconds, got '{}'", ENV_SCAN_TIMEOUT_MS, ms)))?;
        scan.timeout = Duration::from_millis(ms);
        source = ConfigSource::Environment;
    }

    if scan.ports.is_empty() {
        return Err(Error::Config("at least one port must be configured".to_string()));
    }
    if scan.timeout.is_zero() || request_timeout.is_zero() {
        return Err(Error::Config("timeouts must be greater than zero".to_string()));
    }

    tracing::debug!(
        "Config ({}): {} hosts, subnet {:?}, ports {:?}, data dir {:?}",
        source,
        scan.hosts.len(),
        scan.subnet,
        scan.ports,
        data_dir
    );

    Ok(ManagerConfig {
        scan,
        data_dir,
        request_timeout,
        source,
    })
}

fn non_empty_subnet(subnet: &str) -> Option<String> {
    let subnet = subnet.trim();
    if subnet.is_empty() || subnet.eq_ignore_ascii_case("none") {
        None
    } else {
        Some(subnet.to_string())
    }
}

/// Parse a comma separated port list such as "5000, 8080".
pub fn parse_ports(value: &str) -> Result<Vec<u16>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            p.parse::<u16>()
                .map_err(|_| Error::Config(format!("invalid port '{}'", p)))
        })
        .collect()
}

/// Get the path to the config file for documentation purposes
pub fn get_config_file_path_string() -> String {
    get_config_file_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "~/.config/rpmanager/config.toml".to_string())
}

/// Generate example config file content
pub fn generate_example_config() -> String {
    format!(
        r#"# RP Manager Configuration
# Place this file at: ~/.config/rpmanager/config.toml

[scan]
# Hosts that are always probed
# hosts = {hosts:?}

# Subnet swept for devices (host addresses only, at most 254 of them)
# Set to "" to probe the hosts above only
# subnet = "{subnet}"

# Ports the device service may listen on
# ports = {ports:?}

# Per-candidate discovery timeout
# timeout_ms = {scan_ms}

[storage]
# Where devices and remotes are kept
# data_dir = "/path/to/data"

[device]
# Timeout for listing and calling device functions
# request_timeout_ms = {request_ms}
"#,
        hosts = DEFAULT_HOSTS,
        subnet = DEFAULT_SUBNET,
        ports = DEFAULT_PORTS,
        scan_ms = DEFAULT_SCAN_TIMEOUT.as_millis(),
        request_ms = DEFAULT_REQUEST_TIMEOUT.as_millis(),
    )
}
