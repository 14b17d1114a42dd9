//! Persisted records: devices, remotes and remote/function associations.
//!
//! Optional fields carry `#[serde(default)]` so documents written by older
//! versions keep loading after new fields are added.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A device counts as online if it was last seen less than this long ago.
pub const ONLINE_WINDOW_SECS: i64 = 60;

/// Identity key of a device endpoint.
pub fn host_port(host: &str, port: u16) -> String {
    format!("{}:{}", host, port)
}

/// Online rule, recomputed at read time and never stored.
pub fn is_online(last_seen: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(last_seen) < chrono::Duration::seconds(ONLINE_WINDOW_SECS)
}

/// A network endpoint believed to run the device API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    #[serde(default)]
    pub id: u64,
    /// Composite key: "host:port"
    pub host_port: String,
    pub host: String,
    pub port: u16,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    pub last_seen: DateTime<Utc>,
    pub discovered: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Device {
    pub fn key(&self) -> String {
        host_port(&self.host, self.port)
    }

    pub fn is_online(&self) -> bool {
        self.is_online_at(Utc::now())
    }

    pub fn is_online_at(&self, now: DateTime<Utc>) -> bool {
        is_online(self.last_seen, now)
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

/// A user-named collection of function shortcuts spanning devices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Remote {
    #[serde(default)]
    pub id: u64,
    pub name: String,
    pub created: DateTime<Utc>,
    /// Bumped on rename only.
    pub updated: DateTime<Utc>,
}

/// "This remote includes this device's function".
///
/// The device is referenced by host and port rather than by device id, so
/// the association survives the device record being cleared and rediscovered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFunction {
    #[serde(default)]
    pub id: u64,
    pub remote_id: u64,
    pub device_host: String,
    pub device_port: u16,
    pub function_id: String,
    pub added: DateTime<Utc>,
}

impl RemoteFunction {
    pub fn device_key(&self) -> String {
        host_port(&self.device_host, self.device_port)
    }

    pub fn refers_to(&self, function: &FunctionRef) -> bool {
        self.device_host == function.host
            && self.device_port == function.port
            && self.function_id == function.function_id
    }
}

/// Locator of one function on one device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionRef {
    pub host: String,
    pub port: u16,
    pub function_id: String,
}

impl FunctionRef {
    pub fn new(host: impl Into<String>, port: u16, function_id: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            function_id: function_id.into(),
        }
    }

    pub fn device_key(&self) -> String {
        host_port(&self.host, self.port)
    }
}
