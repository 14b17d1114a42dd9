//! Keyed merging of device sources.

use crate::model::{host_port, Device};
use crate::scanner::DiscoveredDevice;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use std::hash::Hash;

/// Fold priority-ordered sources into one map keyed by identity.
///
/// The first item seen for a key wins; iteration order is first-insertion
/// order across all sources.
pub fn ordered_merge<T, K, S>(
    sources: impl IntoIterator<Item = S>,
    key_of: impl Fn(&T) -> K,
) -> IndexMap<K, T>
where
    S: IntoIterator<Item = T>,
    K: Hash + Eq,
{
    let mut merged = IndexMap::new();
    for source in sources {
        for item in source {
            merged.entry(key_of(&item)).or_insert(item);
        }
    }
    merged
}

/// A device as shown in the device list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DisplayDevice {
    /// Answered the latest scan
    Online(DiscoveredDevice),
    /// Known from an earlier session but not found by the latest scan
    Remembered(Device),
}

impl DisplayDevice {
    pub fn key(&self) -> String {
        host_port(self.host(), self.port())
    }

    pub fn host(&self) -> &str {
        match self {
            DisplayDevice::Online(d) => &d.host,
            DisplayDevice::Remembered(d) => &d.host,
        }
    }

    pub fn port(&self) -> u16 {
        match self {
            DisplayDevice::Online(d) => d.port,
            DisplayDevice::Remembered(d) => d.port,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            DisplayDevice::Online(d) => &d.name,
            DisplayDevice::Remembered(d) => &d.name,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            DisplayDevice::Online(d) => &d.description,
            DisplayDevice::Remembered(d) => &d.description,
        }
    }

    pub fn version(&self) -> &str {
        match self {
            DisplayDevice::Online(d) => &d.version,
            DisplayDevice::Remembered(d) => &d.version,
        }
    }

    pub fn is_online(&self) -> bool {
        matches!(self, DisplayDevice::Online(_))
    }
}

/// Overlay the devices found by a scan on the remembered ones.
///
/// Discovered devices come first and take priority; known devices the scan
/// did not find follow. Pure: no store access.
pub fn reconcile(discovered: &[DiscoveredDevice], known: &[Device]) -> Vec<DisplayDevice> {
    let sources = [
        discovered
            .iter()
            .cloned()
            .map(DisplayDevice::Online)
            .collect::<Vec<_>>(),
        known
            .iter()
            .cloned()
            .map(DisplayDevice::Remembered)
            .collect(),
    ];

    ordered_merge(sources, DisplayDevice::key)
        .into_values()
        .collect()
}

/// Fold one discovery into the stored record for the same endpoint.
///
/// Name, description and version are refreshed; the API key, id and first
/// discovery time are kept. `lastSeen` never moves backwards.
pub fn merge_discovery(existing: Option<Device>, found: &DiscoveredDevice) -> Device {
    match existing {
        Some(mut device) => {
            device.name = found.name.clone();
            device.description = found.description.clone();
            device.version = found.version.clone();
            device.last_seen = latest(device.last_seen, found.discovered);
            device
        }
        None => Device {
            id: 0,
            host_port: found.key(),
            host: found.host.clone(),
            port: found.port,
            name: found.name.clone(),
            description: found.description.clone(),
            version: found.version.clone(),
            last_seen: found.discovered,
            discovered: found.discovered,
            api_key: None,
        },
    }
}

fn latest(a: DateTime<Utc>, b: DateTime<Utc>) -> DateTime<Utc> {
    if b > a { b } else { a }
}
