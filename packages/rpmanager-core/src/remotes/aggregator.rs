//! Cross-device view of a remote.
//!
//! Joins a remote's function associations against the known devices and
//! the functions those devices currently serve. Failures are local: a
//! missing device, a missing key, an unreachable device or a function the
//! device no longer offers each drop the affected associations and nothing
//! else.

use crate::device::{DeviceFunction, FunctionCatalog, Probe};
use crate::error::{Error, Result};
use crate::model::{is_online, Device, RemoteFunction};
use crate::store::Store;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// A device function as placed on a remote
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupedFunction {
    #[serde(flatten)]
    pub function: DeviceFunction,
    pub device_host: String,
    pub device_port: u16,
    pub remote_function_id: u64,
}

/// Functions of one device on a remote
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceGroup {
    pub device_name: String,
    pub is_online: bool,
    pub functions: Vec<GroupedFunction>,
    #[serde(skip)]
    pub api_key: String,
}

/// Device key ("host:port") to group, in order of first appearance on the
/// remote
pub type RemoteView = IndexMap<String, DeviceGroup>;

pub struct Aggregator {
    store: Arc<Store>,
    probe: Probe,
    timeout: Duration,
}

impl Aggregator {
    pub fn new(store: Arc<Store>, probe: Probe, timeout: Duration) -> Self {
        Self {
            store,
            probe,
            timeout,
        }
    }

    /// Build the grouped view of `remote_id` as of now.
    pub async fn build_view(&self, remote_id: u64) -> Result<RemoteView> {
        self.build_view_at(remote_id, Utc::now()).await
    }

    /// Build the grouped view, classifying devices as online relative to `now`.
    pub async fn build_view_at(&self, remote_id: u64, now: DateTime<Utc>) -> Result<RemoteView> {
        if self.store.get_remote(remote_id).await.is_none() {
            return Err(Error::NotFound(format!("remote {}", remote_id)));
        }

        let associations = self.store.remote_functions_for(remote_id).await;
        let devices: HashMap<String, Device> = self
            .store
            .list_devices()
            .await
            .into_iter()
            .map(|d| (d.host_port.clone(), d))
            .collect();

        // Devices that can be asked for their functions, in first-use order
        let mut usable: IndexMap<String, &Device> = IndexMap::new();
        for rf in &associations {
            let key = rf.device_key();
            match devices.get(&key) {
                None => tracing::debug!("Remote {}: device {} is not known, skipping", remote_id, key),
                Some(device) if !device.has_api_key() => {
                    tracing::debug!("Remote {}: no API key for {}, skipping", remote_id, key)
                }
                Some(device) => {
                    usable.entry(key).or_insert(device);
                }
            }
        }

        let catalogs = self.fetch_catalogs(&usable).await;

        let mut view = RemoteView::new();
        for rf in &associations {
            let key = rf.device_key();
            let (Some(device), Some(catalog)) = (usable.get(&key), catalogs.get(&key)) else {
                continue;
            };
            let Some(function) = catalog.find(&rf.function_id) else {
                tracing::warn!(
                    "Remote {}: {} no longer offers '{}'",
                    remote_id,
                    key,
                    rf.function_id
                );
                continue;
            };

            view.entry(key)
                .or_insert_with(|| DeviceGroup {
                    device_name: device.name.clone(),
                    is_online: is_online(device.last_seen, now),
                    functions: Vec::new(),
                    api_key: device.api_key.clone().unwrap_or_default(),
                })
                .functions
                .push(grouped(function, rf));
        }

        tracing::debug!(
            "Remote {}: {} of {} functions resolved across {} devices",
            remote_id,
            view.values().map(|g| g.functions.len()).sum::<usize>(),
            associations.len(),
            view.len()
        );

        Ok(view)
    }

    /// One catalog request per device, all devices at once. Devices that
    /// fail are left out of the result.
    async fn fetch_catalogs(&self, devices: &IndexMap<String, &Device>) -> HashMap<String, FunctionCatalog> {
        let requests = devices.iter().map(|(key, device)| async move {
            let outcome = self
                .probe
                .list_functions(&device.host, device.port, device.api_key.as_deref(), self.timeout)
                .await;
            match outcome.into_result(key) {
                Ok(catalog) => Some((key.clone(), catalog)),
                Err(e) => {
                    tracing::warn!("Could not load functions: {}", e);
                    None
                }
            }
        });

        futures::future::join_all(requests)
            .await
            .into_iter()
            .flatten()
            .collect()
    }
}

fn grouped(function: &DeviceFunction, rf: &RemoteFunction) -> GroupedFunction {
    GroupedFunction {
        function: function.clone(),
        device_host: rf.device_host.clone(),
        device_port: rf.device_port,
        remote_function_id: rf.id,
    }
}
