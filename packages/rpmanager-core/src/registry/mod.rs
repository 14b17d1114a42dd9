//! Known devices: merging scan results into the store, API keys, and
//! direct per-device requests.

mod merge;

pub use merge::{merge_discovery, ordered_merge, reconcile, DisplayDevice};

use crate::device::{coerce_inputs, FunctionCatalog, Probe};
use crate::error::{Error, Result};
use crate::model::{host_port, Device};
use crate::scanner::DiscoveredDevice;
use crate::store::Store;
use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Default timeout for function listing and invocation
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Version recorded for devices added by hand rather than by discovery
const MANUAL_DEVICE_VERSION: &str = "1.0.0";

pub struct DeviceRegistry {
    store: Arc<Store>,
    probe: Probe,
    request_timeout: Duration,
}

impl DeviceRegistry {
    pub fn new(store: Arc<Store>, probe: Probe, request_timeout: Duration) -> Self {
        Self {
            store,
            probe,
            request_timeout,
        }
    }

    /// Fold scan results into the store.
    ///
    /// Runs after every scan, including scans whose results were not
    /// published: a device that answered was seen, whatever scan found it.
    pub async fn record_discoveries(&self, discovered: &[DiscoveredDevice]) -> Result<usize> {
        let mut recorded = 0;
        for found in discovered {
            let mut is_new = false;
            let device = self
                .store
                .upsert_device(&found.key(), |existing| {
                    is_new = existing.is_none();
                    merge_discovery(existing, found)
                })
                .await?;

            if is_new {
                tracing::info!("New device '{}' at {}", device.name, device.host_port);
            } else {
                tracing::debug!("Refreshed device '{}' at {}", device.name, device.host_port);
            }
            recorded += 1;
        }
        Ok(recorded)
    }

    pub async fn known_devices(&self) -> Vec<Device> {
        self.store.list_devices().await
    }

    /// Devices for display: the given scan results first, then remembered
    /// devices the scan did not find.
    pub async fn display_devices(&self, discovered: &[DiscoveredDevice]) -> Vec<DisplayDevice> {
        let known = self.store.list_devices().await;
        reconcile(discovered, &known)
    }

    /// Validate `api_key` against the device and store it.
    ///
    /// Nothing is written unless the device accepted the key. A device that
    /// was never discovered gets a record of its own.
    pub async fn save_api_key(&self, host: &str, port: u16, api_key: &str) -> Result<FunctionCatalog> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(Error::Invalid("API key must not be empty".to_string()));
        }

        let key = host_port(host, port);
        let catalog = self
            .probe
            .list_functions(host, port, Some(api_key), self.request_timeout)
            .await
            .into_result(&key)?;

        let mut is_new = false;
        self.store
            .upsert_device(&key, |existing| match existing {
                Some(mut device) => {
                    device.api_key = Some(api_key.to_string());
                    device
                }
                None => {
                    is_new = true;
                    let now = Utc::now();
                    Device {
                        id: 0,
                        host_port: key.clone(),
                        host: host.to_string(),
                        port,
                        name: format!("Device at {}", key),
                        description: String::new(),
                        version: MANUAL_DEVICE_VERSION.to_string(),
                        last_seen: now,
                        discovered: now,
                        api_key: Some(api_key.to_string()),
                    }
                }
            })
            .await?;

        if is_new {
            tracing::info!("Added device {} with API key", key);
        } else {
            tracing::info!("Updated API key for {}", key);
        }

        Ok(catalog)
    }

    /// Fetch the live function catalog with the stored key.
    pub async fn list_functions(&self, host: &str, port: u16) -> Result<FunctionCatalog> {
        let (key, api_key) = self.credential(host, port).await?;
        self.probe
            .list_functions(host, port, Some(&api_key), self.request_timeout)
            .await
            .into_result(&key)
    }

    /// Call one function with raw `name -> text` inputs, coerced to the
    /// types the function declares.
    pub async fn call_function(
        &self,
        host: &str,
        port: u16,
        function_id: &str,
        raw_inputs: &BTreeMap<String, String>,
    ) -> Result<Value> {
        let (key, api_key) = self.credential(host, port).await?;

        let catalog = self
            .probe
            .list_functions(host, port, Some(&api_key), self.request_timeout)
            .await
            .into_result(&key)?;
        let function = catalog.find(function_id).ok_or_else(|| {
            Error::NotFound(format!("function '{}' on {}", function_id, key))
        })?;

        let inputs = coerce_inputs(function, raw_inputs)?;
        tracing::debug!("Calling {} on {} with {} inputs", function_id, key, inputs.len());

        self.probe
            .invoke(host, port, function_id, inputs, Some(&api_key), self.request_timeout)
            .await
            .into_result(&key)
    }

    /// Forget every known device. Remotes keep their associations.
    pub async fn clear_devices(&self) -> Result<usize> {
        let removed = self.store.clear_devices().await?;
        tracing::info!("Cleared {} devices", removed);
        Ok(removed)
    }

    async fn credential(&self, host: &str, port: u16) -> Result<(String, String)> {
        let key = host_port(host, port);
        let device = self
            .store
            .find_device(&key)
            .await
            .ok_or_else(|| Error::NotFound(format!("device {}", key)))?;

        match device.api_key.filter(|k| !k.is_empty()) {
            Some(api_key) => Ok((key, api_key)),
            None => Err(Error::Unauthorized { device: key }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(store: Arc<Store>) -> DeviceRegistry {
        DeviceRegistry::new(store, Probe::new().unwrap(), Duration::from_millis(200))
    }

    fn found(host: &str, port: u16, name: &str) -> DiscoveredDevice {
        DiscoveredDevice {
            host: host.to_string(),
            port,
            name: name.to_string(),
            description: String::new(),
            version: "1.0".to_string(),
            discovered: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_record_discoveries_keeps_one_record_per_endpoint() {
        let store = Arc::new(Store::in_memory());
        let registry = registry(store.clone());

        registry
            .record_discoveries(&[found("10.0.0.5", 5000, "Pi")])
            .await
            .unwrap();
        let id = store.find_device("10.0.0.5:5000").await.unwrap().id;
        store
            .update_device(id, |d| d.api_key = Some("secret".to_string()))
            .await
            .unwrap();

        registry
            .record_discoveries(&[found("10.0.0.5", 5000, "Pi v2"), found("10.0.0.6", 5000, "Other")])
            .await
            .unwrap();

        let devices = registry.known_devices().await;
        assert_eq!(devices.len(), 2);
        let pi = store.find_device("10.0.0.5:5000").await.unwrap();
        assert_eq!(pi.name, "Pi v2");
        assert_eq!(pi.api_key.as_deref(), Some("secret"));
    }

    #[tokio::test]
    async fn test_display_devices_marks_remembered() {
        let store = Arc::new(Store::in_memory());
        let registry = registry(store);
        registry
            .record_discoveries(&[found("10.0.0.5", 5000, "A"), found("10.0.0.6", 5000, "B")])
            .await
            .unwrap();

        let display = registry.display_devices(&[found("10.0.0.6", 5000, "B")]).await;
        assert_eq!(display.len(), 2);
        assert!(display[0].is_online());
        assert_eq!(display[0].key(), "10.0.0.6:5000");
        assert!(!display[1].is_online());
    }

    #[tokio::test]
    async fn test_empty_api_key_is_rejected_without_request() {
        let store = Arc::new(Store::in_memory());
        let registry = registry(store.clone());
        let err = registry.save_api_key("10.0.0.5", 5000, "  ").await.unwrap_err();
        assert!(matches!(err, Error::Invalid(_)));
        assert!(store.list_devices().await.is_empty());
    }

    #[tokio::test]
    async fn test_list_functions_needs_a_stored_key() {
        let store = Arc::new(Store::in_memory());
        let registry = registry(store);

        let err = registry.list_functions("10.0.0.5", 5000).await.unwrap_err();
        assert!(err.is_not_found());

        registry
            .record_discoveries(&[found("10.0.0.5", 5000, "Pi")])
            .await
            .unwrap();
        let err = registry.list_functions("10.0.0.5", 5000).await.unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn test_clear_devices() {
        let store = Arc::new(Store::in_memory());
        let registry = registry(store);
        registry
            .record_discoveries(&[found("10.0.0.5", 5000, "Pi")])
            .await
            .unwrap();
        assert_eq!(registry.clear_devices().await.unwrap(), 1);
        assert!(registry.known_devices().await.is_empty());
    }
}
