//! One open store plus the services that work on it.

use crate::config::ManagerConfig;
use crate::device::Probe;
use crate::error::Result;
use crate::registry::{DeviceRegistry, DisplayDevice};
use crate::remotes::{Aggregator, RemoteService};
use crate::scanner::{ScanState, Scanner};
use crate::store::Store;
use serde::Serialize;
use std::sync::Arc;

/// Outcome of one scan
#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    pub generation: u64,
    /// False when a newer scan had already published its results
    pub published: bool,
    /// Devices that answered this scan
    pub discovered: usize,
    /// Latest published scan merged with the remembered devices
    pub devices: Vec<DisplayDevice>,
}

pub struct Session {
    store: Arc<Store>,
    scanner: Scanner,
    scan_state: ScanState,
    registry: DeviceRegistry,
    remotes: RemoteService,
    aggregator: Aggregator,
}

impl Session {
    /// Open the store named by `config` and wire up the services.
    pub fn open(config: &ManagerConfig) -> Result<Self> {
        let store = Arc::new(Store::open(config.state_path())?);
        Self::with_store(config, store)
    }

    pub fn with_store(config: &ManagerConfig, store: Arc<Store>) -> Result<Self> {
        let probe = Probe::new()?;
        let scanner = Scanner::new(probe.clone(), config.scan.clone())?;

        Ok(Self {
            registry: DeviceRegistry::new(store.clone(), probe.clone(), config.request_timeout),
            remotes: RemoteService::new(store.clone()),
            aggregator: Aggregator::new(store.clone(), probe, config.request_timeout),
            scan_state: ScanState::new(),
            scanner,
            store,
        })
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn scanner(&self) -> &Scanner {
        &self.scanner
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn remotes(&self) -> &RemoteService {
        &self.remotes
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub fn scan_state(&self) -> &ScanState {
        &self.scan_state
    }

    /// Run one scan, record every device that answered, and publish the
    /// results unless a newer scan got there first.
    pub async fn scan(&self) -> Result<ScanSummary> {
        let ticket = self.scan_state.begin();
        let generation = ticket.generation();

        let found = self.scanner.scan().await;
        let discovered = found.len();

        self.registry.record_discoveries(&found).await?;
        let published = self.scan_state.publish(ticket, found).await;

        let latest = self.scan_state.latest().await;
        let devices = self.registry.display_devices(&latest.devices).await;

        Ok(ScanSummary {
            generation,
            published,
            discovered,
            devices,
        })
    }
}
