//! Latest published scan, guarded by scan generations.
//!
//! Every scan takes a ticket before it starts probing. A scan may only
//! publish its results if no scan that started after it has already
//! published, so a slow, superseded scan can never overwrite newer results.

use super::DiscoveredDevice;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Proof that a scan was started; consumed when publishing.
#[derive(Debug)]
pub struct ScanTicket {
    generation: u64,
}

impl ScanTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// A published scan result
#[derive(Debug, Clone, Default)]
pub struct PublishedScan {
    pub generation: u64,
    pub devices: Vec<DiscoveredDevice>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct ScanState {
    started: AtomicU64,
    latest: RwLock<PublishedScan>,
}

impl ScanState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new scan generation.
    pub fn begin(&self) -> ScanTicket {
        let generation = self.started.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!("Scan generation {} started", generation);
        ScanTicket { generation }
    }

    /// Publish results for `ticket`. Returns false, and changes nothing, when
    /// a newer generation has already published.
    pub async fn publish(&self, ticket: ScanTicket, devices: Vec<DiscoveredDevice>) -> bool {
        let mut latest = self.latest.write().await;

        if ticket.generation <= latest.generation {
            tracing::info!(
                "Discarding results of scan generation {} ({} already published)",
                ticket.generation,
                latest.generation
            );
            return false;
        }

        *latest = PublishedScan {
            generation: ticket.generation,
            devices,
            completed_at: Some(Utc::now()),
        };
        true
    }

    pub async fn latest(&self) -> PublishedScan {
        self.latest.read().await.clone()
    }

    /// Number of scans started so far
    pub fn started(&self) -> u64 {
        self.started.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn found(host: &str) -> DiscoveredDevice {
        DiscoveredDevice {
            host: host.to_string(),
            port: 5000,
            name: "Pi".to_string(),
            description: String::new(),
            version: "1.0".to_string(),
            discovered: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_in_order_scans_publish() {
        let state = ScanState::new();

        let first = state.begin();
        assert!(state.publish(first, vec![found("10.0.0.5")]).await);

        let second = state.begin();
        assert!(state.publish(second, vec![found("10.0.0.6")]).await);

        let latest = state.latest().await;
        assert_eq!(latest.generation, 2);
        assert_eq!(latest.devices[0].host, "10.0.0.6");
    }

    #[tokio::test]
    async fn test_stale_scan_is_discarded() {
        let state = ScanState::new();

        let slow = state.begin();
        let fast = state.begin();
        assert_eq!(state.started(), 2);

        assert!(state.publish(fast, vec![found("10.0.0.6")]).await);
        assert!(!state.publish(slow, vec![found("10.0.0.5")]).await);

        let latest = state.latest().await;
        assert_eq!(latest.generation, 2);
        assert_eq!(latest.devices.len(), 1);
        assert_eq!(latest.devices[0].host, "10.0.0.6");
    }

    #[tokio::test]
    async fn test_nothing_published_initially() {
        let state = ScanState::new();
        let latest = state.latest().await;
        assert_eq!(latest.generation, 0);
        assert!(latest.devices.is_empty());
        assert!(latest.completed_at.is_none());
    }
}
