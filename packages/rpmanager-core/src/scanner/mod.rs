//! Device discovery.
//!
//! Brute-force probe of a configured address space: every (host, port)
//! candidate gets one `GET /discover` with a short timeout, all of them in
//! flight at once. Candidates that do not answer are silently dropped.
//!
//! Every probe runs concurrently with no cap, so the number of simultaneous
//! connections grows with hosts x ports.

mod candidates;
mod state;

pub use candidates::{build_candidates, candidate_hosts, subnet_hosts, Candidate, MAX_SUBNET_HOSTS};
pub use state::{PublishedScan, ScanState, ScanTicket};

use crate::device::{Probe, ProbeOutcome};
use crate::error::Result;
use crate::model::host_port;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Default per-candidate discovery timeout
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_millis(500);

/// Conventional ports the device service listens on
pub const DEFAULT_PORTS: [u16; 4] = [5000, 8000, 8080, 3001];

/// Loopback aliases that are always scanned
pub const DEFAULT_HOSTS: [&str; 2] = ["localhost", "127.0.0.1"];

/// Default subnet for the sweep
pub const DEFAULT_SUBNET: &str = "192.168.1.0/24";

/// What to scan
#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
    pub hosts: Vec<String>,
    /// Subnet to sweep, e.g. "192.168.1.0/24"; `None` scans `hosts` only
    pub subnet: Option<String>,
    pub ports: Vec<u16>,
    pub timeout: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            hosts: DEFAULT_HOSTS.iter().map(|h| h.to_string()).collect(),
            subnet: Some(DEFAULT_SUBNET.to_string()),
            ports: DEFAULT_PORTS.to_vec(),
            timeout: DEFAULT_SCAN_TIMEOUT,
        }
    }
}

/// A device that answered discovery in this scan (not persisted)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredDevice {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub description: String,
    pub version: String,
    /// Completion time of the scan that found it
    pub discovered: DateTime<Utc>,
}

impl DiscoveredDevice {
    pub fn key(&self) -> String {
        host_port(&self.host, self.port)
    }
}

pub struct Scanner {
    probe: Probe,
    config: ScanConfig,
    candidates: Vec<Candidate>,
}

impl Scanner {
    /// Build a scanner; fails only on an unparsable subnet.
    pub fn new(probe: Probe, config: ScanConfig) -> Result<Self> {
        let hosts = candidate_hosts(&config.hosts, config.subnet.as_deref())?;
        let candidates = build_candidates(&hosts, &config.ports);

        tracing::debug!(
            "Scanner ready: {} hosts x {} ports = {} candidates",
            hosts.len(),
            config.ports.len(),
            candidates.len()
        );

        Ok(Self {
            probe,
            config,
            candidates,
        })
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    /// Probe every candidate and return the ones that answered.
    ///
    /// Never fails: unreachable or rejecting candidates are excluded. Result
    /// order is unspecified.
    pub async fn scan(&self) -> Vec<DiscoveredDevice> {
        let scan_start = Instant::now();
        let timeout = self.config.timeout;

        tracing::info!(
            "[Scan] Probing {} candidates (timeout {}ms)",
            self.candidates.len(),
            timeout.as_millis()
        );

        let probes = self.candidates.iter().map(|candidate| async move {
            match self.probe.discover(&candidate.host, candidate.port, timeout).await {
                ProbeOutcome::Success(info) => {
                    tracing::debug!(
                        "Found '{}' at {}:{}",
                        info.name,
                        candidate.host,
                        candidate.port
                    );
                    Some((candidate, info))
                }
                ProbeOutcome::Unauthorized => {
                    tracing::debug!(
                        "{}:{} rejected discovery, skipping",
                        candidate.host,
                        candidate.port
                    );
                    None
                }
                ProbeOutcome::Unreachable(_) => None,
            }
        });

        let answered = futures::future::join_all(probes).await;

        let completed_at = Utc::now();
        let devices: Vec<DiscoveredDevice> = answered
            .into_iter()
            .flatten()
            .map(|(candidate, info)| DiscoveredDevice {
                host: candidate.host.clone(),
                port: candidate.port,
                name: info.name,
                description: info.description,
                version: info.version,
                discovered: completed_at,
            })
            .collect();

        tracing::info!(
            "[Scan] Complete: {} devices found in {:.1}s",
            devices.len(),
            scan_start.elapsed().as_secs_f64()
        );

        devices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe() -> Probe {
        Probe::new().unwrap()
    }

    #[test]
    fn test_default_config_covers_loopback_and_subnet() {
        let scanner = Scanner::new(probe(), ScanConfig::default()).unwrap();
        // 2 loopback aliases + 254 subnet hosts, 4 ports each
        assert_eq!(scanner.candidates().len(), 256 * 4);
    }

    #[test]
    fn test_invalid_subnet_fails_construction() {
        let config = ScanConfig {
            subnet: Some("192.168.1.0/99".to_string()),
            ..ScanConfig::default()
        };
        assert!(Scanner::new(probe(), config).is_err());
    }

    #[tokio::test]
    async fn test_scan_with_no_candidates() {
        let config = ScanConfig {
            hosts: Vec::new(),
            subnet: None,
            ports: vec![5000],
            timeout: Duration::from_millis(50),
        };
        let scanner = Scanner::new(probe(), config).unwrap();
        assert!(scanner.scan().await.is_empty());
    }
}
