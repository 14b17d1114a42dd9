//! Candidate address space: configured hosts plus a subnet sweep, crossed
//! with the configured ports.

use crate::error::{Error, Result};
use ipnetwork::IpNetwork;
use std::collections::HashSet;

/// Upper bound on hosts taken from one subnet
pub const MAX_SUBNET_HOSTS: usize = 254;

/// One (host, port) pair to probe
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Candidate {
    pub host: String,
    pub port: u16,
}

/// Host addresses of `subnet`, without the network and broadcast addresses.
pub fn subnet_hosts(subnet: &str) -> Result<Vec<String>> {
    let network: IpNetwork = subnet
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("invalid subnet '{}': {}", subnet, e)))?;

    // One extra host is taken to tell whether the sweep was truncated.
    let mut hosts: Vec<String> = match network {
        IpNetwork::V4(net) if net.prefix() < 31 => net
            .iter()
            .filter(|ip| *ip != net.network() && *ip != net.broadcast())
            .take(MAX_SUBNET_HOSTS + 1)
            .map(|ip| ip.to_string())
            .collect(),
        other => other
            .iter()
            .take(MAX_SUBNET_HOSTS + 1)
            .map(|ip| ip.to_string())
            .collect(),
    };

    if hosts.len() > MAX_SUBNET_HOSTS {
        hosts.truncate(MAX_SUBNET_HOSTS);
        tracing::warn!(
            "Subnet {} has more than {} hosts, only the first {} are scanned",
            subnet,
            MAX_SUBNET_HOSTS,
            MAX_SUBNET_HOSTS
        );
    }

    Ok(hosts)
}

/// Configured hosts followed by the subnet sweep, duplicates removed.
pub fn candidate_hosts(hosts: &[String], subnet: Option<&str>) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut all = Vec::new();

    let swept = match subnet {
        Some(subnet) => subnet_hosts(subnet)?,
        None => Vec::new(),
    };

    for host in hosts.iter().map(|h| h.trim().to_string()).chain(swept) {
        if !host.is_empty() && seen.insert(host.clone()) {
            all.push(host);
        }
    }

    Ok(all)
}

/// Cartesian product of hosts and ports, each pair once.
pub fn build_candidates(hosts: &[String], ports: &[u16]) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    hosts
        .iter()
        .flat_map(|host| {
            ports.iter().map(move |port| Candidate {
                host: host.clone(),
                port: *port,
            })
        })
        .filter(|c| seen.insert(c.clone()))
        .collect()
}
