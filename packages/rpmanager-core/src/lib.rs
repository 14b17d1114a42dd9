//! RP Manager Core Library
//!
//! This crate provides the core functionality for managing devices that
//! serve the device HTTP API on a local network:
//! - Discovery (concurrent probe of a host x port space)
//! - Known-device registry with API keys, function listing and calls
//! - Remotes: named collections of functions across devices, and the
//!   grouped cross-device view built from them
//!
//! All state lives in one local JSON document ([`store::Store`]).
//!
//! # Example
//!
//! ```no_run
//! use rpmanager_core::{config, Session};
//!
//! #[tokio::main]
//! async fn main() -> rpmanager_core::Result<()> {
//!     let config = config::load_config()?;
//!     let session = Session::open(&config)?;
//!
//!     // Scan and remember whatever answered
//!     let summary = session.scan().await?;
//!     println!("Found {} devices", summary.discovered);
//!
//!     // Group the functions of the first remote by device
//!     if let Some(remote) = session.remotes().list().await.first() {
//!         let view = session.aggregator().build_view(remote.id).await?;
//!         for (device, group) in &view {
//!             println!("{} ({}): {} functions", group.device_name, device, group.functions.len());
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod model;
pub mod registry;
pub mod remotes;
pub mod scanner;
pub mod session;
pub mod store;

// Re-export commonly used types
pub use config::{ConfigSource, ManagerConfig};
pub use device::{DeviceFunction, FunctionCatalog, Probe, ProbeOutcome};
pub use error::{Error, Result, StorageError};
pub use model::{Device, FunctionRef, Remote, RemoteFunction};
pub use registry::{DeviceRegistry, DisplayDevice};
pub use remotes::{Aggregator, DeviceGroup, GroupedFunction, RemoteService, RemoteStatus, RemoteView, Toggled};
pub use scanner::{DiscoveredDevice, ScanConfig, Scanner};
pub use session::{ScanSummary, Session};
pub use store::Store;
