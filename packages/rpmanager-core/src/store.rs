//! Local store for devices, remotes and remote functions.
//!
//! The three tables live in one JSON document on disk. Every mutation is
//! applied to a copy of the document, written out, and only then swapped in,
//! so a failed write leaves the previous state intact.

use crate::error::StorageError;
use crate::model::{Device, FunctionRef, Remote, RemoteFunction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// State file name inside the data directory
pub const STATE_FILE: &str = "rpmanager_db.json";

const SCHEMA_VERSION: u32 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Database {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    devices: Vec<Device>,
    #[serde(default)]
    remotes: Vec<Remote>,
    #[serde(default)]
    remote_functions: Vec<RemoteFunction>,
    #[serde(default)]
    last_ids: LastIds,
}

impl Default for Database {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            devices: Vec::new(),
            remotes: Vec::new(),
            remote_functions: Vec::new(),
            last_ids: LastIds::default(),
        }
    }
}

/// Highest id handed out per table. Ids are never reused.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LastIds {
    #[serde(default)]
    device: u64,
    #[serde(default)]
    remote: u64,
    #[serde(default)]
    remote_function: u64,
}

fn allocate_id(last: &mut u64, existing: impl Iterator<Item = u64>) -> u64 {
    let highest = existing.max().unwrap_or(0).max(*last);
    *last = highest + 1;
    *last
}

/// Handle to the local database.
///
/// Open it once per process and share it behind an `Arc`.
#[derive(Debug)]
pub struct Store {
    path: Option<PathBuf>,
    db: Mutex<Database>,
}

impl Store {
    /// Open the store at `path`, creating an empty one if the file is missing.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StorageError::DirectoryAccess(format!("{}: {}", parent.display(), e)))?;
        }

        let db = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let mut db: Database = serde_json::from_str(&content)?;
            db.version = SCHEMA_VERSION;
            tracing::info!(
                "Loaded store: {} devices, {} remotes, {} remote functions",
                db.devices.len(),
                db.remotes.len(),
                db.remote_functions.len()
            );
            db
        } else {
            tracing::debug!("No store file at {:?}, starting empty", path);
            Database::default()
        };

        Ok(Self {
            path: Some(path),
            db: Mutex::new(db),
        })
    }

    /// A store that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            db: Mutex::new(Database::default()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn read<R>(&self, f: impl FnOnce(&Database) -> R) -> R {
        let db = self.db.lock().await;
        f(&db)
    }

    async fn mutate<R>(&self, f: impl FnOnce(&mut Database) -> R) -> Result<R, StorageError> {
        let mut db = self.db.lock().await;
        let mut next = db.clone();
        let out = f(&mut next);
        self.persist(&next).await?;
        *db = next;
        Ok(out)
    }

    async fn persist(&self, db: &Database) -> Result<(), StorageError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let content = serde_json::to_string_pretty(db)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, path).await?;

        tracing::trace!("Saved store to {:?}", path);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Devices
    // ------------------------------------------------------------------

    pub async fn list_devices(&self) -> Vec<Device> {
        self.read(|db| db.devices.clone()).await
    }

    /// Equality lookup on the `host:port` key.
    pub async fn find_device(&self, host_port: &str) -> Option<Device> {
        self.read(|db| db.devices.iter().find(|d| d.host_port == host_port).cloned())
            .await
    }

    /// Insert a device, or overwrite the record that already holds its
    /// `host:port`. The stored record keeps its id either way.
    pub async fn insert_device(&self, mut device: Device) -> Result<Device, StorageError> {
        device.host_port = device.key();
        self.mutate(move |db| {
            if let Some(existing) = db
                .devices
                .iter_mut()
                .find(|d| d.host_port == device.host_port)
            {
                device.id = existing.id;
                *existing = device.clone();
            } else {
                device.id = allocate_id(&mut db.last_ids.device, db.devices.iter().map(|d| d.id));
                db.devices.push(device.clone());
            }
            device
        })
        .await
    }

    /// Replace the record at `host_port` with `merge(existing)` in one step.
    pub async fn upsert_device(
        &self,
        host_port: &str,
        merge: impl FnOnce(Option<Device>) -> Device,
    ) -> Result<Device, StorageError> {
        self.mutate(move |db| {
            let position = db.devices.iter().position(|d| d.host_port == host_port);
            let mut device = merge(position.map(|i| db.devices[i].clone()));
            device.host_port = device.key();

            match position {
                Some(i) => {
                    device.id = db.devices[i].id;
                    db.devices[i] = device.clone();
                }
                None => {
                    device.id = allocate_id(&mut db.last_ids.device, db.devices.iter().map(|d| d.id));
                    db.devices.push(device.clone());
                }
            }
            device
        })
        .await
    }

    /// Apply `update` to the device with the given id.
    pub async fn update_device(
        &self,
        id: u64,
        update: impl FnOnce(&mut Device),
    ) -> Result<Option<Device>, StorageError> {
        self.mutate(move |db| {
            db.devices.iter_mut().find(|d| d.id == id).map(|device| {
                update(device);
                device.clone()
            })
        })
        .await
    }

    /// Remove every device record. Remotes and their functions are kept.
    pub async fn clear_devices(&self) -> Result<usize, StorageError> {
        self.mutate(|db| {
            let count = db.devices.len();
            db.devices.clear();
            count
        })
        .await
    }

    // ------------------------------------------------------------------
    // Remotes
    // ------------------------------------------------------------------

    /// Remotes in creation order.
    pub async fn list_remotes(&self) -> Vec<Remote> {
        self.read(|db| db.remotes.clone()).await
    }

    pub async fn get_remote(&self, id: u64) -> Option<Remote> {
        self.read(|db| db.remotes.iter().find(|r| r.id == id).cloned())
            .await
    }

    pub async fn insert_remote(
        &self,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<Remote, StorageError> {
        let name = name.to_string();
        self.mutate(move |db| {
            let remote = Remote {
                id: allocate_id(&mut db.last_ids.remote, db.remotes.iter().map(|r| r.id)),
                name,
                created: now,
                updated: now,
            };
            db.remotes.push(remote.clone());
            remote
        })
        .await
    }

    pub async fn update_remote(
        &self,
        id: u64,
        update: impl FnOnce(&mut Remote),
    ) -> Result<Option<Remote>, StorageError> {
        self.mutate(move |db| {
            db.remotes.iter_mut().find(|r| r.id == id).map(|remote| {
                update(remote);
                remote.clone()
            })
        })
        .await
    }

    /// Delete a remote together with all of its functions.
    ///
    /// Returns the number of function rows removed, or `None` if no such
    /// remote existed.
    pub async fn delete_remote(&self, id: u64) -> Result<Option<usize>, StorageError> {
        self.mutate(move |db| {
            let before = db.remotes.len();
            db.remotes.retain(|r| r.id != id);
            if db.remotes.len() == before {
                return None;
            }
            Some(remove_functions_of(db, id))
        })
        .await
    }

    // ------------------------------------------------------------------
    // Remote functions
    // ------------------------------------------------------------------

    pub async fn list_remote_functions(&self) -> Vec<RemoteFunction> {
        self.read(|db| db.remote_functions.clone()).await
    }

    /// Functions of one remote, in the order they were added.
    pub async fn remote_functions_for(&self, remote_id: u64) -> Vec<RemoteFunction> {
        self.read(|db| {
            db.remote_functions
                .iter()
                .filter(|rf| rf.remote_id == remote_id)
                .cloned()
                .collect()
        })
        .await
    }

    pub async fn find_remote_function(
        &self,
        remote_id: u64,
        function: &FunctionRef,
    ) -> Option<RemoteFunction> {
        self.read(|db| {
            db.remote_functions
                .iter()
                .find(|rf| rf.remote_id == remote_id && rf.refers_to(function))
                .cloned()
        })
        .await
    }

    pub async fn get_remote_function(&self, id: u64) -> Option<RemoteFunction> {
        self.read(|db| db.remote_functions.iter().find(|rf| rf.id == id).cloned())
            .await
    }

    /// Append an association. No uniqueness check happens here.
    pub async fn insert_remote_function(
        &self,
        remote_id: u64,
        function: &FunctionRef,
        now: DateTime<Utc>,
    ) -> Result<RemoteFunction, StorageError> {
        let function = function.clone();
        self.mutate(move |db| {
            let rf = RemoteFunction {
                id: allocate_id(
                    &mut db.last_ids.remote_function,
                    db.remote_functions.iter().map(|rf| rf.id),
                ),
                remote_id,
                device_host: function.host,
                device_port: function.port,
                function_id: function.function_id,
                added: now,
            };
            db.remote_functions.push(rf.clone());
            rf
        })
        .await
    }

    pub async fn delete_remote_function(&self, id: u64) -> Result<bool, StorageError> {
        self.mutate(move |db| {
            let before = db.remote_functions.len();
            db.remote_functions.retain(|rf| rf.id != id);
            db.remote_functions.len() != before
        })
        .await
    }

    pub async fn delete_remote_functions_for(&self, remote_id: u64) -> Result<usize, StorageError> {
        self.mutate(move |db| remove_functions_of(db, remote_id))
            .await
    }
}

fn remove_functions_of(db: &mut Database, remote_id: u64) -> usize {
    let before = db.remote_functions.len();
    db.remote_functions.retain(|rf| rf.remote_id != remote_id);
    before - db.remote_functions.len()
}
