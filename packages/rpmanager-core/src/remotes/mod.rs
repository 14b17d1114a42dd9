//! Remotes: named collections of device functions, and the cross-device
//! view built from them.

mod aggregator;

pub use aggregator::{Aggregator, DeviceGroup, GroupedFunction, RemoteView};

use crate::error::{Error, Result};
use crate::model::{is_online, FunctionRef, Remote, RemoteFunction};
use crate::store::Store;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

/// Devices referenced by a remote and how many of them are online
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RemoteStatus {
    pub online: usize,
    pub total: usize,
}

/// Membership of a function after a toggle
#[derive(Debug, Clone, PartialEq)]
pub enum Toggled {
    Added(RemoteFunction),
    Removed,
}

pub struct RemoteService {
    store: Arc<Store>,
}

impl RemoteService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// All remotes in creation order.
    pub async fn list(&self) -> Vec<Remote> {
        self.store.list_remotes().await
    }

    pub async fn get(&self, remote_id: u64) -> Result<Remote> {
        self.store
            .get_remote(remote_id)
            .await
            .ok_or_else(|| Error::NotFound(format!("remote {}", remote_id)))
    }

    pub async fn create(&self, name: &str) -> Result<Remote> {
        let name = valid_name(name)?;
        let remote = self.store.insert_remote(name, Utc::now()).await?;
        tracing::info!("Created remote '{}' ({})", remote.name, remote.id);
        Ok(remote)
    }

    /// Create a remote that starts out with one function.
    pub async fn create_with_function(
        &self,
        name: &str,
        function: &FunctionRef,
    ) -> Result<(Remote, RemoteFunction)> {
        let remote = self.create(name).await?;
        let added = self
            .store
            .insert_remote_function(remote.id, function, Utc::now())
            .await?;
        Ok((remote, added))
    }

    /// Rename a remote; bumps its `updated` time.
    pub async fn rename(&self, remote_id: u64, name: &str) -> Result<Remote> {
        let name = valid_name(name)?.to_string();
        let now = Utc::now();
        self.store
            .update_remote(remote_id, move |remote| {
                remote.name = name;
                remote.updated = now;
            })
            .await?
            .ok_or_else(|| Error::NotFound(format!("remote {}", remote_id)))
    }

    /// Delete a remote and all of its functions. Returns how many function
    /// associations went with it.
    pub async fn delete(&self, remote_id: u64) -> Result<usize> {
        let removed = self
            .store
            .delete_remote(remote_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("remote {}", remote_id)))?;
        tracing::info!("Deleted remote {} and {} functions", remote_id, removed);
        Ok(removed)
    }

    /// Associations of one remote, in the order they were added.
    pub async fn functions(&self, remote_id: u64) -> Result<Vec<RemoteFunction>> {
        self.get(remote_id).await?;
        Ok(self.store.remote_functions_for(remote_id).await)
    }

    /// Add a function to a remote. Adding one that is already there returns
    /// the existing association.
    pub async fn add_function(&self, remote_id: u64, function: &FunctionRef) -> Result<RemoteFunction> {
        self.get(remote_id).await?;

        if let Some(existing) = self.store.find_remote_function(remote_id, function).await {
            tracing::debug!(
                "{} on {} is already in remote {}",
                function.function_id,
                function.device_key(),
                remote_id
            );
            return Ok(existing);
        }

        let added = self
            .store
            .insert_remote_function(remote_id, function, Utc::now())
            .await?;
        Ok(added)
    }

    pub async fn remove_function(&self, remote_function_id: u64) -> Result<()> {
        if self.store.delete_remote_function(remote_function_id).await? {
            Ok(())
        } else {
            Err(Error::NotFound(format!("remote function {}", remote_function_id)))
        }
    }

    /// Add the function when it is absent, remove it when present.
    pub async fn toggle_function(&self, remote_id: u64, function: &FunctionRef) -> Result<Toggled> {
        self.get(remote_id).await?;

        match self.store.find_remote_function(remote_id, function).await {
            Some(existing) => {
                self.store.delete_remote_function(existing.id).await?;
                Ok(Toggled::Removed)
            }
            None => {
                let added = self
                    .store
                    .insert_remote_function(remote_id, function, Utc::now())
                    .await?;
                Ok(Toggled::Added(added))
            }
        }
    }

    /// Remotes that contain `function`.
    pub async fn memberships(&self, function: &FunctionRef) -> Vec<Remote> {
        let containing: HashSet<u64> = self
            .store
            .list_remote_functions()
            .await
            .into_iter()
            .filter(|rf| rf.refers_to(function))
            .map(|rf| rf.remote_id)
            .collect();

        self.store
            .list_remotes()
            .await
            .into_iter()
            .filter(|r| containing.contains(&r.id))
            .collect()
    }

    /// Count the distinct devices a remote references and how many are
    /// online. Devices without a record count as offline.
    pub async fn device_status(&self, remote_id: u64) -> Result<RemoteStatus> {
        let functions = self.functions(remote_id).await?;
        let devices = self.store.list_devices().await;
        let now = Utc::now();

        let keys: HashSet<String> = functions.iter().map(RemoteFunction::device_key).collect();
        let online = keys
            .iter()
            .filter(|key| {
                devices
                    .iter()
                    .find(|d| &d.host_port == *key)
                    .is_some_and(|d| is_online(d.last_seen, now))
            })
            .count();

        Ok(RemoteStatus {
            online,
            total: keys.len(),
        })
    }
}

fn valid_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::Invalid("remote name must not be empty".to_string()));
    }
    Ok(name)
}
