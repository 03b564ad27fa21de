//! Sync service command implementation.

use sshconf_core::{ApplicationStorage, StorageConfig};
use sshconf_sync_engine::ServiceRegistry;
use std::path::Path;
use tracing::info;

/// Runs a named sync service against the local storage.
pub fn run(
    name: &str,
    credentials: Option<&Path>,
    storage_config: StorageConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let registry = ServiceRegistry::with_builtin();
    let mut service = registry.create(name, credentials)?;
    let mut storage = ApplicationStorage::open(storage_config)?;
    info!(service = service.name(), "syncing");
    let report = service.sync(&mut storage)?;
    println!("{}: {report}", service.name());
    Ok(())
}
