//! Test fixtures and storage helpers.
//!
//! Provides convenience functions for setting up storages and common
//! record graphs.

use sshconf_core::{
    ApplicationStorage, Group, Host, PfRule, SaveStrategyKind, Snippet, SshConfig, SshIdentity,
    SshKey, StorageConfig, Tag, TagHost,
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A file-backed storage with automatic cleanup.
pub struct TestStorage {
    /// The storage instance.
    pub storage: ApplicationStorage,
    config: StorageConfig,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: TempDir,
}

impl TestStorage {
    /// Creates a storage file in a fresh temporary directory.
    pub fn file(config: StorageConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = config.path(temp_dir.path().join("test.storage"));
        let storage = ApplicationStorage::open(config.clone()).expect("Failed to open storage");
        Self {
            storage,
            config,
            _temp_dir: temp_dir,
        }
    }

    /// Drops the in-memory state and reloads the file.
    pub fn reopen(self) -> Self {
        let storage =
            ApplicationStorage::open(self.config.clone()).expect("Failed to reopen storage");
        Self { storage, ..self }
    }

    /// Returns the storage file path.
    pub fn path(&self) -> PathBuf {
        self.storage
            .path()
            .map(Path::to_path_buf)
            .expect("File storage should have a path")
    }
}

impl std::ops::Deref for TestStorage {
    type Target = ApplicationStorage;

    fn deref(&self) -> &Self::Target {
        &self.storage
    }
}

impl std::ops::DerefMut for TestStorage {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.storage
    }
}

/// Default configuration with cascading saves.
pub fn cascade_config() -> StorageConfig {
    StorageConfig::new().save_strategy(SaveStrategyKind::Cascade)
}

/// Creates an in-memory storage.
pub fn memory_storage(config: StorageConfig) -> ApplicationStorage {
    ApplicationStorage::in_memory(config).expect("Failed to open in-memory storage")
}

/// Runs a test with a temporary in-memory storage.
pub fn with_temp_storage<F, R>(f: F) -> R
where
    F: FnOnce(&mut ApplicationStorage) -> R,
{
    let mut storage = memory_storage(StorageConfig::new());
    f(&mut storage)
}

/// Saves one record of every terminal set, linked together.
///
/// Requires a cascading save strategy. Returns the saved host.
pub fn seed_terminal(storage: &mut ApplicationStorage) -> Host {
    let key = SshKey::new("deploy").with_public_key("ssh-ed25519 AAAA");
    let identity = SshIdentity::new("ops", "root").with_ssh_key(key);
    let config = SshConfig::new()
        .with_port(2222)
        .with_identity(identity)
        .with_startup_snippet(Snippet::new("uptime", "uptime"));
    let group = Group::new("prod").with_ssh_config(config);
    let host = storage
        .save(Host::new("web", "10.0.0.1").with_group(group))
        .expect("Failed to save host");
    let tag = storage.save(Tag::new("linux")).expect("Failed to save tag");
    storage
        .save(PfRule::new(host.clone(), "L", 8080).with_destination("localhost", 80))
        .expect("Failed to save rule");
    storage
        .save(TagHost::new(host.clone(), tag))
        .expect("Failed to save tag link");
    host
}
