//! Importers from third-party sources, selected by name.

use crate::error::{SyncError, SyncResult};
use serde::Deserialize;
use sshconf_core::{
    ApplicationStorage, GetStrategyKind, Host, Model, Query, SshConfig, SSH_CONFIG,
};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Counts of an import run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceReport {
    /// Records created.
    pub created: usize,
    /// Records changed.
    pub updated: usize,
    /// Records already up to date.
    pub unchanged: usize,
}

impl fmt::Display for ServiceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} unchanged",
            self.created, self.updated, self.unchanged
        )
    }
}

/// Imports records from an external source into local storage.
pub trait SyncService {
    /// Returns the registered name.
    fn name(&self) -> &str;

    /// Imports into `storage`, inside its own session.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Service`] if the source cannot be read.
    fn sync(&mut self, storage: &mut ApplicationStorage) -> SyncResult<ServiceReport>;
}

/// Builds a service from an optional credentials path.
pub type ServiceConstructor = fn(Option<&Path>) -> SyncResult<Box<dyn SyncService>>;

/// Maps service names to constructors.
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    services: BTreeMap<&'static str, ServiceConstructor>,
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.services.keys()).finish()
    }
}

impl ServiceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in services.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(HostsJsonService::NAME, HostsJsonService::construct);
        registry
    }

    /// Registers a constructor, replacing any under the same name.
    pub fn register(&mut self, name: &'static str, constructor: ServiceConstructor) {
        self.services.insert(name, constructor);
    }

    /// Returns the registered names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        self.services.keys().copied().collect()
    }

    /// Builds the named service.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::UnknownService`] for an unregistered name, or the
    /// constructor's error.
    pub fn create(
        &self,
        name: &str,
        credentials: Option<&Path>,
    ) -> SyncResult<Box<dyn SyncService>> {
        let constructor = self
            .services
            .get(name)
            .ok_or_else(|| SyncError::UnknownService { name: name.into() })?;
        constructor(credentials)
    }
}

#[derive(Debug, Deserialize)]
struct HostEntry {
    label: String,
    address: String,
    #[serde(default)]
    port: Option<u16>,
}

/// Imports hosts from a JSON file: `[{"label", "address", "port"?}]`.
///
/// Hosts are matched by address. A port is stored on the host's SSH config,
/// which is created when missing.
#[derive(Debug, Clone)]
pub struct HostsJsonService {
    path: PathBuf,
}

impl HostsJsonService {
    /// Registered name.
    pub const NAME: &'static str = "hosts-json";

    /// Creates a service reading `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// [`ServiceConstructor`] for the registry; the credentials path is the
    /// hosts file.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Service`] when no path is given.
    pub fn construct(credentials: Option<&Path>) -> SyncResult<Box<dyn SyncService>> {
        let path = credentials
            .ok_or_else(|| SyncError::service(Self::NAME, "a hosts file is required"))?;
        Ok(Box::new(Self::new(path)))
    }

    fn load(&self) -> SyncResult<Vec<HostEntry>> {
        let bytes = std::fs::read(&self.path).map_err(|e| {
            SyncError::service(Self::NAME, format!("cannot read {}: {e}", self.path.display()))
        })?;
        serde_json::from_slice(&bytes).map_err(|e| {
            SyncError::service(Self::NAME, format!("invalid {}: {e}", self.path.display()))
        })
    }

    fn import(
        storage: &mut ApplicationStorage,
        entry: &HostEntry,
        report: &mut ServiceReport,
    ) -> SyncResult<()> {
        let existing = storage
            .filter::<Host>(&Query::new().with("address", entry.address.as_str()))?
            .into_iter()
            .next();
        let Some(mut host) = existing else {
            let mut host = Host::new(&entry.label, &entry.address);
            if let Some(port) = entry.port {
                let config = storage.save(SshConfig::new().with_port(port))?;
                host.set("ssh_config", config.id());
            }
            storage.save(host)?;
            report.created += 1;
            return Ok(());
        };

        host.take_related();
        let mut changed = false;
        if host.label() != Some(entry.label.as_str()) {
            host.set("label", entry.label.as_str());
            changed = true;
        }
        if let Some(port) = entry.port {
            let config = match host.reference("ssh_config") {
                Some(id) => storage.find_record(&SSH_CONFIG, id, GetStrategyKind::Internal)?,
                None => None,
            };
            match config {
                Some(config) if config.integer("port") == Some(i64::from(port)) => {}
                Some(mut config) => {
                    config.set("port", port);
                    storage.save_record(config)?;
                    changed = true;
                }
                None => {
                    let config = storage.save(SshConfig::new().with_port(port))?;
                    host.set("ssh_config", config.id());
                    changed = true;
                }
            }
        }
        if changed {
            debug!(address = %entry.address, "updating host");
            storage.save(host)?;
            report.updated += 1;
        } else {
            report.unchanged += 1;
        }
        Ok(())
    }
}

impl SyncService for HostsJsonService {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn sync(&mut self, storage: &mut ApplicationStorage) -> SyncResult<ServiceReport> {
        let entries = self.load()?;
        info!(path = %self.path.display(), hosts = entries.len(), "importing hosts");
        storage.session(|s| {
            let mut report = ServiceReport::default();
            for entry in &entries {
                Self::import(s, entry, &mut report)?;
            }
            Ok(report)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sshconf_core::{StorageConfig, HOST};
    use tempfile::TempDir;

    fn write_hosts(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("hosts.json");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn unknown_service() {
        let registry = ServiceRegistry::with_builtin();
        assert_eq!(registry.names(), vec!["hosts-json"]);
        let err = registry.create("aws", None).err().unwrap();
        assert!(matches!(err, SyncError::UnknownService { ref name } if name == "aws"));
    }

    #[test]
    fn hosts_json_requires_a_path() {
        let err = ServiceRegistry::with_builtin()
            .create(HostsJsonService::NAME, None)
            .err()
            .unwrap();
        assert!(matches!(err, SyncError::Service { .. }));
    }

    #[test]
    fn import_upserts_by_address() {
        let dir = TempDir::new().unwrap();
        let path = write_hosts(
            &dir,
            r#"[{"label": "web", "address": "10.0.0.1", "port": 2222},
                {"label": "db", "address": "10.0.0.2"}]"#,
        );
        let mut storage = ApplicationStorage::in_memory(StorageConfig::new()).unwrap();
        let mut service = ServiceRegistry::with_builtin()
            .create(HostsJsonService::NAME, Some(&path))
            .unwrap();

        let report = service.sync(&mut storage).unwrap();
        assert_eq!(report.created, 2);
        assert_eq!(storage.count(&HOST), 2);
        let config: SshConfig = storage.get(&Query::new().with("port", 2222)).unwrap();
        let web: Host = storage.get(&Query::new().with("label", "web")).unwrap();
        assert_eq!(web.reference("ssh_config"), config.id());

        // Re-running is a no-op; changes update in place.
        let report = service.sync(&mut storage).unwrap();
        assert_eq!(report.unchanged, 2);

        write_hosts(
            &dir,
            r#"[{"label": "web-1", "address": "10.0.0.1", "port": 22},
                {"label": "db", "address": "10.0.0.2", "port": 5432}]"#,
        );
        let report = service.sync(&mut storage).unwrap();
        assert_eq!(report.updated, 2);
        assert_eq!(storage.count(&HOST), 2);
        assert_eq!(storage.count(&SSH_CONFIG), 2);
        let web: Host = storage.get(&Query::new().with("address", "10.0.0.1")).unwrap();
        assert_eq!(web.label(), Some("web-1"));
    }

    #[test]
    fn invalid_file_is_a_service_error() {
        let dir = TempDir::new().unwrap();
        let path = write_hosts(&dir, "{not json");
        let mut storage = ApplicationStorage::in_memory(StorageConfig::new()).unwrap();
        let err = HostsJsonService::new(path).sync(&mut storage).unwrap_err();
        assert!(matches!(err, SyncError::Service { .. }));
    }
}
