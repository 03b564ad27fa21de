//! Storage configuration.

use crate::error::{CoreError, CoreResult};
use crate::model::TERMINAL_SCHEMAS;
use crate::schema::SetSchema;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Default application name.
pub const DEFAULT_APPLICATION_NAME: &str = "sshconf";

/// Default backing file location. `~` is the user's home directory.
pub const DEFAULT_PATH_TEMPLATE: &str = "~/.{application_name}.storage";

/// How stored records are resolved on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GetStrategyKind {
    /// Raw fields only.
    #[default]
    Internal,
    /// Follow every foreign key, recursively.
    Related,
    /// Follow foreign keys one level deep.
    Shallow,
}

/// How records are prepared and marked on write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveStrategyKind {
    /// Write as is, no bookkeeping.
    Plain,
    /// Mark every written record for the next push.
    #[default]
    Sync,
    /// Like `Sync`, and persist unsaved related records first.
    Cascade,
}

/// How deletions are tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeleteStrategyKind {
    /// Remove only, no tombstones.
    Plain,
    /// Keep a tombstone for records the remote side knows about.
    #[default]
    Sync,
    /// Like `Sync`, and delete records that reference the deleted one.
    Cascade,
}

/// What a storage session does with the driver when its body fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitPolicy {
    /// Flush on exit even after an error; partial mutations persist.
    #[default]
    Always,
    /// Flush on success, roll back to the last flushed state on error.
    OnSuccess,
}

macro_rules! kind_names {
    ($kind:ident { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $kind {
            /// Returns the configuration name of this variant.
            #[must_use]
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }
        }

        impl FromStr for $kind {
            type Err = CoreError;

            fn from_str(s: &str) -> CoreResult<Self> {
                match s.to_ascii_lowercase().as_str() {
                    $($name => Ok(Self::$variant),)+
                    other => Err(CoreError::config(format!(
                        concat!("unknown ", stringify!($kind), " '{}'"),
                        other
                    ))),
                }
            }
        }

        impl fmt::Display for $kind {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

kind_names!(GetStrategyKind { Internal => "internal", Related => "related", Shallow => "shallow" });
kind_names!(SaveStrategyKind { Plain => "plain", Sync => "sync", Cascade => "cascade" });
kind_names!(DeleteStrategyKind { Plain => "plain", Sync => "sync", Cascade => "cascade" });
kind_names!(CommitPolicy { Always => "always", OnSuccess => "on-success" });

/// Configuration for opening an [`ApplicationStorage`](crate::ApplicationStorage).
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Name substituted into the path template.
    pub application_name: String,

    /// Backing file template; `{application_name}` and a leading `~` are
    /// expanded.
    pub path_template: String,

    /// Explicit backing file, bypassing the template.
    pub path: Option<PathBuf>,

    /// Read-side resolution.
    pub get_strategy: GetStrategyKind,

    /// Write-side preparation and marking.
    pub save_strategy: SaveStrategyKind,

    /// Deletion tracking.
    pub delete_strategy: DeleteStrategyKind,

    /// Session exit behavior on error.
    pub commit_policy: CommitPolicy,

    /// Registered record sets, in deletion order.
    pub schemas: Vec<&'static SetSchema>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            application_name: DEFAULT_APPLICATION_NAME.to_string(),
            path_template: DEFAULT_PATH_TEMPLATE.to_string(),
            path: None,
            get_strategy: GetStrategyKind::default(),
            save_strategy: SaveStrategyKind::default(),
            delete_strategy: DeleteStrategyKind::default(),
            commit_policy: CommitPolicy::default(),
            schemas: TERMINAL_SCHEMAS.to_vec(),
        }
    }
}

impl StorageConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the application name.
    #[must_use]
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = name.into();
        self
    }

    /// Sets the path template.
    #[must_use]
    pub fn path_template(mut self, template: impl Into<String>) -> Self {
        self.path_template = template.into();
        self
    }

    /// Uses an explicit backing file.
    #[must_use]
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets the get strategy.
    #[must_use]
    pub const fn get_strategy(mut self, kind: GetStrategyKind) -> Self {
        self.get_strategy = kind;
        self
    }

    /// Sets the save strategy.
    #[must_use]
    pub const fn save_strategy(mut self, kind: SaveStrategyKind) -> Self {
        self.save_strategy = kind;
        self
    }

    /// Sets the delete strategy.
    #[must_use]
    pub const fn delete_strategy(mut self, kind: DeleteStrategyKind) -> Self {
        self.delete_strategy = kind;
        self
    }

    /// Sets the commit policy.
    #[must_use]
    pub const fn commit_policy(mut self, policy: CommitPolicy) -> Self {
        self.commit_policy = policy;
        self
    }

    /// Replaces the registered record sets.
    #[must_use]
    pub fn schemas(mut self, schemas: impl IntoIterator<Item = &'static SetSchema>) -> Self {
        self.schemas = schemas.into_iter().collect();
        self
    }

    /// Resolves the backing file path.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Config`] if the template starts with `~` and no
    /// home directory can be determined, or the application name is empty.
    pub fn storage_path(&self) -> CoreResult<PathBuf> {
        if let Some(path) = &self.path {
            return Ok(path.clone());
        }
        if self.application_name.is_empty() {
            return Err(CoreError::config("application name must not be empty"));
        }
        let formatted = self
            .path_template
            .replace("{application_name}", &self.application_name);
        expand_home(&formatted)
    }

    /// Checks the registered schemas.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Config`] on a reserved or duplicated set name.
    pub fn validate(&self) -> CoreResult<()> {
        for (i, schema) in self.schemas.iter().enumerate() {
            if schema.is_reserved() {
                return Err(CoreError::config(format!(
                    "set name '{}' uses the reserved prefix '{}'",
                    schema.set_name,
                    SetSchema::RESERVED_PREFIX
                )));
            }
            if self.schemas[..i].contains(schema) {
                return Err(CoreError::config(format!(
                    "set '{}' is registered twice",
                    schema.set_name
                )));
            }
        }
        Ok(())
    }
}

/// Expands a leading `~` to the user's home directory.
///
/// # Errors
///
/// Returns [`CoreError::Config`] if the home directory is unknown.
pub fn expand_home(path: &str) -> CoreResult<PathBuf> {
    let rest = match path.strip_prefix('~') {
        Some(rest) => rest.trim_start_matches(['/', '\\']),
        None => return Ok(PathBuf::from(path)),
    };
    let base = directories::BaseDirs::new()
        .ok_or_else(|| CoreError::config("cannot determine the home directory"))?;
    Ok(base.home_dir().join(rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = StorageConfig::default();
        assert_eq!(config.application_name, "sshconf");
        assert_eq!(config.get_strategy, GetStrategyKind::Internal);
        assert_eq!(config.save_strategy, SaveStrategyKind::Sync);
        assert_eq!(config.delete_strategy, DeleteStrategyKind::Sync);
        assert_eq!(config.commit_policy, CommitPolicy::Always);
        assert_eq!(config.schemas.len(), 9);
        config.validate().unwrap();
    }

    #[test]
    fn builder_pattern() {
        let config = StorageConfig::new()
            .application_name("demo")
            .get_strategy(GetStrategyKind::Related)
            .save_strategy(SaveStrategyKind::Cascade)
            .delete_strategy(DeleteStrategyKind::Plain)
            .commit_policy(CommitPolicy::OnSuccess);

        assert_eq!(config.application_name, "demo");
        assert_eq!(config.get_strategy, GetStrategyKind::Related);
        assert_eq!(config.save_strategy, SaveStrategyKind::Cascade);
        assert_eq!(config.delete_strategy, DeleteStrategyKind::Plain);
        assert_eq!(config.commit_policy, CommitPolicy::OnSuccess);
    }

    #[test]
    fn explicit_path_wins() {
        let config = StorageConfig::new().path("/tmp/x.storage");
        assert_eq!(config.storage_path().unwrap(), PathBuf::from("/tmp/x.storage"));
    }

    #[test]
    fn template_is_formatted() {
        let config = StorageConfig::new()
            .application_name("demo")
            .path_template("/var/lib/{application_name}/data.storage");
        assert_eq!(
            config.storage_path().unwrap(),
            PathBuf::from("/var/lib/demo/data.storage")
        );
    }

    #[test]
    fn home_is_expanded() {
        if let Some(base) = directories::BaseDirs::new() {
            let config = StorageConfig::new().application_name("demo");
            assert_eq!(
                config.storage_path().unwrap(),
                base.home_dir().join(".demo.storage")
            );
        }
    }

    #[test]
    fn empty_application_name_rejected() {
        let config = StorageConfig::new().application_name("");
        assert!(matches!(
            config.storage_path(),
            Err(CoreError::Config { .. })
        ));
    }

    #[test]
    fn reserved_and_duplicate_sets_rejected() {
        static PENDING: SetSchema = SetSchema::new("__pending", &[]);
        static NOTE: SetSchema = SetSchema::new("note", &[]);

        let config = StorageConfig::new().schemas([&PENDING]);
        assert!(config.validate().is_err());

        let config = StorageConfig::new().schemas([&NOTE, &NOTE]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn kinds_parse_by_name() {
        assert_eq!(
            "related".parse::<GetStrategyKind>().unwrap(),
            GetStrategyKind::Related
        );
        assert_eq!(
            "Cascade".parse::<SaveStrategyKind>().unwrap(),
            SaveStrategyKind::Cascade
        );
        assert_eq!(
            "on-success".parse::<CommitPolicy>().unwrap(),
            CommitPolicy::OnSuccess
        );
        assert!("deep".parse::<GetStrategyKind>().is_err());
        assert_eq!(DeleteStrategyKind::Cascade.to_string(), "cascade");
    }
}
