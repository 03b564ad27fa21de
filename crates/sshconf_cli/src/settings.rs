//! Per-user settings file.
//!
//! Stored as JSON next to the storage file, at `~/.{application_name}.json`:
//!
//! ```json
//! {"username": "ops@example.com", "api_url": "https://api.example.com", "salt": "6f1c..."}
//! ```

use crate::error::{CliError, CliResult};
use serde::{Deserialize, Serialize};
use sshconf_core::{expand_home, CoreResult};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Values remembered between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Account username.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// API base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Salt for credential derivation, generated on first use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,
}

impl Settings {
    /// Returns the settings path for an application name.
    ///
    /// # Errors
    ///
    /// Returns a config error if the home directory is unknown.
    pub fn path_for(application_name: &str) -> CoreResult<PathBuf> {
        expand_home(&format!("~/.{application_name}.json"))
    }

    /// Loads settings; a missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn load(path: &Path) -> CliResult<Self> {
        match fs::read(path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no settings file");
                Ok(Self::default())
            }
            Err(e) => Err(CliError::settings(path, e)),
        }
    }

    /// Writes settings as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> CliResult<()> {
        let body = serde_json::to_vec_pretty(self)?;
        fs::write(path, body).map_err(|e| CliError::settings(path, e))
    }

    /// Returns the salt, generating one if none is stored yet.
    pub fn salt_or_generate(&mut self) -> &str {
        self.salt
            .get_or_insert_with(|| Uuid::new_v4().simple().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load(&dir.path().join("none.json")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        let mut settings = Settings {
            username: Some("ops".into()),
            ..Settings::default()
        };
        let salt = settings.salt_or_generate().to_string();
        settings.save(&path).unwrap();

        let mut loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded, settings);
        assert_eq!(loaded.salt_or_generate(), salt);
        assert!(!fs::read_to_string(&path).unwrap().contains("api_url"));
    }

    #[test]
    fn invalid_json_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            Settings::load(&path),
            Err(CliError::InvalidSettings(_))
        ));
    }

    #[test]
    fn path_uses_application_name() {
        let path = Settings::path_for("demo").unwrap();
        assert!(path.ends_with(".demo.json"));
    }
}
