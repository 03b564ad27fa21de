//! File-backed driver.

use crate::driver::{Driver, Sets};
use crate::error::{StorageError, StorageResult};
use crate::value::RecordSet;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A driver persisting all sets to a single CBOR file.
///
/// The whole file is read on open and rewritten on [`Driver::sync`].
///
/// # Durability
///
/// `sync()` writes to a sibling temp file, calls `File::sync_all()` and then
/// renames the temp file over the target, so an interrupted write never
/// leaves a half-written store behind.
///
/// # Example
///
/// ```no_run
/// use sshconf_storage::{Driver, FileDriver};
/// use std::path::Path;
///
/// let mut driver = FileDriver::open(Path::new("app.storage")).unwrap();
/// driver.setdefault("host", Vec::new());
/// driver.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileDriver {
    path: PathBuf,
    sets: Sets,
}

impl FileDriver {
    /// Opens the store at `path`.
    ///
    /// A missing or empty file yields an empty store; the file is created
    /// on the first `sync`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Corrupted`] if the file exists but cannot be
    /// decoded, or an I/O error if it cannot be read.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let sets = Self::load(path)?;
        debug!(path = %path.display(), records = sets.record_count(), "opened record store");
        Ok(Self {
            path: path.to_path_buf(),
            sets,
        })
    }

    /// Returns the path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> StorageResult<Sets> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Sets::new()),
            Err(err) => return Err(err.into()),
        };

        if bytes.is_empty() {
            return Ok(Sets::new());
        }

        ciborium::from_reader(bytes.as_slice())
            .map_err(|e| StorageError::corrupted(path, e.to_string()))
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("storage"));
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn write_atomically(&self) -> StorageResult<()> {
        let mut encoded = Vec::new();
        ciborium::into_writer(&self.sets, &mut encoded)
            .map_err(|e| StorageError::Encoding(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp_path = self.temp_path();
        {
            let file = File::create(&temp_path)?;
            let mut writer = BufWriter::new(file);
            writer.write_all(&encoded)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

impl Driver for FileDriver {
    fn get(&self, key: &str) -> Option<&RecordSet> {
        self.sets.get(key)
    }

    fn get_mut(&mut self, key: &str) -> Option<&mut RecordSet> {
        self.sets.get_mut(key)
    }

    fn set(&mut self, key: &str, value: RecordSet) {
        self.sets.set(key, value);
    }

    fn setdefault(&mut self, key: &str, default: RecordSet) -> &mut RecordSet {
        self.sets.setdefault(key, default)
    }

    fn keys(&self) -> Vec<String> {
        self.sets.keys()
    }

    fn sync(&mut self) -> StorageResult<()> {
        if !self.sets.is_modified() && self.path.exists() {
            return Ok(());
        }
        self.write_atomically()?;
        self.sets.mark_clean();
        debug!(path = %self.path.display(), "synced record store");
        Ok(())
    }

    fn rollback(&mut self) -> StorageResult<()> {
        self.sets = Self::load(&self.path)?;
        debug!(path = %self.path.display(), "rolled back record store");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{RawRecord, RecordId, Value};
    use proptest::prelude::*;
    use tempfile::tempdir;

    fn host(id: u64, label: &str) -> RawRecord {
        [
            ("id", Value::from(RecordId::Remote(id))),
            ("label", Value::from(label)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn open_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.storage");

        let driver = FileDriver::open(&path).unwrap();
        assert!(driver.keys().is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn sync_creates_file_even_without_mutation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.storage");

        let mut driver = FileDriver::open(&path).unwrap();
        driver.sync().unwrap();
        assert!(path.exists());

        // Idempotent
        driver.sync().unwrap();
        driver.sync().unwrap();
        assert!(FileDriver::open(&path).unwrap().keys().is_empty());
    }

    #[test]
    fn persistence_preserves_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.storage");

        {
            let mut driver = FileDriver::open(&path).unwrap();
            driver.set("host", vec![host(3, "c"), host(1, "a"), host(2, "b")]);
            driver.sync().unwrap();
        }

        let driver = FileDriver::open(&path).unwrap();
        let labels: Vec<_> = driver
            .get("host")
            .unwrap()
            .iter()
            .map(|r| r.get("label").and_then(Value::as_text).unwrap().to_string())
            .collect();
        assert_eq!(labels, vec!["c", "a", "b"]);
    }

    #[test]
    fn corrupt_file_fails_to_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.storage");
        fs::write(&path, b"\xff\x00not cbor at all").unwrap();

        let err = FileDriver::open(&path).unwrap_err();
        assert!(err.is_corruption());
        // The damaged file is left for inspection.
        assert!(path.exists());
    }

    #[test]
    fn empty_file_is_empty_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.storage");
        fs::write(&path, b"").unwrap();

        let driver = FileDriver::open(&path).unwrap();
        assert!(driver.keys().is_empty());
    }

    #[test]
    fn rollback_discards_unsynced_changes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.storage");

        let mut driver = FileDriver::open(&path).unwrap();
        driver.set("host", vec![host(1, "kept")]);
        driver.sync().unwrap();

        driver.setdefault("host", Vec::new()).push(host(2, "dropped"));
        driver.set("tag", Vec::new());
        driver.rollback().unwrap();

        assert_eq!(driver.get("host").map(Vec::len), Some(1));
        assert!(driver.get("tag").is_none());
    }

    #[test]
    fn no_temp_file_left_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.storage");

        let mut driver = FileDriver::open(&path).unwrap();
        driver.set("host", vec![host(1, "a")]);
        driver.sync().unwrap();

        assert!(!dir.path().join("app.storage.tmp").exists());
    }

    #[test]
    fn sync_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("app.storage");

        let mut driver = FileDriver::open(&path).unwrap();
        driver.set("tag", Vec::new());
        driver.sync().unwrap();
        assert!(path.exists());
        assert_eq!(driver.path(), path);
    }

    fn arb_id() -> impl Strategy<Value = RecordId> {
        prop_oneof![
            any::<u64>().prop_map(RecordId::Remote),
            any::<u128>().prop_map(|n| RecordId::Local(uuid::Uuid::from_u128(n))),
        ]
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        let scalar = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Integer),
            ".{0,12}".prop_map(Value::Text),
            arb_id().prop_map(Value::Id),
        ];
        scalar.prop_recursive(2, 8, 4, |inner| {
            prop::collection::vec(inner, 0..4).prop_map(Value::List)
        })
    }

    fn arb_record() -> impl Strategy<Value = RawRecord> {
        prop::collection::btree_map("[a-z_]{1,8}", arb_value(), 0..5)
            .prop_map(|fields| fields.into_iter().collect())
    }

    proptest! {
        #[test]
        fn reopen_returns_what_was_synced(
            sets in prop::collection::btree_map(
                "[a-z_]{1,10}",
                prop::collection::vec(arb_record(), 0..4),
                0..4,
            ),
        ) {
            let dir = tempdir().unwrap();
            let path = dir.path().join("app.storage");
            {
                let mut driver = FileDriver::open(&path).unwrap();
                for (key, records) in &sets {
                    driver.set(key, records.clone());
                }
                driver.sync().unwrap();
            }

            let driver = FileDriver::open(&path).unwrap();
            prop_assert_eq!(driver.keys(), sets.keys().cloned().collect::<Vec<_>>());
            for (key, records) in &sets {
                prop_assert_eq!(driver.get(key), Some(records));
            }
        }
    }
}
