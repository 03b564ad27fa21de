//! Inspect command implementation.

use serde::Serialize;
use sshconf_core::{ApplicationStorage, CoreResult, StorageConfig};

/// Storage inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Backing file path.
    pub path: String,
    /// Record sets in deletion order.
    pub sets: Vec<SetStats>,
    /// Records marked for the next push.
    pub pending: usize,
    /// Local deletions not yet confirmed by the remote side.
    pub tombstones: usize,
    /// Last-synced cursor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_synced: Option<String>,
}

/// Statistics for a single record set.
#[derive(Debug, Serialize)]
pub struct SetStats {
    /// Set name.
    pub name: String,
    /// Number of records.
    pub records: usize,
    /// Records never acknowledged by the remote side.
    pub local_only: usize,
}

/// Collects statistics for an open storage.
pub fn inspect(storage: &ApplicationStorage) -> CoreResult<InspectResult> {
    let mut sets = Vec::with_capacity(storage.schemas().len());
    for &schema in storage.schemas() {
        let records = storage.raw_records(schema)?;
        let local_only = records
            .iter()
            .filter(|r| r.id().map_or(true, |id| id.is_local()))
            .count();
        sets.push(SetStats {
            name: schema.set_name.to_string(),
            records: records.len(),
            local_only,
        });
    }
    Ok(InspectResult {
        path: storage
            .path()
            .map_or_else(|| "(memory)".to_string(), |p| p.display().to_string()),
        sets,
        pending: storage.pending().len(),
        tombstones: storage.tombstones().len(),
        last_synced: storage.sync_cursor(),
    })
}

/// Runs the inspect command.
pub fn run(storage_config: StorageConfig, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let path = storage_config.storage_path()?;
    if !path.exists() {
        return Err(format!("No storage found at {}", path.display()).into());
    }
    let storage = ApplicationStorage::open(storage_config)?;
    let result = inspect(&storage)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("Storage: {}", result.path);
    println!();
    for set in &result.sets {
        println!(
            "  {:<14} {:>6} records ({} local only)",
            set.name, set.records, set.local_only
        );
    }
    println!();
    println!("Pending:     {}", result.pending);
    println!("Tombstones:  {}", result.tombstones);
    println!(
        "Last synced: {}",
        result.last_synced.as_deref().unwrap_or("never")
    );
}
