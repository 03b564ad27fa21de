//! Push, pull and full-clean commands.

use crate::client::ReqwestClient;
use crate::credentials::Credentials;
use crate::error::{CliError, CliResult};
use crate::settings::Settings;
use clap::Args;
use dialoguer::Password;
use sshconf_core::{ApplicationStorage, GetStrategyKind, StorageConfig};
use sshconf_sync_engine::{
    BulkTransport, ConflictPolicy, HttpBulkTransport, Reconciler, SyncConfig, DEFAULT_API_URL,
};
use std::path::Path;
use tracing::info;
use zeroize::Zeroizing;

/// Reconciliation to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Send local changes.
    Push,
    /// Fetch remote changes.
    Pull,
    /// Pull, delete everything, push.
    FullClean,
}

/// Options shared by commands talking to the remote service.
#[derive(Debug, Args)]
pub struct RemoteArgs {
    /// Account password, prompted for when absent
    #[arg(short, long, env = "SSHCONF_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Account username (remembered in the settings file)
    #[arg(short, long, env = "SSHCONF_USERNAME")]
    pub username: Option<String>,

    /// API base URL (remembered in the settings file)
    #[arg(long, env = "SSHCONF_API_URL")]
    pub api_url: Option<String>,

    /// Get strategy used to resolve records (internal, related, shallow)
    #[arg(short, long, default_value = "related")]
    pub strategy: GetStrategyKind,

    /// Winner for records changed on both sides (server-wins, client-wins)
    #[arg(long, default_value = "server-wins")]
    pub conflict: ConflictPolicy,
}

/// Runs a reconciliation against the remote service.
pub fn run(
    operation: Operation,
    storage_config: StorageConfig,
    settings_path: &Path,
    args: RemoteArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut settings = Settings::load(settings_path)?;
    let username = args
        .username
        .or_else(|| settings.username.clone())
        .ok_or(CliError::MissingUsername)?;
    let password = match args.password {
        Some(password) => Zeroizing::new(password),
        None => prompt_password(&username)?,
    };
    let api_url = args
        .api_url
        .or_else(|| settings.api_url.clone())
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());

    let salt = settings.salt_or_generate().to_string();
    settings.username = Some(username.clone());
    settings.api_url = Some(api_url.clone());

    let credentials = Credentials::derive(&username, password.as_bytes(), salt.as_bytes())?;
    let config = SyncConfig::new(api_url)
        .with_conflict_policy(args.conflict)
        .with_push_resolution(args.strategy);
    let client = ReqwestClient::new(&credentials, config.timeout)?;
    let transport = HttpBulkTransport::new(config.base_url.clone(), client);
    let reconciler = Reconciler::new(transport, config);

    let mut storage = ApplicationStorage::open(storage_config.get_strategy(args.strategy))?;
    info!(user = credentials.username(), ?operation, "starting");
    let report = execute(operation, &reconciler, &mut storage, &settings, settings_path)?;
    println!("{report}");
    Ok(())
}

/// Runs the operation and remembers the settings once it succeeded.
fn execute<T: BulkTransport>(
    operation: Operation,
    reconciler: &Reconciler<T>,
    storage: &mut ApplicationStorage,
    settings: &Settings,
    settings_path: &Path,
) -> Result<String, Box<dyn std::error::Error>> {
    let report = match operation {
        Operation::Push => reconciler.push(storage)?.to_string(),
        Operation::Pull => reconciler.pull(storage)?.to_string(),
        Operation::FullClean => reconciler.full_clean(storage)?.to_string(),
    };
    settings.save(settings_path)?;
    Ok(report)
}

fn prompt_password(username: &str) -> CliResult<Zeroizing<String>> {
    let password = Password::new()
        .with_prompt(format!("Password for {username}"))
        .interact()?;
    Ok(Zeroizing::new(password))
}
