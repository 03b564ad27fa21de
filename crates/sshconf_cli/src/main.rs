//! sshconf CLI
//!
//! Command-line tool keeping the local SSH configuration storage in sync
//! with the remote service.
//!
//! # Commands
//!
//! - `push` - Send local changes to the remote service
//! - `pull` - Fetch remote changes into the local storage
//! - `fullclean` - Delete every record, locally and remotely
//! - `sync` - Run a named sync service
//! - `inspect` - Display storage statistics

mod client;
mod commands;
mod credentials;
mod error;
mod settings;

use clap::{Parser, Subcommand};
use commands::remote::{Operation, RemoteArgs};
use settings::Settings;
use sshconf_core::{SaveStrategyKind, StorageConfig, DEFAULT_APPLICATION_NAME};
use sshconf_sync_engine::ServiceRegistry;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Sync SSH hosts, groups and keys with the remote service.
#[derive(Parser)]
#[command(name = "sshconf")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the storage file
    #[arg(global = true, long)]
    storage: Option<PathBuf>,

    /// Application name, used for the storage and settings file names
    #[arg(global = true, long, env = "SSHCONF_APP", default_value = DEFAULT_APPLICATION_NAME)]
    app: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send local changes to the remote service
    Push(RemoteArgs),

    /// Fetch remote changes into the local storage
    Pull(RemoteArgs),

    /// Delete every record locally and on the remote service
    Fullclean(RemoteArgs),

    /// Run a named sync service
    Sync {
        /// Service name
        service: String,

        /// Credentials or input file for the service
        #[arg(short, long)]
        credentials: Option<PathBuf>,
    },

    /// Display storage statistics
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut storage_config = StorageConfig::new()
        .application_name(cli.app.as_str())
        .save_strategy(SaveStrategyKind::Cascade);
    if let Some(path) = cli.storage {
        storage_config = storage_config.path(path);
    }

    match cli.command {
        Commands::Push(args) => {
            let settings_path = Settings::path_for(&cli.app)?;
            commands::remote::run(Operation::Push, storage_config, &settings_path, args)?;
        }
        Commands::Pull(args) => {
            let settings_path = Settings::path_for(&cli.app)?;
            commands::remote::run(Operation::Pull, storage_config, &settings_path, args)?;
        }
        Commands::Fullclean(args) => {
            let settings_path = Settings::path_for(&cli.app)?;
            commands::remote::run(Operation::FullClean, storage_config, &settings_path, args)?;
        }
        Commands::Sync {
            service,
            credentials,
        } => {
            commands::service::run(&service, credentials.as_deref(), storage_config)?;
        }
        Commands::Inspect { format } => {
            commands::inspect::run(storage_config, &format)?;
        }
        Commands::Version => {
            println!("sshconf CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("sync services: {}", ServiceRegistry::with_builtin().names().join(", "));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use sshconf_core::GetStrategyKind;
    use sshconf_sync_engine::ConflictPolicy;

    #[test]
    fn command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_remote_options() {
        let cli = Cli::try_parse_from([
            "sshconf", "push", "-p", "secret", "-u", "ops", "-s", "shallow", "--conflict",
            "client-wins",
        ])
        .unwrap();
        let Commands::Push(args) = cli.command else {
            panic!("expected push");
        };
        assert_eq!(args.password.as_deref(), Some("secret"));
        assert_eq!(args.username.as_deref(), Some("ops"));
        assert_eq!(args.strategy, GetStrategyKind::Shallow);
        assert_eq!(args.conflict, ConflictPolicy::ClientWins);
    }

    #[test]
    fn rejects_unknown_strategy() {
        assert!(Cli::try_parse_from(["sshconf", "pull", "-s", "deep"]).is_err());
    }

    #[test]
    fn parses_sync_service() {
        let cli = Cli::try_parse_from(["sshconf", "sync", "hosts-json", "-c", "hosts.json"])
            .unwrap();
        let Commands::Sync {
            service,
            credentials,
        } = cli.command
        else {
            panic!("expected sync");
        };
        assert_eq!(service, "hosts-json");
        assert_eq!(credentials, Some(PathBuf::from("hosts.json")));
    }
}
