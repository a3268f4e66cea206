//! Menugate CLI - Command-line interface for the Menugate authorization service.
//!
//! Provides commands for authorization checks, role inspection, group sync,
//! audit queries, snapshot management, and health.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{audit, cache, check, config, health, roles, snapshot, sync};
use output::OutputFormat;

/// Menugate - Hierarchical menu authorization CLI
#[derive(Parser)]
#[command(
    name = "menugate",
    version,
    about = "Menugate - Hierarchical menu authorization",
    long_about = "CLI tool for querying menu authorization, reconciling group memberships and inspecting the audit log.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// API server URL
    #[arg(long, global = true, env = "MENUGATE_API_URL")]
    api_url: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether a role may open a menu
    Check(check::CheckArgs),

    /// Role permission and menu tree inspection
    #[command(subcommand)]
    Role(roles::RoleCommands),

    /// Reconcile group memberships
    Sync(sync::SyncArgs),

    /// Query the sync audit log
    Audit(audit::AuditArgs),

    /// Snapshot reload and configuration changes
    #[command(subcommand)]
    Snapshot(snapshot::SnapshotCommands),

    /// Permission cache inspection
    #[command(subcommand)]
    Cache(cache::CacheCommands),

    /// Check service health
    Health(health::HealthArgs),

    /// CLI configuration management
    #[command(subcommand)]
    Config(config::ConfigCommands),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let api_url = cli
        .api_url
        .clone()
        .or_else(|| config::load_value("api-url"))
        .unwrap_or_else(|| "http://localhost:8080".to_string());

    let client = client::ApiClient::new(&api_url)?;
    let format = cli.output;

    let result = match cli.command {
        Commands::Check(args) => check::execute(args, &client, format).await,
        Commands::Role(cmd) => roles::execute(cmd, &client, format).await,
        Commands::Sync(args) => sync::execute(args, &client, format).await,
        Commands::Audit(args) => audit::execute(args, &client, format).await,
        Commands::Snapshot(cmd) => snapshot::execute(cmd, &client, format).await,
        Commands::Cache(cmd) => cache::execute(cmd, &client, format).await,
        Commands::Health(args) => health::execute(args, &client, format).await,
        Commands::Config(cmd) => config::execute(cmd, format).await,
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
