//! Configuration snapshot commands.

use anyhow::{Context, Result};
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum SnapshotCommands {
    /// Re-read the server's snapshot file
    Reload,

    /// Apply a configuration change from a JSON or YAML file
    Apply {
        /// File holding one change, e.g. `{"op": "set_permission", ...}`
        file: PathBuf,
    },
}

#[derive(Debug, Deserialize, Serialize)]
struct ReloadResult {
    changed: bool,
    invalidated: u64,
    roles: usize,
    menus: usize,
    #[serde(default)]
    syncs: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize, Serialize)]
struct ChangeResult {
    invalidated: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sync: Option<serde_json::Value>,
}

pub async fn execute(cmd: SnapshotCommands, client: &ApiClient, format: OutputFormat) -> Result<()> {
    match cmd {
        SnapshotCommands::Reload => {
            let result: ReloadResult = client.post_empty("/api/v1/snapshot/reload").await?;
            match format {
                OutputFormat::Table => {
                    if !result.changed {
                        output::print_info("Snapshot unchanged");
                        return Ok(());
                    }
                    output::print_success("Snapshot reloaded");
                    output::print_detail("Roles", &result.roles.to_string());
                    output::print_detail("Menus", &result.menus.to_string());
                    output::print_detail("Invalidated", &result.invalidated.to_string());
                    if !result.syncs.is_empty() {
                        output::print_detail("Re-synced roles", &result.syncs.len().to_string());
                    }
                }
                _ => output::print_item(&result, format)?,
            }
        }

        SnapshotCommands::Apply { file } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let change: serde_json::Value = match file.extension().and_then(|e| e.to_str()) {
                Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                    .with_context(|| format!("Failed to parse {}", file.display()))?,
                _ => serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse {}", file.display()))?,
            };

            let result: ChangeResult = client.post("/api/v1/changes", &change).await?;
            match format {
                OutputFormat::Table => {
                    output::print_success("Change applied");
                    output::print_detail("Invalidated", &result.invalidated.to_string());
                    if result.sync.is_some() {
                        output::print_info("Group mappings changed; the role was re-synced");
                    }
                }
                _ => output::print_item(&result, format)?,
            }
        }
    }

    Ok(())
}
