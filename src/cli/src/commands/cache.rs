//! Permission cache inspection commands.

use anyhow::Result;
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Show hit/miss counters
    Stats,

    /// Show recent invalidation events
    Invalidations {
        /// Number of recent entries to show
        #[arg(short, long, default_value = "20")]
        tail: u32,
    },
}

#[derive(Debug, Deserialize, Serialize)]
struct CacheStats {
    hits: u64,
    misses: u64,
    entries: u64,
    invalidated: u64,
    expired: u64,
    hit_rate: f64,
}

#[derive(Debug, Deserialize, Serialize)]
struct InvalidationEntry {
    event: serde_json::Value,
    count: u64,
    timestamp: String,
}

#[derive(Debug, Serialize, Tabled)]
struct InvalidationRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Event")]
    event: String,
    #[tabled(rename = "Dropped")]
    count: u64,
}

impl From<&InvalidationEntry> for InvalidationRow {
    fn from(entry: &InvalidationEntry) -> Self {
        let kind = entry.event.get("type").and_then(|v| v.as_str()).unwrap_or("?");
        let subject = ["role", "menu"]
            .iter()
            .filter_map(|field| entry.event.get(*field).and_then(|v| v.as_str()))
            .collect::<Vec<_>>()
            .join("/");
        Self {
            time: entry.timestamp.clone(),
            event: if subject.is_empty() {
                kind.to_string()
            } else {
                format!("{} {}", kind, subject)
            },
            count: entry.count,
        }
    }
}

pub async fn execute(cmd: CacheCommands, client: &ApiClient, format: OutputFormat) -> Result<()> {
    match cmd {
        CacheCommands::Stats => {
            let stats: CacheStats = client.get("/api/v1/cache/stats").await?;
            match format {
                OutputFormat::Table => {
                    output::print_header("Permission Cache");
                    output::print_detail("Entries", &stats.entries.to_string());
                    output::print_detail("Hits", &stats.hits.to_string());
                    output::print_detail("Misses", &stats.misses.to_string());
                    output::print_detail("Hit rate", &format!("{:.1}%", stats.hit_rate * 100.0));
                    output::print_detail("Invalidated", &stats.invalidated.to_string());
                    output::print_detail("Expired", &stats.expired.to_string());
                }
                _ => output::print_item(&stats, format)?,
            }
        }

        CacheCommands::Invalidations { tail } => {
            let entries: Vec<InvalidationEntry> = client
                .get_with("/api/v1/cache/invalidations", &[("limit", tail)])
                .await?;
            match format {
                OutputFormat::Table => {
                    let rows: Vec<InvalidationRow> = entries.iter().map(InvalidationRow::from).collect();
                    output::print_list(&rows, format)?;
                }
                _ => output::print_item(&entries, format)?,
            }
        }
    }

    Ok(())
}
