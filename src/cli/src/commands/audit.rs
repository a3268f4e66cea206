//! Audit log query command.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use serde::{Deserialize, Serialize};
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct AuditArgs {
    /// Only entries for this role
    #[arg(short, long)]
    role: Option<String>,

    /// Only entries targeting this group
    #[arg(short, long)]
    group: Option<String>,

    /// Only failed operations
    #[arg(short, long)]
    failures: bool,

    /// Entries at or after this RFC 3339 timestamp
    #[arg(long)]
    since: Option<DateTime<Utc>>,

    /// Maximum number of results
    #[arg(short, long, default_value = "50")]
    limit: u32,
}

#[derive(Debug, Serialize)]
struct AuditQuery<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    success: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    since: Option<DateTime<Utc>>,
    limit: u32,
}

#[derive(Debug, Deserialize, Serialize)]
struct AuditEntry {
    action: String,
    target_id: String,
    role: String,
    timestamp: DateTime<Utc>,
    success: bool,
    message: String,
}

#[derive(Debug, Serialize, Tabled)]
struct AuditRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Result")]
    result: String,
}

impl From<AuditEntry> for AuditRow {
    fn from(entry: AuditEntry) -> Self {
        Self {
            time: entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            role: entry.role,
            action: entry.action,
            target: entry.target_id,
            result: if entry.success {
                "ok".to_string()
            } else {
                entry.message
            },
        }
    }
}

pub async fn execute(args: AuditArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let query = AuditQuery {
        role: args.role.as_deref(),
        target: args.group.as_deref(),
        success: args.failures.then_some(false),
        since: args.since,
        limit: args.limit,
    };

    let entries: Vec<AuditEntry> = client.get_with("/api/v1/audit", &query).await?;

    match format {
        OutputFormat::Table => {
            let rows: Vec<AuditRow> = entries.into_iter().map(AuditRow::from).collect();
            output::print_list(&rows, format)?;
        }
        _ => output::print_item(&entries, format)?,
    }

    Ok(())
}
