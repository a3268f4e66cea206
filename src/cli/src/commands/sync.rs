//! Group membership sync command.

use anyhow::Result;
use clap::Args;
use serde::{Deserialize, Serialize};
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct SyncArgs {
    /// Role to reconcile
    #[arg(required_unless_present = "all", conflicts_with = "all")]
    role: Option<String>,

    /// Reconcile every role with mappings or existing memberships
    #[arg(short, long)]
    all: bool,
}

#[derive(Debug, Deserialize, Serialize)]
struct OperationError {
    error: serde_json::Value,
}

#[derive(Debug, Deserialize, Serialize)]
struct Operation {
    action: String,
    group: String,
    attempts: u32,
    #[serde(default)]
    error: Option<OperationError>,
}

#[derive(Debug, Deserialize, Serialize)]
struct Report {
    role: String,
    operations: Vec<Operation>,
    #[serde(default)]
    read_error: Option<OperationError>,
    #[serde(default)]
    audit_failures: u32,
}

#[derive(Debug, Serialize, Tabled)]
struct ReportRow {
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "Added")]
    added: usize,
    #[tabled(rename = "Removed")]
    removed: usize,
    #[tabled(rename = "Failed")]
    failed: usize,
    #[tabled(rename = "Status")]
    status: String,
}

impl From<&Report> for ReportRow {
    fn from(report: &Report) -> Self {
        let succeeded = |action: &str| {
            report
                .operations
                .iter()
                .filter(|op| op.action == action && op.error.is_none())
                .count()
        };
        let failed = report.operations.iter().filter(|op| op.error.is_some()).count();
        let status = if report.read_error.is_some() {
            "read failed"
        } else if failed > 0 {
            "partial"
        } else if report.operations.is_empty() {
            "converged"
        } else {
            "ok"
        };
        Self {
            role: report.role.clone(),
            added: succeeded("add_membership"),
            removed: succeeded("remove_membership"),
            failed,
            status: status.to_string(),
        }
    }
}

pub async fn execute(args: SyncArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let reports: Vec<Report> = match &args.role {
        Some(role) => vec![client.post_empty(&format!("/api/v1/roles/{}/sync", role)).await?],
        None => client.post_empty("/api/v1/sync").await?,
    };

    match format {
        OutputFormat::Table => {
            let rows: Vec<ReportRow> = reports.iter().map(ReportRow::from).collect();
            output::print_list(&rows, format)?;

            let failures: usize = rows.iter().map(|r| r.failed).sum();
            let audit_failures: u32 = reports.iter().map(|r| r.audit_failures).sum();
            if audit_failures > 0 {
                output::print_error(&format!("{} audit entries could not be written", audit_failures));
            }
            if failures == 0 {
                output::print_success(&format!("Synced {} role(s)", rows.len()));
            } else {
                output::print_denied(&format!("{} membership operation(s) failed; see `menugate audit --failures`", failures));
            }
        }
        _ => output::print_item(&reports, format)?,
    }

    Ok(())
}
