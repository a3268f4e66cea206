//! Authorization check command.
//!
//! Asks the gate whether a role may open a menu, either by menu key or by
//! request path, and optionally prints the per-ancestor trace.

use anyhow::Result;
use clap::Args;
use serde::{Deserialize, Serialize};

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct CheckArgs {
    /// Role identifier
    role: String,

    /// Menu key to check
    #[arg(required_unless_present = "route", conflicts_with = "route")]
    menu: Option<String>,

    /// Check the menu serving this request path instead of a menu key
    #[arg(short, long)]
    route: Option<String>,

    /// Show how each ancestor contributed to the decision
    #[arg(short, long, requires = "menu")]
    explain: bool,
}

#[derive(Debug, Deserialize, Serialize)]
struct Decision {
    role: String,
    #[serde(default)]
    menu: Option<String>,
    authorized: bool,
    state: String,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    cache_hit: bool,
}

#[derive(Debug, Deserialize, Serialize)]
struct TraceStep {
    role: String,
    decision: String,
    granted: bool,
}

#[derive(Debug, Deserialize, Serialize)]
struct Trace {
    role: String,
    menu: String,
    steps: Vec<TraceStep>,
    module_active: bool,
    granted: bool,
}

pub async fn execute(args: CheckArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let decision: Decision = match (&args.menu, &args.route) {
        (Some(menu), _) => {
            client
                .get_with("/api/v1/authorize", &[("role", args.role.as_str()), ("menu", menu.as_str())])
                .await?
        }
        (None, Some(path)) => {
            client
                .get_with("/api/v1/authorize/route", &[("role", args.role.as_str()), ("path", path.as_str())])
                .await?
        }
        (None, None) => anyhow::bail!("either a menu key or --route is required"),
    };

    if !matches!(format, OutputFormat::Table) {
        output::print_item(&decision, format)?;
    } else {
        let target = decision.menu.as_deref().or(args.route.as_deref()).unwrap_or("-");
        if decision.authorized {
            output::print_success(&format!("{} may open {}", decision.role, target));
        } else {
            output::print_denied(&format!(
                "{} may not open {} ({})",
                decision.role,
                target,
                decision.reason.as_deref().unwrap_or(&decision.state)
            ));
        }
        if decision.cache_hit {
            output::print_detail("Cache", "hit");
        }
    }

    if args.explain {
        if let Some(menu) = &args.menu {
            let trace: Trace = client
                .get_with("/api/v1/authorize/explain", &[("role", args.role.as_str()), ("menu", menu.as_str())])
                .await?;
            print_trace(&trace, format)?;
        }
    }

    Ok(())
}

fn print_trace(trace: &Trace, format: OutputFormat) -> Result<()> {
    if !matches!(format, OutputFormat::Table) {
        return output::print_item(trace, format);
    }

    output::print_header(&format!("Resolution of {} for {}", trace.menu, trace.role));
    for (depth, step) in trace.steps.iter().enumerate() {
        output::print_detail(
            &format!("{}{}", "  ".repeat(depth), step.role),
            &format!("{} -> {}", step.decision, if step.granted { "granted" } else { "not granted" }),
        );
    }
    if !trace.module_active {
        output::print_info("Menu module is inactive or missing");
    }
    Ok(())
}
