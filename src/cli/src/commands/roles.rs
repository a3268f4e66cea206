//! Role inspection commands.

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use serde::{Deserialize, Serialize};
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum RoleCommands {
    /// List the menu keys a role can access
    Permissions {
        /// Role identifier
        role: String,
    },

    /// Show the navigable menu tree for a role
    Tree {
        /// Role identifier
        role: String,
    },
}

#[derive(Debug, Deserialize, Serialize)]
struct PermissionSet {
    role: String,
    keys: Vec<String>,
}

#[derive(Debug, Serialize, Tabled)]
struct KeyRow {
    #[tabled(rename = "Menu Key")]
    key: String,
}

#[derive(Debug, Deserialize, Serialize)]
struct MenuNode {
    key: String,
    name: String,
    level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<MenuNode>,
}

pub async fn execute(cmd: RoleCommands, client: &ApiClient, format: OutputFormat) -> Result<()> {
    match cmd {
        RoleCommands::Permissions { role } => {
            let set: PermissionSet = client.get(&format!("/api/v1/roles/{}/permissions", role)).await?;
            match format {
                OutputFormat::Table => {
                    let rows: Vec<KeyRow> = set.keys.into_iter().map(|key| KeyRow { key }).collect();
                    output::print_list(&rows, format)?;
                }
                _ => output::print_item(&set, format)?,
            }
        }

        RoleCommands::Tree { role } => {
            let roots: Vec<MenuNode> = client.get(&format!("/api/v1/roles/{}/menu-tree", role)).await?;
            match format {
                OutputFormat::Table => {
                    output::print_header(&format!("Menu tree for {}", role));
                    if roots.is_empty() {
                        println!("{}", "No accessible menus.".dimmed());
                    }
                    for node in &roots {
                        print_node(node, 0);
                    }
                }
                _ => output::print_item(&roots, format)?,
            }
        }
    }

    Ok(())
}

fn print_node(node: &MenuNode, depth: usize) {
    let url = node.url.as_deref().map(|u| format!(" {}", u.dimmed())).unwrap_or_default();
    println!("{}{} {}{}", "  ".repeat(depth), node.key.bold(), format!("({})", node.name).dimmed(), url);
    for child in &node.children {
        print_node(child, depth + 1);
    }
}
