//! Display formatting for CLI output
//!
//! SBIO pattern: Pure functions that format data for display

use super::commands::{ContextInfo, NodeSetInfo};
use crate::network::NetworkStatus;
use crate::state::NetworkState;

// ============================================================================
// Table formatting helpers
// ============================================================================

/// Format a simple table with headers and rows
pub fn format_table(headers: &[&str], rows: Vec<Vec<String>>) -> String {
    if rows.is_empty() {
        return "No resources found.\n".to_string();
    }

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let mut output = String::new();
    let mut push_row = |cells: Vec<String>| {
        let line: Vec<String> = cells
            .into_iter()
            .enumerate()
            .map(|(i, cell)| match widths.get(i) {
                Some(width) => format!("{:width$}", cell, width = *width),
                None => cell,
            })
            .collect();
        output.push_str(line.join("   ").trim_end());
        output.push('\n');
    };

    push_row(headers.iter().map(|h| h.to_uppercase()).collect());
    for row in rows {
        push_row(row);
    }

    output
}

fn yes_no(value: bool) -> String {
    if value { "yes" } else { "no" }.to_string()
}

// ============================================================================
// Context display
// ============================================================================

pub fn format_context_list(contexts: &[ContextInfo]) -> String {
    let headers = &["", "NAME", "URL"];
    let rows: Vec<Vec<String>> = contexts
        .iter()
        .map(|ctx| {
            vec![
                if ctx.is_current { "*" } else { " " }.to_string(),
                ctx.name.clone(),
                ctx.url.clone(),
            ]
        })
        .collect();

    format_table(headers, rows)
}

pub fn format_current_context(name: &str, url: &str) -> String {
    format!("Current context: {} ({})\n", name, url)
}

// ============================================================================
// Network display
// ============================================================================

pub fn format_node_set_list(node_sets: &[NodeSetInfo]) -> String {
    let headers = &["INDEX", "NAME", "GROUP", "MODE", "DATA NODE", "VISOR", "RUNNING"];
    let rows: Vec<Vec<String>> = node_sets
        .iter()
        .map(|ns| {
            vec![
                ns.index.to_string(),
                ns.name.clone(),
                ns.group_name.clone(),
                ns.mode.to_string(),
                yes_no(ns.data_node),
                yes_no(ns.visor),
                yes_no(ns.running),
            ]
        })
        .collect();

    format_table(headers, rows)
}

/// Summary printed after `network generate`
pub fn format_generated(state: &NetworkState) -> String {
    let mut output = String::new();
    if let Some(config) = &state.config {
        output.push_str(&format!("Network:    {}\n", config.network.name));
        output.push_str(&format!("Directory:  {}\n", config.output_dir.display()));
    }
    output.push_str(&format!("Chain ID:   {}\n", state.vega_chain_id));

    if let Some(services) = &state.generated_services {
        output.push_str(&format!("Node sets:  {}\n", services.node_sets.len()));
        if let Some(wallet) = &services.wallet {
            output.push_str(&format!("Wallet:     {}\n", wallet.service.name));
        }
        if let Some(faucet) = &services.faucet {
            output.push_str(&format!("Faucet:     {}\n", faucet.service.name));
        }
        for binary in &services.binaries {
            output.push_str(&format!("Binary:     {}\n", binary.service.name));
        }
    }
    output
}

pub fn format_network_status(status: &NetworkStatus) -> String {
    let mut output = format!(
        "Network {} ({}) in {}: {}\n\n",
        status.name,
        status.chain_id,
        status.output_dir.display(),
        if status.running { "running" } else { "stopped" }
    );

    let headers = &["JOB", "KIND", "STATUS"];
    let rows: Vec<Vec<String>> = status
        .jobs
        .iter()
        .map(|job| {
            let kind = serde_json::to_value(job.kind)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            let state = match (&job.status, &job.error) {
                (_, Some(err)) => format!("error: {}", err),
                (Some(status), None) => status.clone(),
                (None, None) => "not found".to_string(),
            };
            vec![job.job_id.clone(), kind, state]
        })
        .collect();

    output.push_str(&format_table(headers, rows));
    output
}
