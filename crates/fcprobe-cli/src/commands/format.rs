//! Report rendering for table and JSON output

use std::fmt::Write;

use fcprobe_common::outcome::{ClaimStatus, WorkloadStatus};
use fcprobe_common::report::TargetReport;
use fcprobe_common::RunReport;

use super::{CommandErrorExt, OutputFormat};
use crate::Result;

/// Render the report in the requested format
pub fn render_report(report: &RunReport, output: &OutputFormat) -> Result<String> {
    match output {
        OutputFormat::Table => render_summary(report),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
    }
}

fn render_summary(report: &RunReport) -> Result<String> {
    let headers = ["NODE", "CLAIM", "VOLUME", "DIAGNOSTIC", "WORKLOAD", "DETAIL"];
    let rows: Vec<Vec<String>> = report.targets.iter().map(target_row).collect();

    let mut out = String::new();
    writeln!(
        out,
        "StorageClass: {}  Namespace: {}",
        report.storage_class, report.namespace
    )
    .cmd_err()?;
    writeln!(out).cmd_err()?;
    out.push_str(&render_table(&headers, &rows));
    writeln!(out).cmd_err()?;
    writeln!(
        out,
        "Claims:      {} bound, {} unbound, {} not found",
        report.claims.bound, report.claims.unbound, report.claims.not_found
    )
    .cmd_err()?;
    writeln!(
        out,
        "Diagnostics: {} succeeded, {} failed, {} disabled",
        report.diagnostics.succeeded, report.diagnostics.failed, report.diagnostics.disabled
    )
    .cmd_err()?;
    writeln!(
        out,
        "Workloads:   {} running, {} failed, {} timeout, {} skipped",
        report.workloads.running,
        report.workloads.failed,
        report.workloads.timeout,
        report.workloads.skipped
    )
    .cmd_err()?;
    write!(
        out,
        "Passed:      {}/{} nodes",
        report.passed(),
        report.total_targets
    )
    .cmd_err()?;
    let failed: Vec<&str> = report.failures().map(|t| t.node.as_str()).collect();
    if !failed.is_empty() {
        write!(out, "\nNeeds attention: {}", failed.join(", ")).cmd_err()?;
    }
    if report.interrupted {
        write!(out, "\nInterrupted: remaining nodes were not verified").cmd_err()?;
    }
    Ok(out)
}

fn target_row(target: &TargetReport) -> Vec<String> {
    vec![
        target.node.clone(),
        target.claim.status.to_string(),
        target.claim.volume.clone().unwrap_or_else(|| "-".to_string()),
        target.diagnostic.status.to_string(),
        target.workload.status.to_string(),
        detail(target),
    ]
}

/// The most useful single explanation for a row
fn detail(target: &TargetReport) -> String {
    match target.workload.status {
        WorkloadStatus::Running => String::new(),
        WorkloadStatus::Skipped(ClaimStatus::Unbound) => format!(
            "claim phase {}",
            target.claim.last_phase.as_deref().unwrap_or("unknown")
        ),
        WorkloadStatus::Skipped(_) => target.claim.detail.clone().unwrap_or_default(),
        WorkloadStatus::Failed | WorkloadStatus::Timeout => target
            .workload
            .reason
            .clone()
            .or_else(|| {
                target
                    .workload
                    .last_phase
                    .as_ref()
                    .map(|phase| format!("pod phase {}", phase))
            })
            .unwrap_or_default(),
    }
}

/// Render rows as a column-aligned table with headers.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let num_cols = headers.len();
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < num_cols {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let format_line = |cells: Vec<String>| -> String {
        let line: Vec<String> = cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                format!("{:<width$}", cell, width = w)
            })
            .collect();
        let mut line = line.join("  ");
        line.truncate(line.trim_end().len());
        line.push('\n');
        line
    };

    let mut out = format_line(headers.iter().map(|h| h.to_string()).collect());
    for row in rows {
        out.push_str(&format_line(row.clone()));
    }
    out
}
