//! `genius rank`: dry-run a scheduling cycle for a hypothetical workload

use anyhow::{bail, Result};
use colored::Colorize;
use std::collections::BTreeMap;
use tabled::Tabled;

use crate::client::{ApiClient, CycleReport, CycleRequest, WorkloadRequest};
use crate::output::{color_score, print_json, print_table, print_warning, OutputFormat};

#[derive(Tabled)]
struct RankRow {
    #[tabled(rename = "#")]
    position: usize,
    #[tabled(rename = "Node")]
    node: String,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "Raw")]
    raw: String,
    #[tabled(rename = "Static")]
    static_score: String,
    #[tabled(rename = "Dynamic")]
    dynamic_score: String,
    #[tabled(rename = "GPUs")]
    devices: usize,
}

/// Parse a `key=value` label argument
pub fn parse_label(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected key=value, got '{}'", arg)),
    }
}

pub async fn rank_nodes(
    client: &ApiClient,
    name: &str,
    labels: Vec<(String, String)>,
    nodes: Vec<String>,
    format: OutputFormat,
) -> Result<()> {
    let nodes = if nodes.is_empty() {
        client.snapshot().await?.nodes.into_keys().collect()
    } else {
        nodes
    };
    if nodes.is_empty() {
        bail!("No candidate nodes: pass --node or check that telemetry reports nodes");
    }

    let request = CycleRequest {
        request: WorkloadRequest {
            name: name.to_string(),
            labels: labels.into_iter().collect::<BTreeMap<_, _>>(),
        },
        nodes,
    };
    let report = client.run_cycle(&request).await?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => print_report(&report),
    }
    Ok(())
}

fn print_report(report: &CycleReport) {
    println!(
        "{} {} ({} nodes, {} GPUs, {}ms)",
        "Ranking for".bold(),
        report.request.cyan(),
        report.cluster_nodes,
        report.cluster_devices,
        report.elapsed_ms
    );

    if report.ranked.is_empty() {
        print_warning("No node fits this request");
    } else {
        let max = report.ranked.iter().map(|r| r.score).max().unwrap_or(0);
        let rows: Vec<RankRow> = report
            .ranked
            .iter()
            .enumerate()
            .map(|(i, r)| RankRow {
                position: i + 1,
                node: r.node_name.clone(),
                score: color_score(r.score, max),
                raw: format!("{:.3}", r.raw_score),
                static_score: format!("{:.3}", r.breakdown.static_score),
                dynamic_score: format!("{:.3}", r.breakdown.dynamic_score),
                devices: r.devices,
            })
            .collect();
        print_table(rows);
    }

    if !report.rejected.is_empty() {
        println!("\n{}", "Rejected".bold());
        for r in &report.rejected {
            println!("  {} {}", r.node_name.red(), r.reason.dimmed());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_label() {
        assert_eq!(
            parse_label("genius/gpu-number=2"),
            Ok(("genius/gpu-number".to_string(), "2".to_string()))
        );
        assert_eq!(
            parse_label("genius/gpu-model=^tesla t4$"),
            Ok(("genius/gpu-model".to_string(), "^tesla t4$".to_string()))
        );
        assert_eq!(parse_label("a=b=c"), Ok(("a".to_string(), "b=c".to_string())));
    }

    #[test]
    fn test_parse_label_rejects_missing_key() {
        assert!(parse_label("novalue").is_err());
        assert!(parse_label("=x").is_err());
    }
}
