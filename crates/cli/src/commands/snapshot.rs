//! `genius snapshot`: GPUs currently seen by the scheduler

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, ClusterSnapshot};
use crate::output::{format_mib, format_pct, print_json, print_table, print_warning, OutputFormat};

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "Node")]
    node: String,
    #[tabled(rename = "GPU")]
    id: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Free")]
    free: String,
    #[tabled(rename = "Capacity")]
    capacity: String,
    #[tabled(rename = "Power")]
    power: String,
    #[tabled(rename = "Enc")]
    encoder: String,
    #[tabled(rename = "Dec")]
    decoder: String,
}

pub async fn show_snapshot(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let snapshot = client.snapshot().await?;

    match format {
        OutputFormat::Json => print_json(&snapshot)?,
        OutputFormat::Table => print_snapshot(&snapshot),
    }
    Ok(())
}

fn print_snapshot(snapshot: &ClusterSnapshot) {
    if snapshot.nodes.is_empty() {
        print_warning("No nodes reported by telemetry");
        return;
    }

    let rows = device_rows(snapshot);
    let devices = rows.iter().filter(|r| !r.id.is_empty()).count();

    println!("{}", "Cluster GPU Snapshot".bold());
    print_table(rows);
    println!("\n{} nodes, {} GPUs", snapshot.nodes.len(), devices);
}

fn device_rows(snapshot: &ClusterSnapshot) -> Vec<DeviceRow> {
    let mut rows = Vec::new();
    for (node, devices) in &snapshot.nodes {
        if devices.is_empty() {
            rows.push(DeviceRow {
                node: node.clone(),
                id: String::new(),
                model: "-".dimmed().to_string(),
                free: String::new(),
                capacity: String::new(),
                power: String::new(),
                encoder: String::new(),
                decoder: String::new(),
            });
            continue;
        }

        for d in devices {
            rows.push(DeviceRow {
                node: node.clone(),
                id: d.static_attrs.id.to_string(),
                model: d.static_attrs.model.clone(),
                free: format_mib(d.dynamic_attrs.free_memory_mb),
                capacity: format_mib(d.static_attrs.memory_capacity_mb),
                power: format!("{}W", d.dynamic_attrs.power_watts),
                encoder: format_pct(d.dynamic_attrs.encoder_utilization_pct),
                decoder: format_pct(d.dynamic_attrs.decoder_utilization_pct),
            });
        }
    }
    rows
}
