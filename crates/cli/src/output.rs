//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_table<T: Tabled>(rows: Vec<T>) {
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Format MiB as a human-readable string
pub fn format_mib(mib: u64) -> String {
    const GIB: u64 = 1024;

    if mib >= GIB {
        format!("{:.1}Gi", mib as f64 / GIB as f64)
    } else {
        format!("{}Mi", mib)
    }
}

pub fn format_pct(pct: u32) -> String {
    format!("{}%", pct)
}

pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "healthy" | "fit" => status.green().to_string(),
        "degraded" => status.yellow().to_string(),
        "unhealthy" | "unschedulable" => status.red().to_string(),
        _ => status.to_string(),
    }
}

/// Color a normalized score by where it sits in `[0, max]`
pub fn color_score(score: u64, max: u64) -> String {
    let formatted = score.to_string();
    if max == 0 || score * 10 >= max * 8 {
        formatted.green().to_string()
    } else if score * 10 >= max * 4 {
        formatted.yellow().to_string()
    } else {
        formatted.red().to_string()
    }
}
