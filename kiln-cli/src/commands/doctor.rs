//! Doctor command - health check for the protection setup.
//!
//! Verifies that a compiler host can be found and launched and that the
//! configuration selects something, without modifying any file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use colored::Colorize;
use kiln_core::{BytecodeCompiler, ElectronCompiler};
use serde::Serialize;

use crate::config::KilnrcConfig;
use crate::output::OutputFormat;

/// Status of a health check item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

impl CheckStatus {
    fn colored_icon(&self) -> String {
        match self {
            CheckStatus::Ok => "[OK]".green().to_string(),
            CheckStatus::Warning => "[!!]".yellow().to_string(),
            CheckStatus::Error => "[!!]".red().to_string(),
        }
    }
}

/// A single health check item.
#[derive(Debug, Clone, Serialize)]
pub struct CheckItem {
    pub status: CheckStatus,
    pub label: String,
    pub value: String,
}

impl CheckItem {
    fn ok(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Ok,
            label: label.into(),
            value: value.into(),
        }
    }

    fn warning(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Warning,
            label: label.into(),
            value: value.into(),
        }
    }

    fn error(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Error,
            label: label.into(),
            value: value.into(),
        }
    }
}

/// Result of the health check.
#[derive(Debug, Serialize)]
pub struct DoctorResult {
    pub checks: Vec<CheckItem>,
    pub recommendations: Vec<String>,
}

/// Run the health checks. Always exits successfully; problems are reported
/// as check items, not errors.
pub async fn run(dir: &str, electron: Option<PathBuf>, format: OutputFormat) -> anyhow::Result<()> {
    let root = Path::new(dir);
    let mut checks = Vec::new();
    let mut recommendations = Vec::new();

    let config = KilnrcConfig::load(root);
    if root.join(".kilnrc.toml").exists() {
        checks.push(CheckItem::ok("Config file", ".kilnrc.toml"));
    } else {
        checks.push(CheckItem::warning("Config file", "not found, using defaults"));
    }

    if config.bytecode.chunk_alias.is_empty() {
        checks.push(CheckItem::warning("Chunk aliases", "none configured"));
        recommendations
            .push("Set [bytecode] chunk_alias in .kilnrc.toml or pass --alias".to_string());
    } else {
        checks.push(CheckItem::ok(
            "Chunk aliases",
            config.bytecode.chunk_alias.join(", "),
        ));
    }

    let explicit = electron.or(config.host.electron_path);
    match ElectronCompiler::discover(explicit.as_deref(), root) {
        Ok(binary) => {
            checks.push(CheckItem::ok("Electron binary", binary.display().to_string()));
            match probe(binary).await {
                Ok(version) => checks.push(CheckItem::ok("Compiler host", version)),
                Err(e) => {
                    checks.push(CheckItem::error("Compiler host", e.to_string()));
                    recommendations.push(
                        "The binary was found but did not launch; check that it matches \
                         this platform"
                            .to_string(),
                    );
                }
            }
        }
        Err(e) => {
            checks.push(CheckItem::error("Electron binary", e.to_string()));
            recommendations.push(
                "Install the electron package or point --electron at the binary".to_string(),
            );
        }
    }

    let result = DoctorResult {
        checks,
        recommendations,
    };
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Table => print_table(&result),
    }
    Ok(())
}

async fn probe(binary: PathBuf) -> kiln_core::Result<String> {
    let compiler = ElectronCompiler::new(binary, Duration::from_secs(10))?;
    compiler.probe().await
}

fn print_table(result: &DoctorResult) {
    println!("{}", "Kiln Health Check".cyan().bold());
    println!("{}", "\u{2500}".repeat(40).dimmed());
    for check in &result.checks {
        println!(
            "{} {}: {}",
            check.status.colored_icon(),
            check.label,
            check.value
        );
    }
    if !result.recommendations.is_empty() {
        println!();
        println!("{}", "Recommendations:".bold());
        for rec in &result.recommendations {
            println!("  - {rec}");
        }
    }
}
