//! Protect command - run the full bytecode protection pipeline.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use colored::Colorize;
use kiln_core::{ElectronCompiler, Pipeline};

use crate::config::{CliOverrides, KilnrcConfig};
use crate::output::{render_summary, OutputFormat};

/// Run the pipeline over a bundler output directory.
pub async fn run(dir: &str, overrides: CliOverrides, format: OutputFormat) -> anyhow::Result<()> {
    let root = Path::new(dir);
    let config = KilnrcConfig::load(root).into_kiln_config(overrides);
    config.validate()?;

    let electron = ElectronCompiler::discover(config.electron_path.as_deref(), root)
        .context("Could not locate an Electron binary to compile with")?;
    let compiler = ElectronCompiler::new(
        electron.clone(),
        Duration::from_secs(config.compile_timeout_secs),
    )
    .context("Could not set up the compiler host")?;
    tracing::info!("Using compiler host {}", electron.display());

    let summary = Pipeline::new(config, compiler).run(root).await?;

    print!("{}", render_summary(&summary, format));

    let failed = summary.failed();
    if failed > 0 {
        if format == OutputFormat::Table {
            eprintln!(
                "{} {} chunk(s) failed; their source files were left unmodified",
                "error:".red().bold(),
                failed
            );
        }
        std::process::exit(1);
    }
    Ok(())
}
