//! Scan command - list chunks and eligibility without touching anything.

use std::path::Path;

use kiln_core::scanner;

use crate::config::KilnrcConfig;
use crate::output::{render_scan, OutputFormat};

/// Dry run: scan the output directory and report what a protect run would
/// select. No file is modified, so an empty alias set is allowed here.
pub async fn run(dir: &str, alias: Vec<String>, format: OutputFormat) -> anyhow::Result<()> {
    let root = Path::new(dir);

    let aliases = if alias.is_empty() {
        KilnrcConfig::load(root).bytecode.chunk_alias
    } else {
        alias
    };

    let scan = scanner::scan_output_dir(root, &aliases)?;
    print!("{}", render_scan(&scan, format));
    Ok(())
}
