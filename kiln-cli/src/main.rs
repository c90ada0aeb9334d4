//! Kiln CLI - bytecode protection for Electron bundles.
//!
//! Compiles selected bundle chunks into V8 cache data using the
//! application's own Electron binary and replaces them with loader shims,
//! so shipped bundles carry opaque bytecode instead of readable source.

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;
mod output;

use config::CliOverrides;
use output::OutputFormat;

/// Bytecode protection for Electron bundles.
///
/// Kiln post-processes bundler output: chunks selected by alias are
/// compiled to engine-specific bytecode by the app's own Electron binary
/// and replaced with loader shims that are drop-in import-compatible.
#[derive(Parser)]
#[command(name = "kiln")]
#[command(author, version)]
#[command(about = "Bytecode protection for Electron bundles")]
#[command(propagate_version = true)]
#[command(after_help = "Quick Start:
  kiln scan out/main --alias main     Preview which chunks would be compiled
  kiln protect out/main --alias main  Compile and replace them
  kiln doctor                         Check that a compiler host is available

Bytecode artifacts only load in the exact Electron build that produced
them; kiln always compiles through your project's own binary.")]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output format
    #[arg(long, global = true, value_enum)]
    format: Option<OutputFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile aliased chunks to bytecode and replace them with loader shims
    #[command(visible_alias = "p")]
    Protect {
        /// Bundler output directory to protect
        #[arg(default_value = ".")]
        dir: String,

        /// Chunk alias to select for compilation (repeatable, substring match)
        #[arg(short, long = "alias")]
        alias: Vec<String>,

        /// Rewrite arrow functions into plain functions before compiling
        #[arg(long)]
        transform_arrow_functions: bool,

        /// Keep the original bundle source as _<name>.js next to the shim
        #[arg(long)]
        keep_bundle_js: bool,

        /// String literal to hide behind String.fromCharCode (repeatable)
        #[arg(long = "protect-string")]
        protect_string: Vec<String>,

        /// Path to the Electron binary to compile with
        #[arg(long)]
        electron: Option<PathBuf>,

        /// Maximum chunk compilations in flight
        #[arg(long)]
        concurrency: Option<usize>,

        /// Per-chunk compile timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// List chunks and their eligibility without modifying anything
    Scan {
        /// Bundler output directory to scan
        #[arg(default_value = ".")]
        dir: String,

        /// Chunk alias to match against (repeatable)
        #[arg(short, long = "alias")]
        alias: Vec<String>,
    },

    /// Check that a compiler host can be found and launched
    Doctor {
        /// Project directory to check (defaults to current directory)
        #[arg(default_value = ".")]
        dir: String,

        /// Path to the Electron binary to check
        #[arg(long)]
        electron: Option<PathBuf>,
    },
}

fn setup_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let format = cli.format.unwrap_or_default();

    let command = match cli.command {
        Some(cmd) => cmd,
        None => {
            let _ = Cli::command().print_help();
            println!();
            return Ok(());
        }
    };

    match command {
        Commands::Protect {
            dir,
            alias,
            transform_arrow_functions,
            keep_bundle_js,
            protect_string,
            electron,
            concurrency,
            timeout,
        } => {
            let overrides = CliOverrides {
                alias,
                transform_arrow_functions,
                keep_bundle_js,
                protect_string,
                electron,
                concurrency,
                timeout,
            };
            commands::protect::run(&dir, overrides, format).await
        }
        Commands::Scan { dir, alias } => commands::scan::run(&dir, alias, format).await,
        Commands::Doctor { dir, electron } => commands::doctor::run(&dir, electron, format).await,
    }
}
