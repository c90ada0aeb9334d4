//! Pipeline configuration.
//!
//! `KilnConfig` is an explicit, immutable value handed to the pipeline entry
//! point. Nothing in kiln-core reads ambient or global configuration state.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{KilnError, Result};

/// Upper bound on default concurrency. Every chunk task spawns a full
/// Electron process, so matching the CPU count on large machines mostly
/// burns memory.
const MAX_DEFAULT_CONCURRENCY: usize = 8;

/// Default per-chunk compilation timeout in seconds.
pub const DEFAULT_COMPILE_TIMEOUT_SECS: u64 = 30;

/// Configuration for a protection run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KilnConfig {
    /// Aliases selecting which chunks are compiled. A chunk is eligible iff
    /// its identifier contains one of these as a substring. Empty means no
    /// chunk is eligible.
    #[serde(default)]
    pub chunk_alias: Vec<String>,

    /// Rewrite arrow functions into plain function expressions before
    /// compilation. Works around the known crash executing async arrow
    /// functions from compiled bytecode.
    #[serde(default)]
    pub transform_arrow_functions: bool,

    /// Remove the original plain-source bundle once its artifact and loader
    /// shim exist. When `false`, the original is kept as `_<name>.js`.
    #[serde(default = "default_remove_bundle_js")]
    pub remove_bundle_js: bool,

    /// String literals to replace with `String.fromCharCode` call sites so
    /// they never appear as plain text in the shipped bundle.
    #[serde(default)]
    pub protected_strings: Vec<String>,

    /// Path to the Electron binary used as the compiler host. When unset,
    /// the host is discovered from `$ELECTRON_EXEC_PATH`, then
    /// `node_modules/electron/path.txt`, then `PATH`.
    #[serde(default)]
    pub electron_path: Option<PathBuf>,

    /// Maximum chunk compilations in flight. Defaults to the CPU count,
    /// capped at 8.
    #[serde(default)]
    pub concurrency: Option<usize>,

    /// Per-chunk compilation timeout in seconds.
    #[serde(default = "default_compile_timeout")]
    pub compile_timeout_secs: u64,
}

fn default_remove_bundle_js() -> bool {
    true
}

fn default_compile_timeout() -> u64 {
    DEFAULT_COMPILE_TIMEOUT_SECS
}

impl Default for KilnConfig {
    fn default() -> Self {
        Self {
            chunk_alias: Vec::new(),
            transform_arrow_functions: false,
            remove_bundle_js: true,
            protected_strings: Vec::new(),
            electron_path: None,
            concurrency: None,
            compile_timeout_secs: DEFAULT_COMPILE_TIMEOUT_SECS,
        }
    }
}

impl KilnConfig {
    /// Validate the configuration for a destructive (protect) run.
    ///
    /// An empty alias set means the pipeline could not select a single
    /// chunk; running it anyway is a configuration mistake, not a no-op.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_alias.iter().all(|a| a.trim().is_empty()) {
            return Err(KilnError::Config {
                message: "chunk_alias is empty: no chunk would be selected for compilation"
                    .to_string(),
            });
        }
        if self.compile_timeout_secs == 0 {
            return Err(KilnError::Config {
                message: "compile_timeout_secs must be greater than zero".to_string(),
            });
        }
        if self.concurrency == Some(0) {
            return Err(KilnError::Config {
                message: "concurrency must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Effective number of chunk compilations in flight.
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency
            .unwrap_or_else(|| num_cpus::get().clamp(1, MAX_DEFAULT_CONCURRENCY))
    }
}
