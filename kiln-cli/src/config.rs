//! Kiln configuration loading from `.kilnrc.toml`.
//!
//! Settings are read from a `.kilnrc.toml` file in the bundle's project
//! directory. The file is optional: every section falls back to defaults,
//! and command-line flags override whatever the file says.
//!
//! # Example Configuration
//!
//! ```toml
//! [bytecode]
//! chunk_alias = ["main", "preload"]
//! transform_arrow_functions = true
//! remove_bundle_js = true
//! protected_strings = ["license-key"]
//!
//! [host]
//! electron_path = "node_modules/electron/dist/electron"
//! concurrency = 4
//! compile_timeout_secs = 30
//! ```

use std::path::{Path, PathBuf};

use kiln_core::KilnConfig;
use serde::Deserialize;

/// Root configuration structure loaded from `.kilnrc.toml`.
#[derive(Debug, Deserialize, Default)]
pub struct KilnrcConfig {
    /// Which chunks are compiled and how their source is prepared.
    #[serde(default)]
    pub bytecode: BytecodeSection,

    /// Compiler host selection and resource limits.
    #[serde(default)]
    pub host: HostSection,
}

/// `[bytecode]` section.
#[derive(Debug, Deserialize, Default)]
pub struct BytecodeSection {
    /// Aliases selecting eligible chunks (substring match on identifiers).
    #[serde(default)]
    pub chunk_alias: Vec<String>,

    /// Rewrite arrow functions before compilation.
    #[serde(default)]
    pub transform_arrow_functions: Option<bool>,

    /// Remove the original bundle source after protection.
    #[serde(default)]
    pub remove_bundle_js: Option<bool>,

    /// String literals to hide behind `String.fromCharCode`.
    #[serde(default)]
    pub protected_strings: Vec<String>,
}

/// `[host]` section.
#[derive(Debug, Deserialize, Default)]
pub struct HostSection {
    /// Path to the Electron binary used for compilation.
    #[serde(default)]
    pub electron_path: Option<PathBuf>,

    /// Maximum chunk compilations in flight.
    #[serde(default)]
    pub concurrency: Option<usize>,

    /// Per-chunk compile timeout in seconds.
    #[serde(default)]
    pub compile_timeout_secs: Option<u64>,
}

/// Flag values that override the config file.
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub alias: Vec<String>,
    pub transform_arrow_functions: bool,
    pub keep_bundle_js: bool,
    pub protect_string: Vec<String>,
    pub electron: Option<PathBuf>,
    pub concurrency: Option<usize>,
    pub timeout: Option<u64>,
}

impl KilnrcConfig {
    /// Load configuration from `.kilnrc.toml` in the given directory.
    ///
    /// If the file doesn't exist or can't be parsed, returns defaults;
    /// parse errors are logged as warnings but don't cause failures.
    pub fn load(root: &Path) -> Self {
        let config_path = root.join(".kilnrc.toml");
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse .kilnrc.toml: {}", e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read .kilnrc.toml: {}", e);
                }
            }
        }
        Self::default()
    }

    /// Fold CLI flags over the file settings into the pipeline config.
    ///
    /// Repeatable flags (`--alias`, `--protect-string`) replace the file
    /// lists entirely when given; boolean flags only turn features on.
    pub fn into_kiln_config(self, overrides: CliOverrides) -> KilnConfig {
        let defaults = KilnConfig::default();
        KilnConfig {
            chunk_alias: if overrides.alias.is_empty() {
                self.bytecode.chunk_alias
            } else {
                overrides.alias
            },
            transform_arrow_functions: overrides.transform_arrow_functions
                || self
                    .bytecode
                    .transform_arrow_functions
                    .unwrap_or(defaults.transform_arrow_functions),
            remove_bundle_js: if overrides.keep_bundle_js {
                false
            } else {
                self.bytecode
                    .remove_bundle_js
                    .unwrap_or(defaults.remove_bundle_js)
            },
            protected_strings: if overrides.protect_string.is_empty() {
                self.bytecode.protected_strings
            } else {
                overrides.protect_string
            },
            electron_path: overrides.electron.or(self.host.electron_path),
            concurrency: overrides.concurrency.or(self.host.concurrency),
            compile_timeout_secs: overrides
                .timeout
                .or(self.host.compile_timeout_secs)
                .unwrap_or(defaults.compile_timeout_secs),
        }
    }
}
