//! Loader shim generation.
//!
//! For every compiled chunk the pipeline emits two things:
//!
//! - one shared runtime, `bytecode-loader.cjs`, at the output root, which
//!   registers a `.jsc` extension handler on the module system, and
//! - a per-chunk shim written at the chunk's own path, so the module
//!   identifier downstream importers resolve is unchanged.
//!
//! Known limitation, inherited from bytecode execution itself: calling
//! `Function.prototype.toString` on functions from a compiled chunk no
//! longer returns meaningful source text.

use std::path::Path;

use crate::error::Result;
use crate::types::Chunk;

/// File name of the shared loader runtime emitted at the output root.
pub const LOADER_RUNTIME_NAME: &str = "bytecode-loader.cjs";

/// The loader runtime, embedded at compile time.
pub const LOADER_RUNTIME: &str = include_str!("../assets/bytecode-loader.cjs");

/// Write the shared loader runtime into the output directory.
///
/// Idempotent: later runs overwrite with identical content.
pub fn write_loader_runtime(out_dir: &Path) -> Result<()> {
    std::fs::write(out_dir.join(LOADER_RUNTIME_NAME), LOADER_RUNTIME)?;
    Ok(())
}

/// Relative path prefix from a chunk's directory back to the output root
/// (`./`, `../`, `../../`, ...).
fn prefix_to_root(chunk: &Chunk) -> String {
    let depth = chunk.id.matches('/').count();
    if depth == 0 {
        "./".to_string()
    } else {
        "../".repeat(depth)
    }
}

/// Source text of the shim replacing one compiled chunk.
///
/// The shim is a drop-in replacement: it registers the `.jsc` handler and
/// forwards the artifact's exports under the original module identifier.
pub fn shim_source(chunk: &Chunk) -> String {
    format!(
        "\"use strict\";\nrequire(\"{prefix}{runtime}\");\nmodule.exports = require(\"./{stem}.jsc\");\n",
        prefix = prefix_to_root(chunk),
        runtime = LOADER_RUNTIME_NAME,
        stem = chunk.stem(),
    )
}
