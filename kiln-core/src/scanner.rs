//! Bundle output scanner.
//!
//! Discovers chunk files under a bundler's output directory using the
//! `ignore` crate's parallel-friendly walker, reads their source in parallel
//! with rayon, and marks each chunk's eligibility for bytecode compilation
//! by substring-matching its identifier against the configured aliases.
//! Ignore rules are disabled: output directories are usually gitignored, and
//! every emitted chunk must be seen.

use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use ignore::WalkBuilder;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;
use xxhash_rust::xxh3::xxh3_64;

use crate::error::{KilnError, Result};
use crate::loader::LOADER_RUNTIME_NAME;
use crate::types::Chunk;

/// Extensions the upstream bundler emits for JavaScript chunks. ESM output
/// (`.mjs`) is excluded: the loader shim is CommonJS and `require` does not
/// exist in module scope.
const CHUNK_EXTENSIONS: &[&str] = &["js", "cjs"];

/// Result of scanning an output directory.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ScanResult {
    /// Discovered chunks, sorted by identifier.
    pub chunks: Vec<Chunk>,

    /// Number of files skipped (wrong extension, loader runtime, retained
    /// originals from a previous run).
    pub skipped_count: usize,

    /// Number of files that could not be read.
    pub error_count: usize,

    /// Time taken for the scan in milliseconds.
    pub duration_ms: f64,
}

/// A chunk is eligible iff its identifier contains one of the aliases.
///
/// Substring matching (not exact) is deliberate: one alias selects a family
/// of related chunks (`worker` matches `chunks/worker` and `worker-pool`).
pub fn is_eligible(id: &str, aliases: &[String]) -> bool {
    aliases
        .iter()
        .filter(|a| !a.trim().is_empty())
        .any(|a| id.contains(a.as_str()))
}

/// Chunk identifier for a file: path relative to the output root, without
/// extension, with forward slashes.
fn chunk_id(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let no_ext = rel.with_extension("");
    let id = no_ext
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

/// Whether a file is a chunk candidate at all.
fn is_chunk_file(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    if !CHUNK_EXTENSIONS.contains(&ext.to_lowercase().as_str()) {
        return false;
    }
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    // Skip our own emitted runtime and retained originals from earlier runs.
    name != LOADER_RUNTIME_NAME && !name.starts_with('_')
}

/// Scan an output directory for chunks.
///
/// Pure discovery: no file is modified. Eligibility is derived from
/// `aliases` per [`is_eligible`].
pub fn scan_output_dir(root: &Path, aliases: &[String]) -> Result<ScanResult> {
    let start = Instant::now();

    if !root.is_dir() {
        return Err(KilnError::Config {
            message: format!("Output directory does not exist: {}", root.display()),
        });
    }

    // Output directories are routinely gitignored; VCS ignore rules must
    // not hide chunks from the scan.
    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(false)
        .build();

    let mut skipped = 0usize;
    let mut candidates = Vec::new();
    for entry in walker.filter_map(|e| e.ok()) {
        if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }
        let path = entry.into_path();
        if is_chunk_file(&path) {
            candidates.push(path);
        } else {
            skipped += 1;
        }
    }

    let errors = Mutex::new(0usize);
    let chunks = Mutex::new(Vec::new());

    candidates.par_iter().for_each(|path| {
        let Some(id) = chunk_id(root, path) else {
            *errors.lock().expect("scanner lock poisoned") += 1;
            return;
        };

        let source = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                debug!("Failed to read {}: {}", path.display(), e);
                *errors.lock().expect("scanner lock poisoned") += 1;
                return;
            }
        };

        let chunk = Chunk {
            eligible: is_eligible(&id, aliases),
            source_hash: format!("xxh3:{:016x}", xxh3_64(source.as_bytes())),
            path: path.clone(),
            source,
            id,
        };

        chunks
            .lock()
            .expect("scanner lock poisoned")
            .push(chunk);
    });

    let mut chunks = chunks.into_inner().unwrap_or_default();
    chunks.sort_by(|a, b| a.id.cmp(&b.id));

    Ok(ScanResult {
        chunks,
        skipped_count: skipped,
        error_count: errors.into_inner().unwrap_or_default(),
        duration_ms: start.elapsed().as_secs_f64() * 1000.0,
    })
}
