//! Data models for the protection pipeline.
//!
//! These types describe bundle chunks as they move through the pipeline and
//! the per-chunk outcomes collected into a run summary.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A named unit of bundled output source, as produced by the upstream
/// bundler and discovered by the scanner.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Chunk {
    /// Identifier: the path relative to the output directory, without the
    /// extension, using forward slashes (e.g. `chunks/renderer`).
    pub id: String,

    /// Absolute path of the chunk file on disk.
    pub path: PathBuf,

    /// The chunk's source text.
    pub source: String,

    /// xxHash3 of the source as scanned, for change reporting.
    pub source_hash: String,

    /// Whether the chunk matched a configured alias.
    pub eligible: bool,
}

impl Chunk {
    /// File stem of the chunk (`renderer` for `chunks/renderer.js`).
    pub fn stem(&self) -> &str {
        self.id.rsplit('/').next().unwrap_or(&self.id)
    }
}

/// Terminal state of one chunk after a run.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChunkStatus {
    /// The chunk was compiled; its artifact and loader shim exist.
    Compiled {
        /// Path of the bytecode artifact, relative to the output directory.
        artifact: String,
        /// xxHash3 of the artifact bytes.
        artifact_hash: String,
        /// Size of the artifact in bytes.
        bytes: u64,
    },
    /// The chunk matched no alias and was left byte-for-byte untouched.
    Skipped,
    /// The chunk failed; it was left unmodified on disk.
    Failed {
        /// Human-readable failure reason.
        reason: String,
    },
}

/// Outcome for a single chunk.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkOutcome {
    /// Chunk identifier.
    pub chunk: String,
    /// Terminal status.
    pub status: ChunkStatus,
}

/// Result of a full protection run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RunSummary {
    /// Per-chunk outcomes, sorted by chunk identifier.
    pub outcomes: Vec<ChunkOutcome>,

    /// Wall-clock duration of the run.
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

impl RunSummary {
    /// Number of chunks compiled.
    pub fn compiled(&self) -> usize {
        self.count(|s| matches!(s, ChunkStatus::Compiled { .. }))
    }

    /// Number of chunks skipped as ineligible.
    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, ChunkStatus::Skipped))
    }

    /// Number of chunks that failed.
    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, ChunkStatus::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&ChunkStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }
}

/// Serialize `Duration` as integer milliseconds.
mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
