//! Kiln core - bytecode protection pipeline for Electron bundles.
//!
//! Kiln post-processes a bundler's output: chunks selected by alias are
//! compiled into V8 cache data by the application's own Electron binary,
//! each compiled chunk is replaced with a small loader shim, and the plain
//! source is (optionally) removed. Shipped bundles then carry opaque,
//! engine-build-specific bytecode instead of readable JavaScript.
//!
//! # Pipeline
//!
//! Scanner -> Normalizer -> Compiler Host -> Loader Generator -> Cleanup,
//! one independent state machine per chunk. See [`pipeline::Pipeline`].
//!
//! # Hard constraint
//!
//! V8 cache data is only valid for the exact engine build that produced it.
//! That is why compilation runs out of process inside the target Electron
//! binary, never in a generic compiler.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod host;
pub mod loader;
pub mod normalize;
pub mod pipeline;
pub mod scanner;
pub mod types;

pub use config::KilnConfig;
pub use error::{KilnError, Result};
pub use host::{BytecodeCompiler, ElectronCompiler};
pub use pipeline::Pipeline;
pub use types::{Chunk, ChunkOutcome, ChunkStatus, RunSummary};
