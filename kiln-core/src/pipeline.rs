//! Protection pipeline orchestrator.
//!
//! Drives every chunk through the per-chunk state machine:
//!
//! ```text
//! Scanned -> (ineligible: Done)
//! Scanned -> Eligible -> Normalized -> Compiled -> LoaderWritten
//!         -> (retain? Done : Cleaned -> Done)
//! Eligible -> CompileFailed -> Done(reported)
//! ```
//!
//! Chunks share no mutable state, so eligible chunks run as independent
//! tokio tasks bounded by a semaphore. A chunk failure is contained to that
//! chunk; configuration and host-startup failures abort the run before any
//! file is touched.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use xxhash_rust::xxh3::xxh3_64;

use crate::config::KilnConfig;
use crate::error::{KilnError, Result};
use crate::host::BytecodeCompiler;
use crate::loader;
use crate::normalize;
use crate::scanner;
use crate::types::{Chunk, ChunkOutcome, ChunkStatus, RunSummary};

/// The protection pipeline. Owns one immutable config and one compiler.
pub struct Pipeline<C: BytecodeCompiler> {
    config: Arc<KilnConfig>,
    compiler: Arc<C>,
}

impl<C: BytecodeCompiler> Pipeline<C> {
    /// Create a pipeline from an explicit configuration and compiler.
    pub fn new(config: KilnConfig, compiler: C) -> Self {
        Self {
            config: Arc::new(config),
            compiler: Arc::new(compiler),
        }
    }

    /// Run the full pipeline over a bundler output directory.
    ///
    /// Fatal errors (`Config`, `HostStartup`) return `Err` and occur before
    /// any destructive action. Per-chunk failures are reported in the
    /// summary and never fail the batch.
    pub async fn run(&self, out_dir: &Path) -> Result<RunSummary> {
        let start = Instant::now();
        self.config.validate()?;

        let scan = scanner::scan_output_dir(out_dir, &self.config.chunk_alias)?;
        let eligible = scan.chunks.iter().filter(|c| c.eligible).count();
        info!(
            "Scanned {} chunks in {:.1}ms, {} eligible for compilation",
            scan.chunks.len(),
            scan.duration_ms,
            eligible
        );

        let mut outcomes: Vec<ChunkOutcome> = Vec::with_capacity(scan.chunks.len());

        if eligible > 0 {
            // Fatal if the host cannot launch; nothing has been modified yet.
            let version = self.compiler.probe().await?;
            debug!("Compiler host ready: {}", version);

            // The shared runtime is additive and safe to emit before any
            // chunk is rewritten.
            loader::write_loader_runtime(out_dir)?;
        }

        let semaphore = Arc::new(Semaphore::new(self.config.effective_concurrency()));
        let mut tasks = JoinSet::new();

        for chunk in scan.chunks {
            if !chunk.eligible {
                debug!("Chunk '{}' matches no alias, leaving untouched", chunk.id);
                outcomes.push(ChunkOutcome {
                    chunk: chunk.id,
                    status: ChunkStatus::Skipped,
                });
                continue;
            }

            let config = Arc::clone(&self.config);
            let compiler = Arc::clone(&self.compiler);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("pipeline semaphore closed");
                let id = chunk.id.clone();
                let status = match protect_chunk(&config, compiler.as_ref(), &chunk).await {
                    Ok(status) => status,
                    Err(e) => {
                        error!("Chunk '{}' failed: {}", id, e);
                        ChunkStatus::Failed {
                            reason: e.to_string(),
                        }
                    }
                };
                ChunkOutcome { chunk: id, status }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => error!("Chunk task panicked: {}", e),
            }
        }

        outcomes.sort_by(|a, b| a.chunk.cmp(&b.chunk));

        let summary = RunSummary {
            outcomes,
            duration: start.elapsed(),
        };
        info!(
            "Protected {} chunks ({} skipped, {} failed) in {:.1}s",
            summary.compiled(),
            summary.skipped(),
            summary.failed(),
            summary.duration.as_secs_f64()
        );
        Ok(summary)
    }
}

/// Run one eligible chunk through normalize, compile, loader, cleanup.
///
/// Ordering invariant: the chunk file is only overwritten (and the original
/// only dropped) after the artifact rename has completed, so a failure at
/// any stage leaves the chunk in its last durable state.
async fn protect_chunk<C: BytecodeCompiler>(
    config: &KilnConfig,
    compiler: &C,
    chunk: &Chunk,
) -> Result<ChunkStatus> {
    let mut source = chunk.source.clone();

    if config.transform_arrow_functions {
        source = normalize::rewrite_arrow_functions(&chunk.id, &source)?;
    } else if normalize::contains_async_arrow(&source) {
        warn!(
            "Chunk '{}' contains an async arrow function; executing it from bytecode is known \
             to crash the runtime. Enable transform_arrow_functions to rewrite it.",
            chunk.id
        );
    }

    if !config.protected_strings.is_empty() {
        source = normalize::protect_strings(&source, &config.protected_strings);
    }

    let bytes = compiler.compile(&chunk.id, &source).await?;

    let parent = chunk.path.parent().ok_or_else(|| KilnError::Compile {
        chunk: chunk.id.clone(),
        message: format!("chunk path {} has no parent directory", chunk.path.display()),
    })?;

    // Atomic artifact write: temp file in the target directory, then rename.
    // A failed compile never leaves a partial .jsc at the final path.
    let artifact_path = chunk.path.with_extension("jsc");
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(&bytes)?;
    tmp.flush()?;
    tmp.persist(&artifact_path).map_err(|e| KilnError::Io(e.error))?;
    debug!("Wrote artifact {}", artifact_path.display());

    if !config.remove_bundle_js {
        let retained = parent.join(format!("_{}.js", chunk.stem()));
        std::fs::write(&retained, &chunk.source)?;
        debug!("Retained original source as {}", retained.display());
    }

    // Last step: replace the chunk with its loader shim. The module
    // identifier is unchanged, so importers are unaffected.
    std::fs::write(&chunk.path, loader::shim_source(chunk))?;

    Ok(ChunkStatus::Compiled {
        artifact: format!("{}.jsc", chunk.id),
        artifact_hash: format!("xxh3:{:016x}", xxh3_64(&bytes)),
        bytes: bytes.len() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// In-process compiler for pipeline tests: no Electron required.
    struct MockCompiler {
        fail_on: Option<String>,
    }

    impl MockCompiler {
        fn ok() -> Self {
            Self { fail_on: None }
        }

        fn failing_on(chunk: &str) -> Self {
            Self {
                fail_on: Some(chunk.to_string()),
            }
        }
    }

    impl BytecodeCompiler for MockCompiler {
        async fn probe(&self) -> Result<String> {
            Ok("mock 0.0".to_string())
        }

        async fn compile(&self, chunk_id: &str, source: &str) -> Result<Vec<u8>> {
            if self.fail_on.as_deref() == Some(chunk_id) {
                return Err(KilnError::Compile {
                    chunk: chunk_id.to_string(),
                    message: "Unexpected token".to_string(),
                });
            }
            let mut bytes = vec![0u8; 16];
            bytes.extend_from_slice(source.as_bytes());
            Ok(bytes)
        }
    }

    fn write_chunk(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    fn config_with_alias(aliases: &[&str]) -> KilnConfig {
        KilnConfig {
            chunk_alias: aliases.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn setup_bundle() -> TempDir {
        let dir = TempDir::new().unwrap();
        write_chunk(dir.path(), "index.js", "require('./foo.js');\n");
        write_chunk(dir.path(), "foo.js", "module.exports = { n: 41 + 1 };\n");
        write_chunk(dir.path(), "bar.js", "module.exports = 'bar';\n");
        dir
    }

    #[tokio::test]
    async fn test_only_aliased_chunk_is_compiled() {
        let dir = setup_bundle();
        let index_before = fs::read(dir.path().join("index.js")).unwrap();
        let bar_before = fs::read(dir.path().join("bar.js")).unwrap();

        let pipeline = Pipeline::new(config_with_alias(&["foo"]), MockCompiler::ok());
        let summary = pipeline.run(dir.path()).await.unwrap();

        assert_eq!(summary.compiled(), 1);
        assert_eq!(summary.skipped(), 2);
        assert_eq!(summary.failed(), 0);

        // foo: artifact + shim, original gone (default removal).
        assert!(dir.path().join("foo.jsc").is_file());
        let shim = fs::read_to_string(dir.path().join("foo.js")).unwrap();
        assert!(shim.contains("require(\"./foo.jsc\")"));
        assert!(!dir.path().join("_foo.js").exists());

        // Non-matching chunks byte-for-byte untouched, no artifacts.
        assert_eq!(fs::read(dir.path().join("index.js")).unwrap(), index_before);
        assert_eq!(fs::read(dir.path().join("bar.js")).unwrap(), bar_before);
        assert!(!dir.path().join("index.jsc").exists());
        assert!(!dir.path().join("bar.jsc").exists());

        // Shared loader runtime emitted once at the root.
        assert!(dir.path().join(loader::LOADER_RUNTIME_NAME).is_file());
    }

    #[tokio::test]
    async fn test_retention_keeps_original() {
        let dir = setup_bundle();
        let original = fs::read_to_string(dir.path().join("foo.js")).unwrap();

        let config = KilnConfig {
            remove_bundle_js: false,
            ..config_with_alias(&["foo"])
        };
        let summary = Pipeline::new(config, MockCompiler::ok())
            .run(dir.path())
            .await
            .unwrap();

        assert_eq!(summary.compiled(), 1);
        assert!(dir.path().join("foo.jsc").is_file());
        assert_eq!(
            fs::read_to_string(dir.path().join("_foo.js")).unwrap(),
            original
        );
        // The chunk path itself now holds the shim.
        assert!(fs::read_to_string(dir.path().join("foo.js"))
            .unwrap()
            .contains("foo.jsc"));
    }

    #[tokio::test]
    async fn test_failed_chunk_does_not_affect_others() {
        let dir = setup_bundle();
        let foo_before = fs::read(dir.path().join("foo.js")).unwrap();

        let pipeline = Pipeline::new(
            config_with_alias(&["foo", "bar"]),
            MockCompiler::failing_on("foo"),
        );
        let summary = pipeline.run(dir.path()).await.unwrap();

        assert_eq!(summary.compiled(), 1);
        assert_eq!(summary.failed(), 1);

        let failed = summary
            .outcomes
            .iter()
            .find(|o| o.chunk == "foo")
            .unwrap();
        assert!(matches!(
            &failed.status,
            ChunkStatus::Failed { reason } if reason.contains("Unexpected token")
        ));

        // The failing chunk is left unmodified: no artifact, source intact.
        assert!(!dir.path().join("foo.jsc").exists());
        assert_eq!(fs::read(dir.path().join("foo.js")).unwrap(), foo_before);

        // The other eligible chunk went through.
        assert!(dir.path().join("bar.jsc").is_file());
    }

    #[tokio::test]
    async fn test_empty_alias_is_fatal_config_error() {
        let dir = setup_bundle();
        let err = Pipeline::new(KilnConfig::default(), MockCompiler::ok())
            .run(dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, KilnError::Config { .. }));
        // Nothing was touched.
        assert!(!dir.path().join(loader::LOADER_RUNTIME_NAME).exists());
    }

    #[tokio::test]
    async fn test_unsupported_syntax_fails_chunk_loudly() {
        let dir = setup_bundle();
        write_chunk(
            dir.path(),
            "ctx.js",
            "const f = () => this.handler();\nmodule.exports = f;\n",
        );
        let before = fs::read(dir.path().join("ctx.js")).unwrap();

        let config = KilnConfig {
            transform_arrow_functions: true,
            ..config_with_alias(&["ctx"])
        };
        let summary = Pipeline::new(config, MockCompiler::ok())
            .run(dir.path())
            .await
            .unwrap();

        assert_eq!(summary.failed(), 1);
        let outcome = &summary
            .outcomes
            .iter()
            .find(|o| o.chunk == "ctx")
            .unwrap()
            .status;
        assert!(matches!(
            outcome,
            ChunkStatus::Failed { reason } if reason.contains("this")
        ));
        assert_eq!(fs::read(dir.path().join("ctx.js")).unwrap(), before);
    }

    #[tokio::test]
    async fn test_arrow_transform_feeds_compiler() {
        let dir = TempDir::new().unwrap();
        write_chunk(dir.path(), "foo.js", "module.exports = (a, b) => a + b;\n");

        let config = KilnConfig {
            transform_arrow_functions: true,
            remove_bundle_js: false,
            ..config_with_alias(&["foo"])
        };
        Pipeline::new(config, MockCompiler::ok())
            .run(dir.path())
            .await
            .unwrap();

        // The mock echoes its input after a fake header, so the artifact
        // shows what the compiler was given.
        let artifact = fs::read(dir.path().join("foo.jsc")).unwrap();
        let compiled_source = String::from_utf8_lossy(&artifact[16..]).to_string();
        assert!(compiled_source.contains("function (a, b)"));
        assert!(!compiled_source.contains("=>"));
        // The retained original is the pre-transform source.
        assert!(fs::read_to_string(dir.path().join("_foo.js"))
            .unwrap()
            .contains("=>"));
    }

    /// Collects log output for assertions.
    #[derive(Clone, Default)]
    struct LogCapture(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogCapture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogCapture {
        type Writer = LogCapture;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[tokio::test]
    async fn test_async_arrow_without_transform_warns() {
        let capture = LogCapture::default();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_writer(capture.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let dir = TempDir::new().unwrap();
        write_chunk(
            dir.path(),
            "foo.js",
            "module.exports = async () => fetch('/x');\n",
        );

        // transform_arrow_functions stays off; the chunk still compiles.
        let summary = Pipeline::new(config_with_alias(&["foo"]), MockCompiler::ok())
            .run(dir.path())
            .await
            .unwrap();
        assert_eq!(summary.compiled(), 1);

        let logs = String::from_utf8_lossy(&capture.0.lock().unwrap()).to_string();
        assert!(
            logs.contains("async arrow function"),
            "expected crash-hazard warning, got: {logs}"
        );
    }

    #[tokio::test]
    async fn test_protected_strings_applied() {
        let dir = TempDir::new().unwrap();
        write_chunk(dir.path(), "foo.js", "module.exports = 'hex-key';\n");

        let config = KilnConfig {
            protected_strings: vec!["hex-key".to_string()],
            ..config_with_alias(&["foo"])
        };
        Pipeline::new(config, MockCompiler::ok())
            .run(dir.path())
            .await
            .unwrap();

        let artifact = fs::read(dir.path().join("foo.jsc")).unwrap();
        let compiled_source = String::from_utf8_lossy(&artifact[16..]).to_string();
        assert!(compiled_source.contains("String.fromCharCode"));
        assert!(!compiled_source.contains("hex-key"));
    }
}
