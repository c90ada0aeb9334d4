//! Out-of-process bytecode compiler host.
//!
//! V8 cache data is only loadable by the exact engine build that produced
//! it, so compilation is delegated to the application's own Electron binary
//! run as Node (`ELECTRON_RUN_AS_NODE=1`). Each compilation is one-shot:
//! spawn the host with an embedded helper script, hand it a source file,
//! collect the serialized cache data, tear the process down.
//!
//! The [`BytecodeCompiler`] trait is the process-boundary seam: the pipeline
//! only sees `probe` and `compile`, so tests run against an in-process mock
//! and the compiling runtime can be swapped per project.

use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tempfile::TempDir;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{KilnError, Result};

/// The compile helper executed inside the Electron host, embedded at
/// compile time.
pub const HOST_SCRIPT: &str = include_str!("../assets/compile-host.cjs");

/// Exit code the helper uses for a source that failed to compile.
const EXIT_COMPILE_ERROR: i32 = 2;

/// Cache data below this size cannot contain a valid V8 header.
const MIN_CACHE_LEN: usize = 16;

/// How long the startup probe may take.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Compiles chunk source text into engine cache data.
pub trait BytecodeCompiler: Send + Sync + 'static {
    /// Verify the host can launch at all. Returns a version string for
    /// reporting. Failure is fatal to the whole run.
    fn probe(&self) -> impl Future<Output = Result<String>> + Send;

    /// Compile one chunk's source. Failure affects only that chunk.
    fn compile(&self, chunk_id: &str, source: &str) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// [`BytecodeCompiler`] backed by a real Electron binary.
pub struct ElectronCompiler {
    electron: PathBuf,
    compile_timeout: Duration,
    host_script: PathBuf,
    // Owns the scratch directory holding the helper script and per-chunk
    // handoff files; removed on drop.
    scratch: TempDir,
}

impl ElectronCompiler {
    /// Create a compiler around the given Electron binary.
    pub fn new(electron: PathBuf, compile_timeout: Duration) -> Result<Self> {
        let scratch = tempfile::tempdir()?;
        let host_script = scratch.path().join("compile-host.cjs");
        std::fs::write(&host_script, HOST_SCRIPT)?;
        Ok(Self {
            electron,
            compile_timeout,
            host_script,
            scratch,
        })
    }

    /// Locate the Electron binary to compile with.
    ///
    /// Order: explicit path, `$ELECTRON_EXEC_PATH`, the `path.txt` marker
    /// the `electron` npm package writes, then `PATH`.
    pub fn discover(explicit: Option<&Path>, project_dir: &Path) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.is_file() {
                return Ok(path.to_path_buf());
            }
            return Err(KilnError::HostStartup {
                message: format!("electron binary not found at {}", path.display()),
            });
        }

        if let Ok(env_path) = std::env::var("ELECTRON_EXEC_PATH") {
            let path = PathBuf::from(env_path);
            if path.is_file() {
                return Ok(path);
            }
            return Err(KilnError::HostStartup {
                message: format!(
                    "ELECTRON_EXEC_PATH points at a missing file: {}",
                    path.display()
                ),
            });
        }

        if let Some(path) = Self::from_node_modules(project_dir) {
            return Ok(path);
        }

        which::which("electron").map_err(|_| KilnError::HostStartup {
            message: "no electron binary found: pass --electron, set ELECTRON_EXEC_PATH, \
                      or install the electron package"
                .to_string(),
        })
    }

    /// Resolve the binary through `node_modules/electron/path.txt`, which
    /// names the executable relative to the package's `dist/` directory.
    fn from_node_modules(project_dir: &Path) -> Option<PathBuf> {
        let package = project_dir.join("node_modules").join("electron");
        let marker = std::fs::read_to_string(package.join("path.txt")).ok()?;
        let binary = package.join("dist").join(marker.trim());
        binary.is_file().then_some(binary)
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.electron);
        cmd.env("ELECTRON_RUN_AS_NODE", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl BytecodeCompiler for ElectronCompiler {
    async fn probe(&self) -> Result<String> {
        let mut cmd = self.command();
        cmd.arg("-e")
            .arg("process.stdout.write((process.versions.electron || '?') + ' (node ' + process.versions.node + ')')");

        let output = timeout(PROBE_TIMEOUT, cmd.output())
            .await
            .map_err(|_| KilnError::HostStartup {
                message: format!(
                    "startup probe of {} timed out",
                    self.electron.display()
                ),
            })?
            .map_err(|e| KilnError::HostStartup {
                message: format!("failed to launch {}: {}", self.electron.display(), e),
            })?;

        if !output.status.success() {
            return Err(KilnError::HostStartup {
                message: format!(
                    "{} exited with {}: {}",
                    self.electron.display(),
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn compile(&self, chunk_id: &str, source: &str) -> Result<Vec<u8>> {
        let scratch = self.scratch.path();

        let mut source_file = tempfile::Builder::new()
            .prefix("chunk-")
            .suffix(".js")
            .tempfile_in(scratch)?;
        source_file.write_all(source.as_bytes())?;
        source_file.flush()?;

        let out_file = tempfile::Builder::new()
            .prefix("cache-")
            .suffix(".jsc")
            .tempfile_in(scratch)?;
        let out_path = out_file.path().to_path_buf();

        let mut cmd = self.command();
        cmd.arg(&self.host_script)
            .arg(source_file.path())
            .arg(&out_path);

        debug!("Compiling chunk '{}' via {}", chunk_id, self.electron.display());

        let output = timeout(self.compile_timeout, cmd.output())
            .await
            .map_err(|_| KilnError::CompileTimeout {
                chunk: chunk_id.to_string(),
                seconds: self.compile_timeout.as_secs(),
            })?
            .map_err(|e| KilnError::Compile {
                chunk: chunk_id.to_string(),
                message: format!("failed to launch compiler host: {e}"),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = if output.status.code() == Some(EXIT_COMPILE_ERROR) {
                stderr.trim().to_string()
            } else {
                format!("host exited with {}: {}", output.status, stderr.trim())
            };
            return Err(KilnError::Compile {
                chunk: chunk_id.to_string(),
                message,
            });
        }

        let bytes = std::fs::read(&out_path)?;
        if bytes.len() < MIN_CACHE_LEN {
            return Err(KilnError::Compile {
                chunk: chunk_id.to_string(),
                message: format!(
                    "engine produced {} bytes of cache data, which cannot be valid",
                    bytes.len()
                ),
            });
        }
        Ok(bytes)
    }
}
