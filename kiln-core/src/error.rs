//! Error types for kiln-core.

use thiserror::Error;

/// Result type alias for kiln-core operations.
pub type Result<T> = std::result::Result<T, KilnError>;

/// Errors that can occur while protecting a bundle.
///
/// `Config` and `HostStartup` are fatal: they abort the whole run before any
/// chunk is touched. `Compile`, `UnsupportedSyntax`, and chunk-level IO
/// failures are reported per chunk and never fail the batch.
#[derive(Error, Debug)]
pub enum KilnError {
    /// Invalid or missing pipeline configuration.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration problem.
        message: String,
    },

    /// The compiling Electron instance could not be launched.
    #[error("Compiler host failed to start: {message}")]
    HostStartup {
        /// Description of the startup failure.
        message: String,
    },

    /// A chunk's source failed to produce valid cache data.
    #[error("Compilation of chunk '{chunk}' failed: {message}")]
    Compile {
        /// Identifier of the failing chunk.
        chunk: String,
        /// Compiler host diagnostic.
        message: String,
    },

    /// The arrow-function normalizer met a form it cannot rewrite
    /// without changing meaning.
    #[error("Chunk '{chunk}' uses {construct} inside an arrow function (line {line}); rewriting it would change semantics")]
    UnsupportedSyntax {
        /// Identifier of the failing chunk.
        chunk: String,
        /// The offending construct (`this`, `arguments`, ...).
        construct: String,
        /// 1-based source line of the offending construct.
        line: u32,
    },

    /// Compilation of a chunk exceeded the configured timeout.
    #[error("Compilation of chunk '{chunk}' timed out after {seconds}s")]
    CompileTimeout {
        /// Identifier of the failing chunk.
        chunk: String,
        /// Timeout that expired.
        seconds: u64,
    },

    /// IO error reading chunks or writing artifacts.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl KilnError {
    /// Whether this error aborts the whole run rather than one chunk.
    pub fn is_fatal(&self) -> bool {
        matches!(self, KilnError::Config { .. } | KilnError::HostStartup { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = KilnError::Compile {
            chunk: "main".to_string(),
            message: "Unexpected token".to_string(),
        };
        assert!(err.to_string().contains("main"));
        assert!(err.to_string().contains("Unexpected token"));

        let err = KilnError::UnsupportedSyntax {
            chunk: "preload".to_string(),
            construct: "this".to_string(),
            line: 42,
        };
        assert!(err.to_string().contains("preload"));
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn test_fatality() {
        assert!(KilnError::Config {
            message: "no alias".into()
        }
        .is_fatal());
        assert!(KilnError::HostStartup {
            message: "ENOENT".into()
        }
        .is_fatal());
        assert!(!KilnError::Compile {
            chunk: "a".into(),
            message: "b".into()
        }
        .is_fatal());
    }
}
