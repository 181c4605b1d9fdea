use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Central error type for the wrapper.
/// Every module returns `Result<T, WrapperError>`.
#[derive(Debug, Error)]
pub enum WrapperError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    // ── Integrity ───────────────────────────────────────
    #[error("Checksum mismatch for {path:?}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Checksum file at {0:?} is empty")]
    EmptyChecksumFile(PathBuf),

    // ── Installation ────────────────────────────────────
    #[error("there is no fcrepo instance at {instance_dir:?}. Run extract first.")]
    NotInstalled { instance_dir: PathBuf },

    // ── Configuration ───────────────────────────────────
    #[error("Invalid configuration at {path:?}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("Invalid option `{key}`: {message}")]
    InvalidOption { key: String, message: String },

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // ── Process ─────────────────────────────────────────
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("Service at {url} did not become ready within {waited:?}")]
    StartupTimeout { url: String, waited: Duration },

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type WrapperResult<T> = Result<T, WrapperError>;

impl From<std::io::Error> for WrapperError {
    fn from(source: std::io::Error) -> Self {
        WrapperError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

impl WrapperError {
    /// Attach a path to an IO error.
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| WrapperError::Io { path, source }
    }
}
