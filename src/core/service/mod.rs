// ─── Service profiles ───
// The service-specific half of a managed instance. Everything generic
// (download, verify, install, spawn, poll) lives in `core::instance`;
// a profile only answers "where is the artifact" and "how is it run".

pub mod fcrepo;

pub use fcrepo::{Fcrepo, DEFAULT_FCREPO_VERSION, SPRING_NOOP_FILE};

use std::path::Path;

use serde_json::{Map, Value};

use crate::core::error::WrapperResult;
use crate::core::options::Options;

/// A bundled file installed next to the service binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupportFile {
    pub name: &'static str,
    pub contents: &'static str,
}

pub trait ServiceProfile: Send + Sync + std::fmt::Debug {
    /// Short name used in log lines.
    fn name(&self) -> &str;

    fn default_version(&self) -> &str;

    /// Port used when the options do not mention `port` at all.
    fn default_port(&self) -> &str;

    fn download_url(&self, version: &str) -> String;

    /// Remote file holding the expected digest of the artifact.
    fn checksum_url(&self, version: &str) -> String {
        format!("{}.md5", self.download_url(version))
    }

    /// File name of the installed binary inside the instance directory.
    fn binary_name(&self, version: &str) -> String;

    /// Interpreter flags used when `java_options` is not given.
    /// Support files are referenced relative to `instance_dir`.
    fn default_java_options(
        &self,
        options: &Options,
        instance_dir: &Path,
    ) -> WrapperResult<Vec<String>>;

    /// Files the service reads at runtime, written into the instance
    /// directory on every extract.
    fn support_files(&self, _options: &Options) -> Vec<SupportFile> {
        Vec::new()
    }

    /// Option key holding the service's own `--flag value` pairs.
    fn process_options_key(&self) -> &str;

    fn default_process_options(&self) -> Map<String, Value>;

    /// Path fetched by the liveness probe after the TCP connect succeeds.
    /// `None` skips the HTTP step.
    fn health_path(&self) -> Option<&str> {
        Some("/")
    }
}
