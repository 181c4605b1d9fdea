use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::core::error::{WrapperError, WrapperResult};
use crate::core::options::{render_scalar, Options};
use crate::core::service::{Fcrepo, ServiceProfile, SupportFile};

/// Everything derived from the options, computed once.
///
/// Paths are fixed at construction: mutating the options afterwards has no
/// effect on an existing config. The only side effect of building one is
/// creating the download directory.
#[derive(Debug, Clone)]
pub struct InstanceConfig {
    options: Options,
    version: String,
    download_url: String,
    checksum_url: String,
    download_dir: PathBuf,
    download_path: PathBuf,
    checksum_path: PathBuf,
    instance_dir: PathBuf,
    binary_path: PathBuf,
    version_file: PathBuf,
    tmp_save_dir: PathBuf,
    port: Option<String>,
    process_options: Map<String, Value>,
    java: String,
    java_options: Vec<String>,
    env: Vec<(String, String)>,
    support_files: Vec<SupportFile>,
    expected_checksum: Option<String>,
    validate_checksum: bool,
    ignore_checksum_mismatch: bool,
    managed: bool,
    verbose: bool,
    health_path: Option<String>,
    startup_timeout: Option<Duration>,
    shutdown_timeout: Option<Duration>,
}

impl InstanceConfig {
    /// Resolve options for the default Fedora profile.
    pub fn new(options: Options) -> WrapperResult<Self> {
        Self::resolve(options, &Fcrepo)
    }

    pub fn resolve(options: Options, profile: &dyn ServiceProfile) -> WrapperResult<Self> {
        let version = options
            .string("version")?
            .unwrap_or_else(|| profile.default_version().to_string());
        let download_url = options
            .string("url")?
            .unwrap_or_else(|| profile.download_url(&version));
        let checksum_url = options
            .string("checksum_url")?
            .unwrap_or_else(|| profile.checksum_url(&version));

        let download_dir = options
            .path("download_dir")?
            .unwrap_or_else(std::env::temp_dir);
        std::fs::create_dir_all(&download_dir).map_err(WrapperError::io(&download_dir))?;

        let artifact_name = url_basename(&download_url);
        let download_path = options
            .path("download_path")?
            .unwrap_or_else(|| download_dir.join(artifact_name));
        let checksum_path = download_dir.join(url_basename(&checksum_url));

        let instance_dir = match options.path("instance_dir")? {
            Some(dir) => dir,
            None => std::env::temp_dir().join(artifact_stem(artifact_name)),
        };
        let binary_path = instance_dir.join(profile.binary_name(&version));
        let version_file = options
            .path("version_file")?
            .unwrap_or_else(|| instance_dir.join("VERSION"));
        let tmp_save_dir = match options.path("tmp_save_dir")? {
            Some(dir) => dir,
            None => std::env::temp_dir().join(format!("{}_wrapper-{}", profile.name(), Uuid::new_v4())),
        };

        let port = resolve_port(&options, profile)?;

        let process_options = options
            .map(profile.process_options_key())?
            .unwrap_or_else(|| profile.default_process_options());

        let java = options.string("java")?.unwrap_or_else(|| "java".to_string());
        let mut java_options = match options.string_list("java_options")? {
            Some(flags) => flags,
            None => profile.default_java_options(&options, &instance_dir)?,
        };
        java_options.push("-jar".to_string());
        java_options.push(binary_path.to_string_lossy().into_owned());

        let env = options
            .map("env")?
            .unwrap_or_default()
            .iter()
            .map(|(key, value)| (key.clone(), render_scalar(value)))
            .collect();

        let support_files = profile.support_files(&options);

        let expected_checksum = match options.string("md5sum")? {
            Some(sum) => Some(sum),
            None => options.string("checksum")?,
        };
        let validate_checksum = options.get("validate") != Some(&Value::Bool(false));
        let ignore_checksum_mismatch =
            options.flag("ignore_md5sum", false) || options.flag("ignore_checksum", false);

        Ok(Self {
            version,
            download_url,
            checksum_url,
            download_dir,
            download_path,
            checksum_path,
            instance_dir,
            binary_path,
            version_file,
            tmp_save_dir,
            port,
            process_options,
            java,
            java_options,
            env,
            support_files,
            expected_checksum,
            validate_checksum,
            ignore_checksum_mismatch,
            managed: options.flag("managed", true),
            verbose: options.flag("verbose", false),
            health_path: profile.health_path().map(str::to_string),
            startup_timeout: options.duration_secs("startup_timeout")?,
            shutdown_timeout: options.duration_secs("shutdown_timeout")?,
            options,
        })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn download_url(&self) -> &str {
        &self.download_url
    }

    pub fn checksum_url(&self) -> &str {
        &self.checksum_url
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    pub fn download_path(&self) -> &Path {
        &self.download_path
    }

    /// Local cache of the remote checksum file.
    pub fn checksum_path(&self) -> &Path {
        &self.checksum_path
    }

    pub fn instance_dir(&self) -> &Path {
        &self.instance_dir
    }

    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    pub fn version_file(&self) -> &Path {
        &self.version_file
    }

    pub fn tmp_save_dir(&self) -> &Path {
        &self.tmp_save_dir
    }

    /// `None` means "pick any free port"; see `ManagedInstance::port`.
    pub fn port(&self) -> Option<&str> {
        self.port.as_deref()
    }

    pub fn process_options(&self) -> &Map<String, Value> {
        &self.process_options
    }

    pub fn java(&self) -> &str {
        &self.java
    }

    /// Interpreter flags, always ending in `-jar <binary_path>`.
    pub fn java_options(&self) -> &[String] {
        &self.java_options
    }

    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    /// Bundled files to install into `instance_dir`.
    pub fn support_files(&self) -> &[SupportFile] {
        &self.support_files
    }

    pub fn expected_checksum(&self) -> Option<&str> {
        self.expected_checksum.as_deref()
    }

    pub fn validate_checksum(&self) -> bool {
        self.validate_checksum
    }

    pub fn ignore_checksum_mismatch(&self) -> bool {
        self.ignore_checksum_mismatch
    }

    pub fn managed(&self) -> bool {
        self.managed
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn health_path(&self) -> Option<&str> {
        self.health_path.as_deref()
    }

    pub fn startup_timeout(&self) -> Option<Duration> {
        self.startup_timeout
    }

    pub fn shutdown_timeout(&self) -> Option<Duration> {
        self.shutdown_timeout
    }

    /// Full command line: interpreter, its flags, then `--key value` pairs.
    ///
    /// Empty tokens are dropped, so a flag whose value renders empty
    /// (`null` or `""`) is passed as a bare `--key`.
    pub fn process_arguments(&self, port: Option<&str>) -> Vec<String> {
        let mut flags = self.process_options.clone();
        flags.insert(
            "port".into(),
            port.map(Value::from).unwrap_or(Value::Null),
        );

        let mut args = Vec::with_capacity(1 + self.java_options.len() + flags.len() * 2);
        args.push(self.java.clone());
        args.extend(self.java_options.iter().cloned());
        for (key, value) in &flags {
            for token in [format!("--{key}"), render_scalar(value)] {
                if !token.is_empty() {
                    args.push(token);
                }
            }
        }
        args
    }
}

/// Absent: profile default. Present but `null`/`false`/empty: none.
/// Otherwise the value rendered verbatim.
fn resolve_port(options: &Options, profile: &dyn ServiceProfile) -> WrapperResult<Option<String>> {
    match options.get("port") {
        None => Ok(Some(profile.default_port().to_string())),
        Some(Value::Null) | Some(Value::Bool(false)) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(_) => options.string("port"),
    }
}

fn url_basename(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().unwrap_or(path)
}

fn artifact_stem(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    }
}
