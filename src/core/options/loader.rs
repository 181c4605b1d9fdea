use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use super::{expand_home, Options};
use crate::core::error::{WrapperError, WrapperResult};

/// File name looked up in the working directory and in `$HOME`.
pub const CONFIG_FILE_NAME: &str = ".fcrepo_wrapper";

/// Layers YAML config files under explicitly passed options.
///
/// Order, lowest precedence first:
/// 1. the default paths (`./.fcrepo_wrapper`, `~/.fcrepo_wrapper`)
/// 2. every path named by the `config` option, in order
/// 3. the explicit options themselves
///
/// Missing or unreadable files are skipped.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    default_paths: Vec<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self {
            default_paths: default_configuration_paths(),
        }
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the well-known locations, e.g. with nothing in tests.
    pub fn with_default_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.default_paths = paths;
        self
    }

    pub fn default_paths(&self) -> &[PathBuf] {
        &self.default_paths
    }

    pub fn load(&self, explicit: Options) -> WrapperResult<Options> {
        let verbose = explicit.flag("verbose", false);
        let requested = explicit
            .string_list("config")?
            .unwrap_or_default()
            .into_iter()
            .map(|raw| expand_home(&raw));

        let mut merged = Options::new();
        for path in self.default_paths.iter().cloned().chain(requested) {
            match read_config(&path) {
                Ok(Some(layer)) => {
                    debug!("Loaded config layer {:?}", path);
                    merged.merge(layer);
                }
                Ok(None) => {}
                Err(err) if verbose => warn!("Skipping config {:?}: {}", path, err),
                Err(err) => debug!("Skipping config {:?}: {}", path, err),
            }
        }

        merged.merge(explicit);
        Ok(merged)
    }
}

/// Read one YAML mapping. `Ok(None)` when the file does not exist.
pub fn read_config(path: &Path) -> WrapperResult<Option<Options>> {
    if !path.is_file() {
        return Ok(None);
    }

    let raw = std::fs::read_to_string(path).map_err(WrapperError::io(path))?;
    if raw.trim().is_empty() {
        return Ok(Some(Options::new()));
    }
    let value: Value = serde_yaml::from_str(&raw)?;
    match value {
        Value::Null => Ok(Some(Options::new())),
        Value::Object(map) => Ok(Some(Options::from(map))),
        _ => Err(WrapperError::Config {
            path: path.to_path_buf(),
            message: "top level must be a mapping".into(),
        }),
    }
}

fn default_configuration_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(CONFIG_FILE_NAME));
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SAMPLE: &str = "version_file: path/to/VERSION\nport: 9999\nvalidate: true\nverbose: false\n";
    const ANOTHER: &str = "port: 9998\nverbose: true\n";

    fn write(dir: &Path, name: &str, body: &str) -> String {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn loader() -> ConfigLoader {
        ConfigLoader::new().with_default_paths(Vec::new())
    }

    #[test]
    fn single_file_values_are_used() {
        let dir = tempfile::tempdir().unwrap();
        let sample = write(dir.path(), "sample_config.yml", SAMPLE);

        let options = loader()
            .load(Options::new().with("config", sample))
            .unwrap();

        assert_eq!(options.get("version_file"), Some(&json!("path/to/VERSION")));
        assert_eq!(options.get("validate"), Some(&json!(true)));
        assert_eq!(options.get("verbose"), Some(&json!(false)));
        assert_eq!(options.get("port"), Some(&json!(9999)));
    }

    #[test]
    fn later_files_win() {
        let dir = tempfile::tempdir().unwrap();
        let sample = write(dir.path(), "sample_config.yml", SAMPLE);
        let another = write(dir.path(), "another_sample_config.yml", ANOTHER);

        let options = loader()
            .load(Options::new().with("config", json!([sample, another])))
            .unwrap();

        assert_eq!(options.get("port"), Some(&json!(9998)));
        assert!(options.flag("verbose", false));
    }

    #[test]
    fn explicit_options_win_over_files() {
        let dir = tempfile::tempdir().unwrap();
        let sample = write(dir.path(), "sample_config.yml", SAMPLE);

        let options = loader()
            .load(Options::new().with("config", sample).with("port", "8888"))
            .unwrap();

        assert_eq!(options.get("port"), Some(&json!("8888")));
    }

    #[test]
    fn missing_and_broken_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let broken = write(dir.path(), "broken.yml", "port: [unterminated\n");
        let scalar = write(dir.path(), "scalar.yml", "just a string\n");
        let missing = dir.path().join("nope.yml").to_string_lossy().into_owned();

        let options = ConfigLoader::new()
            .with_default_paths(vec![dir.path().join("also-missing")])
            .load(Options::new().with("config", json!([broken, scalar, missing])))
            .unwrap();

        assert_eq!(options.keys().count(), 1);
        assert!(options.contains_key("config"));
    }

    #[test]
    fn default_paths_are_read_first() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), CONFIG_FILE_NAME, "port: 7000\nversion: 4.4.0\n");
        let another = write(dir.path(), "another.yml", ANOTHER);

        let options = ConfigLoader::new()
            .with_default_paths(vec![dir.path().join(CONFIG_FILE_NAME)])
            .load(Options::new().with("config", another))
            .unwrap();

        assert_eq!(options.get("port"), Some(&json!(9998)));
        assert_eq!(options.get("version"), Some(&json!("4.4.0")));
    }

    #[test]
    fn empty_file_is_an_empty_layer() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.yml");
        std::fs::write(&empty, "").unwrap();
        assert_eq!(read_config(&empty).unwrap(), Some(Options::new()));
    }
}
