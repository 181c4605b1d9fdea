use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use super::{ServiceProfile, SupportFile};
use crate::core::error::{WrapperError, WrapperResult};
use crate::core::options::Options;

pub const DEFAULT_FCREPO_VERSION: &str = "4.5.0";
pub const DEFAULT_FCREPO_PORT: &str = "8080";

/// Spring context swapped in for the JMS one when `enable_jms` is off.
pub const SPRING_NOOP_FILE: &str = "spring-noop.xml";
const SPRING_NOOP_XML: &str = include_str!("../../../data/spring-noop.xml");

const RELEASES_BASE: &str = "https://github.com/fcrepo4/fcrepo4/releases/download";

/// Fedora Commons 4 repository, run from its self-contained jetty-console jar.
#[derive(Debug, Clone, Default)]
pub struct Fcrepo;

impl ServiceProfile for Fcrepo {
    fn name(&self) -> &str {
        "fcrepo"
    }

    fn default_version(&self) -> &str {
        DEFAULT_FCREPO_VERSION
    }

    fn default_port(&self) -> &str {
        DEFAULT_FCREPO_PORT
    }

    fn download_url(&self, version: &str) -> String {
        format!("{RELEASES_BASE}/fcrepo-{version}/{}", self.binary_name(version))
    }

    fn binary_name(&self, version: &str) -> String {
        format!("fcrepo-webapp-{version}-jetty-console.jar")
    }

    fn default_java_options(
        &self,
        options: &Options,
        instance_dir: &Path,
    ) -> WrapperResult<Vec<String>> {
        let mut flags = vec![
            "-Dfcrepo.log.http.api=WARN".to_string(),
            // Silences the relations-external#isPartOf namespace warning.
            "-Dfcrepo.log.kernel=ERROR".to_string(),
        ];
        if let Some(home) = options.string("fcrepo_home_dir")? {
            flags.push(format!("-Dfcrepo.home={home}"));
        }
        if !jms_enabled(options) {
            let noop = absolute(&instance_dir.join(SPRING_NOOP_FILE))?;
            flags.push(format!(
                "-Dfcrepo.spring.jms.configuration=file://{}",
                noop.display()
            ));
        }
        flags.push("-Xmx512m".to_string());
        Ok(flags)
    }

    fn support_files(&self, options: &Options) -> Vec<SupportFile> {
        if jms_enabled(options) {
            return Vec::new();
        }
        vec![SupportFile {
            name: SPRING_NOOP_FILE,
            contents: SPRING_NOOP_XML,
        }]
    }

    fn process_options_key(&self) -> &str {
        "fcrepo_options"
    }

    fn default_process_options(&self) -> Map<String, Value> {
        let mut flags = Map::new();
        flags.insert("headless".into(), Value::Null);
        flags
    }
}

fn jms_enabled(options: &Options) -> bool {
    options.flag("enable_jms", true)
}

fn absolute(path: &Path) -> WrapperResult<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(WrapperError::io(path))?;
    Ok(cwd.join(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_version_qualified() {
        let fcrepo = Fcrepo;
        assert_eq!(
            fcrepo.download_url("4.5.0"),
            "https://github.com/fcrepo4/fcrepo4/releases/download/fcrepo-4.5.0/fcrepo-webapp-4.5.0-jetty-console.jar"
        );
        assert_eq!(
            fcrepo.checksum_url("4.5.0"),
            "https://github.com/fcrepo4/fcrepo4/releases/download/fcrepo-4.5.0/fcrepo-webapp-4.5.0-jetty-console.jar.md5"
        );
    }

    #[test]
    fn home_dir_is_passed_to_the_jvm() {
        let options = Options::new().with("fcrepo_home_dir", "/var/fcrepo");
        let flags = Fcrepo
            .default_java_options(&options, Path::new("/opt/fcrepo"))
            .unwrap();
        assert!(flags.contains(&"-Dfcrepo.home=/var/fcrepo".to_string()));
        assert_eq!(flags.last().map(String::as_str), Some("-Xmx512m"));
    }

    #[test]
    fn jms_is_enabled_by_default() {
        let options = Options::new();
        let flags = Fcrepo
            .default_java_options(&options, Path::new("/opt/fcrepo"))
            .unwrap();
        assert!(!flags.iter().any(|f| f.starts_with("-Dfcrepo.spring.jms")));
        assert!(Fcrepo.support_files(&options).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn disabled_jms_points_at_the_noop_context() {
        let options = Options::new().with("enable_jms", false);
        let flags = Fcrepo
            .default_java_options(&options, Path::new("/opt/fcrepo"))
            .unwrap();
        assert_eq!(
            &flags[flags.len() - 2..],
            [
                "-Dfcrepo.spring.jms.configuration=file:///opt/fcrepo/spring-noop.xml".to_string(),
                "-Xmx512m".to_string(),
            ]
        );

        let files = Fcrepo.support_files(&options);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "spring-noop.xml");
        assert!(files[0].contents.contains("<beans"));
    }

    #[test]
    fn relative_instance_dir_becomes_absolute_url() {
        let options = Options::new().with("enable_jms", Value::Null);
        let flags = Fcrepo
            .default_java_options(&options, Path::new("relative/fcrepo"))
            .unwrap();
        let expected = std::env::current_dir()
            .unwrap()
            .join("relative/fcrepo/spring-noop.xml");
        assert!(flags.contains(&format!(
            "-Dfcrepo.spring.jms.configuration=file://{}",
            expected.display()
        )));
    }

    #[test]
    fn runs_headless_by_default() {
        let flags = Fcrepo.default_process_options();
        assert_eq!(flags.get("headless"), Some(&Value::Null));
    }
}
