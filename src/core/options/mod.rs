// ─── Options ───
// The flat key/value mapping every other component is derived from.
// Values keep the type their source gave them: a port read from YAML as
// `9999` stays a number until something renders it.

pub mod loader;

pub use loader::{read_config, ConfigLoader};

use std::path::PathBuf;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::core::error::{WrapperError, WrapperResult};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options(Map<String, Value>);

impl Options {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build options from a JSON object. Anything else is rejected.
    pub fn from_value(value: Value) -> WrapperResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::new()),
            other => Err(WrapperError::InvalidOption {
                key: "<root>".into(),
                message: format!("expected a mapping, got {other}"),
            }),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Shallow merge: every key of `other` replaces ours.
    pub fn merge(&mut self, other: Options) {
        for (key, value) in other.0 {
            self.0.insert(key, value);
        }
    }

    /// Truthiness of a key: absent falls back to `default`,
    /// `null` and `false` are false, everything else is true.
    pub fn flag(&self, key: &str, default: bool) -> bool {
        match self.0.get(key) {
            None => default,
            Some(Value::Null) | Some(Value::Bool(false)) => false,
            Some(_) => true,
        }
    }

    /// A scalar rendered as a string. `null` reads as absent.
    pub fn string(&self, key: &str) -> WrapperResult<Option<String>> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Array(_)) | Some(Value::Object(_)) => Err(WrapperError::InvalidOption {
                key: key.to_string(),
                message: "expected a scalar value".into(),
            }),
            Some(value) => Ok(Some(render_scalar(value))),
        }
    }

    pub fn path(&self, key: &str) -> WrapperResult<Option<PathBuf>> {
        Ok(self.string(key)?.map(|raw| expand_home(&raw)))
    }

    /// Either a single scalar or a list of scalars.
    pub fn string_list(&self, key: &str) -> WrapperResult<Option<Vec<String>>> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Array(items)) => items
                .iter()
                .filter(|item| !item.is_null())
                .map(|item| match item {
                    Value::Array(_) | Value::Object(_) => Err(WrapperError::InvalidOption {
                        key: key.to_string(),
                        message: "list entries must be scalars".into(),
                    }),
                    other => Ok(render_scalar(other)),
                })
                .collect::<WrapperResult<Vec<_>>>()
                .map(Some),
            Some(Value::Object(_)) => Err(WrapperError::InvalidOption {
                key: key.to_string(),
                message: "expected a string or a list of strings".into(),
            }),
            Some(value) => Ok(Some(vec![render_scalar(value)])),
        }
    }

    pub fn map(&self, key: &str) -> WrapperResult<Option<Map<String, Value>>> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(map)) => Ok(Some(map.clone())),
            Some(_) => Err(WrapperError::InvalidOption {
                key: key.to_string(),
                message: "expected a mapping".into(),
            }),
        }
    }

    /// Seconds as an integer, a float or a numeric string.
    pub fn duration_secs(&self, key: &str) -> WrapperResult<Option<Duration>> {
        let invalid = |message: String| WrapperError::InvalidOption {
            key: key.to_string(),
            message,
        };
        let secs = match self.0.get(key) {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::Number(n)) => n
                .as_f64()
                .ok_or_else(|| invalid(format!("{n} is not a number of seconds")))?,
            Some(Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .map_err(|e| invalid(format!("{s:?}: {e}")))?,
            Some(other) => return Err(invalid(format!("{other} is not a number of seconds"))),
        };
        if !secs.is_finite() || secs < 0.0 {
            return Err(invalid(format!("{secs} is not a valid duration")));
        }
        Ok(Some(Duration::from_secs_f64(secs)))
    }
}

impl From<Map<String, Value>> for Options {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for Options {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Render a scalar the way it appears on a command line.
/// `null` renders empty.
pub fn render_scalar(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

pub(crate) fn expand_home(raw: &str) -> PathBuf {
    if raw == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}
