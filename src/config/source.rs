//! Layered configuration sources.
//!
//! Mirrors a priority-ordered `ConfigSource` trait: each source
//! contributes a partial JSON document, sources are merged highest
//! priority last, and the merged document is deserialized into a full
//! [`super::Config`] before validation.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::{EpidError, EpidResult};

/// A layered source of configuration data.
pub trait ConfigSource: Send + Sync {
    /// Load this source's contribution as a partial JSON value (an empty
    /// object if the source has nothing to contribute).
    fn load(&self) -> EpidResult<Value>;

    /// Merge priority: higher loads later and overrides lower priorities.
    fn priority(&self) -> u8;

    /// Human-readable name, used in error messages and logs.
    fn source_name(&self) -> &'static str;

    /// Paths this source wants watched for hot-reload; empty by default.
    fn watch_paths(&self) -> Vec<PathBuf> {
        Vec::new()
    }
}

/// Loads the configuration JSON file at a fixed path.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    /// Create a file source pointed at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigSource for FileSource {
    fn load(&self) -> EpidResult<Value> {
        if !self.path.exists() {
            return Ok(Value::Object(Default::default()));
        }
        let text = std::fs::read_to_string(&self.path)
            .map_err(|e| EpidError::invalid_input(format!("reading {:?}: {e}", self.path)))?;
        serde_json::from_str(&text)
            .map_err(|e| EpidError::invalid_input(format!("parsing {:?}: {e}", self.path)))
    }

    fn priority(&self) -> u8 {
        10
    }

    fn source_name(&self) -> &'static str {
        "file"
    }

    fn watch_paths(&self) -> Vec<PathBuf> {
        vec![self.path.clone()]
    }
}

/// Reads `EPID_*` environment variable overrides.
pub struct EnvSource {
    prefix: &'static str,
}

impl EnvSource {
    /// Create a source reading variables under `prefix` (e.g. `"EPID_"`).
    pub fn new(prefix: &'static str) -> Self {
        Self { prefix }
    }
}

impl ConfigSource for EnvSource {
    fn load(&self) -> EpidResult<Value> {
        let mut map = serde_json::Map::new();
        if let Ok(v) = std::env::var(format!("{}MAX_CONCURRENCY", self.prefix)) {
            if let Ok(n) = v.parse::<i64>() {
                map.insert("max_concurrency".to_string(), Value::from(n));
            }
        }
        if let Ok(v) = std::env::var(format!("{}STRATEGY", self.prefix)) {
            map.insert("strategy".to_string(), Value::from(v));
        }
        Ok(Value::Object(map))
    }

    fn priority(&self) -> u8 {
        20
    }

    fn source_name(&self) -> &'static str {
        "env"
    }
}

/// Wraps CLI-derived overrides (e.g. a future `--strategy` flag) already
/// parsed into a JSON object by the caller.
pub struct ArgsSource {
    overrides: Value,
}

impl ArgsSource {
    /// Create a source from a pre-built JSON object of overrides.
    pub fn new(overrides: Value) -> Self {
        Self { overrides }
    }
}

impl ConfigSource for ArgsSource {
    fn load(&self) -> EpidResult<Value> {
        Ok(self.overrides.clone())
    }

    fn priority(&self) -> u8 {
        30
    }

    fn source_name(&self) -> &'static str {
        "args"
    }
}

/// Coerce an out-of-shape `max_concurrency` field to a sentinel `0` before
/// typed deserialization, rather than letting the whole load fail.
///
/// §4.9/§8: a non-integer `max_concurrency` (a string that doesn't parse,
/// a float, a bool, ...) must still load successfully, falling back to an
/// effective concurrency of 1 with a warning — the same outcome as an
/// in-range-but-non-positive value. [`super::Config::normalize_concurrency`]
/// performs the actual clamp-and-warn once the value is a plain integer;
/// this step only ensures deserialization itself can't reject the document.
pub fn coerce_max_concurrency(value: &mut Value) {
    let Value::Object(map) = value else { return };
    let Some(field) = map.get("max_concurrency") else {
        return;
    };
    let valid = match field {
        Value::Number(n) => n.as_i64().is_some(),
        Value::String(s) => s.trim().parse::<i64>().is_ok(),
        _ => false,
    };
    if !valid {
        log::warn!("max_concurrency {field:?} is not an integer, falling back to 1");
        map.insert("max_concurrency".to_string(), Value::from(0));
    } else if let Value::String(s) = field {
        // A numeric string ("7") parses but isn't a JSON number; normalize
        // it to one so the typed deserialize step succeeds.
        if let Ok(n) = s.trim().parse::<i64>() {
            map.insert("max_concurrency".to_string(), Value::from(n));
        }
    }
}

/// Merge `overlay` onto `base`, recursing into nested objects and
/// otherwise letting `overlay` win.
pub fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (k, v) in overlay_map {
                merge(base_map.entry(k).or_insert(Value::Null), v);
            }
        }
        (base_slot, overlay_value) => {
            *base_slot = overlay_value;
        }
    }
}

/// Locate the default configuration file path: `$EPID_CONFIG_PATH`, else
/// `dirs::config_dir()/episode-identifier/episodeidentifier.config.json`.
pub fn default_config_path() -> PathBuf {
    if let Ok(p) = std::env::var("EPID_CONFIG_PATH") {
        return PathBuf::from(p);
    }
    dirs::config_dir()
        .unwrap_or_else(|| Path::new(".").to_path_buf())
        .join("episode-identifier")
        .join("episodeidentifier.config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_overlays_nested_objects() {
        let mut base = serde_json::json!({"thresholds": {"text": {"match_confidence": 0.6}}});
        let overlay = serde_json::json!({"thresholds": {"text": {"rename_confidence": 0.9}}});
        merge(&mut base, overlay);
        assert_eq!(base["thresholds"]["text"]["match_confidence"], 0.6);
        assert_eq!(base["thresholds"]["text"]["rename_confidence"], 0.9);
    }

    #[test]
    fn missing_file_source_loads_as_empty_object() {
        let source = FileSource::new("/nonexistent/path/episodeidentifier.config.json");
        assert_eq!(source.load().unwrap(), Value::Object(Default::default()));
    }
}
