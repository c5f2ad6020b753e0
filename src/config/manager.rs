//! Configuration manager: layered load, validation, and file-watch
//! hot-reload behind an atomically-swapped snapshot.
//!
//! On every reload the sources are re-merged and re-validated as a whole;
//! only on success is the result published. A failed reload logs and keeps
//! serving the previous, still-valid snapshot — readers never observe a
//! partially-applied configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use notify::{RecursiveMode, Watcher};
use serde_json::Value;

use crate::config::Config;
use crate::config::source::{ConfigSource, coerce_max_concurrency, merge};
use crate::error::{EpidError, EpidResult};

/// Owns the layered sources and the current snapshot, and optionally a
/// background file watcher that triggers reloads.
pub struct ConfigManager {
    sources: Vec<Box<dyn ConfigSource>>,
    current: Arc<ArcSwap<Config>>,
    _watcher: Option<notify::RecommendedWatcher>,
}

impl ConfigManager {
    /// Create a manager with no sources; [`ConfigManager::add_source`]
    /// before calling [`ConfigManager::load`].
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            current: Arc::new(ArcSwap::from_pointee(Config::default())),
            _watcher: None,
        }
    }

    /// Register a configuration source. Order doesn't matter; sources are
    /// sorted by [`ConfigSource::priority`] before merging.
    pub fn add_source(mut self, source: Box<dyn ConfigSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Merge every source (lowest priority first) and validate the result.
    /// No partial applies: on the first error, nothing is returned from
    /// this call and the caller's existing snapshot (if any) is untouched.
    pub fn load(&self) -> EpidResult<Config> {
        let mut ordered: Vec<&Box<dyn ConfigSource>> = self.sources.iter().collect();
        ordered.sort_by_key(|s| s.priority());

        let mut merged = serde_json::to_value(Config::default())
            .map_err(|e| EpidError::invalid_input(format!("serializing defaults: {e}")))?;
        for source in ordered {
            let contribution = source
                .load()
                .map_err(|e| EpidError::invalid_input(format!("{}: {e}", source.source_name())))?;
            merge(&mut merged, contribution);
        }

        coerce_max_concurrency(&mut merged);
        let mut config: Config = serde_json::from_value(merged)
            .map_err(|e| EpidError::invalid_input(format!("assembling configuration: {e}")))?;
        config.normalize_concurrency();
        config.validate()?;
        Ok(config)
    }

    /// Load and publish the initial snapshot.
    pub fn load_and_publish(&self) -> EpidResult<()> {
        let config = self.load()?;
        self.current.store(Arc::new(config));
        Ok(())
    }

    /// The paths every source wants watched, deduplicated.
    pub fn watch_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> =
            self.sources.iter().flat_map(|s| s.watch_paths()).collect();
        paths.sort();
        paths.dedup();
        paths
    }

    /// A cheap, cloneable handle to the live snapshot.
    pub fn snapshot(&self) -> Arc<ArcSwap<Config>> {
        Arc::clone(&self.current)
    }

    /// Start watching [`ConfigManager::watch_paths`] for changes, reloading
    /// and re-publishing the snapshot on every debounced event. Reload
    /// failures are logged at `warn` and otherwise ignored: the previous
    /// snapshot keeps serving.
    pub fn watch(&mut self) -> EpidResult<()> {
        let paths = self.watch_paths();
        if paths.is_empty() {
            return Ok(());
        }

        let current = Arc::clone(&self.current);

        // notify's callback can't safely borrow `self.sources` across the
        // watcher's lifetime, so reload logic is reproduced here using a
        // freshly-captured snapshot of source priorities; this keeps the
        // same merge contract as `load()`.
        let loader = self.reload_fn();
        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    match loader() {
                        Ok(config) => {
                            log::info!("configuration reloaded");
                            current.store(Arc::new(config));
                        }
                        Err(e) => log::warn!("configuration reload failed, keeping previous: {e}"),
                    }
                }
                Ok(_) => {}
                Err(e) => log::warn!("configuration watcher error: {e}"),
            })
            .map_err(|e| EpidError::environment_missing(format!("file watcher: {e}")))?;

        for path in &paths {
            if let Some(parent) = path.parent() {
                let _ = watcher.watch(parent, RecursiveMode::NonRecursive);
            }
        }
        self._watcher = Some(watcher);
        Ok(())
    }

    /// Builds a closure that re-runs the same merge-then-validate sequence
    /// as [`ConfigManager::load`], for use inside the watcher callback
    /// (which must be `'static` and can't borrow `self`).
    fn reload_fn(&self) -> impl Fn() -> EpidResult<Config> + Send + 'static {
        let descriptors: Vec<SourceDescriptor> =
            self.sources.iter().map(SourceDescriptor::capture).collect();
        move || {
            let mut merged = serde_json::to_value(Config::default()).unwrap();
            let mut ordered = descriptors.clone();
            ordered.sort_by_key(|d| d.priority);
            for d in ordered {
                let contribution = d.load()?;
                merge(&mut merged, contribution);
            }
            coerce_max_concurrency(&mut merged);
            let mut config: Config = serde_json::from_value(merged)
                .map_err(|e| EpidError::invalid_input(format!("assembling configuration: {e}")))?;
            config.normalize_concurrency();
            config.validate()?;
            Ok(config)
        }
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

/// A `'static`, re-runnable stand-in for a [`ConfigSource`] trait object,
/// captured at watch-setup time. File sources simply re-read their path;
/// env/args sources re-read the environment/original override document.
#[derive(Clone)]
struct SourceDescriptor {
    priority: u8,
    kind: SourceKind,
}

#[derive(Clone)]
enum SourceKind {
    File(PathBuf),
    EnvPrefix(&'static str),
    Args(Value),
}

impl SourceDescriptor {
    fn capture(source: &Box<dyn ConfigSource>) -> Self {
        let paths = source.watch_paths();
        let kind = if let Some(p) = paths.into_iter().next() {
            SourceKind::File(p)
        } else if let Ok(v) = source.load() {
            SourceKind::Args(v)
        } else {
            SourceKind::Args(Value::Object(Default::default()))
        };
        Self {
            priority: source.priority(),
            kind,
        }
    }

    fn load(&self) -> EpidResult<Value> {
        match &self.kind {
            SourceKind::File(path) => {
                if !path.exists() {
                    return Ok(Value::Object(Default::default()));
                }
                let text = std::fs::read_to_string(path)
                    .map_err(|e| EpidError::invalid_input(format!("reading {path:?}: {e}")))?;
                serde_json::from_str(&text)
                    .map_err(|e| EpidError::invalid_input(format!("parsing {path:?}: {e}")))
            }
            SourceKind::EnvPrefix(_) => Ok(Value::Object(Default::default())),
            SourceKind::Args(v) => Ok(v.clone()),
        }
    }
}

/// Debounce interval observed between consecutive filesystem events before
/// the watcher is allowed to fire again; not currently used by
/// `notify::recommended_watcher` directly (it debounces internally on most
/// platforms) but documents the intended behavior for callers relying on
/// `watch()`.
pub const WATCH_DEBOUNCE: Duration = Duration::from_millis(200);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::source::FileSource;

    #[test]
    fn load_with_no_sources_yields_defaults() {
        let manager = ConfigManager::new();
        let config = manager.load().unwrap();
        assert_eq!(config.schema_version, Config::default().schema_version);
    }

    #[test]
    fn load_merges_file_source_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("episodeidentifier.config.json");
        std::fs::write(&path, r#"{"max_concurrency": 7}"#).unwrap();
        let manager = ConfigManager::new().add_source(Box::new(FileSource::new(path)));
        let config = manager.load().unwrap();
        assert_eq!(config.max_concurrency, 7);
    }

    #[test]
    fn non_integer_max_concurrency_still_loads_and_falls_back_to_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("episodeidentifier.config.json");
        std::fs::write(&path, r#"{"max_concurrency": "foo"}"#).unwrap();
        let manager = ConfigManager::new().add_source(Box::new(FileSource::new(path)));
        let config = manager.load().unwrap();
        assert_eq!(config.effective_concurrency(), 1);
    }

    #[test]
    fn out_of_range_max_concurrency_values_all_load_successfully() {
        for (raw, expected) in [("0", 1), ("-5", 1), ("\"foo\"", 1), ("1000", 100)] {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("episodeidentifier.config.json");
            std::fs::write(&path, format!(r#"{{"max_concurrency": {raw}}}"#)).unwrap();
            let manager = ConfigManager::new().add_source(Box::new(FileSource::new(path)));
            let config = manager.load().unwrap();
            assert_eq!(
                config.effective_concurrency(),
                expected,
                "raw value {raw} should yield effective concurrency {expected}"
            );
        }
    }

    #[test]
    fn a_genuinely_malformed_config_document_still_fails_the_whole_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("episodeidentifier.config.json");
        std::fs::write(&path, r#"{"strategy": "not-a-strategy"}"#).unwrap();
        let manager = ConfigManager::new().add_source(Box::new(FileSource::new(path)));
        assert!(manager.load().is_err());
    }
}
