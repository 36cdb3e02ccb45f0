//! Persisted synchronization configuration.
//!
//! [`ConfigStore`] is the only owner of the on-disk document. Readers take an
//! `Arc` snapshot, writers go through one mutex, and every write replaces the
//! file with write-then-rename so a crash leaves either the old or the new
//! document on disk.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::input_validation::{validate_album_titles, validate_api_key, validate_local_folder};

/// File name of the persisted document inside the app config directory
pub const CONFIG_FILE_NAME: &str = "sync_config.json";

/// Album selected on a fresh install
const DEFAULT_ALBUM: &str = "Vacation 2023";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    Missing(PathBuf),

    #[error("failed to read configuration {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse configuration {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write configuration {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to replace configuration {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// The synchronization configuration shared by the worker, the settings
/// dialog and the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default = "default_local_folder")]
    pub local_folder: PathBuf,
    #[serde(default = "default_selected_albums")]
    pub selected_albums: Vec<String>,
    #[serde(default)]
    pub auto_sync: bool,
    #[serde(default)]
    pub api_key: String,
    /// Fields this version doesn't know about; written back untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            local_folder: default_local_folder(),
            selected_albums: default_selected_albums(),
            auto_sync: false,
            api_key: String::new(),
            extra: Map::new(),
        }
    }
}

impl Configuration {
    /// The bearer credential, if one is configured.
    pub fn credential(&self) -> Option<&str> {
        let key = self.api_key.trim();
        (!key.is_empty()).then_some(key)
    }

    /// Whether a reconciliation cycle may touch the network and the disk.
    pub fn is_sync_ready(&self) -> bool {
        self.auto_sync && !self.local_folder.as_os_str().is_empty() && self.credential().is_some()
    }

    pub fn is_selected(&self, title: &str) -> bool {
        self.selected_albums.iter().any(|t| t == title)
    }

    /// Drop repeated album titles, keeping the first occurrence.
    fn normalize(&mut self) {
        let mut seen = HashSet::new();
        self.selected_albums.retain(|title| seen.insert(title.clone()));
    }
}

fn default_local_folder() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("PhotoSync")
}

fn default_selected_albums() -> Vec<String> {
    vec![DEFAULT_ALBUM.to_string()]
}

/// Default location of the persisted document.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("photosync")
        .join(CONFIG_FILE_NAME)
}

/// Partial update accepted by the control plane. Any other field in the
/// request body is ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ConfigPatch {
    #[serde(default)]
    pub selected_albums: Option<Vec<String>>,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl ConfigPatch {
    pub fn from_value(value: Value) -> anyhow::Result<Self> {
        if !value.is_object() {
            anyhow::bail!("Configuration update must be a JSON object");
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(titles) = &self.selected_albums {
            validate_album_titles(titles)?;
        }
        if let Some(key) = &self.api_key {
            validate_api_key(key)?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.selected_albums.is_none() && self.api_key.is_none()
    }

    pub fn apply(&self, config: &mut Configuration) {
        if let Some(titles) = &self.selected_albums {
            config.selected_albums = titles.clone();
        }
        if let Some(key) = &self.api_key {
            config.api_key = key.clone();
        }
    }
}

/// Values edited in the settings dialog. Applying it replaces these three
/// fields and leaves the credential alone.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsChange {
    pub local_folder: PathBuf,
    pub selected_albums: Vec<String>,
    pub auto_sync: bool,
}

impl SettingsChange {
    pub fn validate(&self) -> anyhow::Result<()> {
        validate_local_folder(&self.local_folder)?;
        validate_album_titles(&self.selected_albums)
    }

    pub fn apply(&self, config: &mut Configuration) {
        config.local_folder = self.local_folder.clone();
        config.selected_albums = self.selected_albums.clone();
        config.auto_sync = self.auto_sync;
    }
}

/// Read and parse the document at `path`.
pub fn load(path: &Path) -> Result<Configuration, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ConfigError::Missing(path.to_path_buf()))
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let mut config: Configuration =
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    config.normalize();
    Ok(config)
}

/// Like [`load`], but substitutes defaults on any failure and hands the error
/// back for reporting.
pub fn load_or_default(path: &Path) -> (Configuration, Option<ConfigError>) {
    match load(path) {
        Ok(config) => (config, None),
        Err(e) => (Configuration::default(), Some(e)),
    }
}

/// Write `config` to `path` through a temp file in the same directory and an
/// atomic rename.
pub fn write_document(path: &Path, config: &Configuration) -> Result<(), ConfigError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };

    std::fs::create_dir_all(parent).map_err(write_err)?;

    let body = serde_json::to_vec_pretty(config)?;
    let mut tmp = NamedTempFile::new_in(parent).map_err(write_err)?;
    tmp.write_all(&body).map_err(write_err)?;
    tmp.write_all(b"\n").map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;

    tmp.persist(path).map_err(|e| ConfigError::Persist {
        path: path.to_path_buf(),
        source: e.error,
    })?;

    debug!(path = %path.display(), "configuration saved");
    Ok(())
}

/// Thread-safe owner of the live configuration.
pub struct ConfigStore {
    path: PathBuf,
    current: RwLock<Arc<Configuration>>,
    writer: Mutex<()>,
    /// Set while the in-memory document is ahead of the file on disk.
    dirty: AtomicBool,
}

impl ConfigStore {
    /// Create a store backed by `path`, starting from `initial`, without
    /// touching the disk.
    pub fn new(path: PathBuf, initial: Configuration) -> Self {
        Self {
            path,
            current: RwLock::new(Arc::new(initial)),
            writer: Mutex::new(()),
            dirty: AtomicBool::new(false),
        }
    }

    /// Load the persisted document, falling back to defaults.
    pub fn open(path: PathBuf) -> Self {
        Self::open_with(path, |_| {})
    }

    /// Like [`open`](Self::open), then apply `overrides` in memory. The
    /// overrides reach the file only if a later update saves the document.
    pub fn open_with<F>(path: PathBuf, overrides: F) -> Self
    where
        F: FnOnce(&mut Configuration),
    {
        let (mut config, error) = load_or_default(&path);
        match error {
            None => info!(path = %path.display(), "configuration loaded"),
            Some(ConfigError::Missing(_)) => {
                info!(path = %path.display(), "no configuration found, using defaults")
            }
            Some(e) => warn!("{e}; using defaults"),
        }
        overrides(&mut config);
        config.normalize();
        Self::new(path, config)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Immutable snapshot of the current configuration.
    pub fn get(&self) -> Arc<Configuration> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// True when the last save failed and the file is older than memory.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Read-modify-write under the writer lock. The result is persisted and
    /// published even if the save fails; the failure is logged and the next
    /// successful save catches the file up.
    pub fn update<F>(&self, mutator: F) -> Arc<Configuration>
    where
        F: FnOnce(&mut Configuration),
    {
        let _guard = self.writer.lock().unwrap_or_else(|p| p.into_inner());

        let mut next = (*self.get()).clone();
        mutator(&mut next);
        next.normalize();

        let next = Arc::new(next);
        if let Err(e) = self.persist(&next) {
            warn!("{e}; keeping in-memory configuration");
        }
        self.publish(Arc::clone(&next));
        next
    }

    /// Replace the whole document.
    pub fn save(&self, config: Configuration) -> Result<Arc<Configuration>, ConfigError> {
        let _guard = self.writer.lock().unwrap_or_else(|p| p.into_inner());

        let mut config = config;
        config.normalize();
        let config = Arc::new(config);
        let result = self.persist(&config);
        self.publish(Arc::clone(&config));
        result.map(|_| config)
    }

    fn persist(&self, config: &Configuration) -> Result<(), ConfigError> {
        let result = write_document(&self.path, config);
        self.dirty.store(result.is_err(), Ordering::SeqCst);
        result
    }

    fn publish(&self, config: Arc<Configuration>) {
        match self.current.write() {
            Ok(mut guard) => *guard = config,
            Err(poisoned) => *poisoned.into_inner() = config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn sample() -> Configuration {
        Configuration {
            local_folder: PathBuf::from("/tmp/x"),
            selected_albums: vec!["A".to_string()],
            auto_sync: true,
            api_key: "T".to_string(),
            extra: Map::new(),
        }
    }

    #[test]
    fn test_load_missing_file_reports_and_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        let (config, error) = load_or_default(&path);
        assert_eq!(config, Configuration::default());
        assert!(matches!(error, Some(ConfigError::Missing(_))));
    }

    #[test]
    fn test_load_malformed_file_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "{ not json").unwrap();

        let (config, error) = load_or_default(&path);
        assert_eq!(config, Configuration::default());
        assert!(matches!(error, Some(ConfigError::Parse { .. })));

        std::fs::write(&path, r#"{"auto_sync": "yes"}"#).unwrap();
        let (_, error) = load_or_default(&path);
        assert!(matches!(error, Some(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_load_partial_document_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, r#"{"auto_sync": true}"#).unwrap();

        let config = load(&path).unwrap();
        assert!(config.auto_sync);
        assert_eq!(config.selected_albums, vec![DEFAULT_ALBUM.to_string()]);
        assert_eq!(config.api_key, "");
        assert_eq!(config.local_folder, default_local_folder());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let mut with_extra = sample();
        with_extra
            .extra
            .insert("theme".to_string(), json!({"dark": true}));

        let cases = vec![
            Configuration::default(),
            sample(),
            Configuration {
                selected_albums: vec![],
                api_key: String::new(),
                auto_sync: false,
                ..sample()
            },
            Configuration {
                selected_albums: vec!["Ünïcode 🌄".to_string(), "Pets".to_string()],
                local_folder: PathBuf::from("/home/user/Photo Sync"),
                ..sample()
            },
            with_extra,
        ];

        for config in cases {
            write_document(&path, &config).unwrap();
            assert_eq!(load(&path).unwrap(), config);
        }
    }

    #[test]
    fn test_interrupted_write_leaves_previous_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        write_document(&path, &sample()).unwrap();

        // A writer that dies before the rename only leaves a stray temp file.
        let next = Configuration {
            api_key: "NEW".to_string(),
            ..sample()
        };
        let body = serde_json::to_vec_pretty(&next).unwrap();
        let mut tmp = NamedTempFile::new_in(dir.path()).unwrap();
        tmp.write_all(&body[..body.len() / 2]).unwrap();
        let (_file, stray) = tmp.keep().unwrap();

        assert_eq!(load(&path).unwrap(), sample());
        assert!(stray.exists());
    }

    #[test]
    fn test_update_persists_and_preserves_unknown_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            r#"{"local_folder":"/tmp/x","selected_albums":["A"],"auto_sync":true,"api_key":"T","window":{"w":600}}"#,
        )
        .unwrap();

        let store = ConfigStore::open(path.clone());
        let patch = ConfigPatch {
            selected_albums: Some(vec!["B".to_string()]),
            api_key: None,
        };
        let updated = store.update(|c| patch.apply(c));

        assert_eq!(updated.selected_albums, vec!["B".to_string()]);
        assert_eq!(updated.local_folder, PathBuf::from("/tmp/x"));
        assert!(updated.auto_sync);

        let on_disk: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk["window"], json!({"w": 600}));
        assert_eq!(on_disk["selected_albums"], json!(["B"]));
        assert_eq!(on_disk["api_key"], json!("T"));
    }

    #[test]
    fn test_update_deduplicates_selection() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path().join(CONFIG_FILE_NAME), sample());

        let updated = store.update(|c| {
            c.selected_albums = vec!["A".into(), "B".into(), "A".into()];
        });
        assert_eq!(updated.selected_albums, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(ConfigStore::new(
            dir.path().join(CONFIG_FILE_NAME),
            Configuration {
                selected_albums: vec![],
                ..sample()
            },
        ));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store.update(|c| c.selected_albums.push(format!("album-{i}")));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let config = store.get();
        assert_eq!(config.selected_albums.len(), 8);
        assert_eq!(load(store.path()).unwrap(), *config);
    }

    #[test]
    fn test_failed_save_keeps_memory_authoritative() {
        let dir = TempDir::new().unwrap();
        // A directory where the file should be makes the rename fail.
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::create_dir(&path).unwrap();

        let store = ConfigStore::new(path, sample());
        let updated = store.update(|c| c.auto_sync = false);

        assert!(!updated.auto_sync);
        assert!(!store.get().auto_sync);
        assert!(store.is_dirty());
    }

    #[test]
    fn test_config_patch_ignores_other_fields() {
        let patch = ConfigPatch::from_value(json!({
            "selected_albums": ["Pets"],
            "local_folder": "/elsewhere",
            "auto_sync": false
        }))
        .unwrap();
        assert_eq!(patch.selected_albums, Some(vec!["Pets".to_string()]));
        assert_eq!(patch.api_key, None);

        let mut config = sample();
        patch.apply(&mut config);
        assert_eq!(config.local_folder, PathBuf::from("/tmp/x"));
        assert!(config.auto_sync);
    }

    #[test]
    fn test_config_patch_rejects_wrong_shapes() {
        assert!(ConfigPatch::from_value(json!(["A"])).is_err());
        assert!(ConfigPatch::from_value(json!({"selected_albums": "A"})).is_err());
        let patch = ConfigPatch::from_value(json!({"api_key": "line\nbreak"})).unwrap();
        assert!(patch.validate().is_err());
    }

    #[test]
    fn test_config_patch_accepts_opaque_api_key() {
        let patch = ConfigPatch::from_value(json!({"api_key": "Bearer key with spaces ✓"})).unwrap();
        assert!(patch.validate().is_ok());
    }

    #[test]
    fn test_open_with_missing_file_overrides_defaults_in_memory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        let store = ConfigStore::open_with(path.clone(), |c| c.auto_sync = true);
        assert!(store.get().auto_sync);
        assert_eq!(store.get().selected_albums, Configuration::default().selected_albums);
        assert!(!path.exists());

        std::fs::write(&path, "{ not json").unwrap();
        let store = ConfigStore::open_with(path.clone(), |c| c.auto_sync = true);
        assert!(store.get().auto_sync);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn test_sync_ready_guard() {
        assert!(sample().is_sync_ready());
        assert!(!Configuration { auto_sync: false, ..sample() }.is_sync_ready());
        assert!(!Configuration { api_key: "  ".into(), ..sample() }.is_sync_ready());
        assert!(!Configuration { local_folder: PathBuf::new(), ..sample() }.is_sync_ready());
    }
}
