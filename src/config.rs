//! Persistent JSON configuration: output directory, record interval, watch-list.
//!
//! The document is kept as an untyped tree so keys this crate does not know
//! about (the `ui` section, anything a newer version wrote) survive a
//! load/save cycle.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::model::WatchList;

pub const DEFAULT_CONFIG_FILE: &str = "config.json";
pub const DEFAULT_OUTPUT_DIR: &str = "system_performance_record";
pub const DEFAULT_RECORD_INTERVAL: u64 = 5;

pub fn default_document() -> Value {
    json!({
        "output_dir": DEFAULT_OUTPUT_DIR,
        "record_interval": DEFAULT_RECORD_INTERVAL,
        "monitored_processes": [],
        "ui": {
            "window_width": 1200,
            "window_height": 800
        }
    })
}

/// Recursively fill keys missing from `current` with values from `defaults`.
/// Keys present in `current` win; nested objects merge key by key.
pub fn merge_defaults(defaults: &Value, current: &Value) -> Value {
    match (defaults, current) {
        (Value::Object(d), Value::Object(c)) => {
            let mut out = d.clone();
            for (key, value) in c {
                let merged = match d.get(key) {
                    Some(dv) if dv.is_object() && value.is_object() => merge_defaults(dv, value),
                    _ => value.clone(),
                };
                out.insert(key.clone(), merged);
            }
            Value::Object(out)
        }
        _ => current.clone(),
    }
}

pub struct ConfigStore {
    path: PathBuf,
    doc: Value,
}

impl ConfigStore {
    /// Load from `path` (or `config.json` in the working directory).
    ///
    /// A missing file is created with defaults immediately. A file that
    /// cannot be parsed is replaced by defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        if !path.exists() {
            debug!(path = %path.display(), "config file missing, writing defaults");
            let store = Self { path, doc: default_document() };
            store.save()?;
            return Ok(store);
        }

        let text = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        match serde_json::from_str::<Value>(&text) {
            Ok(doc) if doc.is_object() => {
                let mut store = Self {
                    doc: merge_defaults(&default_document(), &doc),
                    path,
                };
                let list = store.monitored_processes();
                store.set_monitored_processes(&list);
                Ok(store)
            }
            Ok(_) | Err(_) => {
                warn!(path = %path.display(), "config file is not a valid JSON object, using defaults");
                let store = Self { path, doc: default_document() };
                store.save()?;
                Ok(store)
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document(&self) -> &Value {
        &self.doc
    }

    /// Look up a dotted key such as `ui.window_width`. Returns `None` if any
    /// segment is missing or a non-object is traversed.
    pub fn get_value(&self, key: &str) -> Option<&Value> {
        key.split('.')
            .try_fold(&self.doc, |node, segment| node.as_object()?.get(segment))
    }

    /// Typed dotted-key lookup with a caller-supplied default.
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get_value(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or(default)
    }

    /// Set a dotted key, creating intermediate objects as needed. A
    /// non-object met on the way is replaced by an object.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        let mut segments: Vec<&str> = key.split('.').collect();
        let Some(last) = segments.pop() else { return };

        let mut node = &mut self.doc;
        for segment in segments {
            node = ensure_object(node)
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        ensure_object(node).insert(last.to_string(), value.into());
    }

    /// Write to `<path>.tmp` and rename over the target so a crash mid-write
    /// leaves either the old or the new file.
    pub fn save(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let text = serde_json::to_string_pretty(&self.doc)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, text).map_err(|source| ConfigError::Write {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| ConfigError::Write {
            path: self.path.clone(),
            source,
        })
    }

    // ── typed accessors ──────────────────────────────────────────────────

    pub fn output_dir(&self) -> String {
        self.get("output_dir", DEFAULT_OUTPUT_DIR.to_string())
    }

    pub fn set_output_dir(&mut self, dir: &str) {
        self.set("output_dir", dir);
    }

    /// Seconds between ticks, never below 1.
    pub fn record_interval(&self) -> u64 {
        self.get("record_interval", DEFAULT_RECORD_INTERVAL).max(1)
    }

    pub fn set_record_interval(&mut self, secs: u64) {
        self.set("record_interval", secs.max(1));
    }

    /// The watch-list, de-duplicated case-insensitively (first casing wins).
    pub fn monitored_processes(&self) -> WatchList {
        WatchList::from_names(self.get::<Vec<String>>("monitored_processes", Vec::new()))
    }

    pub fn set_monitored_processes(&mut self, list: &WatchList) {
        self.set("monitored_processes", list.to_vec());
    }
}

/// The node as an object, replacing any non-object value with `{}`.
fn ensure_object(node: &mut Value) -> &mut Map<String, Value> {
    match node {
        Value::Object(map) => map,
        other => {
            *other = Value::Object(Map::new());
            ensure_object(other)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config(contents: Option<&str>) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("config.json");
        if let Some(c) = contents {
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, c).unwrap();
        }
        (dir, path)
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let (_dir, path) = temp_config(None);
        let cfg = ConfigStore::load(Some(&path)).unwrap();
        assert!(path.exists());
        assert_eq!(cfg.record_interval(), DEFAULT_RECORD_INTERVAL);
        assert_eq!(cfg.output_dir(), DEFAULT_OUTPUT_DIR);
        assert!(cfg.monitored_processes().is_empty());
    }

    #[test]
    fn merge_keeps_existing_and_fills_missing() {
        let (_dir, path) = temp_config(Some(
            r#"{"record_interval": 2, "ui": {"window_width": 640}, "custom": {"k": true}}"#,
        ));
        let cfg = ConfigStore::load(Some(&path)).unwrap();
        assert_eq!(cfg.record_interval(), 2);
        assert_eq!(cfg.get("ui.window_width", 0), 640);
        assert_eq!(cfg.get("ui.window_height", 0), 800);
        assert_eq!(cfg.output_dir(), DEFAULT_OUTPUT_DIR);
        assert!(cfg.get("custom.k", false));
    }

    #[test]
    fn unknown_keys_survive_save() {
        let (_dir, path) = temp_config(Some(r#"{"future_key": [1, 2, 3]}"#));
        let cfg = ConfigStore::load(Some(&path)).unwrap();
        cfg.save().unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let doc: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(doc["future_key"], json!([1, 2, 3]));
        assert_eq!(doc["record_interval"], json!(DEFAULT_RECORD_INTERVAL));
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let (_dir, path) = temp_config(Some("{ this is not json"));
        let cfg = ConfigStore::load(Some(&path)).unwrap();
        assert_eq!(cfg.record_interval(), DEFAULT_RECORD_INTERVAL);
        let reread: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(reread.is_object());
    }

    #[test]
    fn dotted_get_returns_default_for_missing_levels() {
        let (_dir, path) = temp_config(None);
        let cfg = ConfigStore::load(Some(&path)).unwrap();
        assert_eq!(cfg.get("ui.missing", 7), 7);
        assert_eq!(cfg.get("nope.deeper.still", "d".to_string()), "d");
        assert_eq!(cfg.get("output_dir.child", 1), 1);
    }

    #[test]
    fn dotted_set_creates_intermediate_objects() {
        let (_dir, path) = temp_config(None);
        let mut cfg = ConfigStore::load(Some(&path)).unwrap();
        cfg.set("a.b.c", 5);
        assert_eq!(cfg.get("a.b.c", 0), 5);
        cfg.set("output_dir.x", 1);
        assert_eq!(cfg.get("output_dir.x", 0), 1);
    }

    #[test]
    fn save_is_atomic_and_leaves_no_temp_file() {
        let (_dir, path) = temp_config(None);
        let mut cfg = ConfigStore::load(Some(&path)).unwrap();
        cfg.set_record_interval(9);
        cfg.save().unwrap();
        assert!(!path.with_extension("json.tmp").exists());
        let cfg = ConfigStore::load(Some(&path)).unwrap();
        assert_eq!(cfg.record_interval(), 9);
    }

    #[test]
    fn watch_list_is_deduplicated_on_load() {
        let (_dir, path) = temp_config(Some(
            r#"{"monitored_processes": ["Chrome", "sshd", "chrome", "SSHD", "bash"]}"#,
        ));
        let cfg = ConfigStore::load(Some(&path)).unwrap();
        assert_eq!(cfg.monitored_processes().to_vec(), vec!["Chrome", "sshd", "bash"]);
    }

    #[test]
    fn stored_watch_list_is_normalised_on_load() {
        let (_dir, path) = temp_config(Some(
            r#"{"monitored_processes": ["Chrome", " ", "chrome", "bash"]}"#,
        ));
        let cfg = ConfigStore::load(Some(&path)).unwrap();
        assert_eq!(cfg.document()["monitored_processes"], json!(["Chrome", "bash"]));
        cfg.save().unwrap();
        let doc: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc["monitored_processes"], json!(["Chrome", "bash"]));
    }

    #[test]
    fn watch_list_roundtrips_through_file() {
        let (_dir, path) = temp_config(None);
        let mut cfg = ConfigStore::load(Some(&path)).unwrap();
        let mut list = cfg.monitored_processes();
        list.add("notepad");
        list.add("Notepad");
        cfg.set_monitored_processes(&list);
        cfg.save().unwrap();
        let cfg = ConfigStore::load(Some(&path)).unwrap();
        assert_eq!(cfg.monitored_processes().to_vec(), vec!["notepad"]);
    }

    #[test]
    fn record_interval_never_below_one() {
        let (_dir, path) = temp_config(Some(r#"{"record_interval": 0}"#));
        let cfg = ConfigStore::load(Some(&path)).unwrap();
        assert_eq!(cfg.record_interval(), 1);
    }
}
