//! Persistent configuration with change notification.
//!
//! The store is the single writer of `config.json`. Readers subscribe to a
//! watch channel and see every committed change.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tokio::sync::watch;

use archiver_core::{ConfigUpdate, Configuration};

use crate::error::ConfigError;

/// `$XDG_CONFIG_HOME/archiver/config.json`, else `~/.config/archiver/config.json`.
pub fn default_config_path() -> Option<PathBuf> {
    if let Some(dir) = std::env::var("XDG_CONFIG_HOME").ok().filter(|d| !d.is_empty()) {
        return Some(PathBuf::from(dir).join("archiver/config.json"));
    }
    let home = std::env::var("HOME").ok()?;
    Some(PathBuf::from(home).join(".config/archiver/config.json"))
}

/// Read the configuration file. A missing file yields the defaults.
pub fn read_config(path: &Path) -> Result<Configuration, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Configuration::default()),
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    if content.trim().is_empty() {
        return Ok(Configuration::default());
    }
    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Write `config` into the file, keeping any keys this program does not own.
pub fn write_config(path: &Path, config: &Configuration) -> Result<(), ConfigError> {
    let io_err = |source: std::io::Error| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };
    let parse_err = |source: serde_json::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    };

    let mut document = match std::fs::read_to_string(path) {
        Ok(content) if !content.trim().is_empty() => {
            serde_json::from_str::<serde_json::Value>(&content).map_err(parse_err)?
        }
        Ok(_) => serde_json::json!({}),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => serde_json::json!({}),
        Err(e) => return Err(io_err(e)),
    };
    if !document.is_object() {
        document = serde_json::json!({});
    }

    let owned = serde_json::to_value(config).map_err(parse_err)?;
    if let (Some(target), serde_json::Value::Object(fields)) = (document.as_object_mut(), owned) {
        // An unset directory must disappear from the file, not linger.
        target.remove("directory");
        target.extend(fields);
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let output = serde_json::to_string_pretty(&document).map_err(parse_err)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, format!("{output}\n")).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}

#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    tx: watch::Sender<Configuration>,
    /// Held across read-modify-write so concurrent updates do not lose
    /// each other's fields.
    write_lock: Mutex<()>,
}

impl ConfigStore {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let config = read_config(&path)?;
        tracing::info!(
            path = %path.display(),
            directory = ?config.directory(),
            "configuration loaded"
        );
        let (tx, _rx) = watch::channel(config);
        Ok(Self {
            path,
            tx,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> Configuration {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Configuration> {
        self.tx.subscribe()
    }

    /// Persist a partial update and notify subscribers if anything changed.
    pub fn update(&self, update: &ConfigUpdate) -> Result<Configuration, ConfigError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut next = self.get();
        if !next.apply(update) {
            return Ok(next);
        }
        write_config(&self.path, &next)?;
        self.tx.send_replace(next.clone());
        tracing::info!(directory = ?next.directory(), "configuration updated");
        Ok(next)
    }
}

// ─── Tests ────────────────────────────────────────────────────────
