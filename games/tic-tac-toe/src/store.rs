//! Persists the game as a flat JSON object, e.g. `{"CurrPlayer":"O","Grid0":"X",...}`.

use backbone_lib::GameStore;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Keeps the values in memory and rewrites the whole file on every change.
pub struct JsonFileStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl JsonFileStore {
    /// Loads the file. A missing or unreadable file starts out empty, the problem gets logged.
    pub fn open(path: impl AsRef<Path>) -> JsonFileStore {
        let path = path.as_ref().to_path_buf();
        let values = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|err| {
                tracing::error!(?err, ?path, "Stored game is unreadable, starting fresh.");
                BTreeMap::new()
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                tracing::error!(?err, ?path, "Reading the stored game failed.");
                BTreeMap::new()
            }
        };
        JsonFileStore { path, values }
    }

    fn write(&self) {
        let result = serde_json::to_string_pretty(&self.values)
            .map_err(std::io::Error::other)
            .and_then(|content| std::fs::write(&self.path, content));
        if let Err(err) = result {
            tracing::error!(?err, path = ?self.path, "Storing the game failed.");
        }
    }
}

impl GameStore for JsonFileStore {
    fn get(&self, key: &str, default: &str) -> String {
        self.values
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    fn set(&mut self, key: &str, value: &str) {
        if self.values.get(key).map(String::as_str) == Some(value) {
            return;
        }
        self.values.insert(key.to_string(), value.to_string());
        self.write();
    }
}
