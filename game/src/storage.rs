//! Durable key-value storage for progression documents.
//!
//! Every persisted document is a versioned JSON blob under a stable key. Loading never fails:
//! missing, unreadable and corrupted documents all recover to defaults, but the returned
//! [`LoadStatus`] keeps them apart for diagnostics.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

pub const DEFAULT_NAMESPACE: &str = "default";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage I/O failed for `{key}`: {source}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode `{key}`: {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("storage backend unavailable: {0}")]
    Backend(String),
}

/// Read/write contract for the persistent store. Values are opaque strings keyed by stable ids.
pub trait KeyValueStore {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn write(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Box<S> {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).read(key)
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).write(key, value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub dir: PathBuf,
    pub namespace: String,
}

impl StorageConfig {
    pub fn new(dir: impl Into<PathBuf>, namespace: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            namespace: namespace.into(),
        }
    }

    pub fn from_env() -> Self {
        let namespace = std::env::var("BLOCKPUZZLE_NAMESPACE")
            .ok()
            .filter(|ns| !ns.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

        if let Some(explicit) = std::env::var_os("BLOCKPUZZLE_DATA_DIR") {
            return Self::new(PathBuf::from(explicit), namespace);
        }

        let dir = std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var_os("HOME").map(|home| {
                    let mut p = PathBuf::from(home);
                    p.push(".local");
                    p.push("share");
                    p
                })
            })
            .map(|mut base| {
                base.push("blockpuzzle");
                base
            })
            .unwrap_or_else(|| PathBuf::from("blockpuzzle-data"));

        Self::new(dir, namespace)
    }

    pub fn root(&self) -> PathBuf {
        self.dir.join(&self.namespace)
    }
}

/// One JSON file per key under `<dir>/<namespace>/`.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            root: config.root(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let io_err = |source| StorageError::Io {
            key: key.to_string(),
            source,
        };
        fs::create_dir_all(&self.root).map_err(io_err)?;
        atomic_write(&self.path_for(key), value.as_bytes()).map_err(io_err)
    }
}

fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    match fs::rename(&tmp, path) {
        Ok(()) => Ok(()),
        Err(_) => {
            // Rename over an existing file can fail on Windows.
            fs::copy(&tmp, path)?;
            let _ = fs::remove_file(&tmp);
            Ok(())
        }
    }
}

/// In-process store. `fail_writes` simulates a full disk or revoked quota.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
    pub fail_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, key: &str, value: impl Into<String>) -> Self {
        self.entries.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }
}

impl KeyValueStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::Backend(format!("write to `{key}` rejected")));
        }
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// A versioned persisted document.
///
/// `version` must be deserialized with a field-level `#[serde(default)]` so that documents
/// written before versioning was introduced read back as version 0 and go through
/// [`Document::migrate`].
pub trait Document: Serialize + DeserializeOwned + Default {
    const KEY: &'static str;
    const VERSION: u32;

    fn version(&self) -> u32;

    /// Upgrade a document written by an older schema. Must leave `version == Self::VERSION`.
    fn migrate(self, from: u32) -> Self;

    /// Recompute derived fields after loading. Must never lower a stored counter.
    fn sanitized(self) -> Self {
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    /// Nothing stored under the key yet.
    Fresh,
    Loaded,
    Migrated { from: u32 },
    /// Stored bytes did not parse; defaults were substituted.
    Corrupt { reason: String },
    /// The backend failed to read; defaults were substituted.
    Unreadable { reason: String },
}

impl LoadStatus {
    pub fn recovered_to_default(&self) -> bool {
        matches!(
            self,
            LoadStatus::Fresh | LoadStatus::Corrupt { .. } | LoadStatus::Unreadable { .. }
        )
    }
}

pub fn load_document<T: Document>(store: &impl KeyValueStore) -> (T, LoadStatus) {
    let text = match store.read(T::KEY) {
        Ok(Some(text)) => text,
        Ok(None) => {
            tracing::debug!(key = T::KEY, "no stored document, starting fresh");
            return (T::default(), LoadStatus::Fresh);
        }
        Err(e) => {
            tracing::warn!(key = T::KEY, "failed to read stored document: {e}");
            return (
                T::default(),
                LoadStatus::Unreadable {
                    reason: e.to_string(),
                },
            );
        }
    };

    let doc = match serde_json::from_str::<T>(&text) {
        Ok(doc) => doc,
        Err(e) => {
            tracing::warn!(key = T::KEY, "stored document is corrupt, using defaults: {e}");
            return (
                T::default(),
                LoadStatus::Corrupt {
                    reason: e.to_string(),
                },
            );
        }
    };

    let version = doc.version();
    if version < T::VERSION {
        tracing::info!(key = T::KEY, from = version, to = T::VERSION, "migrating document");
        return (
            doc.migrate(version).sanitized(),
            LoadStatus::Migrated { from: version },
        );
    }
    if version > T::VERSION {
        tracing::warn!(
            key = T::KEY,
            version,
            supported = T::VERSION,
            "document written by a newer schema, loading known fields only"
        );
    }
    (doc.sanitized(), LoadStatus::Loaded)
}

pub fn save_document<T: Document>(
    store: &mut impl KeyValueStore,
    doc: &T,
) -> Result<(), StorageError> {
    let text = serde_json::to_string_pretty(doc).map_err(|source| StorageError::Serialize {
        key: T::KEY.to_string(),
        source,
    })?;
    store.write(T::KEY, &text)
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Counter {
        #[serde(default)]
        version: u32,
        #[serde(default)]
        hits: u64,
        #[serde(default)]
        doubled: u64,
    }

    impl Default for Counter {
        fn default() -> Self {
            Self {
                version: Self::VERSION,
                hits: 0,
                doubled: 0,
            }
        }
    }

    impl Document for Counter {
        const KEY: &'static str = "counter";
        const VERSION: u32 = 1;

        fn version(&self) -> u32 {
            self.version
        }

        fn migrate(mut self, _from: u32) -> Self {
            self.version = Self::VERSION;
            self
        }

        fn sanitized(mut self) -> Self {
            self.doubled = self.hits * 2;
            self
        }
    }

    #[test]
    fn missing_and_corrupt_documents_are_distinguishable() {
        let store = MemoryStore::new();
        let (doc, status) = load_document::<Counter>(&store);
        assert_eq!(doc, Counter::default());
        assert_eq!(status, LoadStatus::Fresh);

        let store = MemoryStore::new().with_entry("counter", "{not json");
        let (doc, status) = load_document::<Counter>(&store);
        assert_eq!(doc, Counter::default());
        assert!(matches!(status, LoadStatus::Corrupt { .. }));
        assert!(status.recovered_to_default());
    }

    #[test]
    fn unversioned_documents_are_migrated_and_sanitized() {
        let store = MemoryStore::new().with_entry("counter", r#"{"hits":4}"#);
        let (doc, status) = load_document::<Counter>(&store);
        assert_eq!(status, LoadStatus::Migrated { from: 0 });
        assert_eq!(doc.version, 1);
        assert_eq!(doc.hits, 4);
        assert_eq!(doc.doubled, 8);
    }

    #[test]
    fn failed_writes_surface_as_errors() {
        let mut store = MemoryStore::new();
        store.fail_writes = true;
        let err = save_document(&mut store, &Counter::default()).unwrap_err();
        assert!(matches!(err, StorageError::Backend(_)));
        assert!(store.get("counter").is_none());
    }

    #[test]
    fn file_store_round_trips_under_namespace() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = StorageConfig::new(dir.path(), "alice");
        let mut store = FileStore::new(&config);

        assert!(store.read("counter").expect("read").is_none());

        let doc = Counter {
            hits: 3,
            ..Counter::default()
        };
        save_document(&mut store, &doc).expect("save");
        assert!(dir.path().join("alice").join("counter.json").exists());

        let (loaded, status) = load_document::<Counter>(&store);
        assert_eq!(status, LoadStatus::Loaded);
        assert_eq!(loaded.hits, 3);
        assert_eq!(loaded.doubled, 6);
    }
}
