//! Dedup/State store: which item ids were already acted on, per domain.
//!
//! Persisted as a JSON object `{ "<domain>": ["<id>", ...] }`. Writes go
//! through [`write_json_atomic`] (temp file + fsync + rename) so a crash never
//! leaves a truncated file behind.
//!
//! Single writer only: two processes sharing one state path race each other
//! and may lose marks. There is no cross-process lock.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::PersistenceError;

/// Read a JSON file; an absent file yields `T::default()`.
pub(crate) fn read_json_or_default<T>(path: &Path) -> Result<T, PersistenceError>
where
    T: DeserializeOwned + Default,
{
    let raw = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(T::default()),
        Err(source) => {
            return Err(PersistenceError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    if raw.trim().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(&raw).map_err(|source| PersistenceError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

/// Whole-file replace: serialize, write `<file>.tmp` next to it, fsync, rename.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistenceError> {
    let json = serde_json::to_vec_pretty(value).map_err(|source| PersistenceError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    write_bytes_atomic(path, &json).map_err(|source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let tmp = tmp_path(path);
    let mut f = fs::File::create(&tmp)?;
    f.write_all(bytes)?;
    f.sync_all()?;
    drop(f);
    fs::rename(&tmp, path)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "state".into());
    name.push(".tmp");
    path.with_file_name(name)
}

/// Durable set of previously-acted-on ids, keyed by monitoring domain.
#[derive(Debug)]
pub struct SeenStore {
    path: PathBuf,
    domains: BTreeMap<String, BTreeSet<String>>,
    dirty: bool,
}

impl SeenStore {
    /// Open the store at `path`, loading it if present (first run: empty).
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let mut store = Self {
            path: path.into(),
            domains: BTreeMap::new(),
            dirty: false,
        };
        store.load()?;
        Ok(store)
    }

    /// Replace the in-memory set with what is on disk.
    pub fn load(&mut self) -> Result<(), PersistenceError> {
        self.domains = read_json_or_default(&self.path)?;
        self.dirty = false;
        Ok(())
    }

    /// Persist if anything changed since the last load/save.
    pub fn save(&mut self) -> Result<(), PersistenceError> {
        if !self.dirty {
            return Ok(());
        }
        write_json_atomic(&self.path, &self.domains)?;
        self.dirty = false;
        tracing::debug!(target: "engine", path = %self.path.display(), total = self.total(), "seen set saved");
        Ok(())
    }

    pub fn is_seen(&self, domain: &str, id: &str) -> bool {
        self.domains
            .get(domain)
            .is_some_and(|ids| ids.contains(id))
    }

    /// Returns `true` when `id` was not yet known for `domain`.
    pub fn mark_seen(&mut self, domain: &str, id: &str) -> bool {
        let inserted = self
            .domains
            .entry(domain.to_string())
            .or_default()
            .insert(id.to_string());
        self.dirty |= inserted;
        inserted
    }

    pub fn len(&self, domain: &str) -> usize {
        self.domains.get(domain).map_or(0, BTreeSet::len)
    }

    pub fn total(&self) -> usize {
        self.domains.values().map(BTreeSet::len).sum()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
