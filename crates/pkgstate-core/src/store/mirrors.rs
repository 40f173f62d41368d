//! Dependency mirrors: redirect a declared source location to a substitute.
//!
//! Two files exist per workspace, a shared (user-level) one and a local
//! (workspace-level) one. [`LayeredMirrors`] reads through them: a non-empty
//! local table hides the shared table completely.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{decode, encode, parse_document};
use crate::errors::{PkgStateError, PkgStateResult};
use crate::fs::{FileSystem, SharedFileSystem};
use crate::models::MIRRORS_SCHEMA_VERSION;

// ---------------------------------------------------------------------------
// MirrorMap
// ---------------------------------------------------------------------------

/// Bidirectional original ↔ mirror table. Both sides are unique.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MirrorMap {
    by_original: BTreeMap<String, String>,
    by_mirror: HashMap<String, String>,
}

impl MirrorMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirror configured for `original`.
    pub fn get(&self, original: &str) -> Option<&str> {
        self.by_original.get(original).map(String::as_str)
    }

    /// Original location served by `mirror`.
    pub fn original_for(&self, mirror: &str) -> Option<&str> {
        self.by_mirror.get(mirror).map(String::as_str)
    }

    /// The location to fetch from: the mirror if one is set, else `location`.
    pub fn effective<'a>(&'a self, location: &'a str) -> &'a str {
        self.get(location).unwrap_or(location)
    }

    /// Map `original` to `mirror`, replacing any previous mirror of
    /// `original` and any other original that `mirror` used to serve.
    pub fn set(&mut self, mirror: impl Into<String>, original: impl Into<String>) {
        let mirror = mirror.into();
        let original = original.into();
        if let Some(previous_original) = self.by_mirror.remove(&mirror) {
            self.by_original.remove(&previous_original);
        }
        if let Some(previous_mirror) = self.by_original.insert(original.clone(), mirror.clone()) {
            self.by_mirror.remove(&previous_mirror);
        }
        self.by_mirror.insert(mirror, original);
    }

    /// Remove the pair containing `key`, matched as an original first and
    /// then as a mirror.
    pub fn unset(&mut self, key: &str) -> PkgStateResult<()> {
        if let Some(mirror) = self.by_original.remove(key) {
            self.by_mirror.remove(&mirror);
            return Ok(());
        }
        if let Some(original) = self.by_mirror.remove(key) {
            self.by_original.remove(&original);
            return Ok(());
        }
        Err(PkgStateError::MirrorNotFound(key.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.by_original.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_original.len()
    }

    /// `(original, mirror)` pairs ordered by original.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.by_original
            .iter()
            .map(|(o, m)| (o.as_str(), m.as_str()))
    }
}

#[derive(Serialize, Deserialize)]
struct StoredMirror {
    original: String,
    mirror: String,
}

// ---------------------------------------------------------------------------
// MirrorsFile
// ---------------------------------------------------------------------------

/// One persisted mirror table.
pub struct MirrorsFile {
    fs: SharedFileSystem,
    path: PathBuf,
    delete_when_empty: bool,
}

impl MirrorsFile {
    pub fn new(fs: SharedFileSystem, path: impl Into<PathBuf>, delete_when_empty: bool) -> Self {
        Self {
            fs,
            path: path.into(),
            delete_when_empty,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current content; a missing file is an empty table.
    pub fn load(&self) -> PkgStateResult<MirrorMap> {
        let Some(text) = self.fs.read_optional(&self.path)? else {
            return Ok(MirrorMap::new());
        };
        let doc = parse_document(&self.path, &text)?;
        match doc.version {
            Some(MIRRORS_SCHEMA_VERSION) => {
                let stored: Vec<StoredMirror> = decode(&self.path, doc.object)?;
                let mut map = MirrorMap::new();
                for entry in stored {
                    map.set(entry.mirror, entry.original);
                }
                debug!(path = %self.path.display(), entries = map.len(), "loaded mirrors");
                Ok(map)
            }
            Some(found) => Err(PkgStateError::UnsupportedSchemaVersion {
                document: "mirrors",
                found,
            }),
            None => Err(PkgStateError::malformed(&self.path, "missing 'version'")),
        }
    }

    /// Load, mutate, and persist. A failing mutation writes nothing.
    pub fn apply<F>(&self, mutation: F) -> PkgStateResult<MirrorMap>
    where
        F: FnOnce(&mut MirrorMap) -> PkgStateResult<()>,
    {
        let current = self.load()?;
        let mut updated = current.clone();
        mutation(&mut updated)?;
        if updated != current {
            self.persist(&updated)?;
        }
        Ok(updated)
    }

    pub fn set(&self, mirror: &str, original: &str) -> PkgStateResult<MirrorMap> {
        self.apply(|map| {
            map.set(mirror, original);
            Ok(())
        })
    }

    pub fn unset(&self, original_or_mirror: &str) -> PkgStateResult<MirrorMap> {
        self.apply(|map| map.unset(original_or_mirror))
    }

    fn persist(&self, map: &MirrorMap) -> PkgStateResult<()> {
        if map.is_empty() && self.delete_when_empty {
            if self.fs.exists(&self.path) {
                self.fs.remove_file(&self.path)?;
                debug!(path = %self.path.display(), "removed empty mirrors file");
            }
            return Ok(());
        }
        let stored: Vec<StoredMirror> = map
            .iter()
            .map(|(original, mirror)| StoredMirror {
                original: original.to_string(),
                mirror: mirror.to_string(),
            })
            .collect();
        let text = encode(MIRRORS_SCHEMA_VERSION, &stored)?;
        self.fs.write_atomic(&self.path, text.as_bytes())?;
        debug!(path = %self.path.display(), entries = map.len(), "saved mirrors");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// LayeredMirrors
// ---------------------------------------------------------------------------

/// Local and shared mirror tables seen as one configuration.
pub struct LayeredMirrors {
    local: MirrorsFile,
    shared: Option<MirrorsFile>,
    local_map: MirrorMap,
    shared_map: MirrorMap,
}

impl LayeredMirrors {
    pub fn open(local: MirrorsFile, shared: Option<MirrorsFile>) -> PkgStateResult<Self> {
        let local_map = local.load()?;
        let shared_map = match &shared {
            Some(file) => file.load()?,
            None => MirrorMap::new(),
        };
        Ok(Self {
            local,
            shared,
            local_map,
            shared_map,
        })
    }

    /// The layer lookups are answered from: the local table when it has any
    /// entry, otherwise the shared table.
    pub fn effective_layer(&self) -> &MirrorMap {
        if !self.local_map.is_empty() {
            &self.local_map
        } else {
            &self.shared_map
        }
    }

    pub fn get(&self, original: &str) -> Option<&str> {
        self.effective_layer().get(original)
    }

    pub fn original_for(&self, mirror: &str) -> Option<&str> {
        self.effective_layer().original_for(mirror)
    }

    pub fn effective<'a>(&'a self, location: &'a str) -> &'a str {
        self.effective_layer().effective(location)
    }

    pub fn local(&self) -> &MirrorMap {
        &self.local_map
    }

    pub fn shared(&self) -> &MirrorMap {
        &self.shared_map
    }

    pub fn apply_local<F>(&mut self, mutation: F) -> PkgStateResult<()>
    where
        F: FnOnce(&mut MirrorMap) -> PkgStateResult<()>,
    {
        self.local_map = self.local.apply(mutation)?;
        Ok(())
    }

    pub fn apply_shared<F>(&mut self, mutation: F) -> PkgStateResult<()>
    where
        F: FnOnce(&mut MirrorMap) -> PkgStateResult<()>,
    {
        let shared = self
            .shared
            .as_ref()
            .ok_or_else(|| PkgStateError::Config("no shared mirrors file configured".into()))?;
        self.shared_map = shared.apply(mutation)?;
        Ok(())
    }

    /// Re-read both files from disk.
    pub fn reload(&mut self) -> PkgStateResult<()> {
        let local_map = self.local.load()?;
        let shared_map = match &self.shared {
            Some(file) => file.load()?,
            None => MirrorMap::new(),
        };
        self.local_map = local_map;
        self.shared_map = shared_map;
        Ok(())
    }
}
