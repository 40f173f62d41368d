//! Filesystem abstraction used by every store.
//!
//! Stores never write in place: [`FileSystem::write_atomic`] either replaces
//! the whole file or leaves the previous content untouched, so readers see the
//! old complete generation or the new one.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::errors::{PkgStateError, PkgStateResult};

pub trait FileSystem: Send + Sync {
    fn exists(&self, path: &Path) -> bool;
    fn is_file(&self, path: &Path) -> bool;
    fn is_directory(&self, path: &Path) -> bool;
    fn read_to_string(&self, path: &Path) -> PkgStateResult<String>;
    fn read(&self, path: &Path) -> PkgStateResult<Vec<u8>>;
    /// Replace the content of `path`, creating parent directories as needed.
    fn write_atomic(&self, path: &Path, contents: &[u8]) -> PkgStateResult<()>;
    fn create_dir_all(&self, path: &Path) -> PkgStateResult<()>;
    fn remove_file(&self, path: &Path) -> PkgStateResult<()>;

    /// Read a file that may legitimately be absent.
    fn read_optional(&self, path: &Path) -> PkgStateResult<Option<String>> {
        if !self.exists(path) {
            return Ok(None);
        }
        if self.is_directory(path) {
            return Err(PkgStateError::IsADirectory(path.to_path_buf()));
        }
        self.read_to_string(path).map(Some)
    }
}

impl<T: FileSystem + ?Sized> FileSystem for Arc<T> {
    fn exists(&self, path: &Path) -> bool {
        (**self).exists(path)
    }
    fn is_file(&self, path: &Path) -> bool {
        (**self).is_file(path)
    }
    fn is_directory(&self, path: &Path) -> bool {
        (**self).is_directory(path)
    }
    fn read_to_string(&self, path: &Path) -> PkgStateResult<String> {
        (**self).read_to_string(path)
    }
    fn read(&self, path: &Path) -> PkgStateResult<Vec<u8>> {
        (**self).read(path)
    }
    fn write_atomic(&self, path: &Path, contents: &[u8]) -> PkgStateResult<()> {
        (**self).write_atomic(path, contents)
    }
    fn create_dir_all(&self, path: &Path) -> PkgStateResult<()> {
        (**self).create_dir_all(path)
    }
    fn remove_file(&self, path: &Path) -> PkgStateResult<()> {
        (**self).remove_file(path)
    }
}

pub type SharedFileSystem = Arc<dyn FileSystem>;

// ---------------------------------------------------------------------------
// LocalFileSystem
// ---------------------------------------------------------------------------

/// The real filesystem. Atomic writes go through a temporary file in the
/// destination directory followed by a rename.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalFileSystem;

impl FileSystem for LocalFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_directory(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn read_to_string(&self, path: &Path) -> PkgStateResult<String> {
        std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PkgStateError::FileNotFound(path.to_path_buf()),
            _ => PkgStateError::Io(e),
        })
    }

    fn read(&self, path: &Path) -> PkgStateResult<Vec<u8>> {
        std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PkgStateError::FileNotFound(path.to_path_buf()),
            _ => PkgStateError::Io(e),
        })
    }

    fn write_atomic(&self, path: &Path, contents: &[u8]) -> PkgStateResult<()> {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
        tmp.write_all(contents)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| PkgStateError::Io(e.error))?;
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> PkgStateResult<()> {
        std::fs::create_dir_all(path)?;
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> PkgStateResult<()> {
        std::fs::remove_file(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PkgStateError::FileNotFound(path.to_path_buf()),
            _ => PkgStateError::Io(e),
        })
    }
}

// ---------------------------------------------------------------------------
// InMemoryFileSystem
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryTree {
    files: BTreeMap<PathBuf, Vec<u8>>,
    dirs: BTreeSet<PathBuf>,
}

impl MemoryTree {
    fn ensure_dirs(&mut self, path: &Path) -> PkgStateResult<()> {
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() {
                continue;
            }
            if self.files.contains_key(ancestor) {
                return Err(PkgStateError::NotADirectory(ancestor.to_path_buf()));
            }
        }
        for ancestor in path.ancestors() {
            if !ancestor.as_os_str().is_empty() {
                self.dirs.insert(ancestor.to_path_buf());
            }
        }
        Ok(())
    }
}

/// Process-local filesystem for tests and dry runs. Whole-file writes are
/// swapped under a lock, which gives the same all-or-nothing visibility as
/// the rename on disk.
#[derive(Default)]
pub struct InMemoryFileSystem {
    tree: Mutex<MemoryTree>,
}

impl InMemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file, creating its parent directories.
    pub fn with_file(self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> Self {
        {
            let mut tree = self.tree.lock();
            let path = normalize(path.as_ref());
            if let Some(parent) = path.parent() {
                let _ = tree.ensure_dirs(parent);
            }
            tree.files.insert(path, contents.as_ref().to_vec());
        }
        self
    }

    pub fn read_bytes(&self, path: &Path) -> Option<Vec<u8>> {
        self.tree.lock().files.get(&normalize(path)).cloned()
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

impl FileSystem for InMemoryFileSystem {
    fn exists(&self, path: &Path) -> bool {
        let path = normalize(path);
        let tree = self.tree.lock();
        tree.files.contains_key(&path) || tree.dirs.contains(&path)
    }

    fn is_file(&self, path: &Path) -> bool {
        self.tree.lock().files.contains_key(&normalize(path))
    }

    fn is_directory(&self, path: &Path) -> bool {
        self.tree.lock().dirs.contains(&normalize(path))
    }

    fn read_to_string(&self, path: &Path) -> PkgStateResult<String> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes).map_err(|e| PkgStateError::malformed(normalize(path), e))
    }

    fn read(&self, path: &Path) -> PkgStateResult<Vec<u8>> {
        let path = normalize(path);
        let tree = self.tree.lock();
        if tree.dirs.contains(&path) {
            return Err(PkgStateError::IsADirectory(path));
        }
        tree.files
            .get(&path)
            .cloned()
            .ok_or(PkgStateError::FileNotFound(path))
    }

    fn write_atomic(&self, path: &Path, contents: &[u8]) -> PkgStateResult<()> {
        let path = normalize(path);
        let mut tree = self.tree.lock();
        if tree.dirs.contains(&path) {
            return Err(PkgStateError::IsADirectory(path));
        }
        if let Some(parent) = path.parent() {
            tree.ensure_dirs(parent)?;
        }
        tree.files.insert(path, contents.to_vec());
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> PkgStateResult<()> {
        self.tree.lock().ensure_dirs(&normalize(path))
    }

    fn remove_file(&self, path: &Path) -> PkgStateResult<()> {
        let path = normalize(path);
        match self.tree.lock().files.remove(&path) {
            Some(_) => Ok(()),
            None => Err(PkgStateError::FileNotFound(path)),
        }
    }
}
