//! Snapshot of what the workspace currently has checked out, edited, or
//! downloaded.
//!
//! In memory, dependencies and artifacts keep insertion order. On disk both
//! lists are sorted so that saving the same state twice yields identical
//! bytes.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use semver::Version;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{decode, encode, parse_document};
use crate::errors::{PkgStateError, PkgStateResult};
use crate::fs::{FileSystem, SharedFileSystem};
use crate::models::{
    LocationKind, PackageIdentity, PackageReference, RepositoryLocation, STATE_SCHEMA_VERSION,
};

/// Oldest snapshot schema that can still be read.
const LEGACY_STATE_SCHEMA_VERSION: i64 = 4;

// ---------------------------------------------------------------------------
// Managed dependencies and artifacts
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DependencyState {
    /// A source-control checkout at `revision`.
    Checkout {
        revision: String,
        version: Option<Version>,
        branch: Option<String>,
    },
    /// Put into edit mode; `path` is set when the edit lives outside the
    /// default location.
    Edited { path: Option<PathBuf> },
    /// A package used straight from a local directory.
    FileSystem { path: PathBuf },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagedDependency {
    pub package: PackageReference,
    pub state: DependencyState,
    pub based_on: Option<PackageIdentity>,
}

impl ManagedDependency {
    pub fn new(package: PackageReference, state: DependencyState) -> Self {
        Self {
            package,
            state,
            based_on: None,
        }
    }

    pub fn checkout(
        package: PackageReference,
        revision: impl Into<String>,
        version: Option<Version>,
    ) -> Self {
        Self::new(
            package,
            DependencyState::Checkout {
                revision: revision.into(),
                version,
                branch: None,
            },
        )
    }

    pub fn identity(&self) -> &PackageIdentity {
        &self.package.identity
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArtifactSource {
    Remote { url: String, checksum: String },
    Local { checksum: Option<String> },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagedArtifact {
    pub package: PackageReference,
    pub target_name: String,
    pub source: ArtifactSource,
    pub path: PathBuf,
}

impl ManagedArtifact {
    pub fn identity(&self) -> &PackageIdentity {
        &self.package.identity
    }

    /// SHA-256 of the file at `path`, lowercase hex.
    pub fn checksum(fs: &dyn FileSystem, path: &Path) -> PkgStateResult<String> {
        let data = fs.read(path)?;
        let mut hasher = Sha256::new();
        hasher.update(&data);
        Ok(format!("{:x}", hasher.finalize()))
    }
}

type ArtifactKey = (PackageIdentity, String);

// ---------------------------------------------------------------------------
// Storable forms
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredPackageRef {
    identity: PackageIdentity,
    kind: LocationKind,
    location: String,
    name: String,
}

/// Schema 4 package references carry no kind; it is inferred from the
/// location.
#[derive(Deserialize)]
struct LegacyPackageRef {
    identity: PackageIdentity,
    location: String,
    name: String,
}

impl From<&PackageReference> for StoredPackageRef {
    fn from(package: &PackageReference) -> Self {
        Self {
            identity: package.identity.clone(),
            kind: package.location.kind,
            location: package.location.location.clone(),
            name: package.name.clone(),
        }
    }
}

impl From<StoredPackageRef> for PackageReference {
    fn from(stored: StoredPackageRef) -> Self {
        PackageReference::new(
            stored.identity,
            RepositoryLocation::new(stored.kind, stored.location),
            stored.name,
        )
    }
}

impl From<LegacyPackageRef> for PackageReference {
    fn from(stored: LegacyPackageRef) -> Self {
        PackageReference::new(
            stored.identity,
            RepositoryLocation::parse(stored.location),
            stored.name,
        )
    }
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "camelCase")]
enum StoredDependencyState {
    Checkout {
        revision: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        branch: Option<String>,
    },
    Edited {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<PathBuf>,
    },
    FileSystem {
        path: PathBuf,
    },
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredDependency<R> {
    package_ref: R,
    state: StoredDependencyState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    based_on: Option<PackageIdentity>,
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum StoredArtifactSource {
    Remote {
        url: String,
        checksum: String,
    },
    Local {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        checksum: Option<String>,
    },
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredArtifact<R> {
    package_ref: R,
    target_name: String,
    source: StoredArtifactSource,
    path: PathBuf,
}

#[derive(Serialize, Deserialize)]
struct StoredState<R> {
    #[serde(default = "Vec::new")]
    artifacts: Vec<StoredArtifact<R>>,
    #[serde(default = "Vec::new")]
    dependencies: Vec<StoredDependency<R>>,
}

impl From<&ManagedDependency> for StoredDependency<StoredPackageRef> {
    fn from(dependency: &ManagedDependency) -> Self {
        let state = match &dependency.state {
            DependencyState::Checkout {
                revision,
                version,
                branch,
            } => StoredDependencyState::Checkout {
                revision: revision.clone(),
                version: version.as_ref().map(Version::to_string),
                branch: branch.clone(),
            },
            DependencyState::Edited { path } => {
                StoredDependencyState::Edited { path: path.clone() }
            }
            DependencyState::FileSystem { path } => {
                StoredDependencyState::FileSystem { path: path.clone() }
            }
        };
        Self {
            package_ref: (&dependency.package).into(),
            state,
            based_on: dependency.based_on.clone(),
        }
    }
}

impl<R: Into<PackageReference>> TryFrom<StoredDependency<R>> for ManagedDependency {
    type Error = PkgStateError;

    fn try_from(stored: StoredDependency<R>) -> PkgStateResult<Self> {
        let state = match stored.state {
            StoredDependencyState::Checkout {
                revision,
                version,
                branch,
            } => DependencyState::Checkout {
                revision,
                version: version
                    .map(|v| Version::parse(&v).map_err(|_| PkgStateError::InvalidVersion(v)))
                    .transpose()?,
                branch,
            },
            StoredDependencyState::Edited { path } => DependencyState::Edited { path },
            StoredDependencyState::FileSystem { path } => DependencyState::FileSystem { path },
        };
        Ok(Self {
            package: stored.package_ref.into(),
            state,
            based_on: stored.based_on,
        })
    }
}

impl From<&ManagedArtifact> for StoredArtifact<StoredPackageRef> {
    fn from(artifact: &ManagedArtifact) -> Self {
        let source = match &artifact.source {
            ArtifactSource::Remote { url, checksum } => StoredArtifactSource::Remote {
                url: url.clone(),
                checksum: checksum.clone(),
            },
            ArtifactSource::Local { checksum } => StoredArtifactSource::Local {
                checksum: checksum.clone(),
            },
        };
        Self {
            package_ref: (&artifact.package).into(),
            target_name: artifact.target_name.clone(),
            source,
            path: artifact.path.clone(),
        }
    }
}

impl<R: Into<PackageReference>> From<StoredArtifact<R>> for ManagedArtifact {
    fn from(stored: StoredArtifact<R>) -> Self {
        let source = match stored.source {
            StoredArtifactSource::Remote { url, checksum } => {
                ArtifactSource::Remote { url, checksum }
            }
            StoredArtifactSource::Local { checksum } => ArtifactSource::Local { checksum },
        };
        Self {
            package: stored.package_ref.into(),
            target_name: stored.target_name,
            source,
            path: stored.path,
        }
    }
}

// ---------------------------------------------------------------------------
// WorkspaceState
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct WorkspaceState {
    fs: SharedFileSystem,
    path: PathBuf,
    dependencies: IndexMap<PackageIdentity, ManagedDependency>,
    artifacts: IndexMap<ArtifactKey, ManagedArtifact>,
}

impl WorkspaceState {
    /// An empty snapshot that will be saved to `path`.
    pub fn new(fs: SharedFileSystem, path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            path: path.into(),
            dependencies: IndexMap::new(),
            artifacts: IndexMap::new(),
        }
    }

    /// Read the snapshot at `path`; a missing file is an empty snapshot.
    pub fn load(fs: SharedFileSystem, path: impl Into<PathBuf>) -> PkgStateResult<Self> {
        let mut state = Self::new(fs, path);
        let Some(text) = state.fs.read_optional(&state.path)? else {
            debug!(path = %state.path.display(), "no workspace state yet");
            return Ok(state);
        };
        let doc = parse_document(&state.path, &text)?;
        let (dependencies, artifacts) = match doc.version {
            Some(STATE_SCHEMA_VERSION) => {
                let stored: StoredState<StoredPackageRef> = decode(&state.path, doc.object)?;
                convert(&state.path, stored)?
            }
            Some(LEGACY_STATE_SCHEMA_VERSION) => {
                let stored: StoredState<LegacyPackageRef> = decode(&state.path, doc.object)?;
                convert(&state.path, stored)?
            }
            Some(found) => {
                return Err(PkgStateError::UnsupportedSchemaVersion {
                    document: "workspace state",
                    found,
                })
            }
            None => return Err(PkgStateError::malformed(&state.path, "missing 'version'")),
        };
        for dependency in dependencies {
            if state.dependency(dependency.identity()).is_some() {
                return Err(PkgStateError::malformed(
                    &state.path,
                    format!("dependency '{}' is listed more than once", dependency.identity()),
                ));
            }
            state.add_dependency(dependency);
        }
        for artifact in artifacts {
            if state.artifact(artifact.identity(), &artifact.target_name).is_some() {
                return Err(PkgStateError::malformed(
                    &state.path,
                    format!(
                        "artifact '{}' of '{}' is listed more than once",
                        artifact.target_name,
                        artifact.identity()
                    ),
                ));
            }
            state.add_artifact(artifact);
        }
        debug!(
            path = %state.path.display(),
            dependencies = state.dependencies.len(),
            artifacts = state.artifacts.len(),
            "loaded workspace state"
        );
        Ok(state)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert or replace a dependency. A replaced dependency keeps its
    /// position.
    pub fn add_dependency(&mut self, dependency: ManagedDependency) {
        self.dependencies
            .insert(dependency.identity().clone(), dependency);
    }

    pub fn remove_dependency(&mut self, identity: &PackageIdentity) -> Option<ManagedDependency> {
        self.dependencies.shift_remove(identity)
    }

    pub fn dependency(&self, identity: &PackageIdentity) -> Option<&ManagedDependency> {
        self.dependencies.get(identity)
    }

    /// Dependencies in insertion order.
    pub fn dependencies(&self) -> impl Iterator<Item = &ManagedDependency> {
        self.dependencies.values()
    }

    pub fn add_artifact(&mut self, artifact: ManagedArtifact) {
        let key = (artifact.identity().clone(), artifact.target_name.clone());
        self.artifacts.insert(key, artifact);
    }

    pub fn remove_artifact(
        &mut self,
        identity: &PackageIdentity,
        target_name: &str,
    ) -> Option<ManagedArtifact> {
        self.artifacts
            .shift_remove(&(identity.clone(), target_name.to_string()))
    }

    pub fn artifact(
        &self,
        identity: &PackageIdentity,
        target_name: &str,
    ) -> Option<&ManagedArtifact> {
        self.artifacts
            .get(&(identity.clone(), target_name.to_string()))
    }

    pub fn artifacts(&self) -> impl Iterator<Item = &ManagedArtifact> {
        self.artifacts.values()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty() && self.artifacts.is_empty()
    }

    pub fn reset(&mut self) {
        self.dependencies.clear();
        self.artifacts.clear();
    }

    pub fn serialize(&self) -> PkgStateResult<String> {
        let mut dependencies: Vec<&ManagedDependency> = self.dependencies.values().collect();
        dependencies.sort_by(|a, b| a.identity().cmp(b.identity()));
        let mut artifacts: Vec<&ManagedArtifact> = self.artifacts.values().collect();
        artifacts.sort_by(|a, b| {
            a.identity()
                .cmp(b.identity())
                .then_with(|| a.target_name.cmp(&b.target_name))
        });

        let stored = StoredState::<StoredPackageRef> {
            artifacts: artifacts.into_iter().map(StoredArtifact::from).collect(),
            dependencies: dependencies.into_iter().map(StoredDependency::from).collect(),
        };
        encode(STATE_SCHEMA_VERSION, &stored)
    }

    pub fn save(&self) -> PkgStateResult<()> {
        let text = self.serialize()?;
        self.fs.write_atomic(&self.path, text.as_bytes())?;
        debug!(
            path = %self.path.display(),
            dependencies = self.dependencies.len(),
            artifacts = self.artifacts.len(),
            "saved workspace state"
        );
        Ok(())
    }
}

fn convert<R: Into<PackageReference>>(
    path: &Path,
    stored: StoredState<R>,
) -> PkgStateResult<(Vec<ManagedDependency>, Vec<ManagedArtifact>)> {
    let dependencies = stored
        .dependencies
        .into_iter()
        .map(ManagedDependency::try_from)
        .collect::<PkgStateResult<Vec<_>>>()
        .map_err(|e| PkgStateError::malformed(path, e))?;
    let artifacts = stored.artifacts.into_iter().map(ManagedArtifact::from).collect();
    Ok((dependencies, artifacts))
}
