//! One workspace's persisted state, opened together.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::auth::chain::{workspace_authorization_provider, AuthorizationConfiguration};
use crate::auth::{AuthorizationProvider, CompositeAuthorizationProvider, Credential, SecretStore};
use crate::config::StoreLocations;
use crate::errors::PkgStateResult;
use crate::fs::{FileSystem, SharedFileSystem};
use crate::models::{LocationKind, PackageIdentity, PackageReference, RepositoryLocation};
use crate::store::mirrors::{LayeredMirrors, MirrorsFile};
use crate::store::pins::{Pin, PinState, PinsStore};
use crate::store::state::{DependencyState, ManagedDependency, WorkspaceState};

/// A package as chosen by dependency resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedPackage {
    pub package: PackageReference,
    pub state: PinState,
}

impl ResolvedPackage {
    pub fn new(package: PackageReference, state: PinState) -> Self {
        Self { package, state }
    }

    fn dependency_state(&self) -> DependencyState {
        if self.package.kind() == LocationKind::FileSystem {
            return DependencyState::FileSystem {
                path: PathBuf::from(&self.package.location.location),
            };
        }
        match &self.state {
            PinState::Version { version, revision } => DependencyState::Checkout {
                revision: revision.clone().unwrap_or_else(|| version.to_string()),
                version: Some(version.clone()),
                branch: None,
            },
            PinState::Revision { revision } => DependencyState::Checkout {
                revision: revision.clone(),
                version: None,
                branch: None,
            },
            PinState::Branch { name, revision } => DependencyState::Checkout {
                revision: revision.clone(),
                version: None,
                branch: Some(name.clone()),
            },
        }
    }
}

pub struct Workspace {
    fs: SharedFileSystem,
    locations: StoreLocations,
    pins: PinsStore,
    mirrors: LayeredMirrors,
    state: WorkspaceState,
    authorization: Option<CompositeAuthorizationProvider>,
}

impl Workspace {
    pub fn open(
        fs: SharedFileSystem,
        locations: StoreLocations,
        auth: &AuthorizationConfiguration,
        secret_store: Option<Arc<dyn SecretStore>>,
    ) -> PkgStateResult<Self> {
        let pins = PinsStore::load(fs.clone(), &locations.pins_file)?;
        let local = MirrorsFile::new(
            fs.clone(),
            &locations.local_mirrors_file,
            locations.mirrors_delete_when_empty,
        );
        let shared = locations
            .shared_mirrors_file
            .as_ref()
            .map(|path| MirrorsFile::new(fs.clone(), path, locations.mirrors_delete_when_empty));
        let mirrors = LayeredMirrors::open(local, shared)?;
        let state = WorkspaceState::load(fs.clone(), &locations.state_file)?;
        let authorization = workspace_authorization_provider(fs.clone(), auth, secret_store)?;

        info!(
            root = %locations.workspace_root.display(),
            pins = pins.len(),
            mirrors = mirrors.effective_layer().len(),
            providers = authorization.as_ref().map_or(0, |a| a.providers().len()),
            "opened workspace"
        );
        Ok(Self {
            fs,
            locations,
            pins,
            mirrors,
            state,
            authorization,
        })
    }

    pub fn locations(&self) -> &StoreLocations {
        &self.locations
    }

    pub fn pins(&self) -> &PinsStore {
        &self.pins
    }

    pub fn pins_mut(&mut self) -> &mut PinsStore {
        &mut self.pins
    }

    pub fn mirrors(&self) -> &LayeredMirrors {
        &self.mirrors
    }

    pub fn mirrors_mut(&mut self) -> &mut LayeredMirrors {
        &mut self.mirrors
    }

    pub fn state(&self) -> &WorkspaceState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut WorkspaceState {
        &mut self.state
    }

    pub fn authorization(&self) -> Option<&CompositeAuthorizationProvider> {
        self.authorization.as_ref()
    }

    /// `location` with the active mirror applied.
    pub fn effective_location(&self, location: &RepositoryLocation) -> RepositoryLocation {
        let effective = self.mirrors.effective(&location.location);
        if effective == location.location {
            location.clone()
        } else {
            RepositoryLocation::new(location.kind, effective)
        }
    }

    /// Credentials for fetching from `location`, looked up by the host of its
    /// effective (mirrored) location.
    pub fn authentication_for(&self, location: &RepositoryLocation) -> Option<Credential> {
        let effective = self.effective_location(location);
        let host = effective.host()?;
        self.authorization.as_ref()?.authentication(&host)
    }

    /// Record the outcome of a dependency resolution.
    ///
    /// The snapshot gets one dependency per resolved package; edited
    /// dependencies are left alone and dependencies that are no longer
    /// resolved are dropped. With autopin on, the pins are replaced by the
    /// resolution as well. Local directory packages are never pinned.
    pub fn record_resolution(&mut self, resolved: &[ResolvedPackage]) -> PkgStateResult<()> {
        let mut state = self.state.clone();
        let resolved_ids: Vec<&PackageIdentity> =
            resolved.iter().map(|r| &r.package.identity).collect();
        let stale: Vec<PackageIdentity> = state
            .dependencies()
            .filter(|d| !matches!(d.state, DependencyState::Edited { .. }))
            .filter(|d| !resolved_ids.contains(&d.identity()))
            .map(|d| d.identity().clone())
            .collect();
        for identity in &stale {
            state.remove_dependency(identity);
        }
        for package in resolved {
            if let Some(existing) = state.dependency(&package.package.identity) {
                if matches!(existing.state, DependencyState::Edited { .. }) {
                    continue;
                }
            }
            state.add_dependency(ManagedDependency::new(
                package.package.clone(),
                package.dependency_state(),
            ));
        }

        // The state file is restored if the pins cannot follow it.
        let previous = self.fs.read_optional(state.path())?;
        state.save()?;
        if self.pins.autopin() {
            let pins = resolved
                .iter()
                .filter(|r| r.package.kind() != LocationKind::FileSystem)
                .map(|r| Pin::new(r.package.clone(), r.state.clone()));
            if let Err(err) = self.pins.replace_all(pins) {
                self.restore_state_file(state.path(), previous.as_deref());
                return Err(err);
            }
        }
        self.state = state;
        info!(
            packages = resolved.len(),
            dropped = stale.len(),
            autopin = self.pins.autopin(),
            "recorded resolution"
        );
        Ok(())
    }

    fn restore_state_file(&self, path: &Path, previous: Option<&str>) {
        let restored = match previous {
            Some(text) => self.fs.write_atomic(path, text.as_bytes()),
            None if self.fs.exists(path) => self.fs.remove_file(path),
            None => Ok(()),
        };
        if let Err(err) = restored {
            warn!(path = %path.display(), error = %err, "could not restore workspace state");
        }
    }
}
