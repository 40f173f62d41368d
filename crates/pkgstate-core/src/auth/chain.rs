//! Ordered composition of credential providers.
//!
//! Precedence: custom netrc, user netrc, OS secret store, registry overrides.
//! Two entry points build a chain; they differ only in how a missing user
//! netrc is treated (see [`workspace_authorization_provider`] and
//! [`registry_authorization_provider`]).

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use super::netrc::NetrcProvider;
use super::{
    AuthorizationProvider, Credential, ProviderDescriptor, ProviderKind, RegistryCredentials,
    SecretStore, SecretStoreProvider,
};
use crate::config::{env_flag, StoreLocations, SECRET_STORE_ENV};
use crate::errors::{PkgStateError, PkgStateResult};
use crate::fs::{FileSystem, SharedFileSystem};

/// Which credential sources are enabled.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthorizationConfiguration {
    /// Explicitly configured netrc file; must exist.
    pub custom_netrc: Option<PathBuf>,
    /// Conventional per-user netrc file; `None` disables it.
    pub user_netrc: Option<PathBuf>,
    pub secret_store: bool,
    pub registry: RegistryCredentials,
}

impl AuthorizationConfiguration {
    /// Defaults derived from the workspace locations and the environment.
    pub fn from_locations(locations: &StoreLocations) -> Self {
        Self {
            custom_netrc: None,
            user_netrc: locations.user_netrc.clone(),
            secret_store: env_flag(SECRET_STORE_ENV, true),
            registry: RegistryCredentials::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// CompositeAuthorizationProvider
// ---------------------------------------------------------------------------

pub struct CompositeAuthorizationProvider {
    providers: Vec<Box<dyn AuthorizationProvider>>,
}

impl CompositeAuthorizationProvider {
    pub fn new(providers: Vec<Box<dyn AuthorizationProvider>>) -> Self {
        Self { providers }
    }

    /// Descriptors of the providers, in lookup order.
    pub fn providers(&self) -> Vec<ProviderDescriptor> {
        self.providers.iter().map(|p| p.descriptor()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// The netrc-backed provider of the given kind, for credential writes.
    pub fn netrc_mut(&mut self, kind: ProviderKind) -> Option<&mut NetrcProvider> {
        self.providers
            .iter_mut()
            .filter_map(|p| p.as_netrc_mut())
            .find(|p| p.descriptor().kind == kind)
    }

    /// Persist a credential into the highest-precedence netrc file of the
    /// chain. Fails with a configuration error if the chain has none.
    pub fn store_credential(
        &mut self,
        host: &str,
        user: &str,
        password: &str,
    ) -> PkgStateResult<()> {
        let target = self
            .providers
            .iter_mut()
            .find_map(|p| p.as_netrc_mut())
            .ok_or_else(|| {
                PkgStateError::Config("no netrc file configured for credential storage".into())
            })?;
        target.add_or_update(host, user, password)
    }
}

impl AuthorizationProvider for CompositeAuthorizationProvider {
    fn authentication(&self, host: &str) -> Option<Credential> {
        self.providers.iter().find_map(|p| p.authentication(host))
    }

    fn descriptor(&self) -> ProviderDescriptor {
        // A chain reports the kind of its first provider.
        let mut descriptor = self
            .providers
            .first()
            .map(|p| p.descriptor())
            .unwrap_or(ProviderDescriptor {
                kind: ProviderKind::Registry,
                source: None,
                entries: Some(0),
            });
        descriptor.entries = self
            .providers
            .iter()
            .map(|p| p.descriptor().entries)
            .sum::<Option<usize>>();
        descriptor
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq, Eq)]
enum MissingUserNetrc {
    Omit,
    Empty,
}

fn build_chain(
    fs: SharedFileSystem,
    config: &AuthorizationConfiguration,
    secret_store: Option<Arc<dyn SecretStore>>,
    missing_user: MissingUserNetrc,
) -> PkgStateResult<Vec<Box<dyn AuthorizationProvider>>> {
    let mut providers: Vec<Box<dyn AuthorizationProvider>> = Vec::new();

    if let Some(path) = &config.custom_netrc {
        providers.push(Box::new(NetrcProvider::custom(fs.clone(), path.clone())?));
    }

    if let Some(path) = &config.user_netrc {
        if fs.exists(path) || missing_user == MissingUserNetrc::Empty {
            providers.push(Box::new(NetrcProvider::user(fs.clone(), path.clone())));
        } else {
            debug!(path = %path.display(), "user netrc not present, skipping");
        }
    }

    if config.secret_store {
        match secret_store {
            Some(store) => providers.push(Box::new(SecretStoreProvider::new(store))),
            None => debug!("secret store enabled but not available on this platform"),
        }
    }

    if !config.registry.is_empty() {
        providers.push(Box::new(config.registry.clone()));
    }

    Ok(providers)
}

/// Chain used before fetching workspace dependencies.
///
/// A missing user netrc contributes nothing, and a chain without providers
/// is reported as `None`. A configured custom netrc that does not exist is
/// an error.
pub fn workspace_authorization_provider(
    fs: SharedFileSystem,
    config: &AuthorizationConfiguration,
    secret_store: Option<Arc<dyn SecretStore>>,
) -> PkgStateResult<Option<CompositeAuthorizationProvider>> {
    let providers = build_chain(fs, config, secret_store, MissingUserNetrc::Omit)?;
    if providers.is_empty() {
        return Ok(None);
    }
    Ok(Some(CompositeAuthorizationProvider::new(providers)))
}

/// Chain used for registry operations, including credential writes.
///
/// Always returns a chain. A missing user netrc is kept as an empty provider
/// so that a later login can write to it.
pub fn registry_authorization_provider(
    fs: SharedFileSystem,
    config: &AuthorizationConfiguration,
    secret_store: Option<Arc<dyn SecretStore>>,
) -> PkgStateResult<CompositeAuthorizationProvider> {
    let providers = build_chain(fs, config, secret_store, MissingUserNetrc::Empty)?;
    Ok(CompositeAuthorizationProvider::new(providers))
}
