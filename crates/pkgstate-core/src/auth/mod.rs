//! Credential resolution for network access to package sources.
//!
//! Providers answer one question: which credential, if any, applies to a
//! host. [`chain::CompositeAuthorizationProvider`] asks them in a fixed
//! precedence order. Providers describe themselves through
//! [`ProviderDescriptor`] so callers can inspect a chain without knowing the
//! concrete types inside it.

pub mod chain;
pub mod netrc;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use parking_lot::Mutex;
use tracing::warn;

use crate::errors::PkgStateResult;
use crate::models::host_of;

pub use chain::{
    registry_authorization_provider, workspace_authorization_provider,
    AuthorizationConfiguration, CompositeAuthorizationProvider,
};
pub use netrc::{CredentialEntry, Netrc, NetrcProvider};

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub user: String,
    pub password: String,
}

impl Credential {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    /// Value of an HTTP `Authorization` header using basic auth.
    pub fn basic_header(&self) -> String {
        let token = STANDARD.encode(format!("{}:{}", self.user, self.password));
        format!("Basic {token}")
    }
}

// Keep passwords out of debug logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Provider descriptors
// ---------------------------------------------------------------------------

/// Which kind of source a provider reads credentials from. The declaration
/// order is the precedence order of a chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProviderKind {
    CustomNetrc,
    UserNetrc,
    SecretStore,
    Registry,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderDescriptor {
    pub kind: ProviderKind,
    /// Backing file, for file-based providers.
    pub source: Option<PathBuf>,
    /// Number of credentials currently known, when countable.
    pub entries: Option<usize>,
}

pub trait AuthorizationProvider: Send + Sync {
    fn authentication(&self, host: &str) -> Option<Credential>;

    fn descriptor(&self) -> ProviderDescriptor;

    /// Capability query for providers backed by a writable netrc file.
    fn as_netrc_mut(&mut self) -> Option<&mut NetrcProvider> {
        None
    }

    fn http_authorization_header(&self, url: &str) -> Option<String> {
        let host = host_of(url)?;
        self.authentication(&host).map(|c| c.basic_header())
    }
}

// ---------------------------------------------------------------------------
// OS secret store seam
// ---------------------------------------------------------------------------

/// Platform credential storage (keychain, secret service, ...).
pub trait SecretStore: Send + Sync {
    fn get(&self, host: &str) -> PkgStateResult<Option<Credential>>;
    fn set(&self, host: &str, credential: Credential) -> PkgStateResult<()>;
    fn remove(&self, host: &str) -> PkgStateResult<bool>;
}

/// Secret store kept in process memory.
#[derive(Default)]
pub struct MemorySecretStore {
    entries: Mutex<HashMap<String, Credential>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemorySecretStore {
    fn get(&self, host: &str) -> PkgStateResult<Option<Credential>> {
        Ok(self.entries.lock().get(&host.to_lowercase()).cloned())
    }

    fn set(&self, host: &str, credential: Credential) -> PkgStateResult<()> {
        self.entries.lock().insert(host.to_lowercase(), credential);
        Ok(())
    }

    fn remove(&self, host: &str) -> PkgStateResult<bool> {
        Ok(self.entries.lock().remove(&host.to_lowercase()).is_some())
    }
}

/// Adapts a [`SecretStore`] to the provider interface. Store failures are
/// logged and treated as "no credential".
pub struct SecretStoreProvider {
    store: Arc<dyn SecretStore>,
}

impl SecretStoreProvider {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn SecretStore> {
        &self.store
    }
}

impl AuthorizationProvider for SecretStoreProvider {
    fn authentication(&self, host: &str) -> Option<Credential> {
        match self.store.get(host) {
            Ok(found) => found,
            Err(e) => {
                warn!("secret store lookup for {host} failed: {e}");
                None
            }
        }
    }

    fn descriptor(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            kind: ProviderKind::SecretStore,
            source: None,
            entries: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Registry overrides
// ---------------------------------------------------------------------------

/// Credentials configured explicitly for package registries, keyed by host.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegistryCredentials {
    entries: BTreeMap<String, Credential>,
}

impl RegistryCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, host: &str, credential: Credential) -> Option<Credential> {
        self.entries.insert(host.to_lowercase(), credential)
    }

    pub fn with(mut self, host: &str, credential: Credential) -> Self {
        self.insert(host, credential);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl AuthorizationProvider for RegistryCredentials {
    fn authentication(&self, host: &str) -> Option<Credential> {
        self.entries.get(&host.to_lowercase()).cloned()
    }

    fn descriptor(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            kind: ProviderKind::Registry,
            source: None,
            entries: Some(self.entries.len()),
        }
    }
}
