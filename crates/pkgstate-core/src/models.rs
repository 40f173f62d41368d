//! Shared typed models used across the pin, mirror, and state stores.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

// ---------------------------------------------------------------------------
// Schema / contract constants
// ---------------------------------------------------------------------------

/// Schema version written for mirror configuration files.
pub const MIRRORS_SCHEMA_VERSION: i64 = 1;

/// Schema version written for pin store files.
pub const PINS_SCHEMA_VERSION: i64 = 2;

/// Schema version written for workspace state snapshots.
pub const STATE_SCHEMA_VERSION: i64 = 5;

// ---------------------------------------------------------------------------
// PackageIdentity
// ---------------------------------------------------------------------------

/// Case-normalized key of a package, unique within a workspace. Values read
/// from documents are normalized the same way as constructed ones.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct PackageIdentity(String);

impl PackageIdentity {
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(value.as_ref().trim().to_lowercase())
    }

    /// Derive the identity of a package from its source location.
    ///
    /// `https://github.com/Apple/Swift-NIO.git` and `/src/swift-nio` both
    /// yield `swift-nio`. Registry identities (`scope.name`) are kept whole.
    pub fn from_location(location: &str) -> Self {
        let trimmed = location.trim().trim_end_matches('/');
        let last = trimmed
            .rsplit(|c| c == '/' || c == '\\' || c == ':')
            .next()
            .unwrap_or(trimmed);
        let last = last.strip_suffix(".git").unwrap_or(last);
        Self::new(last)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PackageIdentity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for PackageIdentity {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<PackageIdentity> for String {
    fn from(identity: PackageIdentity) -> Self {
        identity.0
    }
}

// ---------------------------------------------------------------------------
// RepositoryLocation
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LocationKind {
    RemoteSourceControl,
    LocalSourceControl,
    Registry,
    FileSystem,
}

impl LocationKind {
    /// Best-effort classification of a raw location string.
    pub fn infer(location: &str) -> Self {
        let location = location.trim();
        if location.contains("://") || location.starts_with("git@") {
            LocationKind::RemoteSourceControl
        } else if location.ends_with(".git") {
            LocationKind::LocalSourceControl
        } else if !location.contains('/') && !location.contains('\\') && is_registry_id(location)
        {
            LocationKind::Registry
        } else {
            LocationKind::FileSystem
        }
    }
}

fn is_registry_id(location: &str) -> bool {
    match location.split_once('.') {
        Some((scope, name)) => {
            !scope.is_empty()
                && !name.is_empty()
                && !name.contains('.')
                && scope
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-')
        }
        None => false,
    }
}

/// An opaque source location plus the kind of source it points at.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RepositoryLocation {
    pub kind: LocationKind,
    pub location: String,
}

impl RepositoryLocation {
    pub fn new(kind: LocationKind, location: impl Into<String>) -> Self {
        Self {
            kind,
            location: location.into(),
        }
    }

    pub fn remote(url: impl Into<String>) -> Self {
        Self::new(LocationKind::RemoteSourceControl, url)
    }

    pub fn local(path: impl Into<String>) -> Self {
        Self::new(LocationKind::FileSystem, path)
    }

    /// Classify `location` with [`LocationKind::infer`].
    pub fn parse(location: impl Into<String>) -> Self {
        let location = location.into();
        Self {
            kind: LocationKind::infer(&location),
            location,
        }
    }

    /// Host component of a remote location, if there is one.
    pub fn host(&self) -> Option<String> {
        host_of(&self.location)
    }
}

impl fmt::Display for RepositoryLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.location)
    }
}

/// Extract the host of a URL (`https://user@host:443/path` → `host`) or of an
/// scp-style git location (`git@host:path` → `host`). Local paths, including
/// drive-letter paths, have no host.
pub fn host_of(location: &str) -> Option<String> {
    match Url::parse(location) {
        Ok(url) => url
            .host_str()
            .filter(|host| !host.is_empty())
            .map(str::to_string),
        Err(_) => scp_host(location).map(str::to_string),
    }
}

/// Host of `user@host:path`; the user part is required.
fn scp_host(location: &str) -> Option<&str> {
    let (authority, path) = location.split_once(':')?;
    if path.starts_with("//") || authority.contains(['/', '\\']) {
        return None;
    }
    let (_, host) = authority.rsplit_once('@')?;
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

// ---------------------------------------------------------------------------
// PackageReference
// ---------------------------------------------------------------------------

/// A fully described package: who it is and where it comes from.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PackageReference {
    pub identity: PackageIdentity,
    pub location: RepositoryLocation,
    pub name: String,
}

impl PackageReference {
    pub fn new(
        identity: PackageIdentity,
        location: RepositoryLocation,
        name: impl Into<String>,
    ) -> Self {
        Self {
            identity,
            location,
            name: name.into(),
        }
    }

    /// Reference to a remote source-control package, identity and name
    /// derived from the URL.
    pub fn remote(url: &str) -> Self {
        let identity = PackageIdentity::from_location(url);
        let name = identity.as_str().to_string();
        Self::new(identity, RepositoryLocation::remote(url), name)
    }

    /// Reference to a local package directory.
    pub fn local(path: &str) -> Self {
        let identity = PackageIdentity::from_location(path);
        let name = identity.as_str().to_string();
        Self::new(identity, RepositoryLocation::local(path), name)
    }

    pub fn kind(&self) -> LocationKind {
        self.location.kind
    }
}
