//! The lockfile: which exact version or revision each dependency is pinned to.
//!
//! The store is a two-mode state machine. In [`PinMode::Auto`] pins follow
//! dependency resolution and cannot be removed by hand; in
//! [`PinMode::Manual`] `unpin` is allowed for packages that are pinned.
//!
//! The file is created by the first successful mutation and rewritten in full
//! by every later one. Schema 1 files (with or without the versioned
//! envelope) are still read; schema 2 is written.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use semver::Version;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{decode, encode, parse_document};
use crate::errors::{PkgStateError, PkgStateResult};
use crate::fs::{FileSystem, SharedFileSystem};
use crate::models::{
    LocationKind, PackageIdentity, PackageReference, RepositoryLocation, PINS_SCHEMA_VERSION,
};

// ---------------------------------------------------------------------------
// Pin
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PinState {
    Version {
        version: Version,
        revision: Option<String>,
    },
    Revision {
        revision: String,
    },
    Branch {
        name: String,
        revision: String,
    },
}

impl PinState {
    pub fn version(version: Version) -> Self {
        PinState::Version {
            version,
            revision: None,
        }
    }

    pub fn revision(revision: impl Into<String>) -> Self {
        PinState::Revision {
            revision: revision.into(),
        }
    }

    pub fn branch(name: impl Into<String>, revision: impl Into<String>) -> Self {
        PinState::Branch {
            name: name.into(),
            revision: revision.into(),
        }
    }
}

impl fmt::Display for PinState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PinState::Version { version, .. } => write!(f, "{version}"),
            PinState::Revision { revision } => f.write_str(revision),
            PinState::Branch { name, revision } => write!(f, "{name}@{revision}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pin {
    pub package: PackageReference,
    pub state: PinState,
    pub reason: Option<String>,
    /// Dependent package whose pinning produced this pin.
    pub based_on: Option<PackageIdentity>,
}

impl Pin {
    pub fn new(package: PackageReference, state: PinState) -> Self {
        Self {
            package,
            state,
            reason: None,
            based_on: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn based_on(mut self, identity: PackageIdentity) -> Self {
        self.based_on = Some(identity);
        self
    }

    pub fn identity(&self) -> &PackageIdentity {
        &self.package.identity
    }
}

// ---------------------------------------------------------------------------
// Storable forms
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPinState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Schema 2 representation of a [`Pin`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredPin {
    pub package: PackageIdentity,
    #[serde(default)]
    pub name: String,
    pub location: String,
    pub kind: LocationKind,
    pub state: StoredPinState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub based_on: Option<PackageIdentity>,
}

impl From<&Pin> for StoredPin {
    fn from(pin: &Pin) -> Self {
        let state = match &pin.state {
            PinState::Version { version, revision } => StoredPinState {
                version: Some(version.to_string()),
                revision: revision.clone(),
                branch: None,
            },
            PinState::Revision { revision } => StoredPinState {
                revision: Some(revision.clone()),
                ..StoredPinState::default()
            },
            PinState::Branch { name, revision } => StoredPinState {
                branch: Some(name.clone()),
                revision: Some(revision.clone()),
                version: None,
            },
        };
        StoredPin {
            package: pin.package.identity.clone(),
            name: pin.package.name.clone(),
            location: pin.package.location.location.clone(),
            kind: pin.package.location.kind,
            state,
            reason: pin.reason.clone(),
            based_on: pin.based_on.clone(),
        }
    }
}

impl TryFrom<StoredPinState> for PinState {
    type Error = PkgStateError;

    fn try_from(stored: StoredPinState) -> PkgStateResult<Self> {
        match stored {
            StoredPinState {
                version: Some(version),
                revision,
                ..
            } => Ok(PinState::Version {
                version: Version::parse(&version)
                    .map_err(|_| PkgStateError::InvalidVersion(version.clone()))?,
                revision,
            }),
            StoredPinState {
                branch: Some(name),
                revision: Some(revision),
                ..
            } => Ok(PinState::Branch { name, revision }),
            StoredPinState {
                revision: Some(revision),
                ..
            } => Ok(PinState::Revision { revision }),
            _ => Err(PkgStateError::InvalidVersion(
                "pin has neither a version nor a revision".into(),
            )),
        }
    }
}

impl TryFrom<StoredPin> for Pin {
    type Error = PkgStateError;

    fn try_from(stored: StoredPin) -> PkgStateResult<Self> {
        let name = if stored.name.is_empty() {
            stored.package.as_str().to_string()
        } else {
            stored.name
        };
        Ok(Pin {
            package: PackageReference::new(
                stored.package,
                RepositoryLocation::new(stored.kind, stored.location),
                name,
            ),
            state: stored.state.try_into()?,
            reason: stored.reason,
            based_on: stored.based_on,
        })
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredPinsV2 {
    auto_pin: bool,
    pins: Vec<StoredPin>,
}

fn default_autopin() -> bool {
    true
}

/// Schema 1: no location kind, no `basedOn`, `autoPin` optional.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredPinsV1 {
    #[serde(default = "default_autopin")]
    auto_pin: bool,
    #[serde(default)]
    pins: Vec<StoredPinV1>,
}

#[derive(Deserialize)]
struct StoredPinV1 {
    package: String,
    #[serde(rename = "repositoryURL")]
    repository_url: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    revision: Option<String>,
    #[serde(default)]
    branch: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

impl TryFrom<StoredPinV1> for Pin {
    type Error = PkgStateError;

    fn try_from(stored: StoredPinV1) -> PkgStateResult<Self> {
        let state = PinState::try_from(StoredPinState {
            version: stored.version,
            revision: stored.revision,
            branch: stored.branch,
        })?;
        Ok(Pin {
            package: PackageReference::new(
                PackageIdentity::new(&stored.package),
                RepositoryLocation::parse(stored.repository_url),
                stored.package,
            ),
            state,
            reason: stored.reason,
            based_on: None,
        })
    }
}

// ---------------------------------------------------------------------------
// PinsStore
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PinMode {
    /// Pins may be added and removed by hand.
    Manual,
    /// Pins are owned by dependency resolution.
    Auto,
}

impl PinMode {
    pub fn from_autopin(autopin: bool) -> Self {
        if autopin {
            PinMode::Auto
        } else {
            PinMode::Manual
        }
    }
}

pub struct PinsStore {
    fs: SharedFileSystem,
    path: PathBuf,
    mode: PinMode,
    pins: BTreeMap<PackageIdentity, Pin>,
}

impl PinsStore {
    /// Open the store at `path`. A missing file is an empty store in
    /// [`PinMode::Auto`]; nothing is written until the first mutation.
    pub fn load(fs: SharedFileSystem, path: impl Into<PathBuf>) -> PkgStateResult<Self> {
        let path = path.into();
        let (mode, pins) = match fs.read_optional(&path)? {
            Some(text) => parse_pins(&path, &text)?,
            None => (PinMode::Auto, BTreeMap::new()),
        };
        debug!(path = %path.display(), pins = pins.len(), ?mode, "loaded pins");
        Ok(Self {
            fs,
            path,
            mode,
            pins,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> PinMode {
        self.mode
    }

    pub fn autopin(&self) -> bool {
        self.mode == PinMode::Auto
    }

    pub fn pin_for(&self, identity: &PackageIdentity) -> Option<&Pin> {
        self.pins.get(identity)
    }

    pub fn is_pinned(&self, identity: &PackageIdentity) -> bool {
        self.pins.contains_key(identity)
    }

    /// Pins ordered by package identity.
    pub fn pins(&self) -> impl Iterator<Item = &Pin> {
        self.pins.values()
    }

    pub fn pins_map(&self) -> &BTreeMap<PackageIdentity, Pin> {
        &self.pins
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    /// Pin `package` to `state`, replacing any previous pin. Allowed in both
    /// modes.
    pub fn pin(
        &mut self,
        package: PackageReference,
        state: PinState,
        reason: Option<String>,
    ) -> PkgStateResult<()> {
        let mut pin = Pin::new(package, state);
        pin.reason = reason;
        self.add(pin)
    }

    /// Like [`PinsStore::pin`], recording the package whose pin produced this
    /// one.
    pub fn pin_with_base(
        &mut self,
        package: PackageReference,
        state: PinState,
        reason: Option<String>,
        based_on: PackageIdentity,
    ) -> PkgStateResult<()> {
        let mut pin = Pin::new(package, state).based_on(based_on);
        pin.reason = reason;
        self.add(pin)
    }

    /// Insert a fully built pin, replacing any previous pin of its package.
    pub fn add(&mut self, pin: Pin) -> PkgStateResult<()> {
        let mut pins = self.pins.clone();
        info!(package = %pin.identity(), state = %pin.state, "pinning package");
        pins.insert(pin.identity().clone(), pin);
        self.commit(self.mode, pins)
    }

    pub fn unpin(&mut self, identity: &PackageIdentity) -> PkgStateResult<Pin> {
        if self.mode == PinMode::Auto {
            return Err(PkgStateError::AutoPinEnabled);
        }
        let mut pins = self.pins.clone();
        let removed = pins
            .remove(identity)
            .ok_or_else(|| PkgStateError::NotPinned(identity.clone()))?;
        self.commit(self.mode, pins)?;
        info!(package = %identity, "unpinned package");
        Ok(removed)
    }

    pub fn unpin_all(&mut self) -> PkgStateResult<()> {
        if self.mode == PinMode::Auto {
            return Err(PkgStateError::AutoPinEnabled);
        }
        self.commit(self.mode, BTreeMap::new())
    }

    /// Replace every pin with the outcome of a resolution. Allowed in both
    /// modes.
    pub fn replace_all(&mut self, pins: impl IntoIterator<Item = Pin>) -> PkgStateResult<()> {
        let pins = pins
            .into_iter()
            .map(|pin| (pin.identity().clone(), pin))
            .collect();
        self.commit(self.mode, pins)
    }

    pub fn set_mode(&mut self, mode: PinMode) -> PkgStateResult<()> {
        let pins = self.pins.clone();
        self.commit(mode, pins)
    }

    pub fn set_autopin(&mut self, autopin: bool) -> PkgStateResult<()> {
        self.set_mode(PinMode::from_autopin(autopin))
    }

    /// Render the store in the current schema.
    pub fn serialize(&self) -> PkgStateResult<String> {
        render(self.mode, &self.pins)
    }

    /// Persist a candidate state, then adopt it. Nothing changes in memory if
    /// the write fails.
    fn commit(
        &mut self,
        mode: PinMode,
        pins: BTreeMap<PackageIdentity, Pin>,
    ) -> PkgStateResult<()> {
        let text = render(mode, &pins)?;
        self.fs.write_atomic(&self.path, text.as_bytes())?;
        debug!(path = %self.path.display(), pins = pins.len(), ?mode, "saved pins");
        self.mode = mode;
        self.pins = pins;
        Ok(())
    }
}

fn render(mode: PinMode, pins: &BTreeMap<PackageIdentity, Pin>) -> PkgStateResult<String> {
    let stored = StoredPinsV2 {
        auto_pin: mode == PinMode::Auto,
        pins: pins.values().map(StoredPin::from).collect(),
    };
    encode(PINS_SCHEMA_VERSION, &stored)
}

type LoadedPins = (PinMode, BTreeMap<PackageIdentity, Pin>);

fn parse_pins(path: &Path, text: &str) -> PkgStateResult<LoadedPins> {
    let doc = parse_document(path, text)?;
    let (autopin, pins): (bool, Vec<Pin>) = match doc.version {
        None | Some(1) => {
            let stored: StoredPinsV1 = decode(path, doc.object)?;
            let pins = stored
                .pins
                .into_iter()
                .map(Pin::try_from)
                .collect::<PkgStateResult<_>>()
                .map_err(|e| PkgStateError::malformed(path, e))?;
            (stored.auto_pin, pins)
        }
        Some(PINS_SCHEMA_VERSION) => {
            let stored: StoredPinsV2 = decode(path, doc.object)?;
            let pins = stored
                .pins
                .into_iter()
                .map(Pin::try_from)
                .collect::<PkgStateResult<_>>()
                .map_err(|e| PkgStateError::malformed(path, e))?;
            (stored.auto_pin, pins)
        }
        Some(found) => {
            return Err(PkgStateError::UnsupportedSchemaVersion {
                document: "pins",
                found,
            })
        }
    };
    let mut by_identity = BTreeMap::new();
    for pin in pins {
        let identity = pin.identity().clone();
        if by_identity.insert(identity.clone(), pin).is_some() {
            return Err(PkgStateError::malformed(
                path,
                format!("package '{identity}' is pinned more than once"),
            ));
        }
    }
    Ok((PinMode::from_autopin(autopin), by_identity))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::fs::{InMemoryFileSystem, LocalFileSystem};

    const PINS_PATH: &str = "/ws/Package.resolved";

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn memory() -> (Arc<InMemoryFileSystem>, SharedFileSystem) {
        let memory = Arc::new(InMemoryFileSystem::new());
        let fs: SharedFileSystem = memory.clone();
        (memory, fs)
    }

    fn foo() -> PackageReference {
        PackageReference::remote("https://github.com/mona/foo.git")
    }

    #[test]
    fn pin_with_reason() {
        let (_, fs) = memory();
        let mut store = PinsStore::load(fs, PINS_PATH).unwrap();
        store
            .pin(foo(), PinState::version(v("1.0.0")), Some("bad".to_string()))
            .unwrap();

        assert_eq!(store.len(), 1);
        let pin = store.pins_map().get(&PackageIdentity::new("foo")).unwrap();
        assert_eq!(pin.reason.as_deref(), Some("bad"));
        assert_eq!(pin.state, PinState::version(v("1.0.0")));
    }

    #[test]
    fn file_is_created_by_first_mutation() {
        let (_, fs) = memory();
        let path = Path::new(PINS_PATH);
        let mut store = PinsStore::load(fs.clone(), path).unwrap();
        assert!(!fs.exists(path));
        assert!(store.autopin());

        store.set_autopin(false).unwrap();
        assert!(fs.exists(path));

        let reloaded = PinsStore::load(fs, path).unwrap();
        assert_eq!(reloaded.mode(), PinMode::Manual);
        assert!(reloaded.is_empty());
    }

    #[test]
    fn autopin_blocks_unpin_for_every_package() {
        let (_, fs) = memory();
        let mut store = PinsStore::load(fs, PINS_PATH).unwrap();
        store.pin(foo(), PinState::revision("abc123"), None).unwrap();
        assert_eq!(store.mode(), PinMode::Auto);

        for identity in [PackageIdentity::new("foo"), PackageIdentity::new("not-pinned")] {
            assert!(matches!(
                store.unpin(&identity),
                Err(PkgStateError::AutoPinEnabled)
            ));
        }
        assert!(matches!(store.unpin_all(), Err(PkgStateError::AutoPinEnabled)));
        assert!(store.is_pinned(&PackageIdentity::new("foo")));
    }

    #[test]
    fn manual_mode_unpin() {
        let (memory, fs) = memory();
        let mut store = PinsStore::load(fs.clone(), PINS_PATH).unwrap();
        store.set_mode(PinMode::Manual).unwrap();
        store.pin(foo(), PinState::version(v("1.2.3")), None).unwrap();

        let bar = PackageIdentity::new("bar");
        let before = memory.read_bytes(Path::new(PINS_PATH)).unwrap();
        assert!(matches!(
            store.unpin(&bar),
            Err(PkgStateError::NotPinned(id)) if id == bar
        ));
        assert_eq!(memory.read_bytes(Path::new(PINS_PATH)).unwrap(), before);

        let removed = store.unpin(&PackageIdentity::new("FOO")).unwrap();
        assert_eq!(removed.package.name, "foo");
        assert!(store.is_empty());
        assert!(PinsStore::load(fs, PINS_PATH).unwrap().is_empty());
        assert!(matches!(
            store.unpin(&PackageIdentity::new("foo")),
            Err(PkgStateError::NotPinned(_))
        ));
    }

    #[test]
    fn pin_is_legal_in_both_modes() {
        let (_, fs) = memory();
        let mut store = PinsStore::load(fs, PINS_PATH).unwrap();
        for autopin in [true, false] {
            store.set_autopin(autopin).unwrap();
            store
                .pin(foo(), PinState::branch("main", "deadbeef"), None)
                .unwrap();
            assert_eq!(store.len(), 1);
        }
    }

    #[test]
    fn pin_round_trips_through_storable_form() {
        let pins = vec![
            Pin::new(foo(), PinState::version(v("1.0.0"))),
            Pin::new(
                foo(),
                PinState::Version {
                    version: v("2.0.0-beta.1+build.5"),
                    revision: Some("abc".into()),
                },
            )
            .with_reason("security fix"),
            Pin::new(PackageReference::local("/src/Bar"), PinState::revision("r1"))
                .based_on(PackageIdentity::new("foo")),
            Pin::new(
                PackageReference::new(
                    PackageIdentity::new("mona.linkedlist"),
                    RepositoryLocation::new(LocationKind::Registry, "mona.LinkedList"),
                    "LinkedList",
                ),
                PinState::branch("develop", "cafe"),
            ),
        ];
        for pin in pins {
            let stored = StoredPin::from(&pin);
            let json = serde_json::to_string(&stored).unwrap();
            let parsed: StoredPin = serde_json::from_str(&json).unwrap();
            assert_eq!(Pin::try_from(parsed).unwrap(), pin);
        }
    }

    #[test]
    fn store_round_trips_through_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("Package.resolved");
        let fs: SharedFileSystem = Arc::new(LocalFileSystem);

        let mut store = PinsStore::load(fs.clone(), &path).unwrap();
        store.set_mode(PinMode::Manual).unwrap();
        store
            .add(
                Pin::new(foo(), PinState::version(v("1.0.0")))
                    .with_reason("bad")
                    .based_on(PackageIdentity::new("app")),
            )
            .unwrap();

        let reloaded = PinsStore::load(fs, &path).unwrap();
        assert_eq!(reloaded.mode(), PinMode::Manual);
        assert_eq!(reloaded.pins_map(), store.pins_map());
        assert_eq!(reloaded.serialize().unwrap(), std::fs::read_to_string(&path).unwrap());
    }

    #[test]
    fn schema_one_bare_document_loads_sorted() {
        let text = r#"{
            "autoPin": false,
            "pins": [
                {"package": "baz", "repositoryURL": "https://example.com/baz.git",
                 "version": "1.0.0"},
                {"package": "bam", "repositoryURL": "https://example.com/bam.git",
                 "version": "1.0.0", "reason": "pinned by hand"},
                {"package": "bar", "repositoryURL": "/local/bar", "version": "1.0.0"}
            ]
        }"#;
        let fs: SharedFileSystem = Arc::new(InMemoryFileSystem::new().with_file(PINS_PATH, text));
        let store = PinsStore::load(fs, PINS_PATH).unwrap();

        let names: Vec<&str> = store.pins().map(|p| p.identity().as_str()).collect();
        assert_eq!(names, vec!["bam", "bar", "baz"]);
        assert_eq!(store.mode(), PinMode::Manual);
        for pin in store.pins() {
            assert_eq!(pin.state, PinState::version(v("1.0.0")));
        }
        let bam = store.pin_for(&PackageIdentity::new("bam")).unwrap();
        assert_eq!(bam.reason.as_deref(), Some("pinned by hand"));
        assert_eq!(bam.package.kind(), LocationKind::RemoteSourceControl);
        let bar = store.pin_for(&PackageIdentity::new("bar")).unwrap();
        assert_eq!(bar.package.kind(), LocationKind::FileSystem);
    }

    #[test]
    fn schema_one_defaults_autopin_to_true() {
        let text = r#"{"version": 1, "object": {"pins": [
            {"package": "Foo", "repositoryURL": "https://example.com/foo.git", "revision": "abc"}
        ]}}"#;
        let fs: SharedFileSystem = Arc::new(InMemoryFileSystem::new().with_file(PINS_PATH, text));
        let store = PinsStore::load(fs, PINS_PATH).unwrap();
        assert!(store.autopin());
        let pin = store.pin_for(&PackageIdentity::new("foo")).unwrap();
        assert_eq!(pin.package.name, "Foo");
        assert_eq!(pin.state, PinState::revision("abc"));
        assert!(pin.reason.is_none());
    }

    #[test]
    fn schema_one_is_upgraded_on_write() {
        let text = r#"{"autoPin": false, "pins": [
            {"package": "foo", "repositoryURL": "https://example.com/foo.git", "version": "1.0.0"}
        ]}"#;
        let memory = Arc::new(InMemoryFileSystem::new().with_file(PINS_PATH, text));
        let fs: SharedFileSystem = memory.clone();
        let mut store = PinsStore::load(fs.clone(), PINS_PATH).unwrap();
        store.set_autopin(false).unwrap();

        let written: serde_json::Value = serde_json::from_str(
            &String::from_utf8(memory.read_bytes(Path::new(PINS_PATH)).unwrap()).unwrap(),
        )
        .unwrap();
        assert_eq!(written["version"], PINS_SCHEMA_VERSION);
        assert_eq!(written["object"]["autoPin"], false);
        assert_eq!(written["object"]["pins"][0]["package"], "foo");
        assert_eq!(written["object"]["pins"][0]["kind"], "remoteSourceControl");
        assert_eq!(written["object"]["pins"][0]["state"]["version"], "1.0.0");

        let reloaded = PinsStore::load(fs, PINS_PATH).unwrap();
        assert_eq!(reloaded.pins_map(), store.pins_map());
    }

    #[test]
    fn schema_two_identities_are_case_normalized() {
        let text = r#"{"version": 2, "object": {"autoPin": false, "pins": [
            {"package": "Foo", "name": "Foo", "location": "https://example.com/Foo.git",
             "kind": "remoteSourceControl", "state": {"version": "1.0.0"}, "basedOn": "App"}
        ]}}"#;
        let fs: SharedFileSystem = Arc::new(InMemoryFileSystem::new().with_file(PINS_PATH, text));
        let mut store = PinsStore::load(fs, PINS_PATH).unwrap();

        let foo = PackageIdentity::new("foo");
        let pin = store.pin_for(&foo).unwrap();
        assert_eq!(pin.identity().as_str(), "foo");
        assert_eq!(pin.package.name, "Foo");
        assert_eq!(pin.based_on, Some(PackageIdentity::new("app")));

        store.unpin(&PackageIdentity::new("FOO")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn identities_colliding_after_normalization_are_rejected() {
        let text = r#"{"version": 2, "object": {"autoPin": false, "pins": [
            {"package": "Foo", "location": "https://example.com/Foo.git",
             "kind": "remoteSourceControl", "state": {"version": "1.0.0"}},
            {"package": "foo", "location": "https://example.com/foo.git",
             "kind": "remoteSourceControl", "state": {"version": "2.0.0"}}
        ]}}"#;
        let fs: SharedFileSystem = Arc::new(InMemoryFileSystem::new().with_file(PINS_PATH, text));
        let err = PinsStore::load(fs, PINS_PATH).err().unwrap();
        assert!(matches!(err, PkgStateError::MalformedDocument { .. }), "{err}");
    }

    #[test]
    fn load_failures() {
        let cases = [
            (r#"{"version": 3, "object": {}}"#, "unsupported"),
            (r#"{"autoPin": true, "pins": [{"package": "x"}]}"#, "malformed"),
            (
                r#"{"autoPin": true, "pins": [
                    {"package": "x", "repositoryURL": "u", "version": "one"}
                ]}"#,
                "malformed",
            ),
            ("{", "malformed"),
        ];
        for (text, expected) in cases {
            let fs: SharedFileSystem =
                Arc::new(InMemoryFileSystem::new().with_file(PINS_PATH, text));
            let err = PinsStore::load(fs, PINS_PATH).err().unwrap();
            match expected {
                "unsupported" => assert!(
                    matches!(err, PkgStateError::UnsupportedSchemaVersion { found: 3, .. }),
                    "{text}: {err}"
                ),
                _ => assert!(
                    matches!(err, PkgStateError::MalformedDocument { .. }),
                    "{text}: {err}"
                ),
            }
        }
    }

    #[test]
    fn failed_write_leaves_store_unchanged() {
        let fs: SharedFileSystem = Arc::new(InMemoryFileSystem::new().with_file("/ws", "a file"));
        // The parent of the pins file is a regular file, so every write fails.
        let mut store = PinsStore::load(fs, "/ws/Package.resolved").unwrap();
        assert!(store.pin(foo(), PinState::revision("abc"), None).is_err());
        assert!(store.is_empty());
        assert!(store.set_autopin(false).is_err());
        assert_eq!(store.mode(), PinMode::Auto);
    }

    #[test]
    fn replace_all_drops_stale_pins() {
        let (_, fs) = memory();
        let mut store = PinsStore::load(fs, PINS_PATH).unwrap();
        store.pin(foo(), PinState::revision("abc"), None).unwrap();
        let bar = PackageReference::remote("https://github.com/mona/bar.git");
        store
            .replace_all([Pin::new(bar, PinState::version(v("0.1.0")))])
            .unwrap();
        let names: Vec<&str> = store.pins().map(|p| p.identity().as_str()).collect();
        assert_eq!(names, vec!["bar"]);
    }
}
