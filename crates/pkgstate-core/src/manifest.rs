//! The tools-version marker on the first line of a package manifest.
//!
//! ```text
//! // tools-version:5.9
//! ```
//!
//! The marker is matched case-insensitively with optional spaces after `//`.

use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use semver::Version;
use tracing::debug;

use crate::errors::{PkgStateError, PkgStateResult};
use crate::fs::FileSystem;

const MARKER_PREFIX: &str = "// tools-version:";

static MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^//\s*tools-version:(.*)$").unwrap());

static TOOLS_VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)\.(\d+)(?:\.(\d+))?\s*(?:;.*)?$").unwrap());

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ToolsVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl ToolsVersion {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse `major.minor[.patch]`. Anything after a `;` is ignored.
    pub fn parse(text: &str) -> PkgStateResult<Self> {
        let invalid = || PkgStateError::InvalidVersion(text.trim().to_string());
        let caps = TOOLS_VERSION_RE.captures(text).ok_or_else(invalid)?;
        let number = |i: usize| -> PkgStateResult<u64> {
            match caps.get(i) {
                Some(m) => m.as_str().parse().map_err(|_| invalid()),
                None => Ok(0),
            }
        };
        Ok(Self::new(number(1)?, number(2)?, number(3)?))
    }

    /// Version declared by the manifest's first line, if it has a marker.
    pub fn from_manifest(text: &str) -> PkgStateResult<Option<Self>> {
        let (line, _) = split_first_line(text);
        match MARKER_RE.captures(line.trim_end_matches('\r')) {
            Some(caps) => Self::parse(&caps[1]).map(Some),
            None => Ok(None),
        }
    }

    /// The canonical marker line, without a line terminator.
    pub fn marker(&self) -> String {
        format!("{MARKER_PREFIX}{self}")
    }
}

impl fmt::Display for ToolsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.patch == 0 {
            write!(f, "{}.{}", self.major, self.minor)
        } else {
            write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
        }
    }
}

impl From<&Version> for ToolsVersion {
    fn from(version: &Version) -> Self {
        Self::new(version.major, version.minor, version.patch)
    }
}

/// Split off the first line; the remainder starts after its `\n`.
fn split_first_line(text: &str) -> (&str, &str) {
    match text.split_once('\n') {
        Some((line, rest)) => (line, rest),
        None => (text, ""),
    }
}

/// Render `content` with its marker set to `version`. An existing marker line
/// is replaced; otherwise one is prepended. Everything else is kept as is.
pub fn with_version_marker(content: &str, version: &ToolsVersion) -> String {
    let (line, rest) = split_first_line(content);
    let eol = if line.ends_with('\r') { "\r\n" } else { "\n" };
    let marker = version.marker();
    if MARKER_RE.is_match(line.trim_end_matches('\r')) {
        format!("{marker}{eol}{rest}")
    } else {
        format!("{marker}\n{content}")
    }
}

/// Rewrite the marker of the manifest at `path` to declare `version`.
pub fn rewrite_version_marker(
    fs: &dyn FileSystem,
    path: &Path,
    version: &Version,
) -> PkgStateResult<()> {
    if fs.is_directory(path) {
        return Err(PkgStateError::IsADirectory(path.to_path_buf()));
    }
    let ancestors: Vec<&Path> = path
        .ancestors()
        .skip(1)
        .filter(|a| !a.as_os_str().is_empty())
        .collect();
    for ancestor in ancestors.into_iter().rev() {
        if fs.is_file(ancestor) {
            return Err(PkgStateError::NotADirectory(ancestor.to_path_buf()));
        }
    }
    if !fs.exists(path) {
        return Err(PkgStateError::NoSuchFileOrDirectory(path.to_path_buf()));
    }

    let content = fs.read_to_string(path)?;
    let tools_version = ToolsVersion::from(version);
    let updated = with_version_marker(&content, &tools_version);
    if updated != content {
        fs.write_atomic(path, updated.as_bytes())?;
    }
    debug!(path = %path.display(), %tools_version, "wrote tools-version marker");
    Ok(())
}
