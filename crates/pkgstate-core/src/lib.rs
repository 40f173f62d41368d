//! pkgstate core library: the persisted state and configuration of a source
//! package manager workspace.
//!
//! The crate owns the on-disk stores a workspace reads and writes between
//! runs: the lockfile of pinned dependency versions, mirror configuration at
//! workspace and user level, the snapshot of managed checkouts and artifacts,
//! netrc-style credentials with the authorization chain built on them, and the
//! tools-version marker at the top of a package manifest.
//!
//! All file access goes through [`fs::FileSystem`], so every store works the
//! same against the real disk and against [`fs::InMemoryFileSystem`].

pub mod auth;
pub mod config;
pub mod errors;
pub mod fs;
pub mod manifest;
pub mod models;
pub mod store;
pub mod workspace;

pub use errors::{PkgStateError, PkgStateResult};
pub use fs::{FileSystem, InMemoryFileSystem, LocalFileSystem, SharedFileSystem};
pub use models::{LocationKind, PackageIdentity, PackageReference, RepositoryLocation};
pub use workspace::{ResolvedPackage, Workspace};
