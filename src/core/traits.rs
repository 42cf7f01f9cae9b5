//! Core traits and types for package pushing
//!
//! This module defines the seams between the push workflow and the outside
//! world: reading the project, talking to the feed, and looking up the
//! current branch.

use crate::core::error::PublishError;
use async_trait::async_trait;
use semver::Version;
use std::path::{Path, PathBuf};

// ============================================================================
// Project
// ============================================================================

/// Package identity declared by a project file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalPackage {
    pub project_file: PathBuf,
    pub package_id: String,
    pub version: Version,
    /// Absolute directory `dotnet pack` writes packages to
    pub output_path: PathBuf,
}

/// Reads the declared package id, version and output path of a project
#[async_trait]
pub trait ProjectReader: Send + Sync {
    async fn read_project(&self, project_path: &Path) -> Result<LocalPackage, PublishError>;
}

// ============================================================================
// Feed
// ============================================================================

/// One package (and optional symbol package) to upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRequest {
    pub package_id: String,
    pub version: Version,
    pub package_path: PathBuf,
    pub symbols_path: Option<PathBuf>,
}

/// Result of a successful push
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushResult {
    /// Whether the symbol package was uploaded as well
    pub symbols_pushed: bool,
}

/// Remote package feed
///
/// Implementations handle the feed protocol; the push workflow only asks
/// for the latest published version and hands over files to upload.
#[async_trait]
pub trait PackageFeed: Send + Sync {
    /// Feed location, for messages
    fn source(&self) -> &str;

    /// Latest published version of `package_id`, prereleases included.
    ///
    /// `None` when the package has never been published.
    async fn latest_version(&self, package_id: &str) -> Result<Option<Version>, PublishError>;

    /// Upload a package and, when present, its symbol package
    async fn push(&self, request: &PushRequest) -> Result<PushResult, PublishError>;
}

// ============================================================================
// Source control
// ============================================================================

/// Looks up the branch checked out in the repository enclosing a path
#[async_trait]
pub trait BranchResolver: Send + Sync {
    /// `Ok(None)` when no repository encloses `start`
    async fn current_branch(&self, start: &Path) -> Result<Option<String>, PublishError>;
}
