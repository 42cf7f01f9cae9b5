//! Error handling for package pushing
//!
//! This module provides the error taxonomy for a push run with recovery
//! guidance, using the thiserror crate for ergonomic error handling.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for push operations
#[derive(Error, Debug)]
pub enum PublishError {
    // Discovery errors
    #[error("Directory does not exist: {}", path.display())]
    DirectoryNotFound { path: PathBuf },

    #[error("Couldn't find a .csproj file in {}", path.display())]
    NoProjectFound { path: PathBuf },

    #[error("Package file does not exist: {}", path.display())]
    ArtifactNotFound { path: PathBuf },

    // Configuration errors
    #[error("Missing required option: {option}")]
    MissingRequiredOption { option: &'static str },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("[{package_id}] Invalid version '{version}': {reason}")]
    InvalidVersion {
        package_id: String,
        version: String,
        reason: String,
    },

    // Feed errors
    #[error("[{package_id}] Feed query failed: {message}")]
    FeedError { package_id: String, message: String },

    #[error("Authentication with {feed} failed")]
    AuthenticationFailed { feed: String },

    #[error("[{package_id}] Version {version} is already published")]
    VersionConflict { package_id: String, version: String },

    #[error("[{package_id}] Push failed: {message}")]
    PushFailed { package_id: String, message: String },

    #[error("Timed out while {operation}")]
    TimeoutError { operation: String },

    // Local execution errors
    #[error("Command error: {message}")]
    CommandError { message: String },

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PublishError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Expected configuration problems, reported to the user without detail
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::MissingRequiredOption { .. } | Self::ConfigError(_)
        )
    }

    /// Errors that only abort the current package group, not the whole run
    pub fn is_group_scoped(&self) -> bool {
        matches!(
            self,
            Self::FeedError { .. }
                | Self::AuthenticationFailed { .. }
                | Self::VersionConflict { .. }
                | Self::PushFailed { .. }
                | Self::TimeoutError { .. }
        )
    }

    /// Get suggested actions for this error
    pub fn suggested_actions(&self) -> Vec<&'static str> {
        match self {
            Self::DirectoryNotFound { .. } => vec![
                "Build and pack the project before pushing",
                "Check PackageOutputPath in the project file",
            ],
            Self::NoProjectFound { .. } => {
                vec!["Pass the directory that contains the .csproj file"]
            }
            Self::ArtifactNotFound { .. } => vec![
                "Run `dotnet pack` for the declared version",
                "Check that --configuration matches the packed configuration",
            ],
            Self::MissingRequiredOption { .. } => vec![
                "Pass the value on the command line",
                "Set it in a nugetpush.json file in this or a parent directory",
                "Set the NUGETPUSH_* environment variable",
            ],
            Self::ConfigError(_) => vec!["Check nugetpush.json for syntax errors"],
            Self::InvalidVersion { .. } => {
                vec!["Use a version such as 1.2.3 or 1.2.3-beta"]
            }
            Self::FeedError { .. } => vec![
                "Check the feed URL",
                "Check your network connection",
            ],
            Self::AuthenticationFailed { .. } => vec![
                "Check the API key",
                "Check that the key is allowed to push this package id",
            ],
            Self::VersionConflict { .. } => vec!["Bump the version in the project file"],
            Self::PushFailed { .. } => vec![
                "Check the error message",
                "Check the feed status",
            ],
            Self::TimeoutError { .. } => vec!["Increase --timeout"],
            Self::CommandError { .. } => vec!["Check that git is installed and on PATH"],
            Self::Io { .. } => vec!["Check file permissions"],
        }
    }

    /// Get error code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::DirectoryNotFound { .. } => "DIRECTORY_NOT_FOUND",
            Self::NoProjectFound { .. } => "NO_PROJECT_FOUND",
            Self::ArtifactNotFound { .. } => "ARTIFACT_NOT_FOUND",
            Self::MissingRequiredOption { .. } => "MISSING_REQUIRED_OPTION",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::InvalidVersion { .. } => "INVALID_VERSION",
            Self::FeedError { .. } => "FEED_ERROR",
            Self::AuthenticationFailed { .. } => "AUTHENTICATION_FAILED",
            Self::VersionConflict { .. } => "VERSION_CONFLICT",
            Self::PushFailed { .. } => "PUSH_FAILED",
            Self::TimeoutError { .. } => "TIMEOUT_ERROR",
            Self::CommandError { .. } => "COMMAND_ERROR",
            Self::Io { .. } => "IO_ERROR",
        }
    }
}
