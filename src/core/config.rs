//! Configuration structures and types for nuget-push
//!
//! This module provides type-safe configuration management with serde support.
//! [`PushConfig`] is the partial, mergeable shape shared by the config file,
//! environment variables and CLI flags; [`PushSettings`] is the fully
//! resolved value threaded into a run.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default per-request push timeout
pub const DEFAULT_PUSH_TIMEOUT: Duration = Duration::from_secs(120);

/// What to do when a push branch is required but no repository encloses the project
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NoRepositoryPolicy {
    /// Skip the branch check and allow the push
    #[default]
    Allow,
    /// Refuse to push
    Block,
}

impl NoRepositoryPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "allow" => Some(Self::Allow),
            "block" => Some(Self::Block),
            _ => None,
        }
    }
}

/// Partial configuration (file, environment or CLI)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct PushConfig {
    /// Feed API key
    #[serde(skip_serializing_if = "Option::is_none", alias = "apiKey")]
    pub api_key: Option<String>,

    /// NuGet v3 service index URL
    #[serde(skip_serializing_if = "Option::is_none", alias = "feedUrl")]
    pub feed_url: Option<String>,

    /// Service index URL of a separate symbol feed (optional)
    #[serde(skip_serializing_if = "Option::is_none", alias = "symbolFeedUrl")]
    pub symbol_feed_url: Option<String>,

    /// Directory for the rolling log file
    #[serde(skip_serializing_if = "Option::is_none", alias = "logPath")]
    pub log_path: Option<PathBuf>,

    /// Only push from this branch (optional)
    #[serde(skip_serializing_if = "Option::is_none", alias = "pushFromBranch")]
    pub push_from_branch: Option<String>,

    /// Behaviour when a branch is required but no repository is found
    #[serde(skip_serializing_if = "Option::is_none", alias = "noRepositoryPolicy")]
    pub no_repository_policy: Option<NoRepositoryPolicy>,

    /// Per-request push timeout in seconds
    #[serde(skip_serializing_if = "Option::is_none", alias = "timeoutSeconds")]
    pub timeout_seconds: Option<u64>,
}

/// Fully resolved settings for one run
#[derive(Debug, Clone)]
pub struct PushSettings {
    /// API key (absent only for read-only runs)
    pub api_key: Option<SecretString>,
    pub feed_url: String,
    pub symbol_feed_url: Option<String>,
    pub log_path: PathBuf,
    pub push_from_branch: Option<String>,
    pub no_repository_policy: NoRepositoryPolicy,
    pub push_timeout: Duration,
    /// Config file that contributed to these settings, if any
    pub config_file: Option<PathBuf>,
}

impl PushSettings {
    /// Required branch, with blank values treated as absent
    pub fn required_branch(&self) -> Option<&str> {
        self.push_from_branch
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
    }
}
