//! Git branch lookup for the push branch check

use crate::core::config_loader::MAX_ASCENT;
use crate::core::error::PublishError;
use crate::core::traits::BranchResolver;
use crate::security::SafeCommandExecutor;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const GIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Branch name reported for a detached HEAD
pub const DETACHED_HEAD: &str = "HEAD";

/// Closest directory at or above `start` that contains `.git`
pub fn find_repository_root(start: &Path) -> Option<PathBuf> {
    let start = start
        .canonicalize()
        .unwrap_or_else(|_| start.to_path_buf());

    start
        .ancestors()
        .take(MAX_ASCENT)
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf)
}

/// Branch named by the contents of a `HEAD` file
pub fn parse_head(content: &str) -> String {
    match content.trim().strip_prefix("ref:") {
        Some(reference) => {
            let reference = reference.trim();
            reference
                .strip_prefix("refs/heads/")
                .unwrap_or(reference)
                .to_string()
        }
        None => DETACHED_HEAD.to_string(),
    }
}

/// Git directory for a repository root, following a `gitdir:` file
async fn git_dir(root: &Path) -> Result<PathBuf, PublishError> {
    let dot_git = root.join(".git");
    if dot_git.is_dir() {
        return Ok(dot_git);
    }

    let content = tokio::fs::read_to_string(&dot_git)
        .await
        .map_err(|e| PublishError::io(&dot_git, e))?;
    let target = content
        .lines()
        .find_map(|line| line.trim().strip_prefix("gitdir:"))
        .map(str::trim)
        .ok_or_else(|| PublishError::CommandError {
            message: format!("{} is not a gitdir file", dot_git.display()),
        })?;

    Ok(root.join(target))
}

/// Branch lookup using `git`, falling back to reading `HEAD`
pub struct GitBranchResolver {
    use_git_command: bool,
}

impl Default for GitBranchResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl GitBranchResolver {
    pub fn new() -> Self {
        Self {
            use_git_command: true,
        }
    }

    /// Read `HEAD` directly, never spawning `git`
    pub fn head_file_only() -> Self {
        Self {
            use_git_command: false,
        }
    }

    async fn branch_from_git(&self, root: &Path) -> Option<String> {
        let mut executor = SafeCommandExecutor::new(root).ok()?;
        executor.set_timeout(GIT_TIMEOUT);

        match executor
            .execute("git", &["rev-parse", "--abbrev-ref", "HEAD"])
            .await
        {
            Ok(output) if output.status.success() => {
                let branch = String::from_utf8_lossy(&output.stdout).trim().to_string();
                (!branch.is_empty()).then_some(branch)
            }
            Ok(output) => {
                debug!(
                    "git rev-parse failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                None
            }
            Err(e) => {
                debug!("git unavailable: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl BranchResolver for GitBranchResolver {
    async fn current_branch(&self, start: &Path) -> Result<Option<String>, PublishError> {
        let Some(root) = find_repository_root(start) else {
            return Ok(None);
        };
        debug!("Repository root: {}", root.display());

        if self.use_git_command {
            if let Some(branch) = self.branch_from_git(&root).await {
                return Ok(Some(branch));
            }
        }

        let head = git_dir(&root).await?.join("HEAD");
        let content = tokio::fs::read_to_string(&head)
            .await
            .map_err(|e| PublishError::io(&head, e))?;

        Ok(Some(parse_head(&content)))
    }
}
