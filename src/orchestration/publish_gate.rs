//! Publish Gate - decides whether a local package should be pushed
//!
//! The gate is a pure function over already-resolved inputs: the local
//! version, the latest remote version and the branch constraint.

use crate::core::config::NoRepositoryPolicy;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionReason {
    NewerVersionAvailable,
    NotNewer,
    BranchMismatch,
    NoRepository,
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NewerVersionAvailable => "local version is newer",
            Self::NotNewer => "local version is not newer than the feed",
            Self::BranchMismatch => "current branch is not the required branch",
            Self::NoRepository => "no git repository to check the branch against",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishDecision {
    pub should_publish: bool,
    pub reason: DecisionReason,
}

impl PublishDecision {
    fn publish() -> Self {
        Self {
            should_publish: true,
            reason: DecisionReason::NewerVersionAvailable,
        }
    }

    fn skip(reason: DecisionReason) -> Self {
        Self {
            should_publish: false,
            reason,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PublishGate {
    no_repository_policy: NoRepositoryPolicy,
}

impl PublishGate {
    pub fn new(no_repository_policy: NoRepositoryPolicy) -> Self {
        Self {
            no_repository_policy,
        }
    }

    /// Decide whether `local` should be pushed over `remote`
    ///
    /// `current_branch` is `None` when no repository encloses the project.
    /// A blank `required_branch` disables the branch check.
    pub fn decide(
        &self,
        local: &Version,
        remote: &Version,
        current_branch: Option<&str>,
        required_branch: Option<&str>,
    ) -> PublishDecision {
        if local.cmp_precedence(remote) != Ordering::Greater {
            return PublishDecision::skip(DecisionReason::NotNewer);
        }

        let Some(required) = required_branch.map(str::trim).filter(|b| !b.is_empty()) else {
            return PublishDecision::publish();
        };

        match current_branch {
            None => match self.no_repository_policy {
                NoRepositoryPolicy::Allow => PublishDecision::publish(),
                NoRepositoryPolicy::Block => PublishDecision::skip(DecisionReason::NoRepository),
            },
            Some(current) if same_branch(current.trim(), required) => PublishDecision::publish(),
            Some(_) => PublishDecision::skip(DecisionReason::BranchMismatch),
        }
    }
}

/// Case-insensitive branch name comparison
fn same_branch(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}
