//! Package Publisher - Main orchestrator for pushing packages
//!
//! Manages the complete push workflow:
//! - Reading the project's declared package id, version and output path
//! - Scanning the output directory and pairing symbol packages
//! - Comparing each package against the feed through the publish gate
//! - Pushing, then deleting the pushed files
//!
//! Groups are processed one at a time. A failure in one group is reported
//! and the next group is attempted.

use crate::artifacts::{ArtifactGroup, group_artifacts, scan};
use crate::core::config::NoRepositoryPolicy;
use crate::core::error::PublishError;
use crate::core::traits::{BranchResolver, PackageFeed, ProjectReader, PushRequest};
use crate::orchestration::publish_gate::{DecisionReason, PublishGate};
use crate::validation::VersionValidator;
use semver::Version;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, error, info, warn};

/// Options for one run
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    /// Only push from this branch
    pub required_branch: Option<String>,

    /// Behaviour when a branch is required but no repository is found
    pub no_repository_policy: NoRepositoryPolicy,

    /// Decide only, never push or delete
    pub dry_run: bool,

    /// Network calls not finished by this instant fail with a timeout
    pub deadline: Option<Instant>,
}

/// What happened to one package group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupOutcome {
    Published { symbols_pushed: bool },
    WouldPublish,
    Skipped(DecisionReason),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct GroupReport {
    pub package_id: String,
    pub version: Version,
    /// Latest feed version, when the query succeeded
    pub remote_version: Option<Version>,
    pub outcome: GroupOutcome,
}

/// Report returned after a run
#[derive(Debug, Clone)]
pub struct PublishReport {
    /// Package declared by the project
    pub package_id: String,
    pub groups: Vec<GroupReport>,
    pub duration_ms: u64,
}

impl PublishReport {
    /// True when no group failed
    pub fn success(&self) -> bool {
        !self
            .groups
            .iter()
            .any(|g| matches!(g.outcome, GroupOutcome::Failed(_)))
    }

    pub fn published_count(&self) -> usize {
        self.groups
            .iter()
            .filter(|g| matches!(g.outcome, GroupOutcome::Published { .. }))
            .count()
    }
}

/// Main push orchestrator
pub struct PackagePublisher {
    reader: Arc<dyn ProjectReader>,
    feed: Arc<dyn PackageFeed>,
    branches: Arc<dyn BranchResolver>,
}

impl PackagePublisher {
    pub fn new(
        reader: Arc<dyn ProjectReader>,
        feed: Arc<dyn PackageFeed>,
        branches: Arc<dyn BranchResolver>,
    ) -> Self {
        Self {
            reader,
            feed,
            branches,
        }
    }

    /// Push every newer package found in the project's output directory
    ///
    /// Errors reading the project or scanning its output abort the run;
    /// errors for a single group are recorded in the report.
    pub async fn publish(
        &self,
        project_path: &Path,
        options: &PublishOptions,
    ) -> Result<PublishReport, PublishError> {
        let start_time = std::time::Instant::now();

        let project = self.reader.read_project(project_path).await?;
        info!(
            "Project {} declares {} {}",
            project.project_file.display(),
            project.package_id,
            project.version
        );

        let artifacts = scan(&project.output_path)?;
        let groups = group_artifacts(&artifacts, &project)?;

        let required_branch = options
            .required_branch
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty());

        let current_branch = match required_branch {
            Some(_) => {
                let start = project.project_file.parent().unwrap_or(project_path);
                let branch = self.branches.current_branch(start).await?;
                match &branch {
                    Some(name) => debug!("Current branch: {}", name),
                    None => warn!("No git repository found above {}", start.display()),
                }
                branch
            }
            None => None,
        };

        let gate = PublishGate::new(options.no_repository_policy);
        let mut reports = Vec::with_capacity(groups.len());

        for group in &groups {
            let mut remote_version = None;
            let outcome = match self
                .process_group(
                    group,
                    &gate,
                    current_branch.as_deref(),
                    required_branch,
                    options,
                    &mut remote_version,
                )
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("{}", e);
                    GroupOutcome::Failed(e.to_string())
                }
            };

            reports.push(GroupReport {
                package_id: group.package_id.clone(),
                version: group.version.clone(),
                remote_version,
                outcome,
            });
        }

        Ok(PublishReport {
            package_id: project.package_id,
            groups: reports,
            duration_ms: start_time.elapsed().as_millis() as u64,
        })
    }

    async fn process_group(
        &self,
        group: &ArtifactGroup,
        gate: &PublishGate,
        current_branch: Option<&str>,
        required_branch: Option<&str>,
        options: &PublishOptions,
        remote_version: &mut Option<Version>,
    ) -> Result<GroupOutcome, PublishError> {
        let latest = within_deadline(
            options.deadline,
            format!("querying {} for {}", self.feed.source(), group.package_id),
            self.feed.latest_version(&group.package_id),
        )
        .await?;

        let remote = latest.unwrap_or_else(VersionValidator::minimum);
        *remote_version = Some(remote.clone());

        let decision = gate.decide(&group.version, &remote, current_branch, required_branch);
        if !decision.should_publish {
            info!(
                "Skipping {} {} (feed has {}): {}",
                group.package_id, group.version, remote, decision.reason
            );
            return Ok(GroupOutcome::Skipped(decision.reason));
        }

        if options.dry_run {
            info!(
                "Would push {} {} (feed has {})",
                group.package_id, group.version, remote
            );
            return Ok(GroupOutcome::WouldPublish);
        }

        let request = PushRequest {
            package_id: group.package_id.clone(),
            version: group.version.clone(),
            package_path: group.package.clone(),
            symbols_path: group.symbols.clone(),
        };

        info!("Pushing {} {}", group.package_id, group.version);
        let result = within_deadline(
            options.deadline,
            format!("pushing {} {}", group.package_id, group.version),
            self.feed.push(&request),
        )
        .await?;

        // Both files go together: keep the pair while either is unpublished
        if group.symbols.is_some() && !result.symbols_pushed {
            return Err(PublishError::PushFailed {
                package_id: group.package_id.clone(),
                message: format!(
                    "{} was pushed but its symbol package was not; both files kept",
                    group.version
                ),
            });
        }

        remove_pushed(&group.package);
        if let Some(symbols) = &group.symbols {
            remove_pushed(symbols);
        }

        info!("Pushed {} {}", group.package_id, group.version);
        Ok(GroupOutcome::Published {
            symbols_pushed: result.symbols_pushed,
        })
    }
}

/// Await `fut`, failing with a timeout once `deadline` passes
async fn within_deadline<T, F>(
    deadline: Option<Instant>,
    operation: String,
    fut: F,
) -> Result<T, PublishError>
where
    F: Future<Output = Result<T, PublishError>>,
{
    match deadline {
        Some(deadline) => timeout_at(deadline, fut)
            .await
            .map_err(|_| PublishError::TimeoutError { operation })?,
        None => fut.await,
    }
}

fn remove_pushed(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Deleted {}", path.display()),
        Err(e) => warn!("Pushed but could not delete {}: {}", path.display(), e),
    }
}
