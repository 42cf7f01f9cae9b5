pub mod artifacts;
pub mod core;
pub mod orchestration;
pub mod plugins;
pub mod security;
pub mod validation;

pub use artifacts::{ArtifactFile, ArtifactGroup, ArtifactKind, group_artifacts, parse_package_id, scan};
pub use core::*;
pub use orchestration::{
    DecisionReason, GroupOutcome, GroupReport, PackagePublisher, PublishDecision, PublishGate,
    PublishOptions, PublishReport,
};
pub use plugins::{CsprojReader, GitBranchResolver, NuGetFeed};
pub use security::{CommandError, SafeCommandExecutor};
pub use validation::VersionValidator;
