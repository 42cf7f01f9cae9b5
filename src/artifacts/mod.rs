pub mod identity;
pub mod scanner;

pub use identity::{parse_package_id, split_identity};
pub use scanner::{ArtifactFile, ArtifactGroup, ArtifactKind, group_artifacts, scan};
