//! Orchestration layer for package pushing
//!
//! The publish gate decides per package; the publisher drives a whole run.

pub mod package_publisher;
pub mod publish_gate;

// Re-export main types for convenience
pub use package_publisher::{
    GroupOutcome, GroupReport, PackagePublisher, PublishOptions, PublishReport,
};
pub use publish_gate::{DecisionReason, PublishDecision, PublishGate};
