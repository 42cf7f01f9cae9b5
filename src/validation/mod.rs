pub mod version_validator;

pub use version_validator::{VersionValidationResult, VersionValidator};
