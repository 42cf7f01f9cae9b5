//! Version Validator - Parses NuGet version strings into semver versions
//!
//! NuGet accepts a looser grammar than Semantic Versioning 2.0.0: one to
//! four numeric parts, leading zeros, and a case-insensitive prerelease
//! label. This module normalizes that grammar into [`semver::Version`] so
//! ordering follows SemVer precedence.
//!
//! # Example
//!
//! ```
//! use nuget_push::validation::version_validator::VersionValidator;
//!
//! let validator = VersionValidator::new();
//! let version = validator.parse("1.2").unwrap();
//!
//! assert_eq!(version, semver::Version::new(1, 2, 0));
//! ```

use semver::{BuildMetadata, Prerelease, Version};
use serde::{Deserialize, Serialize};

/// Result of version validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionValidationResult {
    /// Whether the text is a usable package version
    pub is_valid: bool,
    /// Validation error message (if any)
    pub error: Option<String>,
    /// Normalized version (e.g., "1.2.0" for "1.2")
    pub normalized: Option<String>,
    /// Pre-release label (e.g., "alpha.1")
    pub prerelease: Option<String>,
}

/// Validator for NuGet package versions
pub struct VersionValidator;

impl Default for VersionValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionValidator {
    pub fn new() -> Self {
        Self
    }

    /// Version used when a package has never been published
    pub fn minimum() -> Version {
        Version::new(0, 0, 0)
    }

    /// Parse a NuGet version string
    ///
    /// # Examples
    ///
    /// ```
    /// use nuget_push::validation::VersionValidator;
    ///
    /// let validator = VersionValidator::new();
    ///
    /// assert!(validator.parse("8.0.0-alpha").is_ok());
    /// assert!(validator.parse("1.2.3.0").is_ok());
    /// assert!(validator.parse("1.2.3.4").is_err());
    /// assert!(validator.parse("latest").is_err());
    /// ```
    pub fn parse(&self, version_str: &str) -> Result<Version, String> {
        let text = version_str.trim();
        if text.is_empty() {
            return Err("version is empty".to_string());
        }

        let (rest, build) = match text.split_once('+') {
            Some((rest, build)) => (rest, Some(build)),
            None => (text, None),
        };
        let (numbers, pre) = match rest.split_once('-') {
            Some((numbers, pre)) => (numbers, Some(pre)),
            None => (rest, None),
        };

        let parts: Vec<&str> = numbers.split('.').collect();
        if parts.len() > 4 {
            return Err(format!("too many numeric parts in '{}'", numbers));
        }

        let mut values = [0u64; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(format!("'{}' is not a number", part));
            }
            *slot = part
                .parse()
                .map_err(|e| format!("'{}' is out of range: {}", part, e))?;
        }

        if values[3] != 0 {
            return Err(format!(
                "four-part version '{}' with a non-zero revision is not supported",
                numbers
            ));
        }

        let mut version = Version::new(values[0], values[1], values[2]);

        if let Some(pre) = pre {
            version.pre =
                Prerelease::new(pre).map_err(|e| format!("invalid prerelease '{}': {}", pre, e))?;
            if version.pre.is_empty() {
                return Err("prerelease label is empty".to_string());
            }
        }
        if let Some(build) = build {
            version.build = BuildMetadata::new(build)
                .map_err(|e| format!("invalid build metadata '{}': {}", build, e))?;
        }

        Ok(version)
    }

    /// Validate a version string
    pub fn validate(&self, version_str: &str) -> VersionValidationResult {
        match self.parse(version_str) {
            Ok(version) => VersionValidationResult {
                is_valid: true,
                error: None,
                normalized: Some(version.to_string()),
                prerelease: if version.pre.is_empty() {
                    None
                } else {
                    Some(version.pre.to_string())
                },
            },
            Err(e) => VersionValidationResult {
                is_valid: false,
                error: Some(e),
                normalized: None,
                prerelease: None,
            },
        }
    }

    /// Check if version is a prerelease
    pub fn is_prerelease(&self, version: &Version) -> bool {
        !version.pre.is_empty()
    }
}
