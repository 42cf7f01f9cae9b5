//! Csproj Reader - reads the package identity declared by an SDK-style project
//!
//! This module provides a lightweight MSBuild property reader:
//! - `.csproj` detection (a directory or a direct file path)
//! - `PackageId`, version and `PackageOutputPath` extraction
//! - `$(Property)` expansion from the project's own properties
//!
//! Only `PropertyGroup` children are read. A `Condition` is honoured when it
//! compares `$(Configuration)` with a literal; any other condition excludes
//! the property. Imports and `Directory.Build.props` are not evaluated.

use crate::core::error::PublishError;
use crate::core::traits::{LocalPackage, ProjectReader};
use crate::validation::VersionValidator;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

pub const DEFAULT_CONFIGURATION: &str = "Debug";
const DEFAULT_VERSION: &str = "1.0.0";
const MAX_EXPANSION_PASSES: usize = 8;

lazy_static! {
    static ref COMMENT: Regex = Regex::new(r"(?s)<!--.*?-->").unwrap();
    static ref EMPTY_GROUP: Regex = Regex::new(r"<PropertyGroup\b[^>]*/>").unwrap();
    static ref PROPERTY_GROUP: Regex =
        Regex::new(r"(?s)<PropertyGroup(\s[^>]*)?>(.*?)</PropertyGroup\s*>").unwrap();
    static ref CONDITION: Regex = Regex::new(r#"Condition\s*=\s*"([^"]*)""#).unwrap();
    static ref CONFIGURATION_TEST: Regex =
        Regex::new(r"^\s*'\$\(Configuration\)'\s*==\s*'([^']*)'\s*$").unwrap();
    static ref PROPERTY: Regex =
        Regex::new(r"<([A-Za-z_][\w.-]*)(\s[^>]*)?>([^<]*)</([A-Za-z_][\w.-]*)\s*>").unwrap();
    static ref REFERENCE: Regex = Regex::new(r"\$\(([A-Za-z_][\w.-]*)\)").unwrap();
}

/// Project reader for `.csproj` files
pub struct CsprojReader {
    configuration: String,
}

impl Default for CsprojReader {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIGURATION)
    }
}

impl CsprojReader {
    /// Create a reader for a build configuration (`Debug`, `Release`, ...)
    pub fn new(configuration: impl Into<String>) -> Self {
        Self {
            configuration: configuration.into(),
        }
    }

    /// Resolve `project_path` to a `.csproj` file
    ///
    /// A directory yields its first `.csproj` by name (top level only).
    pub async fn find_project_file(&self, project_path: &Path) -> Result<PathBuf, PublishError> {
        let metadata = fs::metadata(project_path).await.map_err(|_| {
            PublishError::DirectoryNotFound {
                path: project_path.to_path_buf(),
            }
        })?;

        if metadata.is_file() {
            return if is_csproj(project_path) {
                Ok(project_path.to_path_buf())
            } else {
                Err(PublishError::NoProjectFound {
                    path: project_path.to_path_buf(),
                })
            };
        }

        let mut entries = fs::read_dir(project_path)
            .await
            .map_err(|e| PublishError::io(project_path, e))?;
        let mut projects = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PublishError::io(project_path, e))?
        {
            let path = entry.path();
            if is_csproj(&path) && path.is_file() {
                projects.push(path);
            }
        }

        projects.sort();
        projects
            .into_iter()
            .next()
            .ok_or_else(|| PublishError::NoProjectFound {
                path: project_path.to_path_buf(),
            })
    }
}

fn is_csproj(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csproj"))
}

fn decode_entities(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Whether an element's attributes leave it active for `configuration`
fn condition_holds(attrs: Option<&str>, configuration: &str) -> bool {
    let Some(attrs) = attrs.filter(|a| a.contains("Condition")) else {
        return true;
    };
    CONDITION
        .captures(attrs)
        .and_then(|caps| CONFIGURATION_TEST.captures(&caps[1]).map(|c| c[1].to_string()))
        .is_some_and(|expected| expected.eq_ignore_ascii_case(configuration))
}

/// Active `PropertyGroup` properties, keyed by lower-case name (last one wins)
pub fn parse_properties(xml: &str, configuration: &str) -> HashMap<String, String> {
    let xml = COMMENT.replace_all(xml, "");
    let xml = EMPTY_GROUP.replace_all(&xml, "");
    let mut properties = HashMap::new();

    for group in PROPERTY_GROUP.captures_iter(&xml) {
        if !condition_holds(group.get(1).map(|m| m.as_str()), configuration) {
            continue;
        }

        for caps in PROPERTY.captures_iter(&group[2]) {
            if caps[1] != caps[4] {
                continue;
            }
            if !condition_holds(caps.get(2).map(|m| m.as_str()), configuration) {
                continue;
            }
            properties.insert(caps[1].to_ascii_lowercase(), decode_entities(caps[3].trim()));
        }
    }

    properties
}

/// Expand `$(Name)` references; unknown properties expand to nothing
pub fn expand(value: &str, properties: &HashMap<String, String>) -> String {
    let mut current = value.to_string();
    for _ in 0..MAX_EXPANSION_PASSES {
        if !REFERENCE.is_match(&current) {
            break;
        }
        current = REFERENCE
            .replace_all(&current, |caps: &Captures| {
                properties
                    .get(&caps[1].to_ascii_lowercase())
                    .cloned()
                    .unwrap_or_default()
            })
            .into_owned();
    }
    current
}

#[async_trait]
impl ProjectReader for CsprojReader {
    async fn read_project(&self, project_path: &Path) -> Result<LocalPackage, PublishError> {
        let project_file = self.find_project_file(project_path).await?;
        let project_file = project_file
            .canonicalize()
            .map_err(|e| PublishError::io(&project_file, e))?;
        let project_dir = project_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let project_name = project_file
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();

        let xml = fs::read_to_string(&project_file)
            .await
            .map_err(|e| PublishError::io(&project_file, e))?;

        let mut properties = parse_properties(&xml, &self.configuration);
        // Global properties take precedence over the project's own
        properties.insert("configuration".to_string(), self.configuration.clone());
        properties.insert("msbuildprojectname".to_string(), project_name.clone());
        properties.insert(
            "msbuildprojectdirectory".to_string(),
            project_dir.to_string_lossy().into_owned(),
        );

        let get = |name: &str| {
            properties
                .get(&name.to_ascii_lowercase())
                .map(|v| expand(v, &properties))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let package_id = get("PackageId")
            .or_else(|| get("AssemblyName"))
            .unwrap_or_else(|| project_name.clone());

        let version_text = get("PackageVersion")
            .or_else(|| get("Version"))
            .or_else(|| {
                get("VersionPrefix").map(|prefix| match get("VersionSuffix") {
                    Some(suffix) => format!("{}-{}", prefix, suffix),
                    None => prefix,
                })
            })
            .unwrap_or_else(|| DEFAULT_VERSION.to_string());

        let version = VersionValidator::new()
            .parse(&version_text)
            .map_err(|reason| PublishError::InvalidVersion {
                package_id: package_id.clone(),
                version: version_text.clone(),
                reason,
            })?;

        let output = get("PackageOutputPath")
            .unwrap_or_else(|| format!("bin/{}/", self.configuration))
            .replace('\\', "/");
        let output = PathBuf::from(output);
        let output_path = if output.is_absolute() {
            output
        } else {
            project_dir.join(output)
        };

        debug!(
            "Read {}: {} {} -> {}",
            project_file.display(),
            package_id,
            version,
            output_path.display()
        );

        Ok(LocalPackage {
            project_file,
            package_id,
            version,
            output_path,
        })
    }
}
