//! Artifact Scanner - finds package files in an output directory
//!
//! The scanner classifies the top level of a directory into primary
//! packages (`.nupkg`) and symbol companions (`.symbols.nupkg`), then
//! [`group_artifacts`] pairs each package with its companion.

use crate::artifacts::identity::split_identity;
use crate::core::error::PublishError;
use crate::core::traits::LocalPackage;
use crate::validation::VersionValidator;
use semver::Version;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

pub const SYMBOLS_SUFFIX: &str = ".symbols.nupkg";
pub const PACKAGE_SUFFIX: &str = ".nupkg";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArtifactKind {
    Primary,
    SymbolCompanion,
}

/// One package file found by [`scan`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactFile {
    /// Absolute path
    pub path: PathBuf,
    pub kind: ArtifactKind,
    /// Identifier parsed from the file name, suffix excluded
    pub package_id: String,
    /// Text after the identifier, e.g. `1.2.3-beta`
    pub version_text: Option<String>,
}

/// Case-insensitive suffix strip
fn strip_suffix_ignore_case<'a>(name: &'a str, suffix: &str) -> Option<&'a str> {
    let split = name.len().checked_sub(suffix.len())?;
    if !name.is_char_boundary(split) {
        return None;
    }
    let (stem, tail) = name.split_at(split);
    tail.eq_ignore_ascii_case(suffix).then_some(stem)
}

fn artifact(path: &Path, kind: ArtifactKind, stem: &str) -> ArtifactFile {
    let (package_id, version_text) = split_identity(stem);
    ArtifactFile {
        path: path.to_path_buf(),
        kind,
        package_id: package_id.to_string(),
        version_text: version_text.map(str::to_string),
    }
}

/// Scan the top level of `dir` for package files
///
/// Sub-directories are not entered. Files whose names end in neither
/// suffix are ignored. Each path appears at most once.
pub fn scan(dir: &Path) -> Result<Vec<ArtifactFile>, PublishError> {
    if !dir.is_dir() {
        return Err(PublishError::DirectoryNotFound {
            path: dir.to_path_buf(),
        });
    }
    let root = dir.canonicalize().map_err(|e| PublishError::io(dir, e))?;

    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut artifacts = Vec::new();

    for entry in WalkDir::new(&root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| PublishError::io(&root, std::io::Error::other(e)))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let Some(name) = entry.file_name().to_str() else {
            debug!("Skipping non UTF-8 file name: {}", path.display());
            continue;
        };

        // Symbols first: every `.symbols.nupkg` also ends with `.nupkg`
        if let Some(stem) = strip_suffix_ignore_case(name, SYMBOLS_SUFFIX) {
            if seen.insert(path.to_path_buf()) {
                artifacts.push(artifact(path, ArtifactKind::SymbolCompanion, stem));
            }
        }
        if let Some(stem) = strip_suffix_ignore_case(name, PACKAGE_SUFFIX) {
            if seen.insert(path.to_path_buf()) {
                artifacts.push(artifact(path, ArtifactKind::Primary, stem));
            }
        }
    }

    debug!(
        "Found {} package file(s) in {}",
        artifacts.len(),
        root.display()
    );

    Ok(artifacts)
}

/// A package file and its optional symbol companion, ready to push
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactGroup {
    pub package_id: String,
    pub version: Version,
    pub package: PathBuf,
    pub symbols: Option<PathBuf>,
}

#[derive(Default)]
struct Candidates<'a> {
    primaries: Vec<(Version, &'a ArtifactFile)>,
    symbols: Vec<(Version, &'a ArtifactFile)>,
}

/// Pair scanned files into push groups, ordered by package id
///
/// Ids are compared case-insensitively, as the feed does. For the project's
/// own package the file matching the declared version is chosen; for any
/// other id, the highest version present. The symbol companion must carry
/// the same version as the chosen package.
pub fn group_artifacts(
    artifacts: &[ArtifactFile],
    project: &LocalPackage,
) -> Result<Vec<ArtifactGroup>, PublishError> {
    let validator = VersionValidator::new();
    let mut by_id: BTreeMap<String, Candidates> = BTreeMap::new();

    for file in artifacts {
        let Some(version_text) = file.version_text.as_deref() else {
            warn!("No version in file name, skipping {}", file.path.display());
            continue;
        };
        let version = match validator.parse(version_text) {
            Ok(version) => version,
            Err(reason) => {
                warn!("Skipping {}: {}", file.path.display(), reason);
                continue;
            }
        };

        let candidates = by_id
            .entry(file.package_id.to_ascii_lowercase())
            .or_default();
        match file.kind {
            ArtifactKind::Primary => candidates.primaries.push((version, file)),
            ArtifactKind::SymbolCompanion => candidates.symbols.push((version, file)),
        }
    }

    let mut groups = Vec::new();
    let mut project_found = false;

    for (key, candidates) in by_id {
        let is_project = key.eq_ignore_ascii_case(&project.package_id);

        let chosen = if is_project {
            candidates
                .primaries
                .iter()
                .find(|(v, _)| v.cmp_precedence(&project.version) == Ordering::Equal)
        } else {
            candidates
                .primaries
                .iter()
                .max_by(|(a, _), (b, _)| a.cmp_precedence(b))
        };

        let Some((version, package)) = chosen else {
            if !is_project {
                for (_, orphan) in &candidates.symbols {
                    warn!(
                        "Symbol package without a matching package, skipping {}",
                        orphan.path.display()
                    );
                }
            }
            continue;
        };

        project_found |= is_project;

        let symbols = candidates
            .symbols
            .iter()
            .find(|(v, _)| v.cmp_precedence(version) == Ordering::Equal)
            .map(|(_, file)| file.path.clone());

        groups.push(ArtifactGroup {
            package_id: package.package_id.clone(),
            version: version.clone(),
            package: package.path.clone(),
            symbols,
        });
    }

    if !project_found {
        return Err(PublishError::ArtifactNotFound {
            path: project.output_path.join(format!(
                "{}.{}{}",
                project.package_id, project.version, PACKAGE_SUFFIX
            )),
        });
    }

    Ok(groups)
}
