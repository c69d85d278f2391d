//! Discover test files under the root directory.
//!
//! Each include pattern is walked on the blocking pool from its literal base directory (`tests/**/*.js` only walks
//! `tests/`). Excluded directories are pruned, excluded files skipped. The per-pattern results are merged,
//! de-duplicated and sorted so overlapping patterns never produce the same job twice.

use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher, GlobSet, GlobSetBuilder};
use qutest_core::merge;
use walkdir::WalkDir;

use crate::cli::test_interfaces::DiscoveryError;

/// Find test files.
///
/// ## Parameters
/// - `root`: directory patterns are relative to.
/// - `include`: globs selecting files.
/// - `exclude`: globs removing files, or whole directories when they match one.
///
/// ## Returns
/// - (`Vec<String>`): sorted, unique, root-relative paths using `/` separators.
pub async fn discover(root: &Path, include: &[String], exclude: &[String]) -> Result<Vec<String>, DiscoveryError> {
    std::fs::metadata(root).map_err(|source| DiscoveryError::Root {
        path: root.to_path_buf(),
        source,
    })?;

    let excludes = build_set(exclude)?;
    let mut walks = tokio::task::JoinSet::new();
    for pattern in include {
        let matcher = compile("include", pattern)?;
        let base = literal_base(pattern);
        let root = root.to_path_buf();
        let excludes = excludes.clone();
        walks.spawn_blocking(move || walk_pattern(&root, &base, &matcher, &excludes));
    }

    let mut per_pattern = Vec::with_capacity(include.len());
    while let Some(joined) = walks.join_next().await {
        per_pattern.push(joined??);
    }

    let mut paths = merge(per_pattern);
    paths.sort();
    paths.dedup();
    tracing::debug!(count = paths.len(), "discovered test files");
    Ok(paths)
}

fn compile(kind: &'static str, pattern: &str) -> Result<GlobMatcher, DiscoveryError> {
    glob(kind, pattern).map(|g| g.compile_matcher())
}

fn glob(kind: &'static str, pattern: &str) -> Result<globset::Glob, DiscoveryError> {
    GlobBuilder::new(&normalize(pattern))
        .literal_separator(true)
        .build()
        .map_err(|source| DiscoveryError::InvalidPattern {
            kind,
            pattern: pattern.to_string(),
            source,
        })
}

/// Compile exclude patterns into one set.
pub(crate) fn build_set(patterns: &[String]) -> Result<GlobSet, DiscoveryError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(glob("exclude", pattern)?);
    }
    builder.build().map_err(|source| DiscoveryError::InvalidPattern {
        kind: "exclude",
        pattern: patterns.join(", "),
        source,
    })
}

fn normalize(pattern: &str) -> String {
    let pattern = pattern.replace('\\', "/");
    pattern.strip_prefix("./").unwrap_or(&pattern).to_string()
}

/// The leading directories of a pattern that contain no glob syntax.
fn literal_base(pattern: &str) -> PathBuf {
    let pattern = normalize(pattern);
    let components: Vec<&str> = pattern.split('/').collect();
    let mut base = PathBuf::new();
    // The last component names files, so it never becomes part of the base.
    for component in &components[..components.len().saturating_sub(1)] {
        if component.contains(['*', '?', '[', '{']) {
            break;
        }
        base.push(component);
    }
    base
}

fn walk_pattern(
    root: &Path,
    base: &Path,
    matcher: &GlobMatcher,
    excludes: &GlobSet,
) -> Result<Vec<String>, DiscoveryError> {
    let start = root.join(base);
    if !start.exists() {
        return Ok(Vec::new());
    }

    let walker = WalkDir::new(&start)
        .follow_links(true)
        .into_iter()
        .filter_entry(|entry| match relative(root, entry.path()) {
            Some(rel) => rel.is_empty() || !excludes.is_match(&rel),
            None => true,
        });

    let mut matches = Vec::new();
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(rel) = relative(root, entry.path()) else {
            continue;
        };
        if matcher.is_match(&rel) {
            matches.push(rel);
        }
    }
    Ok(matches)
}

/// `path` relative to `root`, with `/` separators.
pub(crate) fn relative(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = rel.components().map(|c| c.as_os_str().to_string_lossy()).collect();
    Some(parts.join("/"))
}
