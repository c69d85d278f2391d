//! Bundle test files with the esbuild CLI.
//!
//! The bundle is written to stdout and served as-is; esbuild's error report on stderr is parsed into
//! [`BuildMessage`]s so the harness server can return them as JSON.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Serialize;

use crate::cli::test_interfaces::{BundleError, Bundler};

/// Flags that make esbuild produce one self-contained ES module on stdout.
const BASE_ARGS: &[&str] = &[
    "--bundle",
    "--format=esm",
    "--sourcemap=inline",
    "--log-level=error",
    "--color=false",
];

/// One build error, shaped like esbuild's own JSON messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildMessage {
    pub text: String,
    pub location: Option<BuildLocation>,
}

impl BuildMessage {
    /// A message without a source location.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            location: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildLocation {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub line_text: String,
}

/// esbuild CLI invocation (current behavior).
#[derive(Debug, Clone)]
pub struct EsbuildBundler {
    program: PathBuf,
    root: PathBuf,
    args: Vec<String>,
}

impl EsbuildBundler {
    /// Create a bundler for `root`.
    ///
    /// ## Parameters
    /// - `root`: directory esbuild runs in; entries are relative to it.
    /// - `program`: explicit executable, otherwise `node_modules/.bin/esbuild` under `root`, otherwise `esbuild`.
    /// - `extra_args`: user arguments as one shell-quoted string.
    pub fn new(root: &Path, program: Option<PathBuf>, extra_args: &str) -> Result<Self, BundleError> {
        let args = shell_words::split(extra_args).map_err(|e| BundleError::InvalidArguments(e.to_string()))?;
        let program = program.unwrap_or_else(|| {
            let local = root.join("node_modules").join(".bin").join("esbuild");
            if local.is_file() { local } else { PathBuf::from("esbuild") }
        });
        Ok(Self {
            program,
            root: root.to_path_buf(),
            args,
        })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Bundler for EsbuildBundler {
    fn bundle(&self, entry: &Path) -> Result<Vec<u8>, BundleError> {
        let output = Command::new(&self.program)
            .current_dir(&self.root)
            .arg(entry)
            .args(BASE_ARGS)
            .args(&self.args)
            .output()
            .map_err(|source| BundleError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        if output.status.success() {
            return Ok(output.stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut messages = parse_build_errors(&stderr);
        if messages.is_empty() {
            let raw = stderr.trim();
            messages.push(BuildMessage::text(if raw.is_empty() {
                format!("esbuild exited with {}", output.status)
            } else {
                raw.to_string()
            }));
        }
        Err(BundleError::Build(messages))
    }
}

/// Parse esbuild's human-readable error report.
///
/// Each error starts with an `[ERROR]` header line and may be followed by a `file:line:column:` location line and
/// a gutter line (`1 │ source`) holding the offending source text. Notes and the trailing count are ignored.
pub fn parse_build_errors(stderr: &str) -> Vec<BuildMessage> {
    let mut messages: Vec<BuildMessage> = Vec::new();
    let mut expect_line_text = false;

    for line in stderr.lines() {
        let trimmed = line.trim();
        if let Some(text) = error_header(trimmed) {
            messages.push(BuildMessage::text(text));
            expect_line_text = false;
            continue;
        }
        let Some(current) = messages.last_mut() else {
            continue;
        };
        if current.location.is_none() {
            if let Some(location) = parse_location(trimmed) {
                current.location = Some(location);
                expect_line_text = true;
            }
        } else if expect_line_text {
            if let Some((_, source)) = trimmed.split_once('│') {
                if let Some(location) = current.location.as_mut() {
                    location.line_text = source.strip_prefix(' ').unwrap_or(source).to_string();
                }
                expect_line_text = false;
            }
        }
    }
    messages
}

fn error_header(line: &str) -> Option<&str> {
    let idx = line.find("[ERROR]")?;
    let lead = line[..idx].trim();
    if !(lead.is_empty() || lead == "✘" || lead == "X" || lead == "×") {
        return None;
    }
    Some(line[idx + "[ERROR]".len()..].trim())
}

fn parse_location(line: &str) -> Option<BuildLocation> {
    let body = line.strip_suffix(':')?;
    let mut parts = body.rsplitn(3, ':');
    let column = parts.next()?.parse().ok()?;
    let line_no = parts.next()?.parse().ok()?;
    let file = parts.next()?;
    if file.is_empty() || file.contains(' ') {
        return None;
    }
    Some(BuildLocation {
        file: file.to_string(),
        line: line_no,
        column,
        line_text: String::new(),
    })
}
