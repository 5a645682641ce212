//! Review comments for violations and the line-oriented comments file.
//!
//! The `branches` command writes one comment per violation into a file of
//! `path|line|body` lines; the `comment` command reads that file back and
//! posts the comments onto a pull request. The file is the only contract
//! between the two, so a CI job can run them in separate steps.

use std::io::BufRead;

use anyhow::{Context, Result};
use tracing::warn;

use crate::analysis::ModuleAnalysis;

/// One comment anchored to a file and line of the audited repository.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileComment {
    /// Repository-relative path the comment anchors to.
    pub path: String,
    /// 1-based line number.
    pub line: usize,
    /// Human-readable comment body.
    pub body: String,
}

/// Builds one comment per violation, anchored at the require directive in
/// the manifest.
pub fn comments_for_violations(
    manifest_path: &str,
    violations: &[ModuleAnalysis],
) -> Vec<FileComment> {
    violations
        .iter()
        .map(|violation| {
            let body = if violation.branches.is_empty() {
                format!(
                    "not found any branch for version: {}",
                    violation.require.version
                )
            } else {
                format!(
                    "branch is {} for version: {}",
                    violation.branches.join(","),
                    violation.require.version
                )
            };
            FileComment {
                path: manifest_path.to_string(),
                line: violation.require.span.start_line,
                body,
            }
        })
        .collect()
}

/// Serializes comments into the `path|line|body` line format.
pub fn marshal(comments: &[FileComment]) -> String {
    comments
        .iter()
        .map(|comment| format!("{}|{}|{}\n", comment.path, comment.line, comment.body))
        .collect()
}

/// Parses a comments file. Lines with fewer than three segments are
/// logged and skipped; a non-numeric line number is an error.
pub fn unmarshal(reader: impl BufRead) -> Result<Vec<FileComment>> {
    let mut comments = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read comments file")?;
        if line.is_empty() {
            continue;
        }

        let mut segments = line.splitn(3, '|');
        let (Some(path), Some(line_no), Some(body)) =
            (segments.next(), segments.next(), segments.next())
        else {
            warn!("error format of line: {}", idx + 1);
            continue;
        };

        let line_no: usize = line_no
            .parse()
            .with_context(|| format!("invalid line number '{line_no}' at line {}", idx + 1))?;

        comments.push(FileComment {
            path: path.to_string(),
            line: line_no,
            body: body.to_string(),
        });
    }

    Ok(comments)
}
