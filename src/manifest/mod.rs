//! go.mod manifest parsing and module selection.
//!
//! Only the pieces of the manifest this tool needs are parsed: the module
//! path and the `require` directives, with the line numbers each directive
//! occupies so violations can be anchored back to the file in review
//! comments.

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from parsing or selecting manifest entries.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// A require directive that is not a `<path> <version>` pair.
    #[error("malformed require directive at line {line}: '{text}'")]
    MalformedRequire {
        /// 1-based line number of the offending directive.
        line: usize,
        /// The directive text, trimmed.
        text: String,
    },
    /// A `require (` block that is never closed.
    #[error("unterminated require block starting at line {line}")]
    UnterminatedBlock {
        /// 1-based line number where the block opens.
        line: usize,
    },
    /// An invalid module selection pattern.
    #[error("invalid module pattern '{pattern}': {source}")]
    Pattern {
        /// The pattern as supplied, before anchoring.
        pattern: String,
        /// The regex compilation failure.
        #[source]
        source: regex::Error,
    },
}

/// Where a require directive sits in the manifest file.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SourceSpan {
    /// 1-based first line of the directive.
    pub start_line: usize,
    /// 1-based last line of the directive.
    pub end_line: usize,
}

/// One required module: a path/version pair pinned by the manifest.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ModuleRequire {
    /// Module path, e.g. `github.com/example/abc`.
    pub path: String,
    /// Pinned version, either a tag or a pseudo-version.
    pub version: String,
    /// Whether the directive carries an `// indirect` comment.
    #[serde(default)]
    pub indirect: bool,
    /// Location of the directive in the manifest.
    #[serde(default)]
    pub span: SourceSpan,
}

/// A parsed go.mod file.
#[derive(Debug, Default)]
pub struct ModFile {
    /// The declaring module's own path, when present.
    pub module: Option<String>,
    /// All require directives, in file order.
    pub require: Vec<ModuleRequire>,
}

/// Parses the require directives out of go.mod contents.
pub fn parse_mod_file(contents: &str) -> Result<ModFile, ManifestError> {
    let mut file = ModFile::default();
    let mut block_start: Option<usize> = None;

    for (idx, raw) in contents.lines().enumerate() {
        let line_no = idx + 1;

        // Comments may trail any directive; `// indirect` is meaningful.
        let (line, comment) = match raw.split_once("//") {
            Some((code, comment)) => (code.trim(), comment.trim()),
            None => (raw.trim(), ""),
        };
        if line.is_empty() {
            continue;
        }

        if block_start.is_some() {
            if line == ")" {
                block_start = None;
                continue;
            }
            file.require
                .push(parse_require(line, comment, line_no)?);
            continue;
        }

        if let Some(rest) = line.strip_prefix("module ") {
            file.module = Some(rest.trim().to_string());
        } else if line == "require (" {
            block_start = Some(line_no);
        } else if let Some(rest) = line.strip_prefix("require ") {
            file.require.push(parse_require(rest.trim(), comment, line_no)?);
        }
        // go, toolchain, replace, exclude and retract directives are not
        // needed for branch auditing and are skipped.
    }

    if let Some(line) = block_start {
        return Err(ManifestError::UnterminatedBlock { line });
    }

    Ok(file)
}

fn parse_require(text: &str, comment: &str, line_no: usize) -> Result<ModuleRequire, ManifestError> {
    let mut fields = text.split_whitespace();
    let (Some(path), Some(version), None) = (fields.next(), fields.next(), fields.next()) else {
        return Err(ManifestError::MalformedRequire {
            line: line_no,
            text: text.to_string(),
        });
    };

    Ok(ModuleRequire {
        path: path.to_string(),
        version: version.to_string(),
        indirect: comment == "indirect",
        span: SourceSpan {
            start_line: line_no,
            end_line: line_no,
        },
    })
}

/// Selects the requires whose module path matches `module_regex`.
///
/// The pattern is anchored to the full path the same way branch exclusion
/// patterns are; an empty pattern selects everything.
pub fn match_modules(
    requires: Vec<ModuleRequire>,
    module_regex: &str,
) -> Result<Vec<ModuleRequire>, ManifestError> {
    if module_regex.is_empty() {
        return Ok(requires);
    }

    let anchored = crate::analysis::policy::anchor_pattern(module_regex);
    let regex = Regex::new(&anchored).map_err(|source| ManifestError::Pattern {
        pattern: module_regex.to_string(),
        source,
    })?;

    Ok(requires
        .into_iter()
        .filter(|require| regex.is_match(&require.path))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODFILE: &str = "\
module github.com/example/app

go 1.19

require (
\tgithub.com/spf13/cobra v1.7.0
\tgithub.com/spf13/pflag v1.0.5
\tgithub.com/example/abc v1
)

require (
\tgithub.com/inconshreveable/mousetrap v1.1.0 // indirect
\tgithub.com/example/abc/def v1
)
";

    #[test]
    fn parses_require_blocks_with_line_numbers() {
        let file = parse_mod_file(MODFILE).unwrap();

        assert_eq!(file.module.as_deref(), Some("github.com/example/app"));
        assert_eq!(file.require.len(), 5);

        let cobra = &file.require[0];
        assert_eq!(cobra.path, "github.com/spf13/cobra");
        assert_eq!(cobra.version, "v1.7.0");
        assert!(!cobra.indirect);
        assert_eq!(cobra.span.start_line, 6);
        assert_eq!(cobra.span.end_line, 6);

        let mousetrap = &file.require[3];
        assert_eq!(mousetrap.path, "github.com/inconshreveable/mousetrap");
        assert!(mousetrap.indirect);
        assert_eq!(mousetrap.span.start_line, 12);
    }

    #[test]
    fn parses_single_line_require() {
        let file = parse_mod_file("module m\n\nrequire example.com/a v1.2.3\n").unwrap();
        assert_eq!(file.require.len(), 1);
        assert_eq!(file.require[0].path, "example.com/a");
        assert_eq!(file.require[0].version, "v1.2.3");
        assert_eq!(file.require[0].span.start_line, 3);
    }

    #[test]
    fn rejects_malformed_require() {
        let err = parse_mod_file("require (\n\tgithub.com/example/abc\n)\n").unwrap_err();
        assert!(matches!(err, ManifestError::MalformedRequire { line: 2, .. }));
    }

    #[test]
    fn rejects_unterminated_block() {
        let err = parse_mod_file("require (\n\texample.com/a v1\n").unwrap_err();
        assert!(matches!(err, ManifestError::UnterminatedBlock { line: 1 }));
    }

    #[test]
    fn matches_modules_by_anchored_pattern() {
        let file = parse_mod_file(MODFILE).unwrap();
        let matched = match_modules(file.require, "github.com/example/.*").unwrap();

        assert_eq!(matched.len(), 2);
        assert_eq!(matched[0].path, "github.com/example/abc");
        assert_eq!(matched[1].path, "github.com/example/abc/def");
    }

    #[test]
    fn empty_pattern_selects_everything() {
        let file = parse_mod_file(MODFILE).unwrap();
        let matched = match_modules(file.require, "").unwrap();
        assert_eq!(matched.len(), 5);
    }

    #[test]
    fn module_pattern_is_anchored() {
        let file = parse_mod_file("require (\n\texample.com/a v1\n\texample.com/ab v1\n)\n").unwrap();
        let matched = match_modules(file.require, "example.com/a").unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].path, "example.com/a");
    }

    #[test]
    fn invalid_module_pattern_is_an_error() {
        let err = match_modules(Vec::new(), "[").unwrap_err();
        assert!(matches!(err, ManifestError::Pattern { .. }));
    }
}
