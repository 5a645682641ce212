//! Branches command — audits go.mod dependencies against their upstream
//! branches and reports the violations.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use crate::analysis::{self, AnalyzeOptions, BranchPolicy, BranchProbe, SystemGitCli};
use crate::comments;
use crate::manifest;
use crate::render::{self, OutputFormat};

/// Branches command options.
#[derive(Parser)]
pub struct BranchesCommand {
    /// Modules to audit, as a regex over module paths.
    #[arg(long = "module", default_value = "github.com/example/.*")]
    pub module_regex: String,

    /// Branches considered compliant, as a regex; modules whose pinned
    /// commit is on none of these branches are reported.
    #[arg(long = "branches-exclude", default_value = "(^main$|^release-.*$)")]
    pub branches_exclude: String,

    /// Directory containing go.mod.
    #[arg(short = 'd', long = "mod-dir", default_value = "./")]
    pub mod_dir: PathBuf,

    /// Output format for the violation report.
    #[arg(short = 'o', long = "out", value_enum, default_value = "json")]
    pub out: OutputFormat,

    /// Maximum number of repositories probed at once.
    #[arg(long, default_value_t = analysis::DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Abort probes still running after this many seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Also write one `path|line|comment` line per violation to this file,
    /// for the `comment` command to post.
    #[arg(long = "comments-file")]
    pub comments_file: Option<PathBuf>,
}

impl BranchesCommand {
    /// Executes the branches command.
    pub async fn execute(self) -> Result<()> {
        let manifest_path = self.mod_dir.join("go.mod");
        let contents = std::fs::read_to_string(&manifest_path)
            .with_context(|| format!("Failed to read {}", manifest_path.display()))?;

        let mod_file = manifest::parse_mod_file(&contents)
            .with_context(|| format!("Failed to parse {}", manifest_path.display()))?;
        let selected = manifest::match_modules(mod_file.require, &self.module_regex)
            .context("Failed to select modules")?;

        // Compile the policy before probing so a bad pattern fails fast.
        let policy =
            BranchPolicy::new(&self.branches_exclude).context("Failed to compile branch policy")?;

        let probe = Arc::new(BranchProbe::new(SystemGitCli::new()));
        let results = analysis::analyze(
            probe,
            selected,
            AnalyzeOptions {
                concurrency: self.concurrency,
                timeout: self.timeout.map(Duration::from_secs),
            },
        )
        .await;

        let violations = policy.filter_violations(results);
        render::render(&violations, self.out, &mut std::io::stdout().lock())?;

        if let Some(path) = &self.comments_file {
            let anchor = manifest_anchor(&manifest_path);
            let file_comments = comments::comments_for_violations(&anchor, &violations);
            std::fs::write(path, comments::marshal(&file_comments))
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }

        Ok(())
    }
}

/// The repository-relative path comments anchor to: the manifest path with
/// any leading `./` dropped.
fn manifest_anchor(manifest_path: &Path) -> String {
    manifest_path
        .strip_prefix("./")
        .unwrap_or(manifest_path)
        .display()
        .to_string()
}
