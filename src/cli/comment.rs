//! Comment command — posts the violations recorded in a comments file as
//! review comments on a pull request, replacing the ones from earlier
//! runs.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use url::Url;

use crate::comments;
use crate::scm::{self, RefreshOptions, ReviewComment};

/// Name embedded in the marker of every posted comment.
const COMMENT_BY: &str = "gomod-branch-audit";

/// Comment command options.
#[derive(Parser)]
pub struct CommentCommand {
    /// Repository address, e.g. https://github.com/example/app
    #[arg(long = "repo")]
    pub repository: String,

    /// Comments file written by `branches --comments-file`; one
    /// `path|line|comment` per line.
    #[arg(long, default_value = "./comments")]
    pub file: PathBuf,

    /// Git server type (github or gitlab). Inferred from the repository
    /// address when omitted: addresses containing "gitlab" go to gitlab.
    #[arg(long = "server-type")]
    pub server_type: Option<String>,

    /// Head commit of the pull request branch.
    #[arg(long = "commit-id")]
    pub commit_id: String,

    /// Pull request id.
    #[arg(long = "pr-id")]
    pub pr_id: u64,
}

impl CommentCommand {
    /// Executes the comment command.
    pub async fn execute(self) -> Result<()> {
        let url = Url::parse(&self.repository)
            .with_context(|| format!("Invalid repository address '{}'", self.repository))?;
        let host = url.host_str().context("Repository address has no host")?;

        let base_url = match url.port() {
            Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
            None => format!("{}://{}", url.scheme(), host),
        };
        let repo = url
            .path()
            .trim_start_matches('/')
            .trim_end_matches('/')
            .trim_end_matches(".git")
            .to_string();

        let server_type = match &self.server_type {
            Some(explicit) => explicit.clone(),
            None if self.repository.to_lowercase().contains("gitlab") => "gitlab".to_string(),
            None => "github".to_string(),
        };

        let token = std::env::var("TOKEN")
            .context("should provide private access token by env: TOKEN")?;

        let sink = scm::new_sink(&server_type, &base_url, &token)?;

        let file = File::open(&self.file)
            .with_context(|| format!("Failed to open {}", self.file.display()))?;
        let file_comments = comments::unmarshal(BufReader::new(file))?;

        sink.refresh_review_comments(
            &repo,
            self.pr_id,
            RefreshOptions {
                comment_by: COMMENT_BY.to_string(),
                commit_id: self.commit_id,
                comments: file_comments
                    .into_iter()
                    .map(|comment| ReviewComment {
                        body: comment.body,
                        path: comment.path,
                        line: comment.line,
                    })
                    .collect(),
            },
        )
        .await
    }
}
