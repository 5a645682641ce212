//! GitHub review-comment sink, backed by the pulls REST API.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::scm::{RefreshOptions, ReviewCommentSink};

const DEFAULT_API_BASE: &str = "https://api.github.com";
const PAGE_SIZE: usize = 100;

/// An existing pull-request review comment.
#[derive(Deserialize)]
struct PullComment {
    id: u64,
    body: String,
}

/// Request body for creating a review comment.
#[derive(Serialize)]
struct CreateComment<'a> {
    body: String,
    commit_id: &'a str,
    path: &'a str,
    line: usize,
    side: &'static str,
}

/// Review-comment sink for GitHub.
pub struct GithubSink {
    client: Client,
    token: String,
    api_base: String,
}

impl GithubSink {
    /// Creates a sink against api.github.com.
    pub fn new(token: &str) -> Self {
        Self::with_api_base(token, DEFAULT_API_BASE)
    }

    /// Creates a sink against a non-default API base (GitHub Enterprise,
    /// tests).
    pub fn with_api_base(token: &str, api_base: &str) -> Self {
        Self {
            client: Client::new(),
            token: token.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", concat!("gomod-branch-audit/", env!("CARGO_PKG_VERSION")))
    }

    async fn list_comments(&self, repo: &str, pr_id: u64) -> Result<Vec<PullComment>> {
        let mut comments = Vec::new();

        for page in 1.. {
            let url = format!(
                "{}/repos/{}/pulls/{}/comments?per_page={PAGE_SIZE}&page={page}",
                self.api_base, repo, pr_id
            );
            let response = self
                .request(reqwest::Method::GET, &url)
                .send()
                .await
                .context("Failed to list review comments")?;
            let batch: Vec<PullComment> = check(response)
                .await?
                .json()
                .await
                .context("Invalid review comment listing from GitHub")?;

            let last_page = batch.len() < PAGE_SIZE;
            comments.extend(batch);
            if last_page {
                break;
            }
        }

        Ok(comments)
    }
}

#[async_trait]
impl ReviewCommentSink for GithubSink {
    async fn refresh_review_comments(
        &self,
        repo: &str,
        pr_id: u64,
        opts: RefreshOptions,
    ) -> Result<()> {
        let marker = opts.marker();

        for comment in self.list_comments(repo, pr_id).await? {
            if !comment.body.contains(&marker) {
                continue;
            }
            debug!(id = comment.id, "deleting stale review comment");
            let url = format!(
                "{}/repos/{}/pulls/comments/{}",
                self.api_base, repo, comment.id
            );
            let response = self
                .request(reqwest::Method::DELETE, &url)
                .send()
                .await
                .context("Failed to delete review comment")?;
            check(response).await?;
        }

        for comment in &opts.comments {
            let url = format!("{}/repos/{}/pulls/{}/comments", self.api_base, repo, pr_id);
            let response = self
                .request(reqwest::Method::POST, &url)
                .json(&CreateComment {
                    body: comment.marked_body(&opts.comment_by),
                    commit_id: &opts.commit_id,
                    path: &comment.path,
                    line: comment.line,
                    side: "RIGHT",
                })
                .send()
                .await
                .context("Failed to create review comment")?;
            check(response).await?;
        }

        Ok(())
    }
}

/// Turns a non-2xx response into an error carrying the response text.
async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    anyhow::bail!("GitHub API request failed: HTTP {status}: {text}")
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::scm::ReviewComment;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn opts() -> RefreshOptions {
        RefreshOptions {
            comment_by: "gomod-branch-audit".to_string(),
            commit_id: "c2231e2".to_string(),
            comments: vec![ReviewComment {
                body: "branch is feat/x for version: v1".to_string(),
                path: "go.mod".to_string(),
                line: 9,
            }],
        }
    }

    #[tokio::test]
    async fn refresh_deletes_marked_comments_and_posts_new_ones() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/repos/example/app/pulls/8/comments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": 1, "body": "<!-- gomod-branch-audit -->\nold"},
                {"id": 2, "body": "someone else's comment"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("DELETE"))
            .and(path("/repos/example/app/pulls/comments/1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/repos/example/app/pulls/8/comments"))
            .and(body_partial_json(serde_json::json!({
                "path": "go.mod",
                "line": 9,
                "commit_id": "c2231e2",
                "side": "RIGHT"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": 3})))
            .expect(1)
            .mount(&server)
            .await;

        let sink = GithubSink::with_api_base("token", &server.uri());
        sink.refresh_review_comments("example/app", 8, opts())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn refresh_surfaces_api_failures() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/repos/example/app/pulls/8/comments"))
            .respond_with(ResponseTemplate::new(403).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let sink = GithubSink::with_api_base("token", &server.uri());
        let err = sink
            .refresh_review_comments("example/app", 8, opts())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("HTTP 403"));
    }
}
