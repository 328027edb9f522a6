use std::path::Path;
use std::process::Command;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::SourceConfig;
use crate::traits::{TreeEntry, TreeSource};

/// Scan a GitHub repository's tree through the git trees API.
///
/// Workflow:
/// 1. Resolve the revision: configured value, else the local checkout's
///    `HEAD` commit, else the literal `HEAD`.
/// 2. `GET {api_base}/repos/{owner}/{repo}/git/trees/{revision}?recursive=1`.
/// 3. Return every tree node; filtering happens in
///    [`DocumentFilter`](crate::traits::DocumentFilter).
pub struct GitHubTreeSource {
    client: reqwest::Client,
    api_base: String,
    owner: String,
    repo: String,
    revision: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    #[serde(default)]
    sha: Option<String>,
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

impl GitHubTreeSource {
    pub fn new(config: &SourceConfig, timeout_secs: u64) -> Result<Self> {
        let revision = match &config.revision {
            Some(rev) if !rev.is_empty() => rev.clone(),
            _ => git_head_sha(Path::new(".")).unwrap_or_else(|_| "HEAD".to_string()),
        };

        let token = std::env::var(&config.token_env)
            .ok()
            .filter(|t| !t.is_empty());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("idx-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            owner: config.owner.clone(),
            repo: config.repo.clone(),
            revision,
            token,
        })
    }

    fn tree_url(&self) -> String {
        format!(
            "{}/repos/{}/{}/git/trees/{}?recursive=1",
            self.api_base, self.owner, self.repo, self.revision
        )
    }
}

#[async_trait]
impl TreeSource for GitHubTreeSource {
    fn describe(&self) -> String {
        format!("{}/{}@{}", self.owner, self.repo, self.revision)
    }

    async fn scan(&self) -> Result<Vec<TreeEntry>> {
        let url = self.tree_url();
        debug!(url = %url, "requesting tree");

        let mut request = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let resp = request
            .send()
            .await
            .with_context(|| format!("GitHub tree request failed: {}", url))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("GitHub API error {} for {}: {}", status, self.describe(), body.trim());
        }

        let parsed: TreeResponse = resp
            .json()
            .await
            .with_context(|| "Invalid GitHub tree response")?;

        if parsed.truncated {
            warn!(
                repo = %self.describe(),
                entries = parsed.tree.len(),
                "tree listing was truncated by GitHub; some documents will be skipped"
            );
        }
        debug!(
            sha = parsed.sha.as_deref().unwrap_or("unknown"),
            entries = parsed.tree.len(),
            "tree scanned"
        );

        Ok(parsed.tree)
    }
}

fn git_head_sha(repo_dir: &Path) -> Result<String> {
    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(repo_dir)
        .output()
        .with_context(|| "Failed to get HEAD SHA")?;

    if !output.status.success() {
        bail!("git rev-parse HEAD failed");
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_url_uses_configured_revision() {
        let config = SourceConfig {
            owner: "adobe".to_string(),
            repo: "helix-home".to_string(),
            revision: Some("main".to_string()),
            api_base: "https://api.github.com/".to_string(),
            ..SourceConfig::default()
        };
        let source = GitHubTreeSource::new(&config, 5).unwrap();
        assert_eq!(
            source.tree_url(),
            "https://api.github.com/repos/adobe/helix-home/git/trees/main?recursive=1"
        );
        assert_eq!(source.describe(), "adobe/helix-home@main");
    }

    #[test]
    fn parses_tree_response() {
        let body = r#"{
            "sha": "abc",
            "url": "https://api.github.com/...",
            "tree": [
                {"path": "index.md", "mode": "100644", "type": "blob", "sha": "1"},
                {"path": "docs", "mode": "040000", "type": "tree", "sha": "2"}
            ],
            "truncated": false
        }"#;
        let parsed: TreeResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.tree.len(), 2);
        assert!(parsed.tree[0].is_blob());
        assert!(!parsed.tree[1].is_blob());
        assert!(!parsed.truncated);
    }
}
