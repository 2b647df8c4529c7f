use anyhow::Context;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

const GITHUB_API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("image-uploader/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishItem {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub created: Vec<String>,
    pub updated: Vec<String>,
}

impl PublishReport {
    pub fn total(&self) -> usize {
        self.created.len() + self.updated.len()
    }
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, items: &[PublishItem]) -> anyhow::Result<PublishReport>;
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("GitHub publishing is not configured")]
    NotConfigured,
    #[error("invalid repository '{0}', expected owner/repo")]
    InvalidRepository(String),
    #[error("GitHub returned {status} for {path}: {body}")]
    Api {
        status: StatusCode,
        path: String,
        body: String,
    },
}

/// Used when no access token is configured.
pub struct DisabledPublisher;

#[async_trait]
impl Publisher for DisabledPublisher {
    async fn publish(&self, _items: &[PublishItem]) -> anyhow::Result<PublishReport> {
        Err(PublishError::NotConfigured.into())
    }
}

#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub api_url: String,
    pub repo: String,
    pub branch: String,
    pub path_prefix: String,
    pub token: String,
}

/// Accepts `owner/repo`, `owner/repo.git` or a github.com URL.
pub fn normalize_repo_slug(raw: &str) -> Result<String, PublishError> {
    let trimmed = raw.trim();
    let slug = ["https://github.com/", "http://github.com/", "git@github.com:"]
        .iter()
        .find_map(|prefix| trimmed.strip_prefix(prefix))
        .unwrap_or(trimmed)
        .trim_end_matches('/');
    let slug = slug.strip_suffix(".git").unwrap_or(slug);

    match slug.split_once('/') {
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
            Ok(format!("{owner}/{repo}"))
        }
        _ => Err(PublishError::InvalidRepository(raw.to_string())),
    }
}

/// Pushes images through the GitHub REST contents API, one commit per file.
pub struct GitHubPublisher {
    http: Client,
    api_url: String,
    repo: String,
    branch: String,
    path_prefix: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct ContentsEntry {
    sha: String,
}

#[derive(Debug, Serialize)]
struct PutContents<'a> {
    message: String,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<String>,
}

impl GitHubPublisher {
    pub fn new(config: GitHubConfig) -> Result<Self, PublishError> {
        if config.token.trim().is_empty() {
            return Err(PublishError::NotConfigured);
        }
        Ok(Self {
            http: Client::new(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            repo: normalize_repo_slug(&config.repo)?,
            branch: config.branch,
            path_prefix: config.path_prefix.trim_matches('/').to_string(),
            token: config.token,
        })
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    fn remote_path(&self, name: &str) -> String {
        if self.path_prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{name}", self.path_prefix)
        }
    }

    fn contents_url(&self, remote_path: &str) -> String {
        format!("{}/repos/{}/contents/{remote_path}", self.api_url, self.repo)
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .bearer_auth(&self.token)
            .header(header::ACCEPT, "application/vnd.github+json")
            .header(header::USER_AGENT, USER_AGENT)
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
    }

    async fn existing_sha(&self, remote_path: &str) -> anyhow::Result<Option<String>> {
        let response = self
            .request(self.http.get(self.contents_url(remote_path)))
            .query(&[("ref", self.branch.as_str())])
            .send()
            .await
            .with_context(|| format!("failed to look up {remote_path}"))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = ensure_success(response, remote_path).await?;
        let entry: ContentsEntry = response
            .json()
            .await
            .with_context(|| format!("unexpected contents reply for {remote_path}"))?;
        Ok(Some(entry.sha))
    }

    async fn put_file(
        &self,
        remote_path: &str,
        item: &PublishItem,
        sha: Option<String>,
    ) -> anyhow::Result<()> {
        let verb = if sha.is_some() { "Update" } else { "Add" };
        let body = PutContents {
            message: format!("{verb} image {}", item.name),
            content: STANDARD.encode(&item.bytes),
            branch: &self.branch,
            sha,
        };
        let response = self
            .request(self.http.put(self.contents_url(remote_path)))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("failed to upload {remote_path}"))?;
        ensure_success(response, remote_path).await?;
        Ok(())
    }
}

async fn ensure_success(
    response: reqwest::Response,
    path: &str,
) -> Result<reqwest::Response, PublishError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(PublishError::Api {
        status,
        path: path.to_string(),
        body,
    })
}

#[async_trait]
impl Publisher for GitHubPublisher {
    async fn publish(&self, items: &[PublishItem]) -> anyhow::Result<PublishReport> {
        let mut report = PublishReport::default();
        for item in items {
            let remote_path = self.remote_path(&item.name);
            match self.existing_sha(&remote_path).await? {
                Some(sha) => {
                    self.put_file(&remote_path, item, Some(sha)).await?;
                    info!(repo = %self.repo, path = %remote_path, "updated image in repository");
                    report.updated.push(item.name.clone());
                }
                None => {
                    self.put_file(&remote_path, item, None).await?;
                    info!(repo = %self.repo, path = %remote_path, "created image in repository");
                    report.created.push(item.name.clone());
                }
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
