use super::{ContentSource, SourceEntry, SourceItem, SourceKind};
use crate::config::RepositoryConfig;
use crate::error::{ChunkdexError, Result};
use crate::ingest::FileTimes;
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::time::Duration;

/// Entry of a GitHub contents listing
#[derive(Debug, Deserialize)]
struct ContentsEntry {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    size: u64,
    url: String,
    html_url: Option<String>,
}

/// File payload of the GitHub contents API
#[derive(Debug, Deserialize)]
struct FilePayload {
    #[serde(default)]
    content: String,
    encoding: Option<String>,
}

/// Code files of a GitHub repository, read through the contents API
pub struct GitHubSource {
    kind: SourceKind,
    client: Client,
    api_base: String,
    owner: String,
    repo: String,
    token: String,
    extensions: BTreeSet<String>,
    excluded_dirs: BTreeSet<String>,
}

/// Split `https://github.com/owner/repo[.git]` or `owner/repo` into its parts.
pub fn parse_repo_locator(locator: &str) -> Result<(String, String)> {
    let trimmed = locator.trim().trim_end_matches('/');
    let path = match url::Url::parse(trimmed) {
        Ok(url) => url.path().trim_matches('/').to_string(),
        Err(_) => trimmed.to_string(),
    };

    let mut parts = path.split('/').filter(|p| !p.is_empty());
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(repo), None) => {
            Ok((owner.to_string(), repo.trim_end_matches(".git").to_string()))
        }
        _ => Err(ChunkdexError::InvalidInput(format!(
            "Expected a repository as owner/repo or https://github.com/owner/repo, got '{}'",
            locator
        ))),
    }
}

impl GitHubSource {
    pub fn new(repo_url: &str, token: String, config: &RepositoryConfig) -> Result<Self> {
        let (owner, repo) = parse_repo_locator(repo_url)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("chunkdex/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ChunkdexError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            kind: SourceKind::Repository {
                url: repo_url.to_string(),
            },
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            owner,
            repo,
            token,
            extensions: config
                .supported_extensions
                .iter()
                .map(|e| e.to_lowercase())
                .collect(),
            excluded_dirs: config.excluded_dirs.clone(),
        })
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_base, self.owner, self.repo, path
        )
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str, locator: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
            .send()
            .await
            .map_err(|e| ChunkdexError::fetch(locator, format!("Network error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(ChunkdexError::fetch(
                locator,
                format!("GitHub API error {}: {}", status, body),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| ChunkdexError::fetch(locator, format!("Failed to parse response: {}", e)))
    }

    fn is_supported(&self, name: &str) -> bool {
        std::path::Path::new(name)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
            .map(|ext| self.extensions.contains(&ext))
            .unwrap_or(false)
    }
}

#[async_trait]
impl ContentSource for GitHubSource {
    fn kind(&self) -> &SourceKind {
        &self.kind
    }

    /// Walk the repository tree with an explicit worklist of directories.
    ///
    /// The root listing must succeed; a failing sub-directory is logged and
    /// skipped.
    async fn list(&self) -> Result<Vec<SourceEntry>> {
        let mut files = Vec::new();
        let mut pending: Vec<String> = vec![String::new()];

        while let Some(dir) = pending.pop() {
            let locator = if dir.is_empty() { "/" } else { dir.as_str() };
            let listing: Vec<ContentsEntry> = match self.get_json(&self.contents_url(&dir), locator).await {
                Ok(listing) => listing,
                Err(e) if dir.is_empty() => return Err(e),
                Err(e) => {
                    log::error!("Listing failed, skipping directory: {}", e);
                    continue;
                }
            };

            let mut subdirs = Vec::new();
            for entry in listing {
                match entry.kind.as_str() {
                    "file" if self.is_supported(&entry.name) => files.push(SourceEntry {
                        path: entry.path,
                        size: entry.size,
                        url: Some(entry.url),
                        html_url: entry.html_url,
                        absolute_path: None,
                    }),
                    "dir" if !self.excluded_dirs.contains(&entry.name) => subdirs.push(entry.path),
                    _ => {}
                }
            }
            // Reverse so directories pop in listing order
            pending.extend(subdirs.into_iter().rev());
        }

        log::info!(
            "Discovered {} files in {}/{}",
            files.len(),
            self.owner,
            self.repo
        );
        Ok(files)
    }

    async fn fetch(&self, entry: &SourceEntry) -> Result<SourceItem> {
        let url = entry
            .url
            .clone()
            .unwrap_or_else(|| self.contents_url(&entry.path));

        let payload: FilePayload = self.get_json(&url, &entry.path).await?;

        let content = match payload.encoding.as_deref() {
            Some("base64") => {
                let compact: String = payload
                    .content
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .collect();
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(compact.as_bytes())
                    .map_err(|e| ChunkdexError::fetch(&entry.path, format!("Invalid base64 payload: {}", e)))?;
                String::from_utf8(bytes).map_err(|_| ChunkdexError::Decode {
                    locator: entry.path.clone(),
                    attempted: "UTF-8".to_string(),
                })?
            }
            _ => payload.content,
        };

        Ok(SourceItem {
            entry: entry.clone(),
            content,
            times: FileTimes::default(),
        })
    }
}
