pub mod github;
pub mod vault;

pub use github::GitHubSource;
pub use vault::VaultSource;

use crate::error::Result;
use crate::ingest::FileTimes;
use async_trait::async_trait;
use std::path::PathBuf;

/// What kind of collection a source enumerates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    /// Code files of a hosted repository
    Repository { url: String },
    /// Note files of a local vault
    Vault { root: PathBuf },
}

/// One enumerable file, before its content is read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    /// Locator used as the chunk source path (repository- or vault-relative)
    pub path: String,
    pub size: u64,
    /// API URL the content is fetched from (remote sources)
    pub url: Option<String>,
    /// Browser URL of the file (remote sources)
    pub html_url: Option<String>,
    /// On-disk location (local sources)
    pub absolute_path: Option<PathBuf>,
}

impl SourceEntry {
    /// Extension including the leading dot, lowercased (".rs")
    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.path)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
    }
}

/// A fetched file; immutable once read
#[derive(Debug, Clone)]
pub struct SourceItem {
    pub entry: SourceEntry,
    pub content: String,
    pub times: FileTimes,
}

/// Enumerate-then-fetch content provider.
///
/// Errors from `fetch` are per item and never abort a run.
#[async_trait]
pub trait ContentSource: Send + Sync {
    fn kind(&self) -> &SourceKind;

    async fn list(&self) -> Result<Vec<SourceEntry>>;

    async fn fetch(&self, entry: &SourceEntry) -> Result<SourceItem>;
}
