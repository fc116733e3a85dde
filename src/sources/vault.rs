use super::{ContentSource, SourceEntry, SourceItem, SourceKind};
use crate::config::VaultConfig;
use crate::error::{ChunkdexError, Result};
use crate::ingest::FileTimes;
use async_trait::async_trait;
use encoding_rs::Encoding;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Note files of a local vault directory
pub struct VaultSource {
    kind: SourceKind,
    root: PathBuf,
    extensions: BTreeSet<String>,
    excluded_dirs: BTreeSet<String>,
    excluded_files: BTreeSet<String>,
    fallback: &'static Encoding,
}

impl VaultSource {
    /// Open a vault rooted at `root`.
    ///
    /// Fails with a configuration error if the root is missing or not a
    /// directory, or if the fallback encoding label is unknown.
    pub fn new(root: impl Into<PathBuf>, config: &VaultConfig) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(ChunkdexError::Config(format!(
                "Vault path does not exist or is not a directory: {}",
                root.display()
            )));
        }

        let fallback = Encoding::for_label(config.fallback_encoding.as_bytes()).ok_or_else(|| {
            ChunkdexError::Config(format!(
                "Unknown fallback encoding: {}",
                config.fallback_encoding
            ))
        })?;

        Ok(Self {
            kind: SourceKind::Vault { root: root.clone() },
            root,
            extensions: config
                .supported_extensions
                .iter()
                .map(|e| e.to_lowercase())
                .collect(),
            excluded_dirs: config.excluded_dirs.clone(),
            excluded_files: config.excluded_files.clone(),
            fallback,
        })
    }

    /// Walk the vault, pruning excluded directories. Unreadable entries are
    /// logged and skipped.
    pub fn discover(&self) -> Vec<SourceEntry> {
        let mut entries = Vec::new();

        let walker = WalkDir::new(&self.root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                !(e.depth() > 0
                    && e.file_type().is_dir()
                    && self.excluded_dirs.contains(e.file_name().to_string_lossy().as_ref()))
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Skipping unreadable vault entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let name = entry.file_name().to_string_lossy();
            if self.excluded_files.contains(name.as_ref()) {
                continue;
            }

            let path = entry.path();
            if !self.has_supported_extension(path) {
                continue;
            }

            let relative_path = match path.strip_prefix(&self.root) {
                Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
                Err(_) => {
                    log::warn!("Skipping {}: outside vault root", path.display());
                    continue;
                }
            };

            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);

            entries.push(SourceEntry {
                path: relative_path,
                size,
                url: None,
                html_url: None,
                absolute_path: Some(path.to_path_buf()),
            });
        }

        log::info!("Discovered {} note files in {}", entries.len(), self.root.display());
        entries
    }

    fn has_supported_extension(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
            .map(|ext| self.extensions.contains(&ext))
            .unwrap_or(false)
    }
}

#[async_trait]
impl ContentSource for VaultSource {
    fn kind(&self) -> &SourceKind {
        &self.kind
    }

    async fn list(&self) -> Result<Vec<SourceEntry>> {
        Ok(self.discover())
    }

    async fn fetch(&self, entry: &SourceEntry) -> Result<SourceItem> {
        let path = entry
            .absolute_path
            .clone()
            .unwrap_or_else(|| self.root.join(&entry.path));

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| ChunkdexError::fetch(&entry.path, e))?;

        let content = decode_text(bytes, self.fallback, &entry.path)?;

        let times = tokio::fs::metadata(&path)
            .await
            .map(|meta| FileTimes::from_metadata(&meta))
            .unwrap_or_default();

        Ok(SourceItem {
            entry: entry.clone(),
            content,
            times,
        })
    }
}

/// Decode bytes as UTF-8, then as `fallback` (no replacement characters).
pub fn decode_text(bytes: Vec<u8>, fallback: &'static Encoding, locator: &str) -> Result<String> {
    match String::from_utf8(bytes) {
        Ok(text) => Ok(match text.strip_prefix('\u{feff}') {
            Some(stripped) => stripped.to_string(),
            None => text,
        }),
        Err(e) => {
            let bytes = e.into_bytes();
            match fallback.decode_without_bom_handling_and_without_replacement(&bytes) {
                Some(text) => {
                    log::debug!("{} decoded as {}", locator, fallback.name());
                    Ok(text.into_owned())
                }
                None => Err(ChunkdexError::Decode {
                    locator: locator.to_string(),
                    attempted: format!("UTF-8 or {}", fallback.name()),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn build_vault() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("Architecture/cache")).unwrap();
        fs::create_dir_all(root.join(".obsidian")).unwrap();
        fs::create_dir_all(root.join(".trash")).unwrap();
        fs::write(root.join("index.md"), "# Index").unwrap();
        fs::write(root.join("todo.TXT"), "buy cpu").unwrap();
        fs::write(root.join("Architecture/pipeline.markdown"), "stages").unwrap();
        fs::write(root.join("Architecture/cache/lines.md"), "64 bytes").unwrap();
        fs::write(root.join("Architecture/diagram.png"), b"\x89PNG").unwrap();
        fs::write(root.join(".obsidian/workspace.md"), "ui state").unwrap();
        fs::write(root.join(".trash/old.md"), "deleted").unwrap();
        fs::write(root.join(".DS_Store"), "junk").unwrap();
        temp_dir
    }

    #[test]
    fn test_discover_filters_and_sorts() {
        let temp_dir = build_vault();
        let source = VaultSource::new(temp_dir.path(), &VaultConfig::default()).unwrap();
        let paths: Vec<String> = source.discover().into_iter().map(|e| e.path).collect();

        assert_eq!(
            paths,
            vec![
                "Architecture/cache/lines.md",
                "Architecture/pipeline.markdown",
                "index.md",
                "todo.TXT",
            ]
        );
    }

    #[test]
    fn test_missing_root_is_config_error() {
        let err = VaultSource::new("/definitely/not/a/vault", &VaultConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, ChunkdexError::Config(_)));
    }

    #[tokio::test]
    async fn test_fetch_reads_content_and_times() {
        let temp_dir = build_vault();
        let source = VaultSource::new(temp_dir.path(), &VaultConfig::default()).unwrap();
        let entries = source.list().await.unwrap();
        let index = entries.iter().find(|e| e.path == "index.md").unwrap();

        let item = source.fetch(index).await.unwrap();
        assert_eq!(item.content, "# Index");
        assert!(item.times.modified.is_some());
    }

    #[tokio::test]
    async fn test_fetch_falls_back_to_euc_kr() {
        let temp_dir = TempDir::new().unwrap();
        let (encoded, _, _) = encoding_rs::EUC_KR.encode("컴퓨터 구조 노트");
        fs::write(temp_dir.path().join("korean.md"), encoded.as_ref()).unwrap();

        let source = VaultSource::new(temp_dir.path(), &VaultConfig::default()).unwrap();
        let entries = source.list().await.unwrap();
        let item = source.fetch(&entries[0]).await.unwrap();
        assert_eq!(item.content, "컴퓨터 구조 노트");
    }

    #[test]
    fn test_undecodable_bytes_are_decode_error() {
        let err = decode_text(vec![0xff, 0xfe, 0xfd], encoding_rs::EUC_KR, "bad.md").unwrap_err();
        assert!(matches!(err, ChunkdexError::Decode { .. }));
        assert!(err.to_string().contains("bad.md"));
    }

    #[test]
    fn test_utf8_bom_is_stripped() {
        let text = decode_text(b"\xef\xbb\xbfhello".to_vec(), encoding_rs::EUC_KR, "b.md").unwrap();
        assert_eq!(text, "hello");
    }

    #[tokio::test]
    async fn test_fetch_missing_file_is_fetch_error() {
        let temp_dir = TempDir::new().unwrap();
        let source = VaultSource::new(temp_dir.path(), &VaultConfig::default()).unwrap();
        let ghost = SourceEntry {
            path: "ghost.md".to_string(),
            size: 0,
            url: None,
            html_url: None,
            absolute_path: None,
        };
        let err = source.fetch(&ghost).await.unwrap_err();
        assert!(matches!(err, ChunkdexError::Fetch { .. }));
    }
}
