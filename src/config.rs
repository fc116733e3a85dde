use crate::error::{ChunkdexError, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    pub embeddings: EmbeddingsConfig,
    pub chunking: ChunkingConfig,
    pub vector_store: VectorStoreConfig,
    pub repository: RepositoryConfig,
    pub vault: VaultConfig,
}

/// Embedding provider configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingsConfig {
    pub model: String,
    /// Base endpoint of an OpenAI-compatible API
    pub base_url: String,
    pub api_key_env: String,
    /// Vector length, shared with the index
    pub dimensions: usize,
    /// Send `dimensions` in the request body (only for models that accept it)
    pub request_dimensions: bool,
    /// Query-embedding cache size; 0 disables the cache
    pub cache_capacity: usize,
    pub timeout_secs: u64,
}

/// Segment splitter configuration (token counts)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size_tokens: usize,
    /// Code path only
    pub chunk_overlap_tokens: usize,
    pub tokenizer_model: String,
    pub exact_tokenizer: bool,
}

/// Which vector store backend to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreProvider {
    Pinecone,
    Sqlite,
}

/// Similarity metric of an index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Cosine,
    Dotproduct,
    Euclidean,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Cosine => "cosine",
            Metric::Dotproduct => "dotproduct",
            Metric::Euclidean => "euclidean",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "cosine" => Some(Metric::Cosine),
            "dotproduct" => Some(Metric::Dotproduct),
            "euclidean" => Some(Metric::Euclidean),
            _ => None,
        }
    }
}

/// Vector store configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub provider: StoreProvider,
    pub api_key_env: String,
    pub control_plane_url: String,
    pub cloud: String,
    pub region: String,
    pub metric: Metric,
    /// SQLite file used by the local provider
    pub db_path: PathBuf,
    pub code_index: String,
    pub notes_index: String,
    /// Max vectors per upsert request (an item's batch is split if larger)
    pub upsert_batch_size: usize,
}

/// Repository host configuration (code path)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    pub api_base: String,
    pub token_env: String,
    pub supported_extensions: BTreeSet<String>,
    pub excluded_dirs: BTreeSet<String>,
}

/// Note vault configuration (notes path)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub supported_extensions: BTreeSet<String>,
    pub excluded_dirs: BTreeSet<String>,
    pub excluded_files: BTreeSet<String>,
    /// encoding_rs label tried when a file is not valid UTF-8
    pub fallback_encoding: String,
}

fn string_set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            embeddings: EmbeddingsConfig::default(),
            chunking: ChunkingConfig::default(),
            vector_store: VectorStoreConfig::default(),
            repository: RepositoryConfig::default(),
            vault: VaultConfig::default(),
        }
    }
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-004".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            dimensions: 768,
            request_dimensions: false,
            cache_capacity: 256,
            timeout_secs: 30,
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size_tokens: 1000,
            chunk_overlap_tokens: 200,
            tokenizer_model: "gpt-4".to_string(),
            exact_tokenizer: true,
        }
    }
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            provider: StoreProvider::Pinecone,
            api_key_env: "PINECONE_API_KEY".to_string(),
            control_plane_url: "https://api.pinecone.io".to_string(),
            cloud: "aws".to_string(),
            region: "us-east-1".to_string(),
            metric: Metric::Cosine,
            db_path: PathBuf::from("chunkdex.db"),
            code_index: "github-code-embeddings".to_string(),
            notes_index: "notion-notes-embeddings".to_string(),
            upsert_batch_size: 100,
        }
    }
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            token_env: "GITHUB_TOKEN".to_string(),
            supported_extensions: string_set(&[
                ".py", ".js", ".ts", ".jsx", ".tsx", ".java", ".cpp", ".c", ".h",
                ".cs", ".php", ".rb", ".go", ".rs", ".swift", ".kt", ".scala",
                ".html", ".css", ".scss", ".less", ".vue", ".svelte",
                ".md", ".txt", ".json", ".yaml", ".yml", ".xml", ".sql",
                ".sh", ".bash", ".zsh", ".fish", ".ps1", ".bat", ".cmd",
            ]),
            excluded_dirs: string_set(&[
                "node_modules", ".git", ".vscode", ".idea", "__pycache__",
                "venv", "env", ".env", "dist", "build", "target", "bin",
                ".next", ".nuxt", "coverage", ".nyc_output",
            ]),
        }
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            supported_extensions: string_set(&[".md", ".txt", ".markdown"]),
            excluded_dirs: string_set(&[".obsidian", ".trash", ".git", "__pycache__", "node_modules"]),
            excluded_files: string_set(&[".DS_Store", "Thumbs.db", ".gitignore"]),
            fallback_encoding: "euc-kr".to_string(),
        }
    }
}

impl Config {
    /// Load configuration
    ///
    /// Loads environment variables from a .env file (if present) first.
    /// The config file is taken from `CHUNKDEX_CONFIG` (must exist when set),
    /// otherwise `./chunkdex.toml` is used if present, otherwise defaults.
    /// Environment overrides are applied last, then the result is validated.
    pub fn load() -> Result<Self> {
        let _ = dotenv::dotenv();

        let mut config = match std::env::var("CHUNKDEX_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => {
                let default_path = Path::new("chunkdex.toml");
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    log::debug!("No chunkdex.toml found, using built-in defaults");
                    Self::default()
                }
            }
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML config file (no env overrides, no validation)
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ChunkdexError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw)
            .map_err(|e| ChunkdexError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Apply environment-style overrides on top of file values
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(model) = non_empty_env("OPENAI_EMBEDDING_MODEL") {
            self.embeddings.model = model;
        }
        if let Some(base_url) = non_empty_env("OPENAI_BASE_URL") {
            self.embeddings.base_url = base_url;
        }
        if let Some(size) = non_empty_env("CHUNK_SIZE_TOKENS") {
            self.chunking.chunk_size_tokens = parse_env_number("CHUNK_SIZE_TOKENS", &size)?;
        }
        if let Some(overlap) = non_empty_env("CHUNK_OVERLAP_TOKENS") {
            self.chunking.chunk_overlap_tokens = parse_env_number("CHUNK_OVERLAP_TOKENS", &overlap)?;
        }
        if let Some(provider) = non_empty_env("CHUNKDEX_VECTOR_STORE") {
            self.vector_store.provider = match provider.to_ascii_lowercase().as_str() {
                "pinecone" => StoreProvider::Pinecone,
                "sqlite" => StoreProvider::Sqlite,
                other => {
                    return Err(ChunkdexError::Config(format!(
                        "CHUNKDEX_VECTOR_STORE must be 'pinecone' or 'sqlite', got '{}'",
                        other
                    )))
                }
            };
        }
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size_tokens == 0 {
            return Err(ChunkdexError::Config(
                "chunking.chunk_size_tokens must be greater than 0".to_string(),
            ));
        }
        if self.chunking.chunk_overlap_tokens >= self.chunking.chunk_size_tokens {
            return Err(ChunkdexError::Config(
                "chunking.chunk_overlap_tokens must be less than chunk_size_tokens".to_string(),
            ));
        }
        if self.embeddings.dimensions == 0 {
            return Err(ChunkdexError::Config(
                "embeddings.dimensions must be greater than 0".to_string(),
            ));
        }
        if self.vector_store.upsert_batch_size == 0 {
            return Err(ChunkdexError::Config(
                "vector_store.upsert_batch_size must be greater than 0".to_string(),
            ));
        }
        if encoding_rs::Encoding::for_label(self.vault.fallback_encoding.as_bytes()).is_none() {
            return Err(ChunkdexError::Config(format!(
                "vault.fallback_encoding '{}' is not a known encoding label",
                self.vault.fallback_encoding
            )));
        }
        Ok(())
    }

    /// Resolve a required credential from the environment.
    pub fn credential(&self, env_name: &str) -> Result<String> {
        non_empty_env(env_name).ok_or_else(|| {
            ChunkdexError::Config(format!(
                "Environment variable {} not set. Set it in your .env file or as an environment variable.",
                env_name
            ))
        })
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env_number(name: &str, value: &str) -> Result<usize> {
    value.trim().parse().map_err(|_| {
        ChunkdexError::Config(format!("{} must be a non-negative integer, got '{}'", name, value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serialize tests that mutate process-wide env so they don't race.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const OVERRIDE_VARS: [&str; 6] = [
        "CHUNKDEX_CONFIG",
        "OPENAI_EMBEDDING_MODEL",
        "OPENAI_BASE_URL",
        "CHUNK_SIZE_TOKENS",
        "CHUNK_OVERLAP_TOKENS",
        "CHUNKDEX_VECTOR_STORE",
    ];

    fn with_env(vars: &[(&str, &str)], f: impl FnOnce()) {
        let saved: Vec<(&str, Option<String>)> = OVERRIDE_VARS
            .iter()
            .map(|name| (*name, std::env::var(name).ok()))
            .collect();
        for name in OVERRIDE_VARS {
            std::env::remove_var(name);
        }
        for (name, value) in vars {
            std::env::set_var(name, value);
        }
        f();
        for (name, value) in saved {
            match value {
                Some(v) => std::env::set_var(name, v),
                None => std::env::remove_var(name),
            }
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.embeddings.model, "text-embedding-004");
        assert_eq!(config.embeddings.dimensions, 768);
        assert_eq!(config.chunking.chunk_size_tokens, 1000);
        assert_eq!(config.chunking.chunk_overlap_tokens, 200);
        assert_eq!(config.vector_store.metric, Metric::Cosine);
        assert!(config.repository.excluded_dirs.contains("node_modules"));
        assert!(config.repository.supported_extensions.contains(".rs"));
        assert!(config.vault.excluded_files.contains(".DS_Store"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
[chunking]
chunk_size_tokens = 300
chunk_overlap_tokens = 50

[vector_store]
provider = "sqlite"
db_path = "./test.db"
metric = "dotproduct"
"#,
        )
        .unwrap();
        assert_eq!(config.chunking.chunk_size_tokens, 300);
        assert_eq!(config.chunking.tokenizer_model, "gpt-4");
        assert_eq!(config.vector_store.provider, StoreProvider::Sqlite);
        assert_eq!(config.vector_store.metric, Metric::Dotproduct);
        assert_eq!(config.vector_store.code_index, "github-code-embeddings");
        assert_eq!(config.embeddings.dimensions, 768);
    }

    #[test]
    fn test_validate_rejects_overlap_not_below_size() {
        let mut config = Config::default();
        config.chunking.chunk_size_tokens = 100;
        config.chunking.chunk_overlap_tokens = 100;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("chunk_overlap_tokens"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_validate_rejects_unknown_encoding() {
        let mut config = Config::default();
        config.vault.fallback_encoding = "klingon-8".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let _lock = ENV_LOCK.lock().unwrap();
        with_env(
            &[
                ("OPENAI_EMBEDDING_MODEL", "text-embedding-3-small"),
                ("OPENAI_BASE_URL", "http://localhost:9999/v1"),
                ("CHUNK_SIZE_TOKENS", "512"),
                ("CHUNK_OVERLAP_TOKENS", "64"),
                ("CHUNKDEX_VECTOR_STORE", "sqlite"),
            ],
            || {
                let mut config = Config::default();
                config.apply_env_overrides().unwrap();
                assert_eq!(config.embeddings.model, "text-embedding-3-small");
                assert_eq!(config.embeddings.base_url, "http://localhost:9999/v1");
                assert_eq!(config.chunking.chunk_size_tokens, 512);
                assert_eq!(config.chunking.chunk_overlap_tokens, 64);
                assert_eq!(config.vector_store.provider, StoreProvider::Sqlite);
            },
        );
    }

    #[test]
    fn test_env_override_rejects_garbage_number() {
        let _lock = ENV_LOCK.lock().unwrap();
        with_env(&[("CHUNK_SIZE_TOKENS", "lots")], || {
            let mut config = Config::default();
            let err = config.apply_env_overrides().unwrap_err();
            assert!(err.to_string().contains("CHUNK_SIZE_TOKENS"));
        });
    }

    #[test]
    fn test_load_from_explicit_path() {
        let _lock = ENV_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("chunkdex.toml");
        fs::write(&config_path, "log_level = \"debug\"\n[embeddings]\ndimensions = 1536\n").unwrap();
        let path_str = config_path.to_str().unwrap().to_string();
        with_env(&[("CHUNKDEX_CONFIG", path_str.as_str())], || {
            let config = Config::load().unwrap();
            assert_eq!(config.log_level, "debug");
            assert_eq!(config.embeddings.dimensions, 1536);
        });
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let _lock = ENV_LOCK.lock().unwrap();
        with_env(&[("CHUNKDEX_CONFIG", "definitely-missing-chunkdex.toml")], || {
            let err = Config::load().unwrap_err();
            assert!(matches!(err, ChunkdexError::Config(_)));
        });
    }

    #[test]
    fn test_missing_credential_is_config_error() {
        let config = Config::default();
        let err = config.credential("CHUNKDEX_TEST_UNSET_CREDENTIAL").unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("CHUNKDEX_TEST_UNSET_CREDENTIAL"));
    }
}
