use anyhow::Result;
use chunkdex::embeddings::OpenAIEmbedder;
use chunkdex::sources::{ContentSource, GitHubSource, SourceKind, VaultSource};
use chunkdex::store::{self, QueryMatch};
use chunkdex::{Config, Pipeline, RunContext, Searcher};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "chunkdex")]
#[command(version, about = "Chunk code repositories and note vaults into a vector index")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Index the code files of a GitHub repository
    Repo {
        /// https://github.com/owner/repo or owner/repo
        url: String,
    },
    /// Index the notes of a local vault
    Vault {
        /// Vault root directory
        path: PathBuf,
    },
    /// Similarity search against an index
    Search {
        query: String,

        /// Which index to search
        #[arg(long, value_enum, default_value_t = Collection::Code)]
        source: Collection,

        /// Number of results
        #[arg(long, default_value_t = 5)]
        top_k: usize,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Collection {
    Code,
    Notes,
}

fn build_embedder(config: &Config) -> Result<Arc<OpenAIEmbedder>> {
    let api_key = config.credential(&config.embeddings.api_key_env)?;
    Ok(Arc::new(OpenAIEmbedder::new(api_key, &config.embeddings)?))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", config.log_level.as_str()),
    )
    .init();

    match cli.command {
        Command::Repo { url } => {
            let token = config.credential(&config.repository.token_env)?;
            let source = GitHubSource::new(&url, token, &config.repository)?;
            run_index(config, &source).await
        }
        Command::Vault { path } => {
            let source = VaultSource::new(path, &config.vault)?;
            run_index(config, &source).await
        }
        Command::Search {
            query,
            source,
            top_k,
        } => run_search(config, &query, source, top_k).await,
    }
}

async fn run_index(config: Config, source: &dyn ContentSource) -> Result<()> {
    log::info!("Starting chunkdex v{}", env!("CARGO_PKG_VERSION"));
    match source.kind() {
        SourceKind::Repository { url } => log::info!("Repository: {}", url),
        SourceKind::Vault { root } => log::info!("Vault: {}", root.display()),
    }
    log::info!("Embedding model: {}", config.embeddings.model);

    let embedder = build_embedder(&config)?;
    let vector_store = store::from_config(&config)?;
    let ctx = RunContext::new(config);

    let mut pipeline = Pipeline::new(ctx, embedder, vector_store);
    pipeline.run(source).await?;
    Ok(())
}

async fn run_search(config: Config, query: &str, collection: Collection, top_k: usize) -> Result<()> {
    let index = match collection {
        Collection::Code => config.vector_store.code_index.clone(),
        Collection::Notes => config.vector_store.notes_index.clone(),
    };

    let embedder = build_embedder(&config)?;
    let vector_store = store::from_config(&config)?;
    let searcher = Searcher::new(embedder, vector_store, config.embeddings.cache_capacity);

    let results = searcher.search(&index, query, top_k).await?;
    if results.is_empty() {
        println!("No results in {}", index);
        return Ok(());
    }

    for (rank, hit) in results.iter().enumerate() {
        println!("{}", describe_hit(rank + 1, hit));
    }
    Ok(())
}

fn describe_hit(rank: usize, hit: &QueryMatch) -> String {
    let path = hit.metadata_str("file_path").unwrap_or("<unknown>");
    let location = match (hit.metadata_u64("start_line"), hit.metadata_u64("end_line")) {
        (Some(start), Some(end)) => format!("lines {}-{}", start, end),
        _ => hit.metadata_str("title").unwrap_or_default().to_string(),
    };
    let preview: String = hit
        .metadata_str("pageContent")
        .unwrap_or_default()
        .chars()
        .take(200)
        .collect();

    format!(
        "{}. {} ({}) score={:.4}\n   {}",
        rank,
        path,
        location,
        hit.score,
        preview.replace('\n', " ")
    )
}
