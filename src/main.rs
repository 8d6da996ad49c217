use hyrank::cli::{Cli, CollectionsAction, Commands, ConfigAction};
use hyrank::config::{Config, StorageBackend};
use hyrank::corpus::{load_corpus, Document, TextExtractor};
use hyrank::embedding::{EmbeddingProvider, FastEmbedProvider};
use hyrank::error::{HyrankError, Result};
use hyrank::retrieval::{HybridSearcher, SearchResponse, WeightSelection};
use hyrank::store::{
    ephemeral_collection_name, Metadata, NewDocuments, SnapshotVectorStore, SqliteVectorStore,
    VectorStore, CATALOG_COLLECTION,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    let rt = tokio::runtime::Runtime::new().map_err(|e| HyrankError::Io {
        source: e,
        context: "Failed to create tokio runtime".to_string(),
    })?;

    // Handle commands
    match cli.command {
        Commands::Search {
            corpus,
            query,
            profile,
            adaptive,
            limit,
            json,
        } => {
            let selection = if adaptive {
                Some(WeightSelection::Adaptive)
            } else {
                profile.map(WeightSelection::Named)
            };
            rt.block_on(cmd_search(cli.config, &corpus, &query, selection, limit, json))?;
        }
        Commands::Index {
            corpus,
            collection,
            session,
        } => {
            rt.block_on(cmd_index(cli.config, &corpus, collection, session))?;
        }
        Commands::Query {
            text,
            collection,
            top_k,
            json,
        } => {
            rt.block_on(cmd_query(cli.config, &text, collection, top_k, json))?;
        }
        Commands::Collections { action } => {
            rt.block_on(cmd_collections(cli.config, action))?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "hyrank=debug" } else { "hyrank=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn cmd_search(
    config_path: Option<PathBuf>,
    corpus_path: &Path,
    query: &str,
    selection: Option<WeightSelection>,
    limit: usize,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let corpus = load_corpus(corpus_path)?;

    // A missing model degrades to lexical ranking rather than failing the search
    let searcher = match embedding_provider(&config) {
        Ok(provider) => HybridSearcher::new(Arc::new(provider), config.hybrid_config()),
        Err(e) => {
            tracing::warn!("Embedding provider unavailable, ranking lexically: {}", e);
            HybridSearcher::lexical_only(config.hybrid_config())
        }
    };
    let searcher = searcher
        .with_enhancer(Arc::new(config.enhancer()))
        .with_extractor(Arc::new(config.extractor()));

    let mut response = searcher.search(query, &corpus, selection.as_ref()).await?;
    response.results.truncate(limit);

    if json {
        println!("{}", to_json(&response)?);
    } else {
        print_search_response(&response, &config.extractor());
    }

    Ok(())
}

fn print_search_response(response: &SearchResponse, extractor: &dyn TextExtractor) {
    let perf = &response.metadata.performance;

    println!(
        "Query: {} (profile: {})",
        response.metadata.query.original, response.metadata.profile
    );
    if response.metadata.query.corrected != response.metadata.query.original {
        println!("  Corrected: {}", response.metadata.query.corrected);
    }
    println!(
        "  {} documents, {} candidates, {} vector scored in {}ms",
        perf.corpus_size, perf.candidates, perf.vector_scored, perf.total_ms
    );
    if perf.vector_stage_skipped {
        println!("  ⚠ Vector scoring skipped, ranking on keywords only");
    }
    if perf.deadline_hit {
        println!("  ⚠ Query deadline reached, some candidates were not vector scored");
    }

    if response.results.is_empty() {
        println!("\nNo matches.");
        return;
    }

    println!();
    for (rank, item) in response.results.iter().enumerate() {
        let title = item
            .document
            .field_text("title")
            .unwrap_or_else(|| snippet(&extractor.extract(&item.document), 60));
        println!("{:>3}. [{:>3}] {} ({})", rank + 1, item.match_score, title, item.id());
        println!(
            "       bm25 {:>3}  vector {:>3}  rrf {:>3}",
            item.bm25_score, item.vector_score, item.rrf_score
        );
    }
}

async fn cmd_index(
    config_path: Option<PathBuf>,
    corpus_path: &Path,
    collection: Option<String>,
    session: Option<String>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let corpus = load_corpus(corpus_path)?;
    let extractor = config.extractor();

    let name = match (collection, session) {
        (_, Some(token)) => ephemeral_collection_name(&token),
        (Some(name), None) => name,
        (None, None) => CATALOG_COLLECTION.to_string(),
    };

    let (documents, skipped): (Vec<&Document>, Vec<&Document>) = corpus
        .iter()
        .partition(|doc| doc.embedding.is_some() || !extractor.extract(doc).trim().is_empty());
    for doc in &skipped {
        tracing::warn!("Skipping document {} with no text and no embedding", doc.id);
    }

    let texts: Vec<String> = documents.iter().map(|doc| extractor.extract(doc)).collect();
    let embeddings = embed_documents(&config, &documents, &texts).await?;

    let source = corpus_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let added_at = chrono::Utc::now().to_rfc3339();
    let metadatas: Vec<Metadata> = documents
        .iter()
        .enumerate()
        .map(|(i, doc)| {
            let mut meta = doc.fields.clone();
            meta.insert("source".to_string(), source.clone().into());
            meta.insert("chunk_index".to_string(), i.into());
            meta.insert("added_at".to_string(), added_at.clone().into());
            meta
        })
        .collect();
    let ids: Vec<String> = documents.iter().map(|doc| doc.id.clone()).collect();

    let store = open_store(&config).await?;
    store.get_or_create_collection(&name).await?;
    store
        .add_documents(
            &name,
            NewDocuments::new(texts, embeddings)
                .with_metadatas(metadatas)
                .with_ids(ids),
        )
        .await?;

    println!("✓ Indexed {} documents into '{}'", documents.len(), name);
    if !skipped.is_empty() {
        println!("  Skipped {} documents without text", skipped.len());
    }

    Ok(())
}

/// Stored embeddings are reused; the rest are generated in configured batches
async fn embed_documents(
    config: &Config,
    documents: &[&Document],
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let missing: Vec<usize> = documents
        .iter()
        .enumerate()
        .filter(|(_, doc)| doc.embedding.is_none())
        .map(|(i, _)| i)
        .collect();

    let mut generated: Vec<Vec<f32>> = Vec::with_capacity(missing.len());
    if !missing.is_empty() {
        let provider = embedding_provider(config)?;
        let pending: Vec<String> = missing.iter().map(|&i| texts[i].clone()).collect();

        for chunk in pending.chunks(config.embedding.batch_size.max(1)) {
            generated.extend(provider.embed_batch(chunk).await?);
            tracing::debug!("Embedded {}/{} documents", generated.len(), pending.len());
        }
    }

    let mut generated = generated.into_iter();
    documents
        .iter()
        .map(|doc| match &doc.embedding {
            Some(embedding) => Ok(embedding.clone()),
            None => generated.next().ok_or_else(|| {
                HyrankError::Config(format!("Missing generated embedding for {}", doc.id))
            }),
        })
        .collect()
}

async fn cmd_query(
    config_path: Option<PathBuf>,
    text: &str,
    collection: Option<String>,
    top_k: usize,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let name = collection.unwrap_or_else(|| CATALOG_COLLECTION.to_string());

    let provider = embedding_provider(&config)?;
    let embedding = provider.embed(text).await?;

    let store = open_store(&config).await?;
    let result = store.query(&name, &embedding, top_k).await?;

    if json {
        println!("{}", to_json(&result)?);
        return Ok(());
    }

    if result.is_empty() {
        println!("No results in '{}'", name);
        return Ok(());
    }

    for (rank, ((id, document), distance)) in result
        .ids
        .iter()
        .zip(&result.documents)
        .zip(&result.distances)
        .enumerate()
    {
        let relevance = 1.0 / (1.0 + distance);
        println!(
            "{:>3}. {} (distance {:.4}, relevance {:.3})",
            rank + 1,
            id,
            distance,
            relevance
        );
        println!("       {}", snippet(document, 100));
    }

    Ok(())
}

async fn cmd_collections(config_path: Option<PathBuf>, action: CollectionsAction) -> Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config).await?;

    match action {
        CollectionsAction::List => {
            let collections = store.list_collections().await?;
            if collections.is_empty() {
                println!("No collections");
            }
            for info in collections {
                println!(
                    "{}  {} documents  created {}",
                    info.name,
                    info.document_count,
                    info.created_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
        CollectionsAction::Stats { name } => match store.get_stats(&name).await? {
            Some(stats) => {
                println!("Collection: {}", name);
                println!("  Documents: {}", stats.document_count);
                println!(
                    "  Created: {}",
                    stats.created_at.format("%Y-%m-%d %H:%M:%S")
                );
                println!("  Size: {} bytes", stats.total_size);
            }
            None => println!("Collection '{}' not found", name),
        },
        CollectionsAction::Delete { name } => {
            if store.delete_collection(&name).await? {
                println!("✓ Deleted collection '{}'", name);
            } else {
                println!("Collection '{}' not found", name);
            }
        }
    }

    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show { section } => {
            let config = load_config(config_path)?;

            match section {
                Some(section) => match config.section(&section)? {
                    Some(value) => println!("{}", to_json(&value)?),
                    None => println!("Unknown section: {}", section),
                },
                None => println!("{}", to_json(&config)?),
            }
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            // Create parent directory
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| HyrankError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            // Save default config
            let mut config = Config::default();
            config.storage.data_dir = Config::default_data_dir()?;
            config.save(&path)?;

            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    Config::load_or_default(&path)
}

/// FastEmbed model checked against `embedding.dimension`
fn embedding_provider(config: &Config) -> Result<FastEmbedProvider> {
    let provider = FastEmbedProvider::new(&config.embedding.model)?;
    config.embedding.check_dimension(provider.dimension())?;
    Ok(provider)
}

async fn open_store(config: &Config) -> Result<Arc<dyn VectorStore>> {
    let store: Arc<dyn VectorStore> = match config.storage.backend {
        StorageBackend::Snapshot => Arc::new(SnapshotVectorStore::open(config.snapshot_path()?).await?),
        StorageBackend::Sqlite => Arc::new(SqliteVectorStore::open(&config.database_path()?)?),
    };
    tracing::debug!("Opened {} vector store", config.storage.backend);
    Ok(store)
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| HyrankError::Json {
        source: e,
        context: "Failed to serialize output".to_string(),
    })
}

fn snippet(text: &str, max_chars: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}…", cut)
    }
}
