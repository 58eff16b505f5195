//! Agora application binary - composition root.
//!
//! 1. Load `.env`, then configuration from TOML plus environment overrides
//! 2. Open the knowledge graph (SQLite file or Neo4j)
//! 3. Dispatch the requested command

mod cli;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use agora_core::config::AgoraConfig;
use agora_core::{ChatExport, Essence, Persona};
use agora_graph::cypher::schema_script;
use agora_graph::KnowledgeGraph;
use agora_insight::{DigestOptions, DigestService, GraphRecorder, MessageProcessor, Summarizer};
use agora_llm::{CachedModel, DiskCache, LanguageModel, MockModel, ProviderRegistry};

use cli::{expand_home, CliArgs, Command};

const CACHE_DB_FILE: &str = "llm_cache.db";

type AppResult<T> = Result<T, Box<dyn std::error::Error>>;
type AgoraResult<T> = agora_core::Result<T>;

fn load_persona(config: &AgoraConfig, file: Option<&Path>) -> AgoraResult<Persona> {
    let path = file
        .map(Path::to_path_buf)
        .or_else(|| config.general.persona_file.as_deref().map(expand_home));
    match path {
        Some(path) => Ok(Essence::load(&path)?.persona),
        None => Ok(Persona::default()),
    }
}

fn confirm(yes: bool, action: &str) -> AppResult<()> {
    if yes {
        Ok(())
    } else {
        Err(format!("Refusing to {action} without --yes").into())
    }
}

async fn open_graph(config: &AgoraConfig, data_dir: &Path) -> AgoraResult<Arc<KnowledgeGraph>> {
    let graph = KnowledgeGraph::open(config.graph.clone(), Some(data_dir.to_path_buf())).await?;
    Ok(Arc::new(graph))
}

/// Chat and embedding models for a digest run.
fn build_models(
    config: &AgoraConfig,
    data_dir: &Path,
    provider: Option<&str>,
) -> AppResult<(Arc<dyn LanguageModel>, Arc<dyn LanguageModel>)> {
    let registry = ProviderRegistry::from_env(config.llm.clone());
    let chat = match provider {
        Some(name) => registry.select(Some(name))?,
        None => registry.chat_model()?,
    };
    let embedder = registry.embedding_model()?;

    if !config.cache.enabled {
        return Ok((chat, embedder));
    }
    let cache = Arc::new(DiskCache::open(&data_dir.join(CACHE_DB_FILE), &config.cache)?);
    tracing::info!(path = %data_dir.join(CACHE_DB_FILE).display(), "LLM cache enabled");
    Ok((
        Arc::new(CachedModel::new(chat, Arc::clone(&cache))),
        Arc::new(CachedModel::new(embedder, cache)),
    ))
}

async fn run_digest(
    config: &AgoraConfig,
    data_dir: &Path,
    file: &Path,
    provider: Option<&str>,
    offline: bool,
    options: DigestOptions,
) -> AppResult<()> {
    let export = ChatExport::load(file)?;
    tracing::info!(
        chat_id = export.chat_id,
        messages = export.messages.len(),
        "Chat export loaded"
    );
    let persona = load_persona(config, None)?;

    let (processor, summarizer) = if offline {
        let embedder = Arc::new(MockModel::new(config.graph.embedding_dimensions));
        (
            MessageProcessor::new(embedder, config.insight.clone()),
            Summarizer::extractive(persona, config.insight.clone()),
        )
    } else {
        let (chat, embedder) = build_models(config, data_dir, provider)?;
        (
            MessageProcessor::new(embedder, config.insight.clone()),
            Summarizer::new(chat, persona, config.insight.clone()),
        )
    };

    let mut service = DigestService::new(processor, summarizer);
    if options.record {
        let graph = open_graph(config, data_dir).await?;
        service = service.with_recorder(
            GraphRecorder::new(graph).with_host_user(config.general.host_user_id.clone()),
        );
    }

    let digest = service.run(&export, options).await?;
    println!("{}", digest.render());
    Ok(())
}

async fn dispatch(command: Command, config: &AgoraConfig, data_dir: &Path) -> AppResult<()> {
    match command {
        Command::Init => {
            open_graph(config, data_dir).await?.initialize().await?;
            println!("Graph schema initialized");
        }
        Command::Clear { yes } => {
            confirm(yes, "clear the graph")?;
            open_graph(config, data_dir).await?.clear().await?;
            println!("Graph cleared");
        }
        Command::Drop { yes } => {
            confirm(yes, "drop the graph schema")?;
            let dropped = open_graph(config, data_dir).await?.drop_schema().await?;
            println!("Dropped {} constraints and indexes", dropped.len());
            for name in dropped {
                println!("  {name}");
            }
        }
        Command::Stats => {
            let stats = open_graph(config, data_dir).await?.stats().await?;
            println!("Nodes:");
            for (label, count) in &stats.nodes {
                println!("  {label:<12} {count}");
            }
            println!("Edges:");
            for (rel, count) in &stats.edges {
                println!("  {rel:<16} {count}");
            }
        }
        Command::Schema { dimensions } => {
            let dimensions = dimensions.unwrap_or(config.graph.embedding_dimensions);
            println!("{}", schema_script(dimensions));
        }
        Command::Record { file } => {
            let export = ChatExport::load(&file)?;
            let recorder = GraphRecorder::new(open_graph(config, data_dir).await?)
                .with_host_user(config.general.host_user_id.clone());
            let summary = recorder.record_export(&export).await?;
            println!(
                "Recorded {} nodes and {} edges ({} skipped) from {}",
                summary.nodes,
                summary.edges,
                summary.skipped_edges,
                file.display()
            );
        }
        Command::Digest {
            file,
            provider,
            offline,
            record,
            follow_ups,
        } => {
            let options = DigestOptions { follow_ups, record };
            run_digest(config, data_dir, &file, provider.as_deref(), offline, options).await?;
        }
        Command::Providers => {
            let registry = ProviderRegistry::from_env(config.llm.clone());
            for (kind, settings) in registry.status() {
                match settings {
                    Ok(s) => println!("{:<11} ready    {}", kind.name(), s.model_name),
                    Err(e) => println!("{:<11} missing  {e}", kind.name()),
                }
            }
        }
        Command::Persona { file, template } => {
            let persona = load_persona(config, file.as_deref())?;
            match template {
                Some(template) => println!("{}", persona.render(&template)),
                None => println!("{}", serde_json::to_string_pretty(&persona)?),
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> AppResult<()> {
    let args = CliArgs::parse();
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Ignoring unreadable .env file: {e}");
        }
    }

    let config_file = args.resolve_config_path();
    let mut config = if config_file.exists() {
        AgoraConfig::load(&config_file)?
    } else {
        AgoraConfig::default()
    };
    config.apply_env()?;
    if let Some(dir) = args.resolve_data_dir() {
        config.general.data_dir = dir;
    }
    if let Some(level) = args.resolve_log_level() {
        config.general.log_level = level;
    }
    config.validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(
        config = %config_file.display(),
        "Starting Agora v{}",
        env!("CARGO_PKG_VERSION")
    );

    let data_dir: PathBuf = expand_home(&config.general.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }

    dispatch(args.command, &config, &data_dir).await
}
