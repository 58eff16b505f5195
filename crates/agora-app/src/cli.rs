//! CLI argument definitions for the `agora` binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Agora: group chat digests backed by a knowledge graph.
#[derive(Parser, Debug)]
#[command(name = "agora", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Data directory for the graph database and the LLM cache.
    #[arg(short = 'd', long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Create constraints and indexes in the graph.
    Init,
    /// Delete every node and edge.
    Clear {
        #[arg(long)]
        yes: bool,
    },
    /// Drop all constraints and indexes.
    Drop {
        #[arg(long)]
        yes: bool,
    },
    /// Node and edge counts.
    Stats,
    /// Print the Cypher schema script.
    Schema {
        /// Vector index dimensions; defaults to the configured value.
        #[arg(long)]
        dimensions: Option<usize>,
    },
    /// Record a chat export into the graph without summarising it.
    Record { file: PathBuf },
    /// Cluster and summarise a chat export.
    Digest {
        file: PathBuf,
        /// LLM provider name, e.g. "openai" or "ollama".
        #[arg(short = 'p', long)]
        provider: Option<String>,
        /// Use local hash embeddings and an extractive summary.
        #[arg(long)]
        offline: bool,
        /// Also write clusters and topics to the graph.
        #[arg(long)]
        record: bool,
        #[arg(long = "follow-ups")]
        follow_ups: bool,
    },
    /// Show which LLM providers have credentials.
    Providers,
    /// Show the persona, or render a template with it.
    Persona {
        /// Essence TOML file; defaults to `general.persona_file`.
        #[arg(long)]
        file: Option<PathBuf>,
        /// Template text with `{name}` style placeholders.
        #[arg(long)]
        template: Option<String>,
    },
}

impl CliArgs {
    /// Priority: --config flag > AGORA_CONFIG env var > ~/.agora/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("AGORA_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Returns `None` if not overridden (use config default).
    pub fn resolve_data_dir(&self) -> Option<String> {
        self.data_dir
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
    }

    pub fn resolve_log_level(&self) -> Option<String> {
        self.log_level.clone()
    }
}

fn default_config_path() -> PathBuf {
    match home_dir() {
        Some(home) => home.join(".agora").join("config.toml"),
        None => PathBuf::from("config.toml"),
    }
}

pub fn home_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    let home = std::env::var("USERPROFILE");
    #[cfg(not(target_os = "windows"))]
    let home = std::env::var("HOME");
    home.ok().map(PathBuf::from)
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/").or(path.strip_prefix("~\\")), home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
