//! storebridge CLI - Command line driver for storage objects.
//!
//! This tool binds a single query to a storage provider and runs one
//! operation on it, which makes it handy for checking backend settings
//! before handing them to a workflow.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use storebridge::{
    create_default_registry, ProviderSettings, StorageObject, StorageProvider,
};

#[derive(Parser)]
#[command(name = "storebridge")]
#[command(about = "storebridge - Uniform access to storage backends")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Settings file (JSON); command-line flags override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend protocol.
    #[arg(short, long)]
    protocol: Option<String>,

    /// Backend option as KEY=VALUE; VALUE is parsed as JSON when possible.
    #[arg(short = 'o', long = "option", value_name = "KEY=VALUE")]
    options: Vec<String>,

    /// Directory for local copies.
    #[arg(long)]
    cache_root: Option<PathBuf>,

    /// Attempts per operation, including the first.
    #[arg(long)]
    max_attempts: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether a query exists.
    Exists { query: String },

    /// Print the modification time of a query.
    Mtime { query: String },

    /// Print the size of a query in bytes.
    Size { query: String },

    /// Download a query to its local path.
    Retrieve {
        query: String,

        /// Also copy the downloaded file here.
        #[arg(long)]
        to: Option<PathBuf>,
    },

    /// Upload the local copy of a query.
    Store {
        query: String,

        /// Copy this file to the local path before uploading.
        #[arg(long)]
        from: Option<PathBuf>,
    },

    /// Delete a query recursively.
    Remove { query: String },

    /// Create a query or bump its modification time.
    Touch { query: String },

    /// List candidates for a query with wildcards.
    Glob { query: String },

    /// Print the local path a query maps to.
    LocalPath { query: String },

    /// Check whether a query is acceptable.
    Validate { query: String },

    /// List the supported protocols.
    Protocols,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Commands that need no provider
    match &cli.command {
        Commands::Protocols => return cmd_protocols(),
        Commands::Validate { query } => return cmd_validate(query),
        _ => {}
    }

    let settings = load_settings(&cli)?;
    let provider = StorageProvider::new(settings).context("Failed to create storage provider")?;

    match cli.command {
        Commands::Exists { query } => cmd_exists(&object(&provider, &query)?).await,
        Commands::Mtime { query } => cmd_mtime(&object(&provider, &query)?).await,
        Commands::Size { query } => cmd_size(&object(&provider, &query)?).await,
        Commands::Retrieve { query, to } => {
            cmd_retrieve(&object(&provider, &query)?, to.as_deref()).await
        }
        Commands::Store { query, from } => {
            cmd_store(&object(&provider, &query)?, from.as_deref()).await
        }
        Commands::Remove { query } => cmd_remove(&object(&provider, &query)?).await,
        Commands::Touch { query } => cmd_touch(&object(&provider, &query)?).await,
        Commands::Glob { query } => cmd_glob(&object(&provider, &query)?).await,
        Commands::LocalPath { query } => {
            println!("{}", object(&provider, &query)?.local_path().display());
            Ok(())
        }
        Commands::Protocols | Commands::Validate { .. } => Ok(()),
    }
}

/// Build provider settings from the settings file and flags.
fn load_settings(cli: &Cli) -> Result<ProviderSettings> {
    let mut settings = match &cli.config {
        Some(path) => ProviderSettings::from_file(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => match &cli.cache_root {
            Some(cache_root) => ProviderSettings::new(cache_root.clone()),
            None => ProviderSettings::new(default_cache_root()?),
        },
    };

    if let Some(protocol) = &cli.protocol {
        settings.protocol = protocol.clone();
    }
    for option in &cli.options {
        let (key, value) = parse_option(option)?;
        settings.options.insert(key, value);
    }
    if let Some(cache_root) = &cli.cache_root {
        settings.cache_root = cache_root.clone();
    }
    if let Some(max_attempts) = cli.max_attempts {
        settings.retry.max_attempts = max_attempts;
    }

    debug!(
        "Using protocol '{}' with cache root {}",
        settings.protocol,
        settings.cache_root.display()
    );
    Ok(settings)
}

fn default_cache_root() -> Result<PathBuf> {
    let base = dirs::cache_dir().context("Could not determine the user cache directory")?;
    Ok(base.join("storebridge"))
}

/// Split `KEY=VALUE`, reading VALUE as JSON when it parses.
fn parse_option(option: &str) -> Result<(String, serde_json::Value)> {
    let Some((key, raw)) = option.split_once('=') else {
        bail!("Invalid option '{}': expected KEY=VALUE", option);
    };
    if key.is_empty() {
        bail!("Invalid option '{}': empty key", option);
    }
    let value = serde_json::from_str(raw)
        .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

fn object(provider: &StorageProvider, query: &str) -> Result<StorageObject> {
    provider
        .object(query)
        .with_context(|| format!("Invalid query: {}", StorageProvider::safe_print(query)))
}

fn cmd_protocols() -> Result<()> {
    for protocol in create_default_registry().protocols() {
        println!("{}", protocol);
    }
    Ok(())
}

fn cmd_validate(query: &str) -> Result<()> {
    let validation = StorageProvider::is_valid_query(query);
    println!("{}", serde_json::to_string_pretty(&validation)?);
    if !validation.valid {
        bail!("Query rejected");
    }
    Ok(())
}

async fn cmd_exists(object: &StorageObject) -> Result<()> {
    let exists = object
        .exists()
        .await
        .context("Failed to check existence")?;
    println!("{}", exists);
    Ok(())
}

async fn cmd_mtime(object: &StorageObject) -> Result<()> {
    let mtime = object
        .mtime()
        .await
        .context("Failed to read modification time")?;

    let secs = mtime.floor();
    let nanos = ((mtime - secs) * 1e9) as u32;
    match DateTime::<Utc>::from_timestamp(secs as i64, nanos) {
        Some(time) => println!("{} ({})", mtime, time.to_rfc3339()),
        None => println!("{}", mtime),
    }
    Ok(())
}

async fn cmd_size(object: &StorageObject) -> Result<()> {
    let size = object.size().await.context("Failed to read size")?;
    println!("{}", size);
    Ok(())
}

async fn cmd_retrieve(object: &StorageObject, to: Option<&Path>) -> Result<()> {
    info!("Retrieving {}", object.safe_query());

    object.retrieve().await.context("Failed to retrieve")?;

    match to {
        Some(dest) => {
            tokio::fs::copy(object.local_path(), dest)
                .await
                .with_context(|| format!("Failed to copy to {}", dest.display()))?;
            println!("Retrieved to {}", dest.display());
        }
        None => println!("Retrieved to {}", object.local_path().display()),
    }
    Ok(())
}

async fn cmd_store(object: &StorageObject, from: Option<&Path>) -> Result<()> {
    if let Some(source) = from {
        let local = object.local_path();
        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tokio::fs::copy(source, local)
            .await
            .with_context(|| format!("Failed to read source file {}", source.display()))?;
    }

    info!("Storing {}", object.safe_query());
    object.store().await.context("Failed to store")?;

    println!("Stored {}", object.safe_query());
    Ok(())
}

async fn cmd_remove(object: &StorageObject) -> Result<()> {
    object.remove().await.context("Failed to remove")?;
    println!("Removed {}", object.safe_query());
    Ok(())
}

async fn cmd_touch(object: &StorageObject) -> Result<()> {
    object.touch().await.context("Failed to touch")?;
    println!("Touched {}", object.safe_query());
    Ok(())
}

async fn cmd_glob(object: &StorageObject) -> Result<()> {
    let candidates = object.list_candidate_matches().await;
    if candidates.is_empty() {
        println!("No candidates found.");
    } else {
        for candidate in candidates {
            println!("{}", candidate);
        }
    }
    Ok(())
}
