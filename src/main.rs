//! Calypso - Privacy-Preserving Interest Cohort System
//!
//! Entry point for the cohort service: runs the HTTP host surface and
//! ships small operator utilities for taxonomy inspection and API key
//! minting.

use calypso_core::{
    api::{ApiServer, ApiServerConfig},
    auth::ApiKeyValidator,
    clock::SystemClock,
    config::CalypsoConfig,
    error::{CalypsoError, Result},
    storage::{MemoryStore, PlaintextCipher},
    ApiKeyRecord, CohortEngine, CohortGateway, MetricsAggregator, Permission, Taxonomy,
};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "calypso")]
#[command(about = "Privacy-preserving interest cohort service", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Set log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the cohort HTTP service
    Serve {
        /// Bind address (overrides the config file)
        #[arg(long)]
        addr: Option<String>,

        /// Configuration file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Inspect the built-in topic taxonomy
    Taxonomy {
        #[command(subcommand)]
        action: TaxonomyAction,
    },

    /// API key utilities
    Keys {
        #[command(subcommand)]
        action: KeysAction,
    },
}

#[derive(Subcommand)]
enum TaxonomyAction {
    /// Show one topic with its ancestry
    Lookup {
        /// Numeric topic id
        id: u32,
    },

    /// Search topics by name substring
    Search {
        /// Case-insensitive query
        query: String,
    },
}

#[derive(Subcommand)]
enum KeysAction {
    /// Mint an API key record and print it as JSON
    Mint {
        /// Domain the key is bound to (`*` for any)
        #[arg(long)]
        domain: String,

        /// Permissions: cohort_access, metrics_access, admin
        #[arg(long, value_delimiter = ',', default_value = "cohort_access")]
        permissions: Vec<String>,

        /// Days until expiry (omit for a non-expiring key)
        #[arg(long)]
        expires_days: Option<i64>,

        /// Requests allowed per minute
        #[arg(long)]
        per_minute: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::new(format!(
        "calypso={0},calypso_core={0},tower_http=warn",
        cli.log_level.to_lowercase()
    ));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve { addr, config } => serve(addr, config).await,
        Commands::Taxonomy { action } => taxonomy_command(action),
        Commands::Keys { action } => keys_command(action),
    }
}

async fn serve(addr: Option<String>, config_path: Option<PathBuf>) -> Result<()> {
    let config = match config_path {
        Some(path) => CalypsoConfig::from_file(&path)?,
        None => CalypsoConfig::from_env()?,
    };

    let addr: SocketAddr = match addr {
        Some(raw) => raw
            .parse()
            .map_err(|e| CalypsoError::Validation(format!("invalid address '{raw}': {e}")))?,
        None => format!("{}:{}", config.server.host, config.server.port)
            .parse()
            .map_err(|e| {
                CalypsoError::Validation(format!("invalid configured server address: {e}"))
            })?,
    };

    info!("Calypso v{} starting", env!("CARGO_PKG_VERSION"));

    let clock = Arc::new(SystemClock);
    let store = Arc::new(MemoryStore::new());
    let cipher = Arc::new(PlaintextCipher);
    let taxonomy = Arc::new(Taxonomy::builtin()?);
    info!("Taxonomy loaded: {} topics", taxonomy.len());

    let engine = Arc::new(CohortEngine::new(
        taxonomy.clone(),
        config.engine.clone(),
        clock.clone(),
        store.clone(),
        cipher.clone(),
        config.gateway.storage_secret.as_bytes().to_vec(),
    ));
    let aggregator = Arc::new(MetricsAggregator::new(config.privacy.clone()));
    let validator = Arc::new(ApiKeyValidator::new(config.auth.clone(), clock.clone()));
    let gateway = Arc::new(CohortGateway::new(
        engine.clone(),
        aggregator.clone(),
        validator,
        store,
        cipher,
        &config.gateway,
        clock,
    ));

    let server = ApiServer::new(
        ApiServerConfig { addr },
        gateway,
        engine,
        aggregator,
        taxonomy,
    );
    server.serve().await
}

fn taxonomy_command(action: TaxonomyAction) -> Result<()> {
    let taxonomy = Taxonomy::builtin()?;

    match action {
        TaxonomyAction::Lookup { id } => {
            let topic_id = calypso_core::TopicId(id);
            match taxonomy.topic(topic_id) {
                Some(topic) => {
                    let ancestors = taxonomy.ancestors(topic_id);
                    let path: Vec<&str> = ancestors
                        .iter()
                        .rev()
                        .map(|t| t.name.as_str())
                        .chain(std::iter::once(topic.name.as_str()))
                        .collect();
                    println!("{} (level {})", path.join(" > "), topic.level);
                    println!("  id: {}", topic.id.0);
                    println!("  sensitive: {}", taxonomy.is_sensitive(topic_id));
                }
                None => println!("No topic with id {id}"),
            }
        }
        TaxonomyAction::Search { query } => {
            let matches = taxonomy.search(&query);
            if matches.is_empty() {
                println!("No topics match '{query}'");
            }
            for topic in matches {
                println!("{:>6}  {}", topic.id.0, topic.name);
            }
        }
    }
    Ok(())
}

fn keys_command(action: KeysAction) -> Result<()> {
    match action {
        KeysAction::Mint {
            domain,
            permissions,
            expires_days,
            per_minute,
        } => {
            let permissions = permissions
                .iter()
                .map(|p| parse_permission(p))
                .collect::<Result<Vec<_>>>()?;

            let now = Utc::now();
            let mut rate_limit = calypso_core::types::RateLimitConfig::default();
            if let Some(per_minute) = per_minute {
                rate_limit.per_minute = per_minute;
            }

            let record = ApiKeyRecord {
                key: format!("ck_{}", uuid::Uuid::new_v4().simple()),
                domain,
                permissions,
                created_at: now,
                expires_at: expires_days.map(|days| now + Duration::days(days)),
                is_active: true,
                rate_limit,
            };

            println!("{}", serde_json::to_string_pretty(&record)?);
        }
    }
    Ok(())
}

fn parse_permission(raw: &str) -> Result<Permission> {
    match raw.trim().to_lowercase().as_str() {
        "cohort_access" => Ok(Permission::CohortAccess),
        "metrics_access" => Ok(Permission::MetricsAccess),
        "admin" => Ok(Permission::Admin),
        other => Err(CalypsoError::Validation(format!(
            "unknown permission '{other}' (expected cohort_access, metrics_access, or admin)"
        ))),
    }
}
