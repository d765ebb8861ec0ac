use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use weather_core::{
    City, Config, InMemoryStore, Orchestrator, ProviderId, SystemClock, WeatherProvider,
    provider::{default_provider_from_config, provider_from_config},
};

use crate::http::{self, AppState};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather-server", version, about = "Cached weather lookup service")]
pub struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP service.
    Serve {
        /// Socket address to bind, e.g. "127.0.0.1:3000".
        #[arg(long)]
        bind: Option<String>,

        /// Provider short name, e.g. "mock" or "weatherapi".
        #[arg(long)]
        provider: Option<String>,
    },

    /// Look up one city and print the response envelope.
    Show {
        /// City name.
        city: String,

        #[arg(long)]
        provider: Option<String>,
    },

    /// Configure credentials for a specific provider.
    Configure {
        /// Provider short name, e.g. "weatherapi".
        provider: String,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let path = match self.config {
            Some(path) => path,
            None => Config::config_file_path()?,
        };

        match self.command {
            Command::Serve { bind, provider } => {
                let config = load_config(&path, bind)?;
                serve(&config, provider.as_deref()).await
            }
            Command::Show { city, provider } => {
                let config = load_config(&path, None)?;
                show(&config, &city, provider.as_deref()).await
            }
            Command::Configure { provider } => configure(&path, &provider),
        }
    }
}

fn load_config(path: &std::path::Path, bind: Option<String>) -> Result<Config> {
    let mut config = Config::load_from(path)?;
    config.apply_env_overrides()?;
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    Ok(config)
}

/// How often `serve` sweeps expired slots out of the in-memory store.
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

fn resolve_provider(config: &Config, requested: Option<&str>) -> Result<Arc<dyn WeatherProvider>> {
    let provider = match requested {
        Some(name) => provider_from_config(ProviderId::try_from(name)?, config)?,
        None if config.default_provider.is_some() => default_provider_from_config(config)?,
        None => {
            warn!("no default provider configured; falling back to the mock provider");
            provider_from_config(ProviderId::Mock, config)?
        }
    };

    Ok(Arc::from(provider))
}

fn orchestrator(config: &Config, store: Arc<InMemoryStore>, provider: Arc<dyn WeatherProvider>) -> Orchestrator {
    Orchestrator::from_config(config, store, provider, Arc::new(SystemClock))
}

async fn serve(config: &Config, provider: Option<&str>) -> Result<()> {
    let provider = resolve_provider(config, provider)?;
    let provider_id = provider.id();
    let store = Arc::new(InMemoryStore::new());
    let app = http::router(AppState::new(orchestrator(config, Arc::clone(&store), provider)));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            store.purge_expired();
        }
    });

    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.server.bind))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!(
        %addr,
        provider = %provider_id,
        quota_limit = config.quota.limit,
        quota_window_secs = config.quota.window_secs,
        validity_secs = config.cache.validity_secs,
        "weather service listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("weather service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn show(config: &Config, city: &str, provider: Option<&str>) -> Result<()> {
    let city = City::parse(Some(city))?;
    let provider = resolve_provider(config, provider)?;

    let store = Arc::new(InMemoryStore::new());
    let envelope = orchestrator(config, store, provider).lookup(&city).await?;
    println!("{}", serde_json::to_string_pretty(&envelope)?);

    if !envelope.is_success() {
        anyhow::bail!("lookup failed with status {}", envelope.status_code());
    }
    Ok(())
}

fn configure(path: &std::path::Path, provider: &str) -> Result<()> {
    let id = ProviderId::try_from(provider)?;
    let mut config = Config::load_from(path)?;

    if id.requires_api_key() {
        let api_key = inquire::Password::new(&format!("API key for {id}:"))
            .without_confirmation()
            .prompt()
            .context("Failed to read API key")?;
        let api_key = api_key.trim().to_string();
        if api_key.is_empty() {
            anyhow::bail!("API key must not be empty");
        }
        config.upsert_provider_api_key(id, api_key);
    }

    let make_default = match config.default_provider_id() {
        Ok(current) if current == id => false,
        Ok(current) => inquire::Confirm::new(&format!("Replace default provider '{current}' with '{id}'?"))
            .with_default(false)
            .prompt()
            .context("Failed to read answer")?,
        Err(_) => true,
    };
    if make_default {
        config.set_default_provider(id);
    }

    config.save_to(path)?;
    println!("Configured provider '{id}' in {}", path.display());
    Ok(())
}
