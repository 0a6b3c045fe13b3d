use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::FromRef;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod controllers;
mod db;
mod error;
mod landing;
mod markdown;
mod models;
mod purge;
mod retention;
mod types;
mod view;

#[cfg(test)]
mod test_support;

pub(crate) use error::ApiResult;

use config::{Config, Mode};
use db::Database;
use landing::LandingPage;
use retention::Retention;

/// A pastebin for text that expires.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Path to a TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server.
    Serve,
    /// Delete expired pastes once and exit.
    PurgeExpired,
}

/// Everything a request handler needs, built once at startup.
#[derive(Clone, FromRef)]
pub struct App {
    pub config: Arc<Config>,
    pub retention: Arc<Retention>,
    pub database: Database,
    pub landing: Arc<LandingPage>,
}

impl App {
    pub async fn load(config: Config) -> anyhow::Result<Self> {
        let retention = Retention::new(&config.pastes)?;
        let landing = LandingPage::render(&config).context("failed to render landing page")?;
        let database = Database::connect(&config.database.url)
            .await
            .with_context(|| format!("failed to open database {}", config.database.url))?;

        Ok(App {
            config: Arc::new(config),
            retention: Arc::new(retention),
            database,
            landing: Arc::new(landing),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref()).context("failed to load config")?;

    let default_filter = match config.server.mode {
        Mode::Production => "tempbin=info,tower_http=info",
        Mode::Development => "tempbin=debug,tower_http=debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    log_settings(&config);

    let app = App::load(config).await?;

    match cli.command {
        Command::Serve => commands::serve::run(app).await,
        Command::PurgeExpired => commands::purge_expired::run(app).await,
    }
}

fn log_settings(config: &Config) {
    let pastes = &config.pastes;
    info!("mode: {:?}", config.server.mode);
    info!("supported mimes: text/*, {}", pastes.allowed_mimes.join(", "));
    match &config.server.url_prefix {
        Some(prefix) => info!("url prefix: {prefix}"),
        None => info!("url prefix: (not configured, set PASTE_URL_PREFIX)"),
    }
    info!(
        "paste expiration: default {}s, max {}",
        pastes.default_expires,
        pastes
            .max_expires
            .map_or_else(|| "-none-".to_owned(), |max| format!("{max}s"))
    );
    info!(
        "paste ids: {} characters from a {}-character alphabet",
        pastes.id_length,
        pastes.id_alphabet.chars().count()
    );
}
