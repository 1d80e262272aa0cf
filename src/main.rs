use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use url::Url;

use podscrape::catalog::{load_catalog, CatalogSource};
use podscrape::config::Config;
use podscrape::discover::discover;
use podscrape::scrape::{build_client, DEFAULT_WORKERS};
use podscrape::server::{self, ServerSettings};

#[derive(Parser, Debug)]
#[command(
    name = "podscrape",
    version,
    about = "Serves RSS feeds scraped from podcast listing pages"
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Config file (missing file means defaults)
    #[arg(long, value_name = "FILE", default_value = "podscrape.toml")]
    config: PathBuf,

    /// Catalog JSON file path or http(s) URL
    #[arg(long, value_name = "PATH_OR_URL")]
    catalog: Option<String>,

    /// Address to listen on, e.g. 0.0.0.0:8080
    #[arg(long, value_name = "ADDR")]
    listen: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl a site's Podcast menu and print catalog JSON to stdout
    Discover {
        /// Landing page URL, e.g. https://www.radiocity.in
        base_url: String,

        /// Concurrent page fetches
        #[arg(long, default_value_t = DEFAULT_WORKERS)]
        workers: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    config.apply_env(
        std::env::var("PORT").ok().as_deref(),
        std::env::var("CONFIG_URL").ok().as_deref(),
    );

    if let Some(Command::Discover { base_url, workers }) = args.command {
        let base_url = Url::parse(&base_url)
            .with_context(|| format!("Invalid base url {base_url:?}"))?;
        let client =
            build_client(config.request_timeout()).context("Failed to build HTTP client")?;
        let entries = discover(&client, &base_url, workers)
            .await
            .with_context(|| format!("Failed to discover podcasts from {base_url}"))?;
        println!(
            "{}",
            serde_json::to_string_pretty(&entries).context("Failed to encode catalog")?
        );
        return Ok(());
    }

    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }
    if let Some(catalog) = args.catalog {
        config.catalog = Some(catalog);
    }

    let addr = config.listen_addr().context("Invalid listen address")?;
    let master = config.master_meta().context("Invalid [master] section")?;
    let catalog = config.catalog.as_deref().context(
        "No catalog configured: pass --catalog, set `catalog` in the config file, or set CONFIG_URL",
    )?;

    let client = build_client(config.request_timeout()).context("Failed to build HTTP client")?;

    let source = CatalogSource::parse(catalog);
    let programs = load_catalog(&client, &source)
        .await
        .with_context(|| format!("Failed to retrieve any podcast configurations from {source}"))?;

    let settings = ServerSettings {
        workers: config.workers(),
        ttl: config.cache_ttl(),
        master,
    };
    let app = server::app(&client, &programs, &settings);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(addr = %addr, programs = programs.len(), "Listening");

    server::serve(listener, app, shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server gracefully stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down the server...");
}
