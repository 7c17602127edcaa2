/*
feednotion - main.rs
Reads the aggregator feed, optionally summarizes each new item, and creates
one Notion database page per unseen link. Optionally backfills content onto
existing pages.
*/

use anyhow::{Context, Result};
use clap::Parser;
use common::Config;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use feednotion::filter::FilterEngine;
use feednotion::http::build_client;
use feednotion::ingestion::FeedFetcher;
use feednotion::listing::{ListingLayout, ListingScraper};
use feednotion::llm::remote::RemoteLlmProvider;
use feednotion::llm::summarizer::Summarizer;
use feednotion::llm::LlmProvider;
use feednotion::notion::{NotionClient, Workspace};
use feednotion::scraping::{strategy_for, MainTextExtractor};
use feednotion::sync::{SyncOptions, Syncer};

#[derive(Parser, Debug)]
#[command(name = "feednotion", about = "Sync a news feed into a Notion database")]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override log level (info, debug, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Skip ingestion and only append content to existing pages
    #[arg(long)]
    backfill_only: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // .env is optional
    dotenv::dotenv().ok();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = load_config(args.config).await?;

    let credentials = match config.workspace_credentials() {
        Ok(c) => c,
        Err(e) => {
            error!("{:#}", e);
            return Err(e);
        }
    };

    let client = build_client()?;

    let workspace: Arc<dyn Workspace> = Arc::new(NotionClient::new(
        client.clone(),
        &config.notion.api_url,
        credentials.token,
        credentials.database_id,
        Duration::from_secs(config.notion.timeout_seconds),
    ));

    let provider: Option<Arc<dyn LlmProvider>> = config.llm_api_key().map(|key| {
        info!(model = %config.llm.model, "LLM summaries enabled");
        Arc::new(
            RemoteLlmProvider::new(&config.llm.api_url, key, &config.llm.model)
                .with_client(client.clone())
                .with_defaults(config.llm.timeout_seconds, 500, 0.2),
        ) as Arc<dyn LlmProvider>
    });
    if provider.is_none() {
        info!("no model credential, summaries disabled");
    }
    let summarizer = Summarizer::new(provider, &config.llm.language);

    let extractor = MainTextExtractor::new(
        client.clone(),
        strategy_for(config.extract.strategy),
        Duration::from_secs(config.extract.timeout_seconds),
        format!("{}/", config.feed.listing_base_url.trim_end_matches('/')),
        config.extract.max_chars,
    );

    let syncer = Syncer::new(
        workspace,
        summarizer,
        extractor,
        FilterEngine::from_config(&config.filters),
        SyncOptions::from_config(&config),
    );

    if !args.backfill_only {
        let listing = ListingScraper::new(
            client.clone(),
            ListingLayout::geeknews(&config.feed.listing_base_url),
            Duration::from_secs(config.feed.timeout_seconds),
        )?;
        let fetcher = FeedFetcher::new(
            client.clone(),
            &config.feed.url,
            Duration::from_secs(config.feed.timeout_seconds),
            config.feed.max_items,
            listing,
        );

        let fetched = fetcher.fetch_records().await;
        info!(source = ?fetched.source, items = fetched.records.len(), "records fetched");

        let report = syncer.run(&fetched.records).await;
        println!("Created {} new pages", report.created);
    }

    if config.backfill.enabled || args.backfill_only {
        let report = syncer.backfill(config.backfill.limit).await;
        println!("Backfilled {} pages", report.appended);
    }

    Ok(())
}

async fn load_config(explicit: Option<PathBuf>) -> Result<Config> {
    let default_path = PathBuf::from("config.default.toml");

    let override_path = if let Some(p) = explicit {
        if !p.exists() {
            error!(path = ?p, "specified config file not found");
            return Err(anyhow::anyhow!("Config file not found: {}", p.display()));
        }
        Some(p)
    } else {
        let p = PathBuf::from("config.toml");
        if p.exists() { Some(p) } else { None }
    };

    let mut config = Config::load_with_defaults(
        if default_path.exists() { Some(&default_path) } else { None },
        override_path.as_deref(),
    )
    .await
    .context("failed to load configuration")?;
    config.apply_env();

    info!(default = ?default_path, override = ?override_path, "configuration loaded");
    Ok(config)
}
