//! Fetch and normalize the configured feed and print what would be synced.
//! Touches neither Notion nor the model.

use common::Config;
use std::path::Path;
use std::time::Duration;

use feednotion::filter::FilterEngine;
use feednotion::http::build_client;
use feednotion::ingestion::FeedFetcher;
use feednotion::item::normalize;
use feednotion::listing::{ListingLayout, ListingScraper};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let default_path = Path::new("config.default.toml");
    let override_path = Path::new("config.toml");
    let mut config = Config::load_with_defaults(Some(default_path), Some(override_path)).await?;
    config.apply_env();

    let client = build_client()?;
    let timeout = Duration::from_secs(config.feed.timeout_seconds);
    let listing = ListingScraper::new(
        client.clone(),
        ListingLayout::geeknews(&config.feed.listing_base_url),
        timeout,
    )?;
    let fetcher = FeedFetcher::new(client, &config.feed.url, timeout, config.feed.max_items, listing);
    let filter = FilterEngine::from_config(&config.filters);

    println!("\n{}", "=".repeat(60));
    println!("Probing: {}", config.feed.url);
    println!("{}", "=".repeat(60));

    let fetched = fetcher.fetch_records().await;
    println!("Source: {:?}", fetched.source);
    println!("Records: {}", fetched.records.len());

    for (i, record) in fetched.records.iter().enumerate() {
        let Some(item) = normalize(record) else {
            println!("  {}. (no link, dropped)", i + 1);
            continue;
        };
        let verdict = if filter.passes(Some(&item.title), item.description.as_deref(), item.score) {
            "✓"
        } else {
            "✗"
        };
        println!("  {}. {} {}", i + 1, verdict, item.title);
        println!("       URL: {}", item.link);
        println!(
            "       Published: {}  Score: {}  Tags: {}",
            item.published_at.as_deref().unwrap_or("-"),
            item.score.map(|s| s.to_string()).unwrap_or_else(|| "-".into()),
            item.tags.as_ref().map(|t| t.join(", ")).unwrap_or_default()
        );
        let desc_len = item.description.as_ref().map(|d| d.chars().count()).unwrap_or(0);
        println!("       Description: {} chars", desc_len);
    }
    Ok(())
}
