//! HTML listing scraper used when the feed endpoint returns nothing usable.

use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, REFERER};
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::error::FetchError;
use crate::http;
use crate::item::{FieldValue, Mapping, RawRecord};

/// Where a listing lives and how its rows are marked up.
#[derive(Debug, Clone)]
pub struct ListingLayout {
    pub base_url: String,
    pub row: String,
    pub title: String,
    pub score: String,
    pub description: String,
    pub permalink: String,
}

impl ListingLayout {
    /// GeekNews (news.hada.io) topic listing.
    pub fn geeknews(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            row: "div.topics div.topic_row".to_string(),
            title: "div.topictitle a[href]".to_string(),
            score: "div.topicinfo span[id^='tp']".to_string(),
            description: "div.topicdesc a".to_string(),
            permalink: "div.topicdesc a[href*='topic?id=']".to_string(),
        }
    }

    pub fn newest_url(&self) -> String {
        format!("{}/new", self.base_url)
    }

    pub fn root_url(&self) -> String {
        format!("{}/", self.base_url)
    }
}

/// One listing row, in document order.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapedRow {
    pub title: String,
    pub link: String,
    pub points: Option<i64>,
    pub snippet: Option<String>,
    /// Internal permalink to the aggregator's discussion page
    pub topic: Option<String>,
}

impl From<ScrapedRow> for RawRecord {
    fn from(row: ScrapedRow) -> Self {
        let mut map = Mapping::new();
        map.insert("title".into(), Some(FieldValue::Text(row.title)));
        map.insert("link".into(), Some(FieldValue::Text(row.link)));
        map.insert("summary".into(), row.snippet.clone().map(FieldValue::Text));
        map.insert("description".into(), row.snippet.map(FieldValue::Text));
        map.insert("topic".into(), row.topic.map(FieldValue::Text));
        map.insert("points".into(), row.points.map(FieldValue::Integer));
        RawRecord::Mapping(map)
    }
}

struct CompiledLayout {
    row: Selector,
    title: Selector,
    score: Selector,
    description: Selector,
    permalink: Selector,
}

fn compile(selector: &str) -> Result<Selector, FetchError> {
    Selector::parse(selector).map_err(|e| FetchError::Selector(format!("{selector}: {e:?}")))
}

pub struct ListingScraper {
    client: Client,
    layout: ListingLayout,
    selectors: CompiledLayout,
    base: Option<Url>,
    timeout: Duration,
}

impl ListingScraper {
    pub fn new(client: Client, layout: ListingLayout, timeout: Duration) -> Result<Self, FetchError> {
        let selectors = CompiledLayout {
            row: compile(&layout.row)?,
            title: compile(&layout.title)?,
            score: compile(&layout.score)?,
            description: compile(&layout.description)?,
            permalink: compile(&layout.permalink)?,
        };
        let base = Url::parse(&layout.root_url()).ok();
        Ok(Self {
            client,
            layout,
            selectors,
            base,
            timeout,
        })
    }

    pub fn layout(&self) -> &ListingLayout {
        &self.layout
    }

    /// Fetch one listing page and parse its rows.
    pub async fn scrape(&self, url: &str) -> Result<Vec<ScrapedRow>, FetchError> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .header(ACCEPT, http::ACCEPT_HTML)
            .header(ACCEPT_LANGUAGE, http::ACCEPT_LANGUAGE)
            .header(REFERER, self.layout.root_url())
            .send()
            .await
            .map_err(|e| FetchError::request(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        let body = response.text().await.map_err(|e| FetchError::request(url, e))?;
        let rows = self.parse_rows(&body);
        info!(url, rows = rows.len(), "listing: scraped rows");
        Ok(rows)
    }

    pub fn parse_rows(&self, html: &str) -> Vec<ScrapedRow> {
        let document = Html::parse_document(html);
        document
            .select(&self.selectors.row)
            .filter_map(|row| self.parse_row(row))
            .collect()
    }

    fn parse_row(&self, row: ElementRef<'_>) -> Option<ScrapedRow> {
        let anchor = row.select(&self.selectors.title).next()?;
        let href = anchor.value().attr("href")?.trim();
        if href.is_empty() {
            debug!("listing: row with empty title href skipped");
            return None;
        }
        let title = spaced_text(anchor);

        let points = row
            .select(&self.selectors.score)
            .next()
            .and_then(|el| el.text().map(str::trim).collect::<String>().parse::<i64>().ok());

        let snippet = row
            .select(&self.selectors.description)
            .next()
            .map(spaced_text)
            .filter(|s| !s.is_empty());

        let topic = row
            .select(&self.selectors.permalink)
            .next()
            .and_then(|a| a.value().attr("href"))
            .filter(|h| !h.starts_with("http"))
            .map(|h| format!("{}/{}", self.layout.base_url, h.trim_start_matches('/')));

        Some(ScrapedRow {
            title,
            link: self.resolve(href),
            points,
            snippet,
            topic,
        })
    }

    /// Relative title links (self posts) are resolved against the listing base.
    fn resolve(&self, href: &str) -> String {
        if Url::parse(href).is_ok() {
            return href.to_string();
        }
        match self.base.as_ref().and_then(|b| b.join(href).ok()) {
            Some(url) => url.to_string(),
            None => href.to_string(),
        }
    }
}

fn spaced_text(el: ElementRef<'_>) -> String {
    el.text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
