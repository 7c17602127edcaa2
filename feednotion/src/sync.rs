//! Per-item pipeline (filter, dedup, generate, create) and the backfill pass.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use common::{Config, ContentMode};

use crate::filter::FilterEngine;
use crate::item::{normalize, Item, RawRecord};
use crate::llm::summarizer::Summarizer;
use crate::notion::blocks::{compose_body, has_generated_heading};
use crate::notion::{NewPage, PageSummary, Workspace};
use crate::scraping::MainTextExtractor;

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub source_label: String,
    pub page_content: bool,
    pub content_mode: ContentMode,
    pub embed_bookmark: bool,
    pub rate_limit_pause: Duration,
}

impl SyncOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            source_label: config.notion.source_label.clone(),
            page_content: config.notion.page_content,
            content_mode: config.notion.content_mode,
            embed_bookmark: config.notion.embed_bookmark,
            rate_limit_pause: Duration::from_millis(config.notion.rate_limit_pause_ms),
        }
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Filtered,
    Duplicate,
    Created,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub seen: usize,
    pub dropped: usize,
    pub filtered: usize,
    pub duplicates: usize,
    pub created: usize,
    pub failed: usize,
}

impl SyncReport {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Filtered => self.filtered += 1,
            Outcome::Duplicate => self.duplicates += 1,
            Outcome::Created => self.created += 1,
            Outcome::Failed => self.failed += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub inspected: usize,
    pub skipped: usize,
    pub appended: usize,
    pub failed: usize,
}

pub struct Syncer {
    workspace: Arc<dyn Workspace>,
    summarizer: Summarizer,
    extractor: MainTextExtractor,
    filter: FilterEngine,
    options: SyncOptions,
}

impl Syncer {
    pub fn new(
        workspace: Arc<dyn Workspace>,
        summarizer: Summarizer,
        extractor: MainTextExtractor,
        filter: FilterEngine,
        options: SyncOptions,
    ) -> Self {
        Self {
            workspace,
            summarizer,
            extractor,
            filter,
            options,
        }
    }

    /// Normalize and process records in source order. Nothing that goes wrong
    /// with one item stops the run.
    pub async fn run(&self, records: &[RawRecord]) -> SyncReport {
        let mut report = SyncReport::default();
        for (i, record) in records.iter().enumerate() {
            report.seen += 1;
            let Some(item) = normalize(record) else {
                debug!(index = i, "sync: record without link dropped");
                report.dropped += 1;
                continue;
            };
            info!("[{}] {}", i + 1, item.title);
            let outcome = self.process(&item).await;
            report.record(outcome);
        }
        info!(
            created = report.created,
            duplicates = report.duplicates,
            filtered = report.filtered,
            failed = report.failed,
            "sync: run finished"
        );
        report
    }

    pub async fn process(&self, item: &Item) -> Outcome {
        if !self
            .filter
            .passes(Some(&item.title), item.description.as_deref(), item.score)
        {
            info!(link = %item.link, "sync: skipped by filters");
            return Outcome::Filtered;
        }

        // A failed lookup counts as "not present"; a duplicate page is possible then.
        match self.workspace.find_by_url(&item.link).await {
            Ok(true) => {
                info!(link = %item.link, "sync: already exists");
                return Outcome::Duplicate;
            }
            Ok(false) => {}
            Err(e) => warn!(link = %item.link, "sync: dedup query failed: {}", e),
        }

        let summary = self
            .summarizer
            .one_line_summary(&item.title, &item.link, item.description.as_deref())
            .await;

        let children = if self.options.page_content {
            let generated = self.generate_body(item).await;
            compose_body(
                self.options.content_mode,
                self.bookmark_for(&item.link),
                generated.as_deref(),
                summary.as_deref(),
            )
        } else {
            Vec::new()
        };

        let page = NewPage::from_item(item, &self.options.source_label, summary, children);
        match self.workspace.create_page(&page).await {
            Ok(_) => Outcome::Created,
            Err(e) => {
                warn!(link = %item.link, "sync: notion error: {}", e);
                if e.is_rate_limited() {
                    tokio::time::sleep(self.options.rate_limit_pause).await;
                }
                Outcome::Failed
            }
        }
    }

    fn bookmark_for<'a>(&self, link: &'a str) -> Option<&'a str> {
        self.options.embed_bookmark.then_some(link)
    }

    async fn generate_body(&self, item: &Item) -> Option<String> {
        if !self.summarizer.is_enabled() {
            return None;
        }
        let text = match self.extractor.extract(&item.link).await {
            Some(text) => Some(text),
            None => item.description.clone(),
        };
        self.summarizer
            .generate_content(&item.title, &item.link, text.as_deref(), self.options.content_mode)
            .await
    }

    /// Append generated content to recently edited pages that lack it.
    pub async fn backfill(&self, limit: usize) -> BackfillReport {
        let mut report = BackfillReport::default();
        if !self.summarizer.is_enabled() {
            warn!("backfill: no model credential configured, nothing to generate");
            return report;
        }

        let pages = match self.workspace.recent_pages(limit).await {
            Ok(pages) => pages,
            Err(e) => {
                warn!("backfill: page query failed: {}", e);
                return report;
            }
        };

        for page in &pages {
            report.inspected += 1;
            match self.backfill_page(page).await {
                Ok(true) => report.appended += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    warn!(page_id = %page.id, "backfill: {}", e);
                    report.failed += 1;
                }
            }
        }
        info!(
            inspected = report.inspected,
            appended = report.appended,
            skipped = report.skipped,
            "backfill: finished"
        );
        report
    }

    async fn backfill_page(&self, page: &PageSummary) -> Result<bool, crate::notion::WorkspaceError> {
        let mode = self.options.content_mode;
        let existing = self.workspace.list_blocks(&page.id).await?;
        if has_generated_heading(&existing, mode) {
            debug!(page_id = %page.id, "backfill: already has generated content");
            return Ok(false);
        }
        let Some(url) = page.url.as_deref() else {
            debug!(page_id = %page.id, "backfill: page has no URL");
            return Ok(false);
        };

        let text = match self.extractor.extract(url).await {
            Some(text) => Some(text),
            None => page.summary.clone(),
        };
        let title = page.title.as_deref().unwrap_or(url);
        let generated = self
            .summarizer
            .generate_content(title, url, text.as_deref(), mode)
            .await;

        let blocks = compose_body(mode, None, generated.as_deref(), page.summary.as_deref());
        if blocks.is_empty() {
            return Ok(false);
        }
        self.workspace.append_blocks(&page.id, &blocks).await?;
        info!(page_id = %page.id, blocks = blocks.len(), "backfill: content appended");
        Ok(true)
    }
}
