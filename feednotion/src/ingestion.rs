use chrono::DateTime;
use feed_rs::parser;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use reqwest::header::ACCEPT;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::FetchError;
use crate::http;
use crate::item::{is_alternate, FieldValue, Mapping, RawRecord, TagEntry, TimeParts};
use crate::listing::ListingScraper;

/// Where a batch of records came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordSource {
    Feed(String),
    Listing(String),
    Nothing,
}

#[derive(Debug)]
pub struct FetchedRecords {
    pub source: RecordSource,
    pub records: Vec<RawRecord>,
}

/// Fetches the configured feed, falling back through URL variants and then
/// the HTML listing. Never fails: total failure is an empty batch.
pub struct FeedFetcher {
    client: Client,
    feed_url: String,
    timeout: Duration,
    max_items: usize,
    listing: ListingScraper,
}

impl FeedFetcher {
    pub fn new(
        client: Client,
        feed_url: impl Into<String>,
        timeout: Duration,
        max_items: usize,
        listing: ListingScraper,
    ) -> Self {
        Self {
            client,
            feed_url: feed_url.into(),
            timeout,
            max_items,
            listing,
        }
    }

    pub async fn fetch_records(&self) -> FetchedRecords {
        let mut fetched = self.fetch_untruncated().await;
        fetched.records.truncate(self.max_items);
        fetched
    }

    async fn fetch_untruncated(&self) -> FetchedRecords {
        for url in feed_url_variants(&self.feed_url) {
            info!("Fetching feed: {}", url);
            match fetch_and_parse_feed(&self.client, &url, self.timeout).await {
                Ok(records) if !records.is_empty() => {
                    info!("Fetched feed '{}': {} entries", url, records.len());
                    return FetchedRecords {
                        source: RecordSource::Feed(url),
                        records,
                    };
                }
                Ok(_) => info!("feed '{}' returned no entries", url),
                Err(e) => warn!("feed request failed: {}", e),
            }
        }

        let layout = self.listing.layout();
        for url in [layout.newest_url(), layout.root_url()] {
            info!("Falling back to listing scrape: {}", url);
            match self.listing.scrape(&url).await {
                Ok(rows) if !rows.is_empty() => {
                    return FetchedRecords {
                        source: RecordSource::Listing(url),
                        records: rows.into_iter().map(RawRecord::from).collect(),
                    };
                }
                Ok(_) => info!("listing '{}' had no rows", url),
                Err(e) => warn!("scrape failed for {}: {}", url, e),
            }
        }

        warn!("no items from feed or listing");
        FetchedRecords {
            source: RecordSource::Nothing,
            records: Vec::new(),
        }
    }
}

/// The URL as given, with a trailing slash, downgraded to plain http, and both.
/// Duplicates are dropped, order is kept.
pub fn feed_url_variants(url: &str) -> Vec<String> {
    let with_slash = |u: &str| format!("{}/", u.trim_end_matches('/'));
    let plain = url.replacen("https://", "http://", 1);
    let candidates = [url.to_string(), with_slash(url), plain.clone(), with_slash(&plain)];

    let mut variants: Vec<String> = Vec::with_capacity(candidates.len());
    for c in candidates {
        if !variants.contains(&c) {
            variants.push(c);
        }
    }
    variants
}

/// Fetch one feed URL and parse it into raw records.
pub async fn fetch_and_parse_feed(client: &Client, url: &str, timeout: Duration) -> Result<Vec<RawRecord>, FetchError> {
    let response = client
        .get(url)
        .timeout(timeout)
        .header(ACCEPT, http::ACCEPT_FEED)
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

    let bytes = response.bytes().await.map_err(|e| FetchError::request(url, e))?;
    parse_feed_body(url, &bytes)
}

/// Strict parse first; on failure, salvage whatever complete entries precede the damage.
pub fn parse_feed_body(url: &str, body: &[u8]) -> Result<Vec<RawRecord>, FetchError> {
    match parser::parse(body) {
        Ok(feed) => Ok(feed.entries.into_iter().map(RawRecord::from).collect()),
        Err(e) => {
            warn!("feed parse warning for {}: {}", url, e);
            let text = String::from_utf8_lossy(body);
            let salvaged = salvage_entries(&text);
            if salvaged.is_empty() {
                return Err(FetchError::parse(url, e));
            }
            info!("salvaged {} entries from malformed feed {}", salvaged.len(), url);
            Ok(salvaged.into_iter().map(RawRecord::from).collect())
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum EntryField {
    Title,
    Link,
    Summary,
    Content,
    Published,
    Updated,
    Category,
    Comments,
}

fn entry_field(local_name: &[u8]) -> Option<EntryField> {
    match local_name {
        b"title" => Some(EntryField::Title),
        b"link" => Some(EntryField::Link),
        b"description" | b"summary" => Some(EntryField::Summary),
        b"encoded" | b"content" => Some(EntryField::Content),
        b"pubDate" | b"published" | b"issued" => Some(EntryField::Published),
        b"updated" | b"date" | b"modified" => Some(EntryField::Updated),
        b"category" => Some(EntryField::Category),
        b"comments" => Some(EntryField::Comments),
        _ => None,
    }
}

#[derive(Default)]
struct PartialEntry {
    title: String,
    link: String,
    summary: String,
    content: String,
    published: String,
    updated: String,
    comments: String,
    tags: Vec<TagEntry>,
    category: String,
    /// First non-alternate `href`, used only when no alternate link shows up
    other_link: String,
}

impl PartialEntry {
    fn push_text(&mut self, field: EntryField, text: &str) {
        let target = match field {
            EntryField::Title => &mut self.title,
            EntryField::Link => &mut self.link,
            EntryField::Summary => &mut self.summary,
            EntryField::Content => &mut self.content,
            EntryField::Published => &mut self.published,
            EntryField::Updated => &mut self.updated,
            EntryField::Comments => &mut self.comments,
            EntryField::Category => &mut self.category,
        };
        target.push_str(text);
    }

    /// Atom links: the first `rel="alternate"` (or rel-less) href wins.
    fn offer_link(&mut self, rel: Option<&str>, href: String) {
        if is_alternate(rel) {
            if self.link.is_empty() {
                self.link = href;
            }
        } else if self.other_link.is_empty() {
            self.other_link = href;
        }
    }

    fn finish_category(&mut self) {
        let term = std::mem::take(&mut self.category);
        let term = term.trim();
        if !term.is_empty() {
            self.tags.push(TagEntry {
                term: Some(term.to_string()),
                label: None,
            });
        }
    }

    fn into_mapping(self) -> Mapping {
        fn text(s: String) -> Option<FieldValue> {
            let s = s.trim().to_string();
            (!s.is_empty()).then_some(FieldValue::Text(s))
        }
        fn time(s: &str) -> Option<FieldValue> {
            let s = s.trim();
            DateTime::parse_from_rfc2822(s)
                .or_else(|_| DateTime::parse_from_rfc3339(s))
                .ok()
                .map(|d| FieldValue::Time(TimeParts::from_datetime(&d)))
        }

        let link = if self.link.trim().is_empty() {
            self.other_link
        } else {
            self.link
        };

        let mut map = Mapping::new();
        map.insert("published_parsed".into(), time(&self.published));
        map.insert("updated_parsed".into(), time(&self.updated));
        map.insert("title".into(), text(self.title));
        map.insert("link".into(), text(link));
        map.insert("summary".into(), text(self.summary));
        map.insert("description".into(), text(self.content));
        map.insert("comments".into(), text(self.comments));
        map.insert(
            "tags".into(),
            (!self.tags.is_empty()).then_some(FieldValue::Tags(self.tags)),
        );
        map
    }
}

fn attribute(e: &BytesStart<'_>, name: &str) -> Option<String> {
    e.try_get_attribute(name)
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// Lenient scan of an RSS/Atom document. Collects every `<item>`/`<entry>`
/// that closes before the first XML error.
pub fn salvage_entries(xml: &str) -> Vec<Mapping> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<PartialEntry> = None;
    let mut field: Option<EntryField> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.local_name();
                if matches!(name.as_ref(), b"item" | b"entry") {
                    current = Some(PartialEntry::default());
                    field = None;
                } else if let Some(entry) = current.as_mut() {
                    field = entry_field(name.as_ref());
                    if field == Some(EntryField::Link) {
                        if let Some(href) = attribute(&e, "href") {
                            entry.offer_link(attribute(&e, "rel").as_deref(), href);
                            field = None;
                        }
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                if let Some(entry) = current.as_mut() {
                    match entry_field(e.local_name().as_ref()) {
                        Some(EntryField::Link) => {
                            if let Some(href) = attribute(&e, "href") {
                                entry.offer_link(attribute(&e, "rel").as_deref(), href);
                            }
                        }
                        Some(EntryField::Category) => {
                            if let Some(term) = attribute(&e, "term") {
                                entry.category = term;
                                entry.finish_category();
                            }
                        }
                        _ => {}
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if let (Some(entry), Some(f)) = (current.as_mut(), field) {
                    match t.unescape() {
                        Ok(text) => entry.push_text(f, &text),
                        Err(e) => debug!("salvage: undecodable text skipped: {}", e),
                    }
                }
            }
            Ok(Event::CData(c)) => {
                if let (Some(entry), Some(f)) = (current.as_mut(), field) {
                    entry.push_text(f, &String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Ok(Event::End(e)) => {
                let name = e.local_name();
                if matches!(name.as_ref(), b"item" | b"entry") {
                    if let Some(entry) = current.take() {
                        entries.push(entry.into_mapping());
                    }
                } else if field == Some(EntryField::Category) {
                    if let Some(entry) = current.as_mut() {
                        entry.finish_category();
                    }
                }
                field = None;
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                debug!("salvage stopped at byte {}: {}", reader.buffer_position(), e);
                break;
            }
            _ => {}
        }
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::normalize;

    #[test]
    fn variants_cover_slash_and_scheme() {
        assert_eq!(
            feed_url_variants("https://news.test/rss"),
            vec![
                "https://news.test/rss",
                "https://news.test/rss/",
                "http://news.test/rss",
                "http://news.test/rss/",
            ]
        );
    }

    #[test]
    fn variants_drop_duplicates() {
        assert_eq!(
            feed_url_variants("http://news.test/rss/"),
            vec!["http://news.test/rss/"]
        );
    }

    #[test]
    fn well_formed_feed_parses_strictly() {
        let xml = br#"<?xml version="1.0"?><rss version="2.0"><channel><title>t</title>
            <item><title>A</title><link>https://x.test/a</link></item>
            <item><title>B</title><link>https://x.test/b</link></item>
            </channel></rss>"#;
        let records = parse_feed_body("test", xml).expect("parse");
        assert_eq!(records.len(), 2);
        assert!(matches!(records[0], RawRecord::Entry(_)));
    }

    #[test]
    fn truncated_feed_keeps_complete_entries() {
        let xml = br#"<?xml version="1.0"?><rss version="2.0"><channel><title>t</title>
            <item><title>Kept &amp; sound</title><link>https://x.test/a</link>
              <description><![CDATA[<p>body</p>]]></description>
              <pubDate>Tue, 05 Mar 2024 10:20:30 +0000</pubDate>
              <category>rust</category></item>
            <item><title>Broken</title><link>https://x.test/b</lin"#;
        let records = parse_feed_body("test", xml).expect("salvaged");
        assert_eq!(records.len(), 1);

        let item = normalize(&records[0]).expect("item");
        assert_eq!(item.title, "Kept & sound");
        assert_eq!(item.link, "https://x.test/a");
        assert_eq!(item.description.as_deref(), Some("body"));
        assert_eq!(item.published_at.as_deref(), Some("2024-03-05T10:20:30"));
        assert_eq!(item.tags, Some(vec!["rust".to_string()]));
    }

    #[test]
    fn atom_links_and_terms_are_salvaged() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom">
            <entry><title>Atom</title><link rel="alternate" href="https://x.test/atom"/>
              <category term="web"/><updated>2024-01-02T03:04:05Z</updated></entry>
            <entry><title>cut"#;
        let entries = salvage_entries(xml);
        assert_eq!(entries.len(), 1);
        let item = normalize(&RawRecord::from(entries[0].clone())).expect("item");
        assert_eq!(item.link, "https://x.test/atom");
        assert_eq!(item.tags, Some(vec!["web".to_string()]));
        assert_eq!(item.published_at.as_deref(), Some("2024-01-02T03:04:05"));
    }

    #[test]
    fn alternate_link_wins_over_earlier_replies_link() {
        let strict = br#"<?xml version="1.0" encoding="utf-8"?>
            <feed xmlns="http://www.w3.org/2005/Atom"><title>t</title><id>urn:t</id>
              <updated>2024-01-02T03:04:05Z</updated>
              <entry><title>One</title><id>urn:1</id><updated>2024-01-02T03:04:05Z</updated>
                <link rel="replies" href="https://x.test/1#comments"/>
                <link rel="alternate" href="https://x.test/1"/>
              </entry>
            </feed>"#;
        let records = parse_feed_body("test", strict).expect("parse");
        assert_eq!(normalize(&records[0]).expect("item").link, "https://x.test/1");

        let broken = r#"<feed xmlns="http://www.w3.org/2005/Atom">
            <entry><title>One</title>
              <link rel="replies" href="https://x.test/1#comments"></link>
              <link rel="edit" href="https://x.test/edit/1"/>
              <link rel="alternate" href="https://x.test/1"></link>
            </entry>
            <entry><title>Two</title><link rel="self" href="https://x.test/2.atom"/></entry>
            <entry><title>cut"#;
        let entries = salvage_entries(broken);
        assert_eq!(entries.len(), 2);
        let first = normalize(&RawRecord::from(entries[0].clone())).expect("item");
        assert_eq!(first.link, "https://x.test/1");
        let second = normalize(&RawRecord::from(entries[1].clone())).expect("item");
        assert_eq!(second.link, "https://x.test/2.atom");
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let err = parse_feed_body("test", b"not a feed at all").unwrap_err();
        assert!(matches!(err, FetchError::Parse { .. }));
    }
}
