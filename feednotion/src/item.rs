//! Canonical item shape and the normalizer that produces it.
//!
//! Records arrive either as parsed feed entries or as key/value mappings built
//! by the listing scraper and the lenient feed salvage. Both are read through
//! [`RawRecord::get`], which tries a primary key and then alternates.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use feed_rs::model::Entry;
use scraper::Html;
use std::collections::BTreeMap;
use tracing::debug;

/// Value stored under one field of a raw record.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Time(TimeParts),
    Tags(Vec<TagEntry>),
}

impl FieldValue {
    pub fn into_text(self) -> Option<String> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::Integer(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Integers pass through, text is parsed best-effort.
    pub fn into_integer(self) -> Option<i64> {
        match self {
            FieldValue::Integer(n) => Some(n),
            FieldValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Broken-down calendar time: year, month, day, hour, minute, second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeParts {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl TimeParts {
    pub fn new(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> Self {
        Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
        }
    }

    /// Parts of the instant expressed in UTC.
    pub fn from_datetime<Tz: TimeZone>(dt: &DateTime<Tz>) -> Self {
        use chrono::{Datelike, Timelike};
        let utc = dt.with_timezone(&Utc);
        Self::new(
            utc.year(),
            utc.month(),
            utc.day(),
            utc.hour(),
            utc.minute(),
            utc.second(),
        )
    }

    /// `YYYY-MM-DDTHH:MM:SS`, or `None` when the parts do not form a valid time.
    pub fn to_iso8601(&self) -> Option<String> {
        let dt = NaiveDate::from_ymd_opt(self.year, self.month, self.day)?.and_hms_opt(
            self.hour,
            self.minute,
            self.second,
        )?;
        Some(dt.format("%Y-%m-%dT%H:%M:%S").to_string())
    }
}

/// One tag/category entry. Only entries carrying a `term` become tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagEntry {
    pub term: Option<String>,
    pub label: Option<String>,
}

/// Key/value record. A key may be present with a null value.
pub type Mapping = BTreeMap<String, Option<FieldValue>>;

/// A record as fetched, before normalization.
#[derive(Debug, Clone)]
pub enum RawRecord {
    Entry(Box<Entry>),
    Mapping(Mapping),
}

impl From<Entry> for RawRecord {
    fn from(entry: Entry) -> Self {
        RawRecord::Entry(Box::new(entry))
    }
}

impl From<Mapping> for RawRecord {
    fn from(map: Mapping) -> Self {
        RawRecord::Mapping(map)
    }
}

impl RawRecord {
    /// First present, non-null value among `key` and then `alternates`, in order.
    pub fn get(&self, key: &str, alternates: &[&str]) -> Option<FieldValue> {
        std::iter::once(key)
            .chain(alternates.iter().copied())
            .find_map(|k| self.field(k))
    }

    fn field(&self, key: &str) -> Option<FieldValue> {
        match self {
            RawRecord::Mapping(map) => map.get(key).cloned().flatten(),
            RawRecord::Entry(entry) => entry_field(entry, key),
        }
    }
}

/// Links without `rel`, or with `rel="alternate"`, point at the story itself.
pub(crate) fn is_alternate(rel: Option<&str>) -> bool {
    rel.map_or(true, |r| r.trim().is_empty() || r.trim() == "alternate")
}

fn entry_field(entry: &Entry, key: &str) -> Option<FieldValue> {
    match key {
        "id" => Some(FieldValue::Text(entry.id.clone())),
        "title" => entry.title.as_ref().map(|t| FieldValue::Text(t.content.clone())),
        "link" => entry
            .links
            .iter()
            .find(|l| is_alternate(l.rel.as_deref()))
            .or_else(|| entry.links.first())
            .map(|l| FieldValue::Text(l.href.clone())),
        "summary" => entry.summary.as_ref().map(|t| FieldValue::Text(t.content.clone())),
        "description" => entry
            .content
            .as_ref()
            .and_then(|c| c.body.clone())
            .map(FieldValue::Text),
        "published_parsed" => entry.published.as_ref().map(|d| FieldValue::Time(TimeParts::from_datetime(d))),
        "updated_parsed" => entry.updated.as_ref().map(|d| FieldValue::Time(TimeParts::from_datetime(d))),
        "tags" if !entry.categories.is_empty() => Some(FieldValue::Tags(
            entry
                .categories
                .iter()
                .map(|c| TagEntry {
                    term: Some(c.term.clone()),
                    label: c.label.clone(),
                })
                .collect(),
        )),
        _ => None,
    }
}

/// Canonical item handed to the filter and the workspace sync.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub title: String,
    /// Dedup key
    pub link: String,
    pub description: Option<String>,
    /// ISO-8601, no offset
    pub published_at: Option<String>,
    pub score: Option<i64>,
    pub tags: Option<Vec<String>>,
    /// Aggregator's own discussion page, when the scraper found one
    pub discussion_url: Option<String>,
}

/// Build an [`Item`] from a raw record. Records without a link yield `None`.
pub fn normalize(record: &RawRecord) -> Option<Item> {
    let link = match text_field(record, "link", &[]) {
        Some(link) => link,
        None => {
            debug!("dropping record without link");
            return None;
        }
    };

    let title = text_field(record, "title", &[]).unwrap_or_default();
    let description = text_field(record, "summary", &["description"]).map(|d| {
        if d.contains('<') {
            html_to_text(&d)
        } else {
            collapse_whitespace(&d)
        }
    });
    let description = description.filter(|d| !d.is_empty());

    let published_at = match record.get("published_parsed", &["updated_parsed"]) {
        Some(FieldValue::Time(parts)) => parts.to_iso8601(),
        _ => None,
    };

    let score = record.get("points", &["score"]).and_then(FieldValue::into_integer);

    let tags = match record.get("tags", &[]) {
        Some(FieldValue::Tags(entries)) => collect_terms(&entries),
        _ => None,
    };

    let discussion_url = text_field(record, "topic", &["comments"]);

    Some(Item {
        title,
        link,
        description,
        published_at,
        score,
        tags,
        discussion_url,
    })
}

/// Text value trimmed; empty strings count as absent.
fn text_field(record: &RawRecord, key: &str, alternates: &[&str]) -> Option<String> {
    record
        .get(key, alternates)
        .and_then(FieldValue::into_text)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn collect_terms(entries: &[TagEntry]) -> Option<Vec<String>> {
    let terms: Vec<String> = entries
        .iter()
        .filter_map(|t| t.term.as_deref())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms)
    }
}

/// Flatten an HTML snippet into single-spaced text.
pub fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let text: Vec<&str> = fragment.root_element().text().collect();
    collapse_whitespace(&text.join(" "))
}

pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
