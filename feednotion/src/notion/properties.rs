use serde_json::{json, Map, Value};

use crate::item::Item;

use super::blocks::{rich_text, ContentBlock};

pub const MAX_TAGS: usize = 10;

/// Everything needed to create one database page.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPage {
    pub title: String,
    pub url: String,
    pub source: String,
    pub summary: Option<String>,
    /// `YYYY-MM-DDTHH:MM:SS`
    pub published: Option<String>,
    pub tags: Vec<String>,
    pub children: Vec<ContentBlock>,
}

impl NewPage {
    pub fn from_item(item: &Item, source: &str, summary: Option<String>, children: Vec<ContentBlock>) -> Self {
        let title = if item.title.trim().is_empty() {
            item.link.clone()
        } else {
            item.title.clone()
        };
        Self {
            title,
            url: item.link.clone(),
            source: source.to_string(),
            summary,
            published: item.published_at.clone(),
            tags: item.tags.clone().unwrap_or_default(),
            children,
        }
    }

    /// The `properties` object for `POST /v1/pages`.
    pub fn properties(&self) -> Value {
        let mut props = Map::new();
        props.insert("Name".into(), json!({ "title": rich_text(&self.title) }));
        props.insert("URL".into(), json!({ "url": self.url }));
        props.insert("Source".into(), json!({ "select": { "name": self.source } }));

        if let Some(summary) = self.summary.as_deref().filter(|s| !s.is_empty()) {
            props.insert("Summary".into(), json!({ "rich_text": rich_text(summary) }));
        }
        if let Some(published) = &self.published {
            props.insert("Published".into(), json!({ "date": { "start": published } }));
        }

        let tags: Vec<Value> = self
            .tags
            .iter()
            .map(|t| t.replace(',', " ").trim().to_string())
            .filter(|t| !t.is_empty())
            .take(MAX_TAGS)
            .map(|name| json!({ "name": name }))
            .collect();
        if !tags.is_empty() {
            props.insert("Tags".into(), json!({ "multi_select": tags }));
        }
        Value::Object(props)
    }
}

/// The parts of an existing page the backfill pass reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSummary {
    pub id: String,
    pub url: Option<String>,
    pub title: Option<String>,
    pub summary: Option<String>,
}

impl PageSummary {
    pub fn from_notion(page: &Value) -> Option<Self> {
        let id = page.get("id")?.as_str()?.to_string();
        let props = page.get("properties");
        let prop = |name: &str| props.and_then(|p| p.get(name));

        let url = prop("URL")
            .and_then(|p| p.get("url"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let title = prop("Name").and_then(|p| joined_text(p.get("title")));
        let summary = prop("Summary").and_then(|p| joined_text(p.get("rich_text")));

        Some(Self {
            id,
            url,
            title,
            summary,
        })
    }
}

fn joined_text(runs: Option<&Value>) -> Option<String> {
    let text: String = runs?
        .as_array()?
        .iter()
        .filter_map(|r| r.get("plain_text").and_then(Value::as_str))
        .collect();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
