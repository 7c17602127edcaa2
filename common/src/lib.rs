/*!
common/src/lib.rs

Shared configuration types for feednotion.

This file provides:
- Config data structures (deserialized from TOML)
- An async loader merging a default file with an override file
- Environment overrides applied on top of the merged files
*/

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::warn;

/// Feed source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Primary RSS/Atom feed URL
    pub url: String,
    /// Base URL of the HTML listing used when every feed variant comes back empty
    pub listing_base_url: String,
    /// Cap on the number of items processed per run
    pub max_items: usize,
    pub timeout_seconds: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: "https://news.hada.io/rss".to_string(),
            listing_base_url: "https://news.hada.io".to_string(),
            max_items: 30,
            timeout_seconds: 15,
        }
    }
}

/// Keyword / score filters applied before anything touches the workspace
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    /// 0 disables the score check
    pub min_score: i64,
}

/// Body layout used for generated page content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentMode {
    Short,
    Detailed,
    Translate,
}

impl FromStr for ContentMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "short" | "summary" => Ok(ContentMode::Short),
            "detailed" | "bullets" => Ok(ContentMode::Detailed),
            "translate" | "translation" => Ok(ContentMode::Translate),
            other => anyhow::bail!("unknown content mode '{}'", other),
        }
    }
}

impl fmt::Display for ContentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContentMode::Short => "short",
            ContentMode::Detailed => "detailed",
            ContentMode::Translate => "translate",
        };
        f.write_str(name)
    }
}

/// Notion workspace configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotionConfig {
    /// Integration token. Usually supplied through the env var named by `token_env`.
    pub token: Option<String>,
    pub token_env: String,
    /// Database id, dashed UUID or full Notion URL
    pub database_id: Option<String>,
    pub api_url: String,
    pub source_label: String,
    /// Generate body blocks when creating pages
    pub page_content: bool,
    pub content_mode: ContentMode,
    /// Put a bookmark to the original link at the top of the body
    pub embed_bookmark: bool,
    pub timeout_seconds: u64,
    /// Pause after a 429 from the API before moving to the next item
    pub rate_limit_pause_ms: u64,
}

impl Default for NotionConfig {
    fn default() -> Self {
        Self {
            token: None,
            token_env: "NOTION_TOKEN".to_string(),
            database_id: None,
            api_url: "https://api.notion.com".to_string(),
            source_label: "GeekNews".to_string(),
            page_content: true,
            content_mode: ContentMode::Translate,
            embed_bookmark: true,
            timeout_seconds: 20,
            rate_limit_pause_ms: 2000,
        }
    }
}

/// Remote LLM config (OpenAI-compatible chat completions)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub api_key_env: String,
    pub api_url: String,
    pub model: String,
    /// Target language for generated summaries and translations
    pub language: String,
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            api_url: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            language: "ko".to_string(),
            timeout_seconds: 20,
        }
    }
}

/// Which main-text extraction strategy to construct
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorKind {
    Readability,
    Structural,
}

impl FromStr for ExtractorKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "readability" => Ok(ExtractorKind::Readability),
            "structural" | "fallback" => Ok(ExtractorKind::Structural),
            other => anyhow::bail!("unknown extractor '{}'", other),
        }
    }
}

/// Article main-text extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    pub strategy: ExtractorKind,
    pub timeout_seconds: u64,
    pub max_chars: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            strategy: ExtractorKind::Readability,
            timeout_seconds: 15,
            max_chars: 8000,
        }
    }
}

/// Backfill pass over already-created pages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackfillConfig {
    pub enabled: bool,
    pub limit: usize,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            limit: 50,
        }
    }
}

/// Top-level application configuration (deserialized from config.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub feed: FeedConfig,
    pub filters: FilterConfig,
    pub notion: NotionConfig,
    pub llm: LlmConfig,
    pub extract: ExtractConfig,
    pub backfill: BackfillConfig,
}

/// Credentials the run cannot start without
#[derive(Debug, Clone)]
pub struct WorkspaceCredentials {
    pub token: String,
    pub database_id: String,
}

impl Config {
    /// Load configuration with an optional default file and an optional override file.
    /// If both are present, they are merged (override takes precedence).
    pub async fn load_with_defaults(default_path: Option<&Path>, override_path: Option<&Path>) -> Result<Self> {
        let mut config_value = toml::Value::Table(toml::map::Map::new());

        for path in [default_path, override_path].into_iter().flatten() {
            if path.exists() {
                let data = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                let val: toml::Value = toml::from_str(&data)
                    .with_context(|| format!("Failed to parse configuration: {}", path.display()))?;
                merge_toml(&mut config_value, val);
            }
        }

        let cfg: Config = config_value.try_into().context("Failed to parse merged configuration")?;
        Ok(cfg)
    }

    /// Apply environment overrides using the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup. Empty values are ignored;
    /// values that fail to parse are logged and leave the previous setting in place.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("FEED_URL") {
            self.feed.url = v;
        }
        if let Some(v) = get("LISTING_BASE_URL") {
            self.feed.listing_base_url = v;
        }
        set_parsed(&mut self.feed.max_items, "MAX_ITEMS", get("MAX_ITEMS"));

        if let Some(v) = lookup("INCLUDE_KEYWORDS") {
            self.filters.include = split_keywords(&v);
        }
        if let Some(v) = lookup("EXCLUDE_KEYWORDS") {
            self.filters.exclude = split_keywords(&v);
        }
        set_parsed(&mut self.filters.min_score, "MIN_POINTS", get("MIN_POINTS"));

        if let Some(v) = get(&self.notion.token_env.clone()) {
            self.notion.token = Some(v);
        }
        if let Some(v) = get("NOTION_DATABASE_ID") {
            self.notion.database_id = Some(v);
        }
        if let Some(v) = get("NOTION_API_URL") {
            self.notion.api_url = v;
        }
        if let Some(v) = get("SOURCE_LABEL") {
            self.notion.source_label = v;
        }
        set_flag(&mut self.notion.page_content, "NOTION_PAGE_CONTENT", get("NOTION_PAGE_CONTENT"));
        set_parsed(&mut self.notion.content_mode, "NOTION_CONTENT_MODE", get("NOTION_CONTENT_MODE"));
        set_flag(&mut self.notion.embed_bookmark, "NOTION_EMBED_BOOKMARK", get("NOTION_EMBED_BOOKMARK"));

        if let Some(v) = get(&self.llm.api_key_env.clone()) {
            self.llm.api_key = Some(v);
        }
        if let Some(v) = get("OPENAI_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = get("OPENAI_API_URL") {
            self.llm.api_url = v;
        }
        if let Some(v) = get("SUMMARY_LANGUAGE") {
            self.llm.language = v;
        }

        set_parsed(&mut self.extract.strategy, "EXTRACTOR", get("EXTRACTOR"));

        set_flag(&mut self.backfill.enabled, "BACKFILL", get("BACKFILL"));
        set_parsed(&mut self.backfill.limit, "BACKFILL_LIMIT", get("BACKFILL_LIMIT"));
    }

    /// Token and normalized database id, or an error naming what is missing.
    pub fn workspace_credentials(&self) -> Result<WorkspaceCredentials> {
        let token = self
            .notion
            .token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .with_context(|| format!("Notion token is not set ({} or notion.token)", self.notion.token_env))?;
        let database_id = self
            .notion
            .database_id
            .as_deref()
            .map(normalize_database_id)
            .filter(|id| !id.is_empty())
            .context("Notion database id is not set (NOTION_DATABASE_ID or notion.database_id)")?;
        Ok(WorkspaceCredentials { token, database_id })
    }

    /// Model credential, if any. Absence disables all generation.
    pub fn llm_api_key(&self) -> Option<&str> {
        self.llm.api_key.as_deref().filter(|k| !k.trim().is_empty())
    }
}

fn set_parsed<T: FromStr>(target: &mut T, key: &str, raw: Option<String>) {
    if let Some(raw) = raw {
        match raw.parse::<T>() {
            Ok(v) => *target = v,
            Err(_) => warn!(key, value = %raw, "ignoring unparseable config value"),
        }
    }
}

fn set_flag(target: &mut bool, key: &str, raw: Option<String>) {
    if let Some(raw) = raw {
        match parse_bool(&raw) {
            Some(v) => *target = v,
            None => warn!(key, value = %raw, "ignoring unparseable boolean"),
        }
    }
}

/// Accepts the usual spellings of a boolean switch.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Split a comma-separated keyword list, trimming entries and dropping empty ones.
pub fn split_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Reduce a database reference to its 32-hex id.
///
/// Accepts a bare id, a dashed UUID or a full Notion URL
/// (`https://www.notion.so/workspace/Title-0123...?v=...`). Anything else is
/// returned trimmed and unchanged.
pub fn normalize_database_id(raw: &str) -> String {
    fn is_id(s: &str) -> bool {
        s.len() == 32 && s.chars().all(|c| c.is_ascii_hexdigit())
    }

    let trimmed = raw.trim();
    // The view id in `?v=...` is also 32 hex, so cut the query first.
    let path = trimmed.split(['?', '#']).next().unwrap_or(trimmed);
    let segment = path.trim_end_matches('/').rsplit('/').next().unwrap_or(path);

    let compact = segment.replace('-', "");
    if is_id(&compact) {
        return compact;
    }
    match segment.rsplit('-').next() {
        Some(tail) if is_id(tail) => tail.to_string(),
        _ => trimmed.to_string(),
    }
}

fn merge_toml(a: &mut toml::Value, b: toml::Value) {
    match (a, b) {
        (toml::Value::Table(a_map), toml::Value::Table(b_map)) => {
            for (k, v) in b_map {
                if let Some(a_val) = a_map.get_mut(&k) {
                    merge_toml(a_val, v);
                } else {
                    a_map.insert(k, v);
                }
            }
        }
        (a_val, b_val) => *a_val = b_val,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn config_from_string_uses_defaults_for_missing_sections() {
        let toml = r#"
            [feed]
            url = "https://example.test/rss"

            [filters]
            include = ["rust"]
            min_score = 5
        "#;

        let cfg: Config = toml::from_str(toml).expect("parse config");
        assert_eq!(cfg.feed.url, "https://example.test/rss");
        assert_eq!(cfg.feed.max_items, 30);
        assert_eq!(cfg.filters.include, vec!["rust".to_string()]);
        assert_eq!(cfg.filters.min_score, 5);
        assert_eq!(cfg.notion.content_mode, ContentMode::Translate);
        assert_eq!(cfg.extract.max_chars, 8000);
        assert!(!cfg.backfill.enabled);
    }

    #[tokio::test]
    async fn override_file_takes_precedence() {
        let dir = tempfile::tempdir().expect("tempdir");
        let default_path = dir.path().join("config.default.toml");
        let override_path = dir.path().join("config.toml");
        std::fs::write(
            &default_path,
            "[feed]\nurl = \"https://a.test/rss\"\nmax_items = 10\n[notion]\nsource_label = \"A\"\n",
        )
        .unwrap();
        std::fs::write(&override_path, "[feed]\nmax_items = 3\n").unwrap();

        let cfg = Config::load_with_defaults(Some(&default_path), Some(&override_path))
            .await
            .expect("load");
        assert_eq!(cfg.feed.url, "https://a.test/rss");
        assert_eq!(cfg.feed.max_items, 3);
        assert_eq!(cfg.notion.source_label, "A");
    }

    #[test]
    fn env_overrides_files() {
        let mut cfg = Config::default();
        cfg.apply_env_with(lookup(&[
            ("FEED_URL", "https://b.test/feed"),
            ("MAX_ITEMS", "7"),
            ("INCLUDE_KEYWORDS", " rust, ,llm "),
            ("MIN_POINTS", "12"),
            ("NOTION_TOKEN", "secret"),
            ("NOTION_DATABASE_ID", "0123456789abcdef0123456789abcdef"),
            ("NOTION_CONTENT_MODE", "detailed"),
            ("NOTION_PAGE_CONTENT", "false"),
            ("OPENAI_API_KEY", "sk-test"),
            ("BACKFILL", "yes"),
            ("BACKFILL_LIMIT", "5"),
            ("EXTRACTOR", "structural"),
        ]));

        assert_eq!(cfg.feed.url, "https://b.test/feed");
        assert_eq!(cfg.feed.max_items, 7);
        assert_eq!(cfg.filters.include, vec!["rust".to_string(), "llm".to_string()]);
        assert_eq!(cfg.filters.min_score, 12);
        assert_eq!(cfg.notion.content_mode, ContentMode::Detailed);
        assert!(!cfg.notion.page_content);
        assert_eq!(cfg.llm_api_key(), Some("sk-test"));
        assert!(cfg.backfill.enabled);
        assert_eq!(cfg.backfill.limit, 5);
        assert_eq!(cfg.extract.strategy, ExtractorKind::Structural);

        let creds = cfg.workspace_credentials().expect("credentials");
        assert_eq!(creds.token, "secret");
        assert_eq!(creds.database_id, "0123456789abcdef0123456789abcdef");
    }

    #[test]
    fn bad_env_values_keep_previous_setting() {
        let mut cfg = Config::default();
        cfg.apply_env_with(lookup(&[
            ("MAX_ITEMS", "lots"),
            ("MIN_POINTS", "-"),
            ("NOTION_CONTENT_MODE", "poem"),
            ("BACKFILL", "maybe"),
        ]));
        assert_eq!(cfg.feed.max_items, 30);
        assert_eq!(cfg.filters.min_score, 0);
        assert_eq!(cfg.notion.content_mode, ContentMode::Translate);
        assert!(!cfg.backfill.enabled);
    }

    #[test]
    fn missing_credentials_are_an_error() {
        let cfg = Config::default();
        let err = cfg.workspace_credentials().unwrap_err();
        assert!(err.to_string().contains("token"));

        let mut cfg = Config::default();
        cfg.notion.token = Some("t".into());
        let err = cfg.workspace_credentials().unwrap_err();
        assert!(err.to_string().contains("database id"));
    }

    #[test]
    fn database_id_is_extracted_from_urls() {
        assert_eq!(
            normalize_database_id("https://www.notion.so/me/News-0123456789abcdef0123456789abcdef?v=fedcba9876543210fedcba9876543210"),
            "0123456789abcdef0123456789abcdef"
        );
        assert_eq!(
            normalize_database_id(" 01234567-89ab-cdef-0123-456789abcdef "),
            "0123456789abcdef0123456789abcdef"
        );
        assert_eq!(normalize_database_id("not-an-id"), "not-an-id");
    }

    #[test]
    fn keyword_splitting() {
        assert_eq!(split_keywords("a, b ,,c"), vec!["a", "b", "c"]);
        assert!(split_keywords("  ").is_empty());
    }
}
