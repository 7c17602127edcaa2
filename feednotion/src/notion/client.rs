use reqwest::header::RETRY_AFTER;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{ContentBlock, NewPage, PageSummary, Workspace, WorkspaceError};

pub const NOTION_VERSION: &str = "2022-06-28";

/// Notion caps `children` arrays and page sizes at 100.
const MAX_BATCH: usize = 100;

/// Notion REST client bound to one database.
pub struct NotionClient {
    client: Client,
    api_url: String,
    token: String,
    database_id: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

impl NotionClient {
    pub fn new(
        client: Client,
        api_url: impl Into<String>,
        token: impl Into<String>,
        database_id: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            database_id: database_id.into(),
            timeout,
        }
    }

    pub fn database_id(&self) -> &str {
        &self.database_id
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/{}", self.api_url, path)
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        req.bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
            .timeout(self.timeout)
    }

    async fn send(&self, req: RequestBuilder) -> Result<Value, WorkspaceError> {
        let response = self.authorized(req).send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            return Err(WorkspaceError::RateLimited { retry_after });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let parsed: ApiErrorBody = serde_json::from_str(&body).unwrap_or_default();
            let message = if parsed.message.is_empty() { body } else { parsed.message };
            return Err(WorkspaceError::Api {
                status: status.as_u16(),
                code: parsed.code,
                message,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| WorkspaceError::Decode(e.to_string()))
    }

    async fn query_database(&self, body: Value) -> Result<ListResponse, WorkspaceError> {
        let path = format!("databases/{}/query", self.database_id);
        let value = self.send(self.client.post(self.endpoint(&path)).json(&body)).await?;
        serde_json::from_value(value).map_err(|e| WorkspaceError::Decode(e.to_string()))
    }
}

#[async_trait::async_trait]
impl Workspace for NotionClient {
    async fn find_by_url(&self, url: &str) -> Result<bool, WorkspaceError> {
        let body = json!({
            "filter": { "property": "URL", "url": { "equals": url } },
            "page_size": 1
        });
        let found = !self.query_database(body).await?.results.is_empty();
        debug!(url, found, "notion: dedup lookup");
        Ok(found)
    }

    async fn create_page(&self, page: &NewPage) -> Result<String, WorkspaceError> {
        let mut chunks = page.children.chunks(MAX_BATCH);
        let first: Vec<Value> = chunks
            .next()
            .map(|c| c.iter().map(ContentBlock::to_notion).collect())
            .unwrap_or_default();

        let mut body = json!({
            "parent": { "database_id": self.database_id },
            "properties": page.properties(),
        });
        if !first.is_empty() {
            body["children"] = Value::Array(first);
        }

        let created = self.send(self.client.post(self.endpoint("pages")).json(&body)).await?;
        let id = created
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| WorkspaceError::Decode("created page has no id".into()))?
            .to_string();

        // The page exists from here on; a failed overflow append leaves it short, not missing.
        for rest in chunks {
            if let Err(e) = self.append_blocks(&id, rest).await {
                warn!(page_id = %id, url = %page.url, "notion: page created but remaining blocks not appended: {}", e);
                break;
            }
        }
        info!(page_id = %id, url = %page.url, blocks = page.children.len(), "notion: page created");
        Ok(id)
    }

    async fn recent_pages(&self, limit: usize) -> Result<Vec<PageSummary>, WorkspaceError> {
        let mut pages = Vec::new();
        let mut cursor: Option<String> = None;

        while pages.len() < limit {
            let mut body = json!({
                "sorts": [{ "timestamp": "last_edited_time", "direction": "descending" }],
                "page_size": (limit - pages.len()).min(MAX_BATCH),
            });
            if let Some(c) = &cursor {
                body["start_cursor"] = json!(c);
            }

            let batch = self.query_database(body).await?;
            for raw in &batch.results {
                match PageSummary::from_notion(raw) {
                    Some(page) => pages.push(page),
                    None => warn!("notion: query result without id skipped"),
                }
            }
            match (batch.has_more, batch.next_cursor) {
                (true, Some(next)) => cursor = Some(next),
                _ => break,
            }
        }

        pages.truncate(limit);
        Ok(pages)
    }

    async fn list_blocks(&self, page_id: &str) -> Result<Vec<ContentBlock>, WorkspaceError> {
        let url = self.endpoint(&format!("blocks/{}/children", page_id));
        let mut blocks = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut req = self
                .client
                .get(&url)
                .query(&[("page_size", MAX_BATCH.to_string())]);
            if let Some(c) = &cursor {
                req = req.query(&[("start_cursor", c.as_str())]);
            }

            let value = self.send(req).await?;
            let batch: ListResponse =
                serde_json::from_value(value).map_err(|e| WorkspaceError::Decode(e.to_string()))?;
            blocks.extend(batch.results.iter().filter_map(ContentBlock::from_notion));

            match (batch.has_more, batch.next_cursor) {
                (true, Some(next)) => cursor = Some(next),
                _ => break,
            }
        }
        Ok(blocks)
    }

    async fn append_blocks(&self, page_id: &str, blocks: &[ContentBlock]) -> Result<(), WorkspaceError> {
        let url = self.endpoint(&format!("blocks/{}/children", page_id));
        for chunk in blocks.chunks(MAX_BATCH) {
            let children: Vec<Value> = chunk.iter().map(ContentBlock::to_notion).collect();
            self.send(self.client.patch(&url).json(&json!({ "children": children })))
                .await?;
        }
        debug!(page_id, blocks = blocks.len(), "notion: blocks appended");
        Ok(())
    }
}
