use feednotion::notion::{ContentBlock, NewPage, NotionClient, Workspace, WorkspaceError};
use mockito::Matcher;
use serde_json::json;
use std::time::Duration;

const DB: &str = "0123456789abcdef0123456789abcdef";

fn client(server: &mockito::ServerGuard) -> NotionClient {
    NotionClient::new(
        reqwest::Client::new(),
        server.url(),
        "secret-token",
        DB,
        Duration::from_secs(5),
    )
}

fn page(children: Vec<ContentBlock>) -> NewPage {
    NewPage {
        title: "Foo".into(),
        url: "https://x.test/1".into(),
        source: "GeekNews".into(),
        summary: None,
        published: None,
        tags: Vec::new(),
        children,
    }
}

#[tokio::test]
async fn find_by_url_filters_on_url_property() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", format!("/v1/databases/{DB}/query").as_str())
        .match_header("authorization", "Bearer secret-token")
        .match_header("notion-version", "2022-06-28")
        .match_body(Matcher::Json(json!({
            "filter": { "property": "URL", "url": { "equals": "https://x.test/1" } },
            "page_size": 1
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"object": "list", "results": [{"id": "p1"}], "has_more": false}"#)
        .create_async()
        .await;

    assert!(client(&server).find_by_url("https://x.test/1").await.unwrap());
    mock.assert_async().await;
}

#[tokio::test]
async fn find_by_url_with_no_results_is_false() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", format!("/v1/databases/{DB}/query").as_str())
        .with_status(200)
        .with_body(r#"{"results": []}"#)
        .create_async()
        .await;

    assert!(!client(&server).find_by_url("https://x.test/2").await.unwrap());
}

#[tokio::test]
async fn rate_limit_is_reported_with_retry_after() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/pages")
        .with_status(429)
        .with_header("retry-after", "3")
        .with_body(r#"{"object": "error", "status": 429, "code": "rate_limited", "message": "slow down"}"#)
        .create_async()
        .await;

    let err = client(&server).create_page(&page(Vec::new())).await.unwrap_err();
    assert!(err.is_rate_limited());
    assert!(matches!(err, WorkspaceError::RateLimited { retry_after: Some(3) }));
}

#[tokio::test]
async fn api_errors_carry_code_and_message() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", format!("/v1/databases/{DB}/query").as_str())
        .with_status(400)
        .with_body(r#"{"object": "error", "status": 400, "code": "validation_error", "message": "Could not find property with name or id: URL"}"#)
        .create_async()
        .await;

    match client(&server).find_by_url("https://x.test/1").await {
        Err(WorkspaceError::Api { status, code, message }) => {
            assert_eq!(status, 400);
            assert_eq!(code, "validation_error");
            assert!(message.contains("URL"));
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn create_page_sends_first_hundred_children_and_appends_the_rest() {
    let mut server = mockito::Server::new_async().await;

    let create = server
        .mock("POST", "/v1/pages")
        .match_body(Matcher::PartialJson(json!({
            "parent": { "database_id": DB },
            "properties": {
                "Name": { "title": [{ "type": "text", "text": { "content": "Foo" } }] },
                "URL": { "url": "https://x.test/1" },
                "Source": { "select": { "name": "GeekNews" } }
            }
        })))
        .with_status(200)
        .with_body(r#"{"object": "page", "id": "new-page"}"#)
        .create_async()
        .await;
    let append = server
        .mock("PATCH", "/v1/blocks/new-page/children")
        .with_status(200)
        .with_body(r#"{"object": "list", "results": []}"#)
        .expect(1)
        .create_async()
        .await;

    let children: Vec<ContentBlock> = (0..130).map(|i| ContentBlock::Paragraph(format!("p{i}"))).collect();
    let id = client(&server).create_page(&page(children)).await.unwrap();

    assert_eq!(id, "new-page");
    create.assert_async().await;
    append.assert_async().await;
}

#[tokio::test]
async fn failed_overflow_append_still_returns_the_created_page() {
    let mut server = mockito::Server::new_async().await;

    let _create = server
        .mock("POST", "/v1/pages")
        .with_status(200)
        .with_body(r#"{"object": "page", "id": "new-page"}"#)
        .create_async()
        .await;
    let append = server
        .mock("PATCH", "/v1/blocks/new-page/children")
        .with_status(429)
        .with_header("retry-after", "1")
        .expect(1)
        .create_async()
        .await;

    let children: Vec<ContentBlock> = (0..250).map(|i| ContentBlock::Bullet(format!("b{i}"))).collect();
    let id = client(&server).create_page(&page(children)).await.unwrap();

    assert_eq!(id, "new-page");
    append.assert_async().await;
}

#[tokio::test]
async fn recent_pages_follow_the_cursor() {
    let mut server = mockito::Server::new_async().await;
    let path = format!("/v1/databases/{DB}/query");

    let first = server
        .mock("POST", path.as_str())
        .match_body(Matcher::Json(json!({
            "sorts": [{ "timestamp": "last_edited_time", "direction": "descending" }],
            "page_size": 3
        })))
        .with_status(200)
        .with_body(
            json!({
                "results": [
                    { "id": "a", "properties": { "URL": { "url": "https://x.test/a" } } },
                    { "id": "b", "properties": { "URL": { "url": null } } }
                ],
                "has_more": true,
                "next_cursor": "cur-1"
            })
            .to_string(),
        )
        .create_async()
        .await;
    let second = server
        .mock("POST", path.as_str())
        .match_body(Matcher::PartialJson(json!({ "start_cursor": "cur-1", "page_size": 1 })))
        .with_status(200)
        .with_body(r#"{"results": [{"id": "c"}], "has_more": false, "next_cursor": null}"#)
        .create_async()
        .await;

    let pages = client(&server).recent_pages(3).await.unwrap();
    let ids: Vec<&str> = pages.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert_eq!(pages[0].url.as_deref(), Some("https://x.test/a"));
    assert_eq!(pages[1].url, None);

    first.assert_async().await;
    second.assert_async().await;
}

#[tokio::test]
async fn list_blocks_reads_supported_types() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/v1/blocks/p1/children")
        .match_query(Matcher::UrlEncoded("page_size".into(), "100".into()))
        .with_status(200)
        .with_body(
            json!({
                "results": [
                    { "type": "bookmark", "bookmark": { "url": "https://x.test/1" } },
                    { "type": "divider", "divider": {} },
                    { "type": "heading_2", "heading_2": { "rich_text": [{ "plain_text": "번역 (KR)" }] } }
                ],
                "has_more": false
            })
            .to_string(),
        )
        .create_async()
        .await;

    let blocks = client(&server).list_blocks("p1").await.unwrap();
    assert_eq!(
        blocks,
        vec![
            ContentBlock::Bookmark("https://x.test/1".into()),
            ContentBlock::Heading("번역 (KR)".into()),
        ]
    );
}
