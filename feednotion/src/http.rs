use anyhow::{Context, Result};
use reqwest::redirect::Policy;
use reqwest::Client;

/// Some aggregators and article hosts block non-browser agents outright.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0 Safari/537.36";

pub const ACCEPT_FEED: &str = "application/rss+xml, application/xml;q=0.9, */*;q=0.8";
pub const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
pub const ACCEPT_LANGUAGE: &str = "ko-KR,ko;q=0.9,en-US;q=0.8,en;q=0.7";

/// Shared client. Timeouts are set per request since each caller has its own budget.
pub fn build_client() -> Result<Client> {
    Client::builder()
        .user_agent(BROWSER_USER_AGENT)
        .redirect(Policy::limited(10))
        .build()
        .context("failed to build reqwest client")
}
