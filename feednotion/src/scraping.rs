use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, REFERER};
use reqwest::Client;
use scraper::{ElementRef, Html, Node, Selector};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use common::ExtractorKind;

use crate::error::FetchError;
use crate::http;
use crate::item::collapse_whitespace;

/// Containers commonly wrapping the article body, tried by the structural strategy.
const CONTENT_CONTAINERS: &[&str] = &[
    "article",
    "main",
    "[role=main]",
    "#content",
    ".content",
    ".post",
    ".entry-content",
    ".article",
    ".article-body",
    ".post-content",
];

/// Turns an article HTML document into plain main-body text.
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Paragraph and list-item text joined by blank lines, or `None` if nothing was found.
    fn extract_text(&self, html: &str, url: &Url) -> Option<String>;
}

/// Paragraph/list-item text of `root`, one entry per element, blank-line separated.
fn block_text(root: ElementRef<'_>, blocks: &Selector) -> Option<String> {
    let parts: Vec<String> = root
        .select(blocks)
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}

fn block_selector() -> Selector {
    Selector::parse("p, li").expect("static selector")
}

/// Readability boilerplate removal, then paragraph extraction on the cleaned HTML.
/// Falls back to [`StructuralStrategy`] when readability produces nothing.
pub struct ReadabilityStrategy {
    blocks: Selector,
    fallback: StructuralStrategy,
}

impl ReadabilityStrategy {
    pub fn new() -> Self {
        Self {
            blocks: block_selector(),
            fallback: StructuralStrategy::new(),
        }
    }
}

impl Default for ReadabilityStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionStrategy for ReadabilityStrategy {
    fn name(&self) -> &'static str {
        "readability"
    }

    fn extract_text(&self, html: &str, url: &Url) -> Option<String> {
        let mut input = html.as_bytes();
        match readability::extractor::extract(&mut input, url) {
            Ok(product) => {
                let cleaned = Html::parse_fragment(&product.content);
                if let Some(text) = block_text(cleaned.root_element(), &self.blocks) {
                    return Some(text);
                }
                debug!("scraping: readability left no paragraphs for {}", url);
            }
            Err(e) => warn!("scraping: readability failed for {}: {}", url, e),
        }
        self.fallback.extract_text(html, url)
    }
}

/// Picks the content container with the most visible text and reads its paragraphs.
pub struct StructuralStrategy {
    containers: Vec<Selector>,
    blocks: Selector,
}

impl StructuralStrategy {
    pub fn new() -> Self {
        Self {
            containers: CONTENT_CONTAINERS
                .iter()
                .filter_map(|s| Selector::parse(s).ok())
                .collect(),
            blocks: block_selector(),
        }
    }
}

impl Default for StructuralStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionStrategy for StructuralStrategy {
    fn name(&self) -> &'static str {
        "structural"
    }

    fn extract_text(&self, html: &str, _url: &Url) -> Option<String> {
        let document = Html::parse_document(html);
        let candidates: Vec<ElementRef<'_>> = self
            .containers
            .iter()
            .flat_map(|sel| document.select(sel))
            .collect();

        let best = if candidates.is_empty() {
            document.root_element()
        } else {
            candidates
                .into_iter()
                .max_by_key(|el| visible_text_len(*el))?
        };
        block_text(best, &self.blocks)
    }
}

/// Character count of text not inside script/style/noscript.
fn visible_text_len(root: ElementRef<'_>) -> usize {
    root.descendants()
        .filter_map(|node| match node.value() {
            Node::Text(text) => {
                let hidden = node
                    .parent()
                    .and_then(|p| p.value().as_element().map(|e| e.name()))
                    .map_or(false, |name| matches!(name, "script" | "style" | "noscript"));
                (!hidden).then(|| text.trim().chars().count())
            }
            _ => None,
        })
        .sum()
}

pub fn strategy_for(kind: ExtractorKind) -> Box<dyn ExtractionStrategy> {
    match kind {
        ExtractorKind::Readability => Box::new(ReadabilityStrategy::new()),
        ExtractorKind::Structural => Box::new(StructuralStrategy::new()),
    }
}

/// Fetches linked articles and extracts their main text.
pub struct MainTextExtractor {
    client: Client,
    strategy: Box<dyn ExtractionStrategy>,
    timeout: Duration,
    referer: String,
    max_chars: usize,
}

impl MainTextExtractor {
    pub fn new(
        client: Client,
        strategy: Box<dyn ExtractionStrategy>,
        timeout: Duration,
        referer: impl Into<String>,
        max_chars: usize,
    ) -> Self {
        Self {
            client,
            strategy,
            timeout,
            referer: referer.into(),
            max_chars,
        }
    }

    /// Best-effort main text, at most `max_chars` characters. Every failure is `None`.
    pub async fn extract(&self, url: &str) -> Option<String> {
        let html = match self.fetch(url).await {
            Ok(html) => html,
            Err(e) => {
                warn!("scraping: {}", e);
                return None;
            }
        };
        let parsed = match Url::parse(url) {
            Ok(u) => u,
            Err(_) => {
                warn!("scraping: {}", FetchError::Url(url.to_string()));
                return None;
            }
        };

        let text = self.strategy.extract_text(&html, &parsed)?;
        let text = truncate_chars(&text, self.max_chars);
        info!(
            "scraping: {} extracted {} chars from {}",
            self.strategy.name(),
            text.chars().count(),
            url
        );
        Some(text)
    }

    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .header(ACCEPT, http::ACCEPT_HTML)
            .header(ACCEPT_LANGUAGE, http::ACCEPT_LANGUAGE)
            .header(REFERER, self.referer.as_str())
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
        response.text().await.map_err(|e| FetchError::request(url, e))
    }
}

pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> Url {
        Url::parse("https://example.com/post").unwrap()
    }

    #[test]
    fn structural_picks_the_largest_container() {
        let html = r#"<html><body>
            <div class="content"><p>short</p></div>
            <article>
              <p>The first real paragraph of the story.</p>
              <ul><li>point one</li><li>point   two</li></ul>
              <script>var noise = "lots and lots of script text that is not visible";</script>
            </article>
            </body></html>"#;
        let text = StructuralStrategy::new().extract_text(html, &url()).expect("text");
        assert_eq!(
            text,
            "The first real paragraph of the story.\n\npoint one\n\npoint two"
        );
    }

    #[test]
    fn structural_uses_whole_document_without_containers() {
        let html = "<html><body><div><p>alpha</p><p> </p><p>beta</p></div></body></html>";
        let text = StructuralStrategy::new().extract_text(html, &url()).expect("text");
        assert_eq!(text, "alpha\n\nbeta");
    }

    #[test]
    fn structural_without_paragraphs_is_none() {
        let html = "<html><body><div>just a div</div></body></html>";
        assert!(StructuralStrategy::new().extract_text(html, &url()).is_none());
    }

    #[test]
    fn readability_extracts_paragraphs() {
        let para = "Rust gives you memory safety without a garbage collector, and this sentence is long enough to count. ";
        let html = format!(
            r#"<html><head><title>t</title></head><body>
               <div id="story"><p>{p}</p><p>{p}</p><p>{p}</p></div>
               </body></html>"#,
            p = para.repeat(3)
        );
        let text = ReadabilityStrategy::new().extract_text(&html, &url()).expect("text");
        assert!(text.contains("memory safety"));
    }

    #[test]
    fn truncation_counts_characters() {
        assert_eq!(truncate_chars("가나다라", 2), "가나");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
