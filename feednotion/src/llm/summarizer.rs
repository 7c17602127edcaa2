// Summarizer module
use std::sync::Arc;
use tracing::{debug, info, warn};

use common::ContentMode;

use super::{LlmProvider, LlmRequest};
use crate::scraping::truncate_chars;

/// Context budget for the one-line Summary property.
pub const SUMMARY_CONTEXT_CHARS: usize = 800;
/// Context budget for page-body generation.
pub const CONTENT_CONTEXT_CHARS: usize = 1200;

const TEMPERATURE: f32 = 0.2;

const SUMMARY_SYSTEM: &str = "당신은 핵심만 간결히 정리하는 요약 비서입니다.";
const TRANSLATE_SYSTEM: &str = "당신은 기술 기사를 자연스럽게 옮기는 전문 번역가입니다.";

fn max_tokens(mode: ContentMode) -> usize {
    match mode {
        ContentMode::Short => 180,
        ContentMode::Detailed => 500,
        ContentMode::Translate => 1200,
    }
}

fn language_name(code: &str) -> &str {
    match code.to_ascii_lowercase().as_str() {
        "ko" | "kr" | "korean" => "한국어",
        "en" | "english" => "영어",
        "ja" | "jp" | "japanese" => "일본어",
        "zh" | "cn" | "chinese" => "중국어",
        _ => code,
    }
}

fn build_prompt(mode: ContentMode, lang: &str, title: &str, url: &str, text: Option<&str>, context_chars: usize) -> String {
    let lang = language_name(lang);
    let instruction = match mode {
        ContentMode::Short => format!("다음 링크의 기사 내용을 {lang}로 2~3문장으로 간결히 요약해 주세요."),
        ContentMode::Detailed => format!(
            "다음 기사의 핵심 내용을 {lang}로 4~7개의 불릿 포인트로 정리해 주세요. \
             각 항목은 한 줄로, 짧고 구체적으로 작성하세요."
        ),
        ContentMode::Translate => format!(
            "다음 기사 본문을 {lang}로 3~6개의 문단으로 옮겨 주세요. \
             직역하지 말고 의미가 자연스럽게 전달되도록 다듬고, 문단 사이는 빈 줄로 구분하세요."
        ),
    };

    let hint = text
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| format!("\n본문: {}", truncate_chars(t, context_chars)))
        .unwrap_or_default();

    format!("{instruction}\n제목: {title}\n링크: {url}{hint}")
}

/// Generates summaries and translations. Without a provider every call is `None`.
#[derive(Clone)]
pub struct Summarizer {
    provider: Option<Arc<dyn LlmProvider>>,
    language: String,
}

impl Summarizer {
    pub fn new(provider: Option<Arc<dyn LlmProvider>>, language: impl Into<String>) -> Self {
        Self {
            provider,
            language: language.into(),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None, "ko")
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    /// Generate text for `mode` from the title, url and up to `context_chars` of `text`.
    /// Provider failures are logged and come back as `None`.
    pub async fn summarize(
        &self,
        title: &str,
        url: &str,
        text: Option<&str>,
        mode: ContentMode,
        context_chars: usize,
    ) -> Option<String> {
        let provider = self.provider.as_ref()?;

        let system = match mode {
            ContentMode::Translate => TRANSLATE_SYSTEM,
            ContentMode::Short | ContentMode::Detailed => SUMMARY_SYSTEM,
        };
        let request = LlmRequest {
            system: Some(system.to_string()),
            prompt: build_prompt(mode, &self.language, title, url, text, context_chars),
            max_tokens: Some(max_tokens(mode)),
            temperature: Some(TEMPERATURE),
            timeout_seconds: None,
        };

        match provider.generate(request).await {
            Ok(response) => {
                let content = response.content.trim();
                if content.is_empty() {
                    debug!("LLM returned empty {} output for {}", mode, url);
                    return None;
                }
                info!(
                    "LLM {} generation ok for {} ({} tokens)",
                    mode, url, response.usage.total_tokens
                );
                Some(content.to_string())
            }
            Err(e) => {
                warn!("LLM {} generation failed for {}: {:#}", mode, url, e);
                None
            }
        }
    }

    /// 2~3 sentence summary for the Summary property.
    pub async fn one_line_summary(&self, title: &str, url: &str, description: Option<&str>) -> Option<String> {
        self.summarize(title, url, description, ContentMode::Short, SUMMARY_CONTEXT_CHARS)
            .await
    }

    /// Body text for a page in the given mode.
    pub async fn generate_content(&self, title: &str, url: &str, text: Option<&str>, mode: ContentMode) -> Option<String> {
        self.summarize(title, url, text, mode, CONTENT_CONTEXT_CHARS).await
    }
}

const BULLET_GLYPHS: &[char] = &['-', '*', '•', '·', '–', '—'];

/// Split model output into body entries: blank-line paragraphs for translations,
/// one entry per line (bullet glyphs stripped) otherwise. Empty entries are dropped.
pub fn split_output(mode: ContentMode, output: &str) -> Vec<String> {
    match mode {
        ContentMode::Translate => {
            let mut paragraphs = Vec::new();
            let mut current: Vec<&str> = Vec::new();
            for line in output.lines() {
                if line.trim().is_empty() {
                    if !current.is_empty() {
                        paragraphs.push(current.join("\n"));
                        current.clear();
                    }
                } else {
                    current.push(line.trim());
                }
            }
            if !current.is_empty() {
                paragraphs.push(current.join("\n"));
            }
            paragraphs
        }
        ContentMode::Short | ContentMode::Detailed => output
            .lines()
            .map(|line| line.trim().trim_start_matches(BULLET_GLYPHS).trim())
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect(),
    }
}
