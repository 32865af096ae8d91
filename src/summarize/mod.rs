//! External model client for page analysis.
//!
//! Builds a grounded-answer prompt from extracted page content and a user
//! question, then calls a Gemini-style `generateContent` endpoint. Sampling
//! is low-temperature with a bounded output budget so repeated runs of the
//! same task stay comparable.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::SummarizerConfig;
use crate::extract::ExtractedPage;

/// Marker inserted where long content is cut.
const TRUNCATION_MARKER: &str = "\n[... content truncated ...]\n";

#[derive(Debug, thiserror::Error)]
pub enum SummarizationError {
    #[error("model request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("model returned HTTP {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("model response contained no generated text")]
    EmptyResponse,
}

/// One generated analysis.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub analysis: String,
    pub generated_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f64,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

/// Client for the external text-generation API.
pub struct SummarizerClient {
    client: Client,
    cfg: SummarizerConfig,
}

impl SummarizerClient {
    pub fn new(cfg: SummarizerConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(cfg.timeout_secs))
                .build()
                .expect("Failed to build HTTP client"),
            cfg,
        }
    }

    /// Ask the model `question` about `page`. Never returns partial output.
    pub async fn summarize(
        &self,
        page: &ExtractedPage,
        question: &str,
        api_key: &str,
    ) -> Result<Summary, SummarizationError> {
        let prompt = self.build_prompt(page, question);
        debug!(prompt_chars = prompt.len(), model = %self.cfg.model, "invoking model");

        // The credential travels in a header, never in the URL: reqwest
        // transport errors embed the full request URL in their Display
        // output, and those messages end up in stored error results.
        let url = format!(
            "{}/models/{}:generateContent",
            self.cfg.api_base, self.cfg.model
        );

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.cfg.temperature,
                max_output_tokens: self.cfg.max_output_tokens,
            },
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await
            .map_err(SummarizationError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SummarizationError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(SummarizationError::Transport)?;

        let analysis = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .filter(|t| !t.is_empty())
            .ok_or(SummarizationError::EmptyResponse)?;

        Ok(Summary {
            analysis,
            generated_at: Utc::now(),
        })
    }

    /// Assemble the instruction prompt. Content is truncated to the
    /// configured budget keeping both a prefix and a suffix, since the
    /// answer may depend on material near the end of a long page.
    pub fn build_prompt(&self, page: &ExtractedPage, question: &str) -> String {
        let content = truncate_content(&page.content, self.cfg.max_content_chars);

        format!(
            "You are analyzing a web page. Answer the question using ONLY the page \
             content provided below. If the content is insufficient to answer, say so \
             explicitly. Cite the passages that support your answer.\n\n\
             Page title: {title}\n\
             Site: {site}\n\n\
             Page content:\n{content}\n\n\
             Question: {question}",
            title = page.title,
            site = page.site_name,
            content = content,
            question = question,
        )
    }
}

/// Bound `content` to `budget` characters, keeping a prefix and a suffix
/// joined by an explicit marker.
fn truncate_content(content: &str, budget: usize) -> String {
    let char_count = content.chars().count();
    if char_count <= budget {
        return content.to_string();
    }

    let keep = budget.saturating_sub(TRUNCATION_MARKER.chars().count());
    let head = keep / 2;
    let tail = keep - head;

    let prefix: String = content.chars().take(head).collect();
    let suffix: String = content.chars().skip(char_count - tail).collect();

    format!("{prefix}{TRUNCATION_MARKER}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(content: &str) -> ExtractedPage {
        ExtractedPage {
            title: "Pricing".to_string(),
            excerpt: String::new(),
            site_name: "example.com".to_string(),
            content: content.to_string(),
        }
    }

    fn client_with(max_content_chars: usize, api_base: Option<String>) -> SummarizerClient {
        let mut cfg = SummarizerConfig::default();
        cfg.max_content_chars = max_content_chars;
        if let Some(base) = api_base {
            cfg.api_base = base;
        }
        SummarizerClient::new(cfg)
    }

    #[test]
    fn test_short_content_is_untouched() {
        assert_eq!(truncate_content("short", 100), "short");
    }

    #[test]
    fn test_truncation_keeps_prefix_and_suffix() {
        let content = format!("START{}END", "x".repeat(20_000));
        let truncated = truncate_content(&content, 500);

        assert!(truncated.starts_with("START"));
        assert!(truncated.ends_with("END"));
        assert!(truncated.contains(TRUNCATION_MARKER.trim()));
        assert!(truncated.chars().count() <= 500);
    }

    #[test]
    fn test_truncation_is_char_boundary_safe() {
        let content = "é".repeat(10_000);
        let truncated = truncate_content(&content, 300);
        assert!(truncated.chars().count() <= 300);
    }

    #[test]
    fn test_prompt_embeds_question_title_and_instructions() {
        let client = client_with(8000, None);
        let prompt = client.build_prompt(&page("Plans start at $5."), "What does it cost?");
        assert!(prompt.contains("Page title: Pricing"));
        assert!(prompt.contains("Site: example.com"));
        assert!(prompt.contains("Plans start at $5."));
        assert!(prompt.contains("Question: What does it cost?"));
        assert!(prompt.contains("ONLY the page"));
    }

    #[test]
    fn test_prompt_length_is_bounded() {
        let client = client_with(1000, None);
        let huge = "word ".repeat(100_000);
        let prompt = client.build_prompt(&page(&huge), "q");
        // content budget plus the fixed instruction scaffolding
        assert!(prompt.chars().count() < 1000 + 600);
    }

    #[tokio::test]
    async fn test_summarize_parses_generated_text() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock(
                "POST",
                mockito::Matcher::Regex(r"^/models/.*:generateContent".to_string()),
            )
            .match_header("x-goog-api-key", "test-key")
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "candidates": [{
                        "content": { "parts": [{ "text": "The plan costs $5." }] }
                    }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = client_with(8000, Some(server.url()));
        let summary = client
            .summarize(&page("Plans start at $5."), "Cost?", "test-key")
            .await
            .unwrap();
        assert_eq!(summary.analysis, "The plan costs $5.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_provider_error_is_wrapped() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock(
                "POST",
                mockito::Matcher::Regex(r"^/models/.*:generateContent".to_string()),
            )
            .with_status(403)
            .with_body(r#"{"error": "invalid api key"}"#)
            .create_async()
            .await;

        let client = client_with(8000, Some(server.url()));
        let err = client
            .summarize(&page("content"), "q", "bad-key")
            .await
            .unwrap_err();
        match err {
            SummarizationError::Provider { status, .. } => assert_eq!(status, 403),
            other => panic!("expected provider error, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_transport_error_does_not_expose_credential() {
        // Port 9 (discard) is unroutable; the request fails at the
        // transport layer, whose error message quotes the request URL.
        let client = client_with(8000, Some("http://127.0.0.1:9".to_string()));
        let err = client
            .summarize(&page("content"), "q", "SUPER-SECRET-KEY")
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, SummarizationError::Transport(_)));
        assert!(
            !message.contains("SUPER-SECRET-KEY"),
            "credential leaked into error message: {message}"
        );
    }
}
