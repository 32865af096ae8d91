//! HTML content extraction.
//!
//! Strips executable and presentational markup before pulling text, then
//! assembles a main-content string from a prioritized list of likely
//! content containers, falling back to the whole body.

use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Containers tried in order when assembling main content.
const CONTENT_SELECTORS: &[&str] = &["main", "article", "#content", ".content"];

/// Tags whose subtrees never contribute to extracted text.
const SKIP_TAGS: &[&str] = &[
    "script", "style", "noscript", "iframe", "svg", "video", "audio", "canvas", "template",
];

/// Stop collecting from prioritized containers once this much text is in hand.
const MIN_CONTENT_LEN: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("no text content could be extracted from {url}")]
    Empty { url: String },
}

/// Normalized text document produced from one fetched page.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedPage {
    pub title: String,
    /// Description meta tag content, or empty.
    pub excerpt: String,
    /// Hostname with a leading "www." stripped.
    pub site_name: String,
    pub content: String,
}

/// Extract a normalized text document from raw HTML.
pub fn extract(html: &str, page_url: &Url) -> Result<ExtractedPage, ExtractionError> {
    let document = Html::parse_document(html);

    let title = select_first_text(&document, "title");

    let excerpt = Selector::parse(r#"meta[name="description"]"#)
        .ok()
        .and_then(|sel| {
            document
                .select(&sel)
                .next()
                .and_then(|el| el.value().attr("content"))
                .map(|c| normalize_whitespace(c))
        })
        .unwrap_or_default();

    let site_name = page_url
        .host_str()
        .map(|h| h.strip_prefix("www.").unwrap_or(h).to_string())
        .unwrap_or_default();

    let mut content = String::new();
    for selector_str in CONTENT_SELECTORS {
        if content.len() >= MIN_CONTENT_LEN {
            break;
        }
        if let Ok(sel) = Selector::parse(selector_str) {
            for el in document.select(&sel) {
                let text = collect_text(el);
                if !text.is_empty() {
                    if !content.is_empty() {
                        content.push(' ');
                    }
                    content.push_str(&text);
                }
            }
        }
    }

    if content.len() < MIN_CONTENT_LEN {
        // Prioritized containers yielded too little, take the whole body.
        let body_text = select_first(&document, "body")
            .map(collect_text)
            .unwrap_or_default();
        if body_text.len() > content.len() {
            content = body_text;
        }
    }

    if title.is_empty() && content.is_empty() {
        return Err(ExtractionError::Empty {
            url: page_url.to_string(),
        });
    }

    Ok(ExtractedPage {
        title,
        excerpt,
        site_name,
        content,
    })
}

fn select_first<'a>(document: &'a Html, selector: &str) -> Option<ElementRef<'a>> {
    let sel = Selector::parse(selector).ok()?;
    document.select(&sel).next()
}

fn select_first_text(document: &Html, selector: &str) -> String {
    select_first(document, selector)
        .map(|el| normalize_whitespace(&el.text().collect::<String>()))
        .unwrap_or_default()
}

/// Walk an element's subtree collecting text, skipping executable/media
/// tags and elements hidden with display:none.
fn collect_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    collect_into(el, &mut out);
    normalize_whitespace(&out)
}

fn collect_into(el: ElementRef<'_>, out: &mut String) {
    let tag = el.value().name();
    if SKIP_TAGS.contains(&tag) {
        return;
    }
    if let Some(style) = el.value().attr("style") {
        let style: String = style.chars().filter(|c| !c.is_whitespace()).collect();
        if style.to_ascii_lowercase().contains("display:none") {
            return;
        }
    }
    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
            out.push(' ');
        } else if let Some(child_el) = ElementRef::wrap(child) {
            collect_into(child_el, out);
        }
    }
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_extracts_title_excerpt_and_site_name() {
        let html = r#"<html><head>
            <title>  Pricing Plans  </title>
            <meta name="description" content="Our pricing page.">
            </head><body><main>Plans start at $5/month.</main></body></html>"#;
        let page = extract(html, &url("https://www.example.com/pricing")).unwrap();
        assert_eq!(page.title, "Pricing Plans");
        assert_eq!(page.excerpt, "Our pricing page.");
        assert_eq!(page.site_name, "example.com");
        assert!(page.content.contains("Plans start at $5/month."));
    }

    #[test]
    fn test_scripts_and_styles_are_ignored() {
        let html = r#"<html><body><main>
            <script>var tracking = "evil";</script>
            <style>.x { color: red }</style>
            <p>Visible text.</p>
            <div style="display: none">Hidden text.</div>
            </main></body></html>"#;
        let page = extract(html, &url("https://example.com/")).unwrap();
        assert!(page.content.contains("Visible text."));
        assert!(!page.content.contains("tracking"));
        assert!(!page.content.contains("color: red"));
        assert!(!page.content.contains("Hidden text."));
    }

    #[test]
    fn test_falls_back_to_body_when_containers_are_thin() {
        let long = "All the interesting words live outside any container. ".repeat(10);
        let html = format!(
            "<html><body><article>tiny</article><p>{long}</p></body></html>"
        );
        let page = extract(&html, &url("https://example.com/")).unwrap();
        assert!(page.content.contains("interesting words"));
    }

    #[test]
    fn test_container_priority_order() {
        let filler = "word ".repeat(60);
        let html = format!(
            "<html><body><article>article {filler}</article><main>main {filler}</main></body></html>"
        );
        let page = extract(&html, &url("https://example.com/")).unwrap();
        // main is consulted before article
        assert!(page.content.starts_with("main"));
    }

    #[test]
    fn test_whitespace_is_normalized() {
        let html = "<html><body><main>a\n\n   b\t\tc</main></body></html>";
        let page = extract(html, &url("https://example.com/")).unwrap();
        assert!(page.content.starts_with("a b c"));
    }

    #[test]
    fn test_empty_document_is_an_error() {
        let err = extract("", &url("https://example.com/")).unwrap_err();
        assert!(matches!(err, ExtractionError::Empty { .. }));
    }
}
