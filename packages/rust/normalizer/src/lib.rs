//! HTML-to-prompt-text normalization.
//!
//! Converts a fetched page into plain text suitable for prompting: page chrome
//! is stripped, the remaining HTML is converted via `htmd`, and a cleanup
//! pipeline removes markup and collapses whitespace. Output is truncated to a
//! bounded number of characters.
//!
//! Normalization is deterministic and never fails; if `htmd` rejects the
//! document, the raw text nodes are used instead.

mod cleanup;

use scraper::{Html, Selector};
use tracing::{debug, instrument, warn};

/// Marker appended to truncated page text.
pub const TRUNCATION_MARKER: &str = "[... page truncated ...]";

/// Tags whose content never reaches the prompt.
const SKIP_TAGS: &[&str] = &[
    "script", "style", "nav", "footer", "iframe", "noscript", "svg", "form", "template",
];

/// A normalized page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedPage {
    /// Page title from `<title>` or the first `<h1>`.
    pub title: Option<String>,
    /// Plain text, at most `max_chars` characters plus [`TRUNCATION_MARKER`].
    pub text: String,
    /// Whether `text` was cut.
    pub truncated: bool,
}

impl NormalizedPage {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Normalize raw page HTML into prompt-ready text.
#[instrument(skip(html), fields(html_len = html.len()))]
pub fn normalize(html: &str, max_chars: usize) -> NormalizedPage {
    let doc = Html::parse_document(html);
    let title = extract_title(&doc);
    let content_html = extract_content_html(&doc);

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(SKIP_TAGS.to_vec())
        .build();

    let markdown = match converter.convert(&content_html) {
        Ok(md) => md,
        Err(e) => {
            warn!(error = %e, "htmd conversion failed, falling back to text nodes");
            fallback_text(&doc)
        }
    };

    let cleaned = cleanup::run_pipeline(&markdown);
    let (text, truncated) = truncate_chars(&cleaned, max_chars);

    debug!(
        title = title.as_deref().unwrap_or(""),
        text_len = text.len(),
        truncated,
        "page normalized"
    );

    NormalizedPage {
        title,
        text,
        truncated,
    }
}

/// Pick the main content container, falling back to `<body>`.
fn extract_content_html(doc: &Html) -> String {
    let selectors = ["main", r#"[role="main"]"#, "article", "body"];

    for sel_str in selectors {
        if let Ok(selector) = Selector::parse(sel_str) {
            if let Some(el) = doc.select(&selector).next() {
                let inner = el.inner_html();
                if !inner.trim().is_empty() {
                    return inner;
                }
            }
        }
    }

    doc.root_element().html()
}

fn extract_title(doc: &Html) -> Option<String> {
    ["title", "h1"].into_iter().find_map(|sel_str| {
        let selector = Selector::parse(sel_str).ok()?;
        let text = doc
            .select(&selector)
            .next()?
            .text()
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        (!text.is_empty()).then_some(text)
    })
}

/// Visible text nodes of `<body>`, one per line.
fn fallback_text(doc: &Html) -> String {
    let Ok(body_sel) = Selector::parse("body") else {
        return String::new();
    };
    doc.select(&body_sel)
        .next()
        .map(|body| {
            body.text()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}

/// Truncate to `max_chars` characters on a char boundary, preferring a word break.
fn truncate_chars(text: &str, max_chars: usize) -> (String, bool) {
    let Some((cut, _)) = text.char_indices().nth(max_chars) else {
        return (text.to_string(), false);
    };

    let head = &text[..cut];
    let head = match head.rfind(char::is_whitespace) {
        Some(pos) if pos > cut / 2 => &head[..pos],
        _ => head,
    };

    (format!("{}\n{TRUNCATION_MARKER}", head.trim_end()), true)
}
