//! Markdown-to-plain-text cleanup pipeline.
//!
//! Each cleanup pass is a function `&str -> String` applied in sequence.
//! The output keeps paragraph breaks but no markup.

use std::sync::LazyLock;

use regex::Regex;

/// Run the full cleanup pipeline on converted Markdown text.
pub(crate) fn run_pipeline(md: &str) -> String {
    let mut result = md.to_string();

    result = strip_images(&result);
    result = unwrap_links(&result);
    result = strip_markdown_markers(&result);
    result = strip_leftover_html(&result);
    result = collapse_inline_whitespace(&result);
    result = clean_blank_lines(&result);

    result.trim().to_string()
}

// ---------------------------------------------------------------------------
// Pass 1: Images
// ---------------------------------------------------------------------------

/// Drop `![alt](src)` images entirely; alt text on marketing sites is noise.
fn strip_images(md: &str) -> String {
    static IMG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").expect("valid regex"));

    IMG_RE.replace_all(md, "").to_string()
}

// ---------------------------------------------------------------------------
// Pass 2: Links
// ---------------------------------------------------------------------------

/// Replace `[text](href)` with `text`.
fn unwrap_links(md: &str) -> String {
    static LINK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("valid regex"));

    LINK_RE.replace_all(md, "$1").to_string()
}

// ---------------------------------------------------------------------------
// Pass 3: Markdown markers
// ---------------------------------------------------------------------------

/// Remove heading hashes, horizontal rules, bullets, quote markers and emphasis.
fn strip_markdown_markers(md: &str) -> String {
    static HEADING_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^[ \t]{0,3}#{1,6}[ \t]+").expect("valid regex"));
    static BULLET_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^[ \t]*(?:[-*+]|\d+\.)[ \t]+").expect("valid regex"));
    static QUOTE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^[ \t]*>[ \t]?").expect("valid regex"));
    static EMPHASIS_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\*\*|__|`+").expect("valid regex"));
    static ITALIC_STAR_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?m)(^|[^\w*])\*([^*\s](?:[^*\n]*[^*\s])?)\*").expect("valid regex")
    });
    // Underscores inside words (snake_case) are left alone.
    static ITALIC_UNDERSCORE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?m)(^|\W)_([^_\s](?:[^_\n]*[^_\s])?)_\b").expect("valid regex")
    });
    static RULE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^[ \t]*(?:-{3,}|\*{3,}|_{3,})[ \t]*$").expect("valid regex"));

    let result = HEADING_RE.replace_all(md, "");
    let result = RULE_RE.replace_all(&result, "");
    let result = BULLET_RE.replace_all(&result, "");
    let result = QUOTE_RE.replace_all(&result, "");
    let result = EMPHASIS_RE.replace_all(&result, "");
    let result = ITALIC_STAR_RE.replace_all(&result, "${1}${2}");
    ITALIC_UNDERSCORE_RE.replace_all(&result, "${1}${2}").to_string()
}

// ---------------------------------------------------------------------------
// Pass 4: Leftover HTML
// ---------------------------------------------------------------------------

/// Remove any HTML tags that survived conversion, keeping their inner text.
fn strip_leftover_html(md: &str) -> String {
    static HTML_TAG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"</?[a-zA-Z][^>]*>").expect("valid regex"));

    HTML_TAG_RE.replace_all(md, "").to_string()
}

// ---------------------------------------------------------------------------
// Pass 5: Inline whitespace
// ---------------------------------------------------------------------------

/// Collapse runs of spaces/tabs and trim every line.
fn collapse_inline_whitespace(md: &str) -> String {
    static WS_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[ \t\u{a0}]+").expect("valid regex"));

    md.lines()
        .map(|line| WS_RE.replace_all(line.trim(), " ").to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Pass 6: Blank lines
// ---------------------------------------------------------------------------

/// Collapse runs of blank lines into a single paragraph break.
fn clean_blank_lines(md: &str) -> String {
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

    MULTI_BLANK_RE.replace_all(md, "\n\n").to_string()
}
