//! Markdown stripping passes.
//!
//! Each pass is a `&str -> String` regex rewrite applied in sequence, leaving
//! plain prose that can be tokenized without scoring markup as words.

use std::sync::LazyLock;

use regex::Regex;

/// Remove code, images, link targets, headings, list and emphasis markers.
pub fn strip_markdown(md: &str) -> String {
    let mut result = md.to_string();

    result = strip_code(&result);
    result = strip_images(&result);
    result = unwrap_links(&result);
    result = strip_line_markers(&result);
    result = strip_emphasis(&result);

    result
}

// ---------------------------------------------------------------------------
// Pass 1: Code
// ---------------------------------------------------------------------------

/// Drop fenced code blocks entirely, then inline code spans.
fn strip_code(md: &str) -> String {
    static FENCE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)```.*?(?:```|\z)").expect("valid regex"));
    static INLINE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"`[^`\n]*`").expect("valid regex"));

    let without_fences = FENCE_RE.replace_all(md, " ");
    INLINE_RE.replace_all(&without_fences, " ").to_string()
}

// ---------------------------------------------------------------------------
// Pass 2: Images
// ---------------------------------------------------------------------------

fn strip_images(md: &str) -> String {
    static IMAGE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").expect("valid regex"));

    IMAGE_RE.replace_all(md, " ").to_string()
}

// ---------------------------------------------------------------------------
// Pass 3: Links keep their text
// ---------------------------------------------------------------------------

fn unwrap_links(md: &str) -> String {
    static LINK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("valid regex"));

    LINK_RE.replace_all(md, "$1").to_string()
}

// ---------------------------------------------------------------------------
// Pass 4: Headings, quotes, list bullets
// ---------------------------------------------------------------------------

fn strip_line_markers(md: &str) -> String {
    static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?m)^[ \t]*(?:#{1,6}|>+|[-*+•]|\d+[.)])[ \t]+").expect("valid regex")
    });

    MARKER_RE.replace_all(md, "").to_string()
}

// ---------------------------------------------------------------------------
// Pass 5: Emphasis
// ---------------------------------------------------------------------------

/// `*`/`~` runs vanish; `_` becomes a space so `snake_case` splits into words.
fn strip_emphasis(md: &str) -> String {
    static STAR_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\*+|~~").expect("valid regex"));
    static UNDERSCORE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"_+").expect("valid regex"));

    let without_stars = STAR_RE.replace_all(md, "");
    UNDERSCORE_RE.replace_all(&without_stars, " ").to_string()
}
