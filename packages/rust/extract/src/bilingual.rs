//! Bilingual summary splitter.
//!
//! A summary document is expected to hold a primary-language (Chinese)
//! section and a secondary-language (English) section. Detection order:
//! explicit markers, both headings, secondary heading only, whole text.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use noteforge_shared::{BilingualSummary, NoteforgeError, Result};

/// Sentinel that opens the primary-language section.
pub const PRIMARY_MARKER: &str = "<<<PRIMARY>>>";

/// Sentinel that opens the secondary-language section.
pub const SECONDARY_MARKER: &str = "<<<SECONDARY>>>";

const PRIMARY_HEADINGS: &str = r"中文摘要|中文总结|中文|Chinese Summary|Chinese";
const SECONDARY_HEADINGS: &str = r"English Summary|English|英文摘要|英文总结";

static PRIMARY_HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| heading_regex(PRIMARY_HEADINGS));
static SECONDARY_HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| heading_regex(SECONDARY_HEADINGS));

/// A `#`-style or `**bold**` heading line naming one of `names`.
fn heading_regex(names: &str) -> Regex {
    Regex::new(&format!(
        r"(?mi)^[ \t]*(?:#{{1,6}}[ \t]*(?:{names})|\*\*[ \t]*(?:{names})[ \t]*[:：]?[ \t]*\*\*)[ \t]*[:：]?[ \t\r]*$"
    ))
    .expect("valid regex")
}

/// Which rule produced a split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitMethod {
    Markers,
    Headings,
    SecondaryHeading,
    Whole,
}

/// Split `text` into a [`BilingualSummary`].
///
/// Fails when both sections are empty after normalization.
pub fn split_bilingual(text: &str) -> Result<BilingualSummary> {
    split_with_method(text).map(|(summary, _)| summary)
}

/// Like [`split_bilingual`], also reporting which detection rule matched.
pub fn split_with_method(text: &str) -> Result<(BilingualSummary, SplitMethod)> {
    let (primary, secondary, method) = locate_sections(text);

    let primary_text = normalize_section(primary);
    let secondary_text = normalize_section(secondary);

    if primary_text.is_empty() && secondary_text.is_empty() {
        return Err(NoteforgeError::extraction(
            "summary has no usable text in either language",
        ));
    }

    debug!(?method, primary_len = primary_text.len(), secondary_len = secondary_text.len(), "bilingual split");

    let legacy_text = if primary_text.is_empty() {
        secondary_text.clone()
    } else {
        primary_text.clone()
    };

    Ok((
        BilingualSummary {
            primary_text,
            secondary_text,
            legacy_text,
        },
        method,
    ))
}

fn locate_sections(text: &str) -> (&str, &str, SplitMethod) {
    if let (Some(a), Some(b)) = (text.find(PRIMARY_MARKER), text.find(SECONDARY_MARKER)) {
        if a < b {
            let body_start = a + PRIMARY_MARKER.len();
            // A secondary heading inside the marked primary region starts the
            // secondary section; the marker left in it is stripped later.
            if let Some(sec) = SECONDARY_HEADING_RE.find(&text[body_start..b]) {
                return (
                    &text[body_start..body_start + sec.start()],
                    &text[body_start + sec.end()..],
                    SplitMethod::Markers,
                );
            }
            return (
                &text[body_start..b],
                &text[b + SECONDARY_MARKER.len()..],
                SplitMethod::Markers,
            );
        }
    }

    let secondary = SECONDARY_HEADING_RE.find(text);
    if let Some(sec) = secondary {
        if let Some(pri) = PRIMARY_HEADING_RE.find(&text[..sec.start()]) {
            return (
                &text[pri.end()..sec.start()],
                &text[sec.end()..],
                SplitMethod::Headings,
            );
        }
        // Without a primary heading everything above the secondary heading is
        // taken as primary text, even if it is empty or in the wrong language.
        return (
            &text[..sec.start()],
            &text[sec.end()..],
            SplitMethod::SecondaryHeading,
        );
    }

    (text, "", SplitMethod::Whole)
}

/// Canonicalize one section: dash bullets, single spaces, at most one blank line.
///
/// Idempotent: `normalize_section(normalize_section(x)) == normalize_section(x)`.
pub fn normalize_section(section: &str) -> String {
    static BULLET_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^[ \t]*•[ \t]*").expect("valid regex"));
    static SPACE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[ \t\u{3000}\u{a0}]+").expect("valid regex"));
    static BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

    let unmarked = section
        .replace(PRIMARY_MARKER, "")
        .replace(SECONDARY_MARKER, "")
        .replace("\r\n", "\n");
    let bulleted = BULLET_RE.replace_all(&unmarked, "- ");

    let lines: Vec<String> = bulleted
        .lines()
        .map(|line| SPACE_RE.replace_all(line, " ").trim().to_string())
        .collect();

    BLANK_RE
        .replace_all(&lines.join("\n"), "\n\n")
        .trim()
        .to_string()
}
