//! Prompt templates for the three completion requests of a record.

use noteforge_extract::{PRIMARY_MARKER, SECONDARY_MARKER};
use noteforge_shared::Chunk;
use noteforge_transcript::format_timestamp;

/// Characters of the assembled document sent to whole-document prompts.
pub const DOCUMENT_CHAR_BUDGET: usize = 24_000;

pub const CHUNK_SYSTEM_PROMPT: &str = "\
You turn raw lecture or video transcript excerpts into clean study notes.
Rewrite the excerpt as well-structured Markdown prose in the language of the \
transcript. Keep every fact, name, number and example; drop filler words, \
repetitions and timestamps. Do not add an introduction or a conclusion and do \
not mention that this is an excerpt.";

pub const MIND_MAP_SYSTEM_PROMPT: &str = r#"You build concept maps from study notes.
Respond with a single JSON object and nothing else, using this shape:
{"root": {"label": "<topic>", "children": [{"label": "<branch>", "children": [{"label": "<point>"}]}]}}
Rules: at least 4 branches under the root, at least 2 points under every branch,
at most 10 children per node, at most 3 levels below the root, labels under 64 characters."#;

/// System prompt for the bilingual summary; the reply must carry both markers.
pub fn summary_system_prompt() -> String {
    format!(
        "You write concise bilingual summaries of study notes.\n\
         Reply with exactly two sections and no other text:\n\
         {PRIMARY_MARKER}\n\
         a summary in Simplified Chinese, as 3 to 8 bullet points\n\
         {SECONDARY_MARKER}\n\
         the same summary in English, as 3 to 8 bullet points"
    )
}

/// User prompt for one chunk: a `Part i/N` header, the time span, then the
/// verbatim blocks.
pub fn chunk_prompt(title: &str, chunk: &Chunk) -> String {
    let (start, end) = chunk.span_ms();
    format!(
        "Title: {title}\nPart {}/{} ({} - {})\n\n{}",
        chunk.position,
        chunk.total,
        format_timestamp(start),
        format_timestamp(end),
        chunk.render()
    )
}

pub fn summary_prompt(title: &str, document: &str) -> String {
    format!(
        "Title: {title}\n\nNotes:\n{}",
        truncate_chars(document, DOCUMENT_CHAR_BUDGET)
    )
}

pub fn mind_map_prompt(title: &str, document: &str) -> String {
    format!(
        "Title: {title}\n\nBuild the concept map for these notes:\n{}",
        truncate_chars(document, DOCUMENT_CHAR_BUDGET)
    )
}

/// The first `max_chars` characters of `text`, never splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}
