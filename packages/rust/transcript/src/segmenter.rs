//! Block segmenter for SRT-style subtitle text.
//!
//! A block boundary is a numeric index line immediately followed by a
//! `HH:MM:SS,mmm --> HH:MM:SS,mmm` line. Every byte of non-blank input ends up
//! in exactly one block: content before the first boundary and content after
//! the last block's caption lines become blocks of their own.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::{debug, instrument};

use noteforge_shared::TranscriptBlock;

static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^[ \t]*\d+[ \t]*\n[ \t]*(\d{1,2}):(\d{2}):(\d{2})[,.](\d{1,3})[ \t]*-->[ \t]*(\d{1,2}):(\d{2}):(\d{2})[,.](\d{1,3})[^\n]*$",
    )
    .expect("valid regex")
});

/// A matched index + time-range header.
struct Header {
    start: usize,
    end: usize,
    start_ms: u64,
    end_ms: u64,
}

/// Split raw transcript text into ordered blocks.
///
/// Empty, whitespace-only, or BOM-only input yields an empty list.
#[instrument(skip_all, fields(input_len = input.len()))]
pub fn segment(input: &str) -> Vec<TranscriptBlock> {
    let text = normalize_input(input);
    if text.trim().is_empty() {
        return Vec::new();
    }

    let headers: Vec<Header> = HEADER_RE
        .captures_iter(&text)
        .map(|caps| {
            let whole = caps.get(0).expect("group 0 always matches");
            Header {
                start: whole.start(),
                end: whole.end(),
                start_ms: capture_ms(&caps, 1),
                end_ms: capture_ms(&caps, 5),
            }
        })
        .collect();

    let mut blocks = Vec::with_capacity(headers.len() + 2);

    let Some(first) = headers.first() else {
        push_block(&mut blocks, &text, &text, 0, 0);
        debug!("no block headers found, treating input as one block");
        return blocks;
    };

    let lead = &text[..first.start];
    if !lead.trim().is_empty() {
        push_block(&mut blocks, lead, lead, first.start_ms, first.start_ms);
    }

    for (i, header) in headers.iter().enumerate() {
        let next_start = headers.get(i + 1).map_or(text.len(), |n| n.start);
        let mut block_end = next_start;
        let mut tail = None;

        // The last block ends at the first blank line after its caption;
        // anything further is an unmatched tail.
        if i + 1 == headers.len() {
            if let Some(offset) = caption_end(&text[header.end..next_start]) {
                block_end = header.end + offset;
                let rest = &text[block_end..next_start];
                if !rest.trim().is_empty() {
                    tail = Some(rest);
                }
            }
        }

        push_block(
            &mut blocks,
            &text[header.start..block_end],
            &text[header.end..block_end],
            header.start_ms,
            header.end_ms,
        );

        if let Some(rest) = tail {
            let at = blocks.last().map_or(header.end_ms, |b| b.end_ms);
            push_block(&mut blocks, rest, rest, at, at);
        }
    }

    debug!(blocks = blocks.len(), "segmentation complete");
    blocks
}

/// Format milliseconds as `HH:MM:SS`.
pub fn format_timestamp(ms: u64) -> String {
    let secs = ms / 1000;
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

fn normalize_input(input: &str) -> String {
    input
        .trim_start_matches('\u{feff}')
        .replace("\r\n", "\n")
        .replace('\r', "\n")
}

fn push_block(blocks: &mut Vec<TranscriptBlock>, raw: &str, body: &str, start_ms: u64, end_ms: u64) {
    let text = body
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    blocks.push(TranscriptBlock {
        index: blocks.len() + 1,
        start_ms,
        end_ms: end_ms.max(start_ms),
        text,
        raw: raw.trim().to_string(),
    });
}

/// Offset of the first blank line that follows at least one caption line.
fn caption_end(body: &str) -> Option<usize> {
    let mut seen_text = false;
    let mut offset = 0;
    for line in body.split_inclusive('\n') {
        if line.trim().is_empty() {
            if seen_text {
                return Some(offset);
            }
        } else {
            seen_text = true;
        }
        offset += line.len();
    }
    None
}

/// Read `h, m, s, frac` captures starting at `first` into milliseconds.
fn capture_ms(caps: &Captures<'_>, first: usize) -> u64 {
    let num = |i: usize| -> u64 { caps[first + i].parse().unwrap_or(0) };
    // "5" means 500 ms, "05" means 50 ms.
    let frac = &caps[first + 3];
    let millis = frac.parse::<u64>().unwrap_or(0) * 10u64.pow(3 - frac.len() as u32);
    ((num(0) * 60 + num(1)) * 60 + num(2)) * 1000 + millis
}
