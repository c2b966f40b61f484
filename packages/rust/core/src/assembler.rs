//! Output assembly: chunk responses back into one document.
//!
//! Chunks may resolve in any order; the document is always rebuilt in chunk
//! order, and a single failed or missing chunk fails the whole record.

use std::collections::BTreeMap;

use tracing::debug;

use noteforge_shared::{NoteforgeError, Result};

/// Outcome of one chunk: its text, or the message of its last failure.
pub type ChunkOutput = std::result::Result<String, String>;

/// Join chunk outputs `1..=total` in position order, separated by a blank line.
///
/// Fails with [`NoteforgeError::ChunkFailed`] naming the lowest position that
/// failed or never reported.
pub fn assemble(
    outputs: impl IntoIterator<Item = (usize, ChunkOutput)>,
    total: usize,
) -> Result<String> {
    let by_position: BTreeMap<usize, ChunkOutput> = outputs.into_iter().collect();

    let mut parts = Vec::with_capacity(total);
    for position in 1..=total {
        match by_position.get(&position) {
            Some(Ok(text)) => {
                let text = text.trim();
                if !text.is_empty() {
                    parts.push(text);
                }
            }
            Some(Err(message)) => {
                return Err(NoteforgeError::ChunkFailed {
                    position,
                    total,
                    message: message.clone(),
                });
            }
            None => {
                return Err(NoteforgeError::ChunkFailed {
                    position,
                    total,
                    message: "no output received".into(),
                });
            }
        }
    }

    let document = parts.join("\n\n");
    debug!(chunks = total, chars = document.len(), "document assembled");
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use noteforge_transcript::{group, segment};

    #[test]
    fn reorders_by_position() {
        let outputs = vec![
            (3, Ok("third".to_string())),
            (1, Ok("  first \n".to_string())),
            (2, Ok("second".to_string())),
        ];
        assert_eq!(assemble(outputs, 3).unwrap(), "first\n\nsecond\n\nthird");
    }

    #[test]
    fn blank_outputs_are_skipped() {
        let outputs = vec![(1, Ok("a".to_string())), (2, Ok("   ".to_string())), (3, Ok("b".to_string()))];
        assert_eq!(assemble(outputs, 3).unwrap(), "a\n\nb");
    }

    #[test]
    fn first_failure_is_reported() {
        let outputs = vec![
            (1, Ok("a".to_string())),
            (4, Err("timed out".to_string())),
            (2, Err("HTTP 502".to_string())),
            (3, Ok("c".to_string())),
        ];
        let err = assemble(outputs, 4).unwrap_err();
        assert_eq!(err.to_string(), "chunk 2/4 failed: HTTP 502");
    }

    #[test]
    fn missing_position_fails() {
        let outputs = vec![(1, Ok("a".to_string())), (3, Ok("c".to_string()))];
        let err = assemble(outputs, 3).unwrap_err();
        assert!(matches!(err, NoteforgeError::ChunkFailed { position: 2, total: 3, .. }));
    }

    #[test]
    fn identity_completion_restores_transcript_order() {
        let raw = std::fs::read_to_string("../../../fixtures/srt/lecture.srt").expect("fixture");
        let blocks = segment(&raw);
        let chunks = group(&blocks, 2, 4);

        // Resolve in reverse to mimic out-of-order completion.
        let outputs: Vec<_> = chunks
            .iter()
            .rev()
            .map(|c| (c.position, Ok(c.render())))
            .collect();
        let document = assemble(outputs, chunks.len()).unwrap();

        let expected: Vec<&str> = blocks.iter().map(|b| b.raw.as_str()).collect();
        let squash = |s: &str| s.split_whitespace().collect::<String>();
        assert_eq!(squash(&document), squash(&expected.join("\n")));
    }
}
