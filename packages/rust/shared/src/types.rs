//! Core domain types for transcripts and the artifacts derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Transcript units
// ---------------------------------------------------------------------------

/// One timestamped transcript unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptBlock {
    /// 1-based position in segmentation order (strictly increasing).
    pub index: usize,
    /// Start of the cue in milliseconds.
    pub start_ms: u64,
    /// End of the cue in milliseconds (never before `start_ms`).
    pub end_ms: u64,
    /// Caption text lines of the block.
    pub text: String,
    /// Verbatim source slice of the block, trailing blank lines removed.
    pub raw: String,
}

/// A contiguous run of blocks submitted to the completion service as one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 1-based position among all chunks of the transcript.
    pub position: usize,
    /// Total number of chunks of the transcript.
    pub total: usize,
    pub blocks: Vec<TranscriptBlock>,
}

impl Chunk {
    /// Render the chunk's blocks verbatim, separated by a blank line.
    pub fn render(&self) -> String {
        self.blocks
            .iter()
            .map(|b| b.raw.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Time span covered by the chunk, `(start_ms, end_ms)`.
    pub fn span_ms(&self) -> (u64, u64) {
        let start = self.blocks.first().map(|b| b.start_ms).unwrap_or(0);
        let end = self.blocks.last().map(|b| b.end_ms).unwrap_or(start);
        (start, end)
    }
}

// ---------------------------------------------------------------------------
// Derived artifacts
// ---------------------------------------------------------------------------

/// A summary separated into two language sections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BilingualSummary {
    pub primary_text: String,
    pub secondary_text: String,
    /// Single-language value kept for older readers.
    pub legacy_text: String,
}

/// A bounded concept-tree node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MindMapNode {
    pub label: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<MindMapNode>,
}

impl MindMapNode {
    /// Number of levels below this node (a leaf has depth 0).
    pub fn depth(&self) -> usize {
        self.children
            .iter()
            .map(|c| c.depth() + 1)
            .max()
            .unwrap_or(0)
    }
}

/// Ranked, case-insensitively unique topic tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet(pub Vec<String>);

impl TagSet {
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Case-insensitive membership test.
    pub fn contains(&self, tag: &str) -> bool {
        let needle = tag.to_lowercase();
        self.0.iter().any(|t| t.to_lowercase() == needle)
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A source record handed out by the persistence layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: String,
    pub title: String,
    /// Where the media came from (used for platform tags).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Location of the raw transcript, fetched before segmentation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_url: Option<String>,
    /// Inline transcript text; takes precedence over `transcript_url`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
}

impl SourceRecord {
    /// Create a record with an inline transcript and a fresh time-sortable id.
    pub fn inline(title: impl Into<String>, transcript: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            title: title.into(),
            source_url: None,
            transcript_url: None,
            transcript: Some(transcript.into()),
        }
    }
}

/// Everything the pipeline derives from one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordArtifacts {
    /// Rewritten full-text notes.
    pub document: String,
    pub summary: BilingualSummary,
    pub mind_map: MindMapNode,
    pub tags: TagSet,
    /// SHA-256 of the raw transcript the artifacts were derived from.
    pub content_hash: String,
    /// Completion model that produced the artifacts.
    pub model: String,
}

/// Persisted artifacts together with their write time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredArtifacts {
    pub record_id: String,
    pub artifacts: RecordArtifacts,
    pub updated_at: DateTime<Utc>,
}

/// Which records a backfill run should pick up.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    /// Restrict to these ids (empty = no restriction).
    pub ids: Vec<String>,
    /// Only records that have no artifacts yet.
    pub only_missing: bool,
    /// Maximum number of records.
    pub limit: Option<usize>,
}

/// Hex SHA-256 digest of some text.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(index: usize, raw: &str) -> TranscriptBlock {
        TranscriptBlock {
            index,
            start_ms: index as u64 * 1000,
            end_ms: index as u64 * 1000 + 900,
            text: raw.to_string(),
            raw: raw.to_string(),
        }
    }

    #[test]
    fn chunk_render_and_span() {
        let chunk = Chunk {
            position: 1,
            total: 1,
            blocks: vec![block(1, "a"), block(2, "b")],
        };
        assert_eq!(chunk.render(), "a\n\nb");
        assert_eq!(chunk.span_ms(), (1000, 2900));
    }

    #[test]
    fn mind_map_serialization_skips_empty_children() {
        let node = MindMapNode {
            label: "Root".into(),
            children: vec![MindMapNode {
                label: "Leaf".into(),
                children: vec![],
            }],
        };
        let json = serde_json::to_string(&node).expect("serialize");
        assert_eq!(json, r#"{"label":"Root","children":[{"label":"Leaf"}]}"#);
        assert_eq!(node.depth(), 1);
    }

    #[test]
    fn tag_set_is_transparent() {
        let tags = TagSet(vec!["Rust".into(), "tokio".into()]);
        let json = serde_json::to_string(&tags).expect("serialize");
        assert_eq!(json, r#"["Rust","tokio"]"#);
        assert!(tags.contains("rust"));
    }

    #[test]
    fn content_hash_deterministic() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
        assert_eq!(content_hash("").len(), 64);
    }
}
