//! Shared types, error model, and configuration for noteforge.
//!
//! This crate is the foundation depended on by all other noteforge crates.
//! It provides:
//! - [`NoteforgeError`], the unified error type
//! - Domain types ([`TranscriptBlock`], [`Chunk`], [`MindMapNode`], [`TagSet`], ...)
//! - Configuration ([`AppConfig`] and the runtime structs derived from it)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BackfillConfig, BackfillSection, ChunkingConfig, ChunkingSection,
    CompletionSection, CompletionSettings, StorageSection, config_dir, config_file_path,
    expand_home, init_config, load_config, load_config_from, resolve_api_key,
};
pub use error::{NoteforgeError, Result};
pub use types::{
    BilingualSummary, Chunk, MindMapNode, RecordArtifacts, RecordFilter, SourceRecord,
    StoredArtifacts, TagSet, TranscriptBlock, content_hash,
};
