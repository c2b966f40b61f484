//! Transcript segmentation and chunking.
//!
//! This crate provides:
//! - [`segment`]: splits SRT-style subtitle text into ordered [`TranscriptBlock`]s
//! - [`group`]: packs blocks into a bounded number of contiguous [`Chunk`]s
//!
//! [`TranscriptBlock`]: noteforge_shared::TranscriptBlock
//! [`Chunk`]: noteforge_shared::Chunk

pub mod chunker;
pub mod segmenter;

pub use chunker::{effective_chunk_size, group};
pub use segmenter::{format_timestamp, segment};
