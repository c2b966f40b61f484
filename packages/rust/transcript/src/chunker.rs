//! Chunk grouper: contiguous, size-bounded runs of transcript blocks.

use tracing::{debug, instrument};

use noteforge_shared::{Chunk, TranscriptBlock};

/// Blocks per chunk needed to stay within `max_chunks`, never below `baseline`.
///
/// Zero values for either knob are treated as 1.
pub fn effective_chunk_size(total_blocks: usize, baseline: usize, max_chunks: usize) -> usize {
    let baseline = baseline.max(1);
    let max_chunks = max_chunks.max(1);
    baseline.max(total_blocks.div_ceil(max_chunks))
}

/// Partition `blocks` into ordered chunks of at most [`effective_chunk_size`] blocks.
///
/// Blocks are never split or dropped, so the chunk count always honours
/// `max_chunks` by growing chunks instead.
#[instrument(skip(blocks), fields(blocks = blocks.len()))]
pub fn group(blocks: &[TranscriptBlock], baseline: usize, max_chunks: usize) -> Vec<Chunk> {
    if blocks.is_empty() {
        return Vec::new();
    }

    let size = effective_chunk_size(blocks.len(), baseline, max_chunks);
    let total = blocks.len().div_ceil(size);

    let chunks: Vec<Chunk> = blocks
        .chunks(size)
        .enumerate()
        .map(|(i, slice)| Chunk {
            position: i + 1,
            total,
            blocks: slice.to_vec(),
        })
        .collect();

    debug!(chunk_size = size, chunks = chunks.len(), "grouped transcript blocks");
    chunks
}
