//! Core pipeline orchestration for noteforge.
//!
//! This crate ties segmentation, chunk completion, assembly, and artifact
//! extraction into the per-record [`NotePipeline`], and drives many records
//! through it with the [`BackfillRunner`].

pub mod assembler;
pub mod backfill;
pub mod pipeline;
pub mod pool;
pub mod prompts;
pub mod store;

pub use assembler::{ChunkOutput, assemble};
pub use backfill::{
    BackfillJob, BackfillProgress, BackfillReport, BackfillRunner, JobFailure, JobState,
    SilentProgress,
};
pub use pipeline::{NotePipeline, PipelineConfig, RecordPipeline, Stage, StageFailure};
pub use pool::{ItemOutcome, WorkerPool};
pub use store::{MemoryStore, RecordStore};
