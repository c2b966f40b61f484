//! Per-record pipeline: transcript → notes document → summary, mind map, tags.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use noteforge_client::{CompletionBackend, CompletionRequest, ResilientClient, TextFetcher};
use noteforge_extract::{extract_mind_map, score_tags, split_bilingual};
use noteforge_shared::{
    ChunkingConfig, CompletionSettings, NoteforgeError, RecordArtifacts, SourceRecord,
    content_hash,
};
use noteforge_transcript::{group, segment};

use crate::assembler::{self, ChunkOutput};
use crate::pool::WorkerPool;
use crate::prompts;

// ---------------------------------------------------------------------------
// Stage failures
// ---------------------------------------------------------------------------

/// Where in the pipeline a record failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Fetch,
    Segment,
    Complete,
    Assemble,
    Summarize,
    MindMap,
    Tags,
    Persist,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Segment => "segment",
            Self::Complete => "complete",
            Self::Assemble => "assemble",
            Self::Summarize => "summarize",
            Self::MindMap => "mind_map",
            Self::Tags => "tags",
            Self::Persist => "persist",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record-level failure tagged with the stage that produced it.
#[derive(Debug, thiserror::Error)]
#[error("{stage}: {error}")]
pub struct StageFailure {
    pub stage: Stage,
    #[source]
    pub error: NoteforgeError,
}

impl StageFailure {
    pub fn new(stage: Stage, error: NoteforgeError) -> Self {
        Self { stage, error }
    }

    /// Input problems are skips, not failures.
    pub fn is_skip(&self) -> bool {
        self.error.is_skip()
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Turns one source record into its artifacts.
pub trait RecordPipeline: Send + Sync {
    fn process(
        &self,
        record: &SourceRecord,
    ) -> impl Future<Output = Result<RecordArtifacts, StageFailure>> + Send;
}

/// Generation parameters shared by every request of a record.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub chunking: ChunkingConfig,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl PipelineConfig {
    pub fn new(chunking: ChunkingConfig, settings: &CompletionSettings) -> Self {
        Self {
            chunking,
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
        }
    }

    fn request(&self, system_prompt: impl Into<String>, user_prompt: String) -> CompletionRequest {
        CompletionRequest {
            system_prompt: system_prompt.into(),
            user_prompt,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

/// The notes pipeline over a completion backend and a transcript fetcher.
pub struct NotePipeline<B, F> {
    client: Arc<ResilientClient<B>>,
    fetcher: F,
    config: PipelineConfig,
}

impl<B, F> NotePipeline<B, F>
where
    B: CompletionBackend + 'static,
    F: TextFetcher,
{
    pub fn new(client: ResilientClient<B>, fetcher: F, config: PipelineConfig) -> Self {
        Self {
            client: Arc::new(client),
            fetcher,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    async fn load_transcript(&self, record: &SourceRecord) -> Result<String, StageFailure> {
        let fail = |e| StageFailure::new(Stage::Fetch, e);

        if record.title.trim().is_empty() {
            return Err(fail(NoteforgeError::input("record has an empty title")));
        }
        if let Some(text) = &record.transcript {
            return Ok(text.clone());
        }
        match &record.transcript_url {
            Some(url) => self.fetcher.fetch_text(url).await.map_err(fail),
            None => Err(fail(NoteforgeError::input(
                "record has neither a transcript nor a transcript URL",
            ))),
        }
    }

    /// Resolve every chunk through the pool and assemble the notes document.
    async fn build_document(&self, title: &str, raw: &str) -> Result<String, StageFailure> {
        let blocks = segment(raw);
        if blocks.is_empty() {
            return Err(StageFailure::new(
                Stage::Segment,
                NoteforgeError::input("transcript has no content"),
            ));
        }

        let chunking = &self.config.chunking;
        let chunks = group(&blocks, chunking.baseline_blocks, chunking.max_chunks);
        let total = chunks.len();
        info!(blocks = blocks.len(), chunks = total, "transcript chunked");

        let requests: Vec<(usize, CompletionRequest)> = chunks
            .iter()
            .map(|chunk| {
                let prompt = prompts::chunk_prompt(title, chunk);
                (chunk.position, self.config.request(prompts::CHUNK_SYSTEM_PROMPT, prompt))
            })
            .collect();

        let client = Arc::clone(&self.client);
        let outcomes = WorkerPool::new(chunking.concurrency)
            .run(requests, move |(position, request)| {
                let client = Arc::clone(&client);
                async move {
                    let result = client.complete(&request).await;
                    debug!(position, ok = result.is_ok(), "chunk resolved");
                    result
                }
            })
            .await;

        let outputs = outcomes.into_iter().enumerate().map(|(i, outcome)| {
            let output: ChunkOutput = outcome
                .into_result()
                .and_then(|r| r.map_err(|e| e.to_string()));
            (i + 1, output)
        });

        assembler::assemble(outputs, total).map_err(|e| {
            let stage = match e {
                NoteforgeError::ChunkFailed { .. } => Stage::Complete,
                _ => Stage::Assemble,
            };
            StageFailure::new(stage, e)
        })
    }

    async fn complete_document(
        &self,
        stage: Stage,
        request: CompletionRequest,
    ) -> Result<String, StageFailure> {
        self.client
            .complete(&request)
            .await
            .map_err(|e| StageFailure::new(stage, NoteforgeError::completion(e.to_string())))
    }
}

impl<B, F> RecordPipeline for NotePipeline<B, F>
where
    B: CompletionBackend + 'static,
    F: TextFetcher,
{
    #[instrument(skip_all, fields(record_id = %record.id))]
    async fn process(&self, record: &SourceRecord) -> Result<RecordArtifacts, StageFailure> {
        let start = Instant::now();
        let raw = self.load_transcript(record).await?;
        let document = self.build_document(&record.title, &raw).await?;

        if document.is_empty() {
            return Err(StageFailure::new(
                Stage::Assemble,
                NoteforgeError::extraction("every chunk came back empty"),
            ));
        }

        let summary_request = self.config.request(
            prompts::summary_system_prompt(),
            prompts::summary_prompt(&record.title, &document),
        );
        let mind_map_request = self.config.request(
            prompts::MIND_MAP_SYSTEM_PROMPT,
            prompts::mind_map_prompt(&record.title, &document),
        );

        let (summary_text, mind_map_text) = tokio::join!(
            self.complete_document(Stage::Summarize, summary_request),
            self.complete_document(Stage::MindMap, mind_map_request),
        );

        let summary = split_bilingual(&summary_text?)
            .map_err(|e| StageFailure::new(Stage::Summarize, e))?;
        let mind_map = extract_mind_map(&mind_map_text?).map_err(|e| {
            warn!(error = %e, "mind map rejected");
            StageFailure::new(Stage::MindMap, e)
        })?;

        let tag_source = format!("{}\n\n{}", summary.primary_text, summary.secondary_text);
        let tags = score_tags(&record.title, &tag_source, record.source_url.as_deref());

        info!(
            chars = document.len(),
            tags = tags.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "record processed"
        );

        Ok(RecordArtifacts {
            document,
            summary,
            mind_map,
            tags,
            content_hash: content_hash(&raw),
            model: self.config.model.clone(),
        })
    }
}
