//! The persistence seam of the backfill runner.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use noteforge_shared::{NoteforgeError, RecordArtifacts, RecordFilter, Result, SourceRecord};
use noteforge_storage::Storage;

/// Source of candidate records and sink for their artifacts.
pub trait RecordStore: Send + Sync {
    fn load_candidate_records(
        &self,
        filter: &RecordFilter,
    ) -> impl Future<Output = Result<Vec<SourceRecord>>> + Send;

    fn save_artifacts(
        &self,
        record_id: &str,
        artifacts: &RecordArtifacts,
    ) -> impl Future<Output = Result<()>> + Send;
}

impl RecordStore for Storage {
    async fn load_candidate_records(&self, filter: &RecordFilter) -> Result<Vec<SourceRecord>> {
        Storage::load_candidate_records(self, filter).await
    }

    async fn save_artifacts(&self, record_id: &str, artifacts: &RecordArtifacts) -> Result<()> {
        Storage::save_artifacts(self, record_id, artifacts).await
    }
}

/// Process-local store, insertion ordered.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Vec<SourceRecord>>,
    artifacts: Mutex<HashMap<String, RecordArtifacts>>,
}

impl MemoryStore {
    pub fn new(records: Vec<SourceRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            artifacts: Mutex::new(HashMap::new()),
        }
    }

    pub fn artifacts_for(&self, record_id: &str) -> Option<RecordArtifacts> {
        self.lock_artifacts().ok()?.get(record_id).cloned()
    }

    pub fn saved_count(&self) -> usize {
        self.lock_artifacts().map(|a| a.len()).unwrap_or(0)
    }

    fn lock_artifacts(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, RecordArtifacts>>> {
        self.artifacts
            .lock()
            .map_err(|_| NoteforgeError::Storage("artifact map poisoned".into()))
    }
}

impl RecordStore for MemoryStore {
    async fn load_candidate_records(&self, filter: &RecordFilter) -> Result<Vec<SourceRecord>> {
        let records = self
            .records
            .lock()
            .map_err(|_| NoteforgeError::Storage("record list poisoned".into()))?
            .clone();
        let saved = self.lock_artifacts()?;

        let selected = records
            .into_iter()
            .filter(|r| filter.ids.is_empty() || filter.ids.contains(&r.id))
            .filter(|r| !filter.only_missing || !saved.contains_key(&r.id))
            .take(filter.limit.unwrap_or(usize::MAX))
            .collect();
        Ok(selected)
    }

    async fn save_artifacts(&self, record_id: &str, artifacts: &RecordArtifacts) -> Result<()> {
        self.lock_artifacts()?
            .insert(record_id.to_string(), artifacts.clone());
        Ok(())
    }
}
