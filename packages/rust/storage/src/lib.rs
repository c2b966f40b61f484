//! libSQL storage layer (embedded, offline mode).
//!
//! The [`Storage`] struct wraps a libSQL database holding source records and
//! the artifacts derived from them. It is the persistence collaborator of the
//! backfill runner: candidates are loaded from `records`, results are upserted
//! into `artifacts`.
//!
//! **Access rules:**
//! - `noteforge import` / `noteforge backfill`: read-write via [`Storage::open`]
//! - inspection tooling: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::params::Params;
use libsql::{Connection, Database, Value, params};
use noteforge_shared::{
    BilingualSummary, MindMapNode, NoteforgeError, RecordArtifacts, RecordFilter, Result,
    SourceRecord, StoredArtifacts, TagSet,
};
use tracing::{debug, info};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

fn db_err(e: libsql::Error) -> NoteforgeError {
    NoteforgeError::Storage(e.to_string())
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| NoteforgeError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(NoteforgeError::Storage(format!(
                "database not found: {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        NoteforgeError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(NoteforgeError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Records
    // -----------------------------------------------------------------------

    /// Insert a source record. Fails if the id already exists.
    pub async fn insert_record(&self, record: &SourceRecord) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO records (id, title, source_url, transcript_url, transcript, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.id.as_str(),
                    record.title.as_str(),
                    record.source_url.as_deref(),
                    record.transcript_url.as_deref(),
                    record.transcript.as_deref(),
                    now.as_str(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(db_err)?;
        debug!(id = %record.id, "record inserted");
        Ok(())
    }

    /// Get a record by id.
    pub async fn get_record(&self, id: &str) -> Result<Option<SourceRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, title, source_url, transcript_url, transcript FROM records WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_record(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    /// Records matching `filter`, oldest first.
    pub async fn load_candidate_records(&self, filter: &RecordFilter) -> Result<Vec<SourceRecord>> {
        let mut sql = String::from(
            "SELECT r.id, r.title, r.source_url, r.transcript_url, r.transcript
             FROM records r LEFT JOIN artifacts a ON a.record_id = r.id
             WHERE 1 = 1",
        );
        let mut values: Vec<Value> = Vec::new();

        if filter.only_missing {
            sql.push_str(" AND a.record_id IS NULL");
        }
        if !filter.ids.is_empty() {
            let placeholders: Vec<String> = (1..=filter.ids.len()).map(|i| format!("?{i}")).collect();
            sql.push_str(&format!(" AND r.id IN ({})", placeholders.join(", ")));
            values.extend(filter.ids.iter().map(|id| Value::Text(id.clone())));
        }
        sql.push_str(" ORDER BY r.created_at, r.id");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT ?{}", values.len() + 1));
            values.push(Value::Integer(limit as i64));
        }

        let mut rows = self
            .conn
            .query(&sql, Params::Positional(values))
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_record(&row)?);
        }
        debug!(count = results.len(), "candidate records loaded");
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Artifacts
    // -----------------------------------------------------------------------

    /// Insert or replace the artifacts of a record.
    pub async fn save_artifacts(&self, record_id: &str, artifacts: &RecordArtifacts) -> Result<()> {
        self.check_writable()?;
        let mind_map_json = serde_json::to_string(&artifacts.mind_map)
            .map_err(|e| NoteforgeError::Storage(format!("serialize mind map: {e}")))?;
        let tags_json = serde_json::to_string(&artifacts.tags)
            .map_err(|e| NoteforgeError::Storage(format!("serialize tags: {e}")))?;
        let now = Utc::now().to_rfc3339();

        self.conn
            .execute(
                "INSERT INTO artifacts (record_id, document, summary_primary, summary_secondary,
                                        summary_legacy, mind_map_json, tags_json, content_hash, model, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(record_id) DO UPDATE SET
                   document = excluded.document,
                   summary_primary = excluded.summary_primary,
                   summary_secondary = excluded.summary_secondary,
                   summary_legacy = excluded.summary_legacy,
                   mind_map_json = excluded.mind_map_json,
                   tags_json = excluded.tags_json,
                   content_hash = excluded.content_hash,
                   model = excluded.model,
                   updated_at = excluded.updated_at",
                params![
                    record_id,
                    artifacts.document.as_str(),
                    artifacts.summary.primary_text.as_str(),
                    artifacts.summary.secondary_text.as_str(),
                    artifacts.summary.legacy_text.as_str(),
                    mind_map_json,
                    tags_json,
                    artifacts.content_hash.as_str(),
                    artifacts.model.as_str(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(db_err)?;

        self.conn
            .execute(
                "UPDATE records SET updated_at = ?1 WHERE id = ?2",
                params![now.as_str(), record_id],
            )
            .await
            .map_err(db_err)?;

        debug!(record_id, "artifacts saved");
        Ok(())
    }

    /// Get the stored artifacts of a record.
    pub async fn get_artifacts(&self, record_id: &str) -> Result<Option<StoredArtifacts>> {
        let mut rows = self
            .conn
            .query(
                "SELECT document, summary_primary, summary_secondary, summary_legacy,
                        mind_map_json, tags_json, content_hash, model, updated_at
                 FROM artifacts WHERE record_id = ?1",
                params![record_id],
            )
            .await
            .map_err(db_err)?;

        let Some(row) = rows.next().await.map_err(db_err)? else {
            return Ok(None);
        };

        let text = |idx: i32| row.get::<String>(idx).map_err(db_err);

        let mind_map: MindMapNode = serde_json::from_str(&text(4)?)
            .map_err(|e| NoteforgeError::Storage(format!("invalid mind map JSON: {e}")))?;
        let tags: TagSet = serde_json::from_str(&text(5)?)
            .map_err(|e| NoteforgeError::Storage(format!("invalid tags JSON: {e}")))?;
        let updated_at = DateTime::parse_from_rfc3339(&text(8)?)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| NoteforgeError::Storage(format!("invalid date: {e}")))?;

        Ok(Some(StoredArtifacts {
            record_id: record_id.to_string(),
            artifacts: RecordArtifacts {
                document: text(0)?,
                summary: BilingualSummary {
                    primary_text: text(1)?,
                    secondary_text: text(2)?,
                    legacy_text: text(3)?,
                },
                mind_map,
                tags,
                content_hash: text(6)?,
                model: text(7)?,
            },
            updated_at,
        }))
    }
}

/// Convert a database row to a [`SourceRecord`].
fn row_to_record(row: &libsql::Row) -> Result<SourceRecord> {
    Ok(SourceRecord {
        id: row.get::<String>(0).map_err(db_err)?,
        title: row.get::<String>(1).map_err(db_err)?,
        source_url: row.get::<String>(2).ok(),
        transcript_url: row.get::<String>(3).ok(),
        transcript: row.get::<String>(4).ok(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("nf_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn artifacts(document: &str) -> RecordArtifacts {
        RecordArtifacts {
            document: document.into(),
            summary: BilingualSummary {
                primary_text: "中文".into(),
                secondary_text: "English".into(),
                legacy_text: "中文".into(),
            },
            mind_map: MindMapNode {
                label: "Root".into(),
                children: vec![MindMapNode {
                    label: "Leaf".into(),
                    children: vec![],
                }],
            },
            tags: TagSet(vec!["Raft".into()]),
            content_hash: "abc123".into(),
            model: "test-model".into(),
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("nf_test_{}.db", Uuid::now_v7()));
        let _s1 = Storage::open(&tmp).await.expect("first open");
        drop(_s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn record_roundtrip_keeps_optional_columns() {
        let storage = test_storage().await;
        let mut record = SourceRecord::inline("Raft lecture", "1\n00:00:00,000 --> 00:00:01,000\nhi");
        record.source_url = Some("https://www.youtube.com/watch?v=x".into());
        storage.insert_record(&record).await.expect("insert record");

        let found = storage.get_record(&record.id).await.unwrap().unwrap();
        assert_eq!(found, record);
        assert!(found.transcript_url.is_none());

        assert!(storage.get_record("missing").await.unwrap().is_none());
        assert!(storage.insert_record(&record).await.is_err());
    }

    #[tokio::test]
    async fn candidate_filtering() {
        let storage = test_storage().await;
        let mut ids = Vec::new();
        for i in 0..4 {
            let record = SourceRecord::inline(format!("talk {i}"), "text");
            storage.insert_record(&record).await.unwrap();
            ids.push(record.id);
        }
        storage.save_artifacts(&ids[1], &artifacts("done")).await.unwrap();

        let all = storage
            .load_candidate_records(&RecordFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 4);

        let missing = storage
            .load_candidate_records(&RecordFilter {
                only_missing: true,
                ..Default::default()
            })
            .await
            .unwrap();
        let missing_ids: Vec<_> = missing.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(missing_ids, [ids[0].as_str(), ids[2].as_str(), ids[3].as_str()]);

        let picked = storage
            .load_candidate_records(&RecordFilter {
                ids: vec![ids[3].clone(), ids[1].clone()],
                only_missing: false,
                limit: Some(1),
            })
            .await
            .unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].id, ids[1]);
    }

    #[tokio::test]
    async fn artifacts_upsert_and_read_back() {
        let storage = test_storage().await;
        let record = SourceRecord::inline("talk", "text");
        storage.insert_record(&record).await.unwrap();

        assert!(storage.get_artifacts(&record.id).await.unwrap().is_none());

        storage.save_artifacts(&record.id, &artifacts("first")).await.unwrap();
        storage.save_artifacts(&record.id, &artifacts("second")).await.unwrap();

        let stored = storage.get_artifacts(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.record_id, record.id);
        assert_eq!(stored.artifacts, artifacts("second"));
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("nf_test_{}.db", Uuid::now_v7()));
        let rw = Storage::open(&tmp).await.unwrap();
        rw.insert_record(&SourceRecord::inline("a", "text")).await.unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        let result = ro.insert_record(&SourceRecord::inline("b", "text")).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
        assert_eq!(
            ro.load_candidate_records(&RecordFilter::default()).await.unwrap().len(),
            1
        );
    }
}
