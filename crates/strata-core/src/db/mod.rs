//! Direct SQLite access for durable vector records.
//!
//! The semantic tier is the only tier with a durable copy. Each row holds the
//! item content, its embedding (little-endian f32 blob), memory type,
//! metadata and version. Writes are last-write-wins by version number.

pub mod types;

pub use types::*;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Error, Result};
use crate::types::{MemoryType, Metadata};

/// Schema for the vector record table (001)
pub const VECTOR_RECORDS_SQL: &str = include_str!("migrations/001_vector_records.sql");

const RECORD_COLUMNS: &str =
    "id, content, embedding, memory_type, metadata_json, version, created_at, updated_at";

/// Database connection wrapper.
///
/// Thread-safe via internal Mutex. All database operations acquire the lock.
pub struct Database {
    conn: Mutex<Connection>,
}

/// Row as read from SQLite, before column decoding.
struct RawRecord {
    id: String,
    content: String,
    embedding: Vec<u8>,
    memory_type: String,
    metadata_json: String,
    version: i64,
    created_at: i64,
    updated_at: i64,
}

impl Database {
    /// Open database at specific path
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(Error::Database)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(Error::Database)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Create tables if they do not exist
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        conn.execute_batch(VECTOR_RECORDS_SQL)?;
        tracing::debug!("vector record schema ready");
        Ok(())
    }

    /// Check database connectivity
    pub fn ping(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        conn.execute_batch("SELECT 1").map_err(Error::Database)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Vector Record Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert or overwrite a record if its version is newer than the stored one
    pub fn upsert_vector_record(&self, record: &VectorRecord) -> Result<UpsertOutcome> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        Self::upsert_on(&conn, record)
    }

    /// Upsert a batch of records in a single transaction
    pub fn upsert_vector_records(&self, records: &[VectorRecord]) -> Result<Vec<UpsertOutcome>> {
        let mut conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let tx = conn.transaction()?;
        let mut outcomes = Vec::with_capacity(records.len());
        for record in records {
            outcomes.push(Self::upsert_on(&tx, record)?);
        }
        tx.commit()?;
        Ok(outcomes)
    }

    fn upsert_on(conn: &Connection, record: &VectorRecord) -> Result<UpsertOutcome> {
        let stored: Option<i64> = conn
            .query_row(
                "SELECT version FROM vector_records WHERE id = ?1",
                params![record.id],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(stored) = stored {
            let stored = stored as u64;
            if stored >= record.version {
                return Ok(UpsertOutcome::Stale { stored_version: stored });
            }
        }

        let metadata_json = serde_json::to_string(&record.metadata)?;
        conn.execute(
            "INSERT INTO vector_records
                 (id, content, embedding, dimensions, memory_type, metadata_json, version, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                 content = excluded.content,
                 embedding = excluded.embedding,
                 dimensions = excluded.dimensions,
                 memory_type = excluded.memory_type,
                 metadata_json = excluded.metadata_json,
                 version = excluded.version,
                 created_at = excluded.created_at,
                 updated_at = excluded.updated_at",
            params![
                record.id,
                record.content,
                encode_embedding(&record.embedding),
                record.embedding.len() as i64,
                record.memory_type.as_str(),
                metadata_json,
                record.version as i64,
                record.created_at.timestamp_millis(),
                record.updated_at.timestamp_millis(),
            ],
        )?;

        Ok(match stored {
            Some(previous) => UpsertOutcome::Updated { previous_version: previous as u64 },
            None => UpsertOutcome::Inserted,
        })
    }

    /// Hard-delete a record. Returns whether a row was removed.
    pub fn delete_vector_record(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let rows = conn.execute("DELETE FROM vector_records WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Vector Record Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// Get a record by ID
    pub fn get_vector_record(&self, id: &str) -> Result<Option<VectorRecord>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let raw = conn
            .query_row(
                &format!("SELECT {} FROM vector_records WHERE id = ?1", RECORD_COLUMNS),
                params![id],
                Self::map_record,
            )
            .optional()?;
        raw.map(RawRecord::decode).transpose()
    }

    /// Page through records ordered by id, starting strictly after `after_id`
    pub fn list_vector_records(
        &self,
        after_id: Option<&str>,
        limit: usize,
        memory_type: Option<MemoryType>,
    ) -> Result<Vec<VectorRecord>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM vector_records
             WHERE (?1 IS NULL OR id > ?1) AND (?2 IS NULL OR memory_type = ?2)
             ORDER BY id
             LIMIT ?3",
            RECORD_COLUMNS
        ))?;
        let raws = stmt
            .query_map(
                params![after_id, memory_type.map(|t| t.as_str()), limit as i64],
                Self::map_record,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        raws.into_iter().map(RawRecord::decode).collect()
    }

    /// Load the id, version and embedding of every record
    pub fn scan_embeddings(&self) -> Result<Vec<EmbeddingRow>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare("SELECT id, version, embedding FROM vector_records")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, version, blob)| {
                let embedding = decode_embedding(&id, &blob)?;
                Ok(EmbeddingRow { id, version: version as u64, embedding })
            })
            .collect()
    }

    /// Count stored records
    pub fn count_vector_records(&self) -> Result<usize> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM vector_records", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn map_record(row: &rusqlite::Row) -> rusqlite::Result<RawRecord> {
        Ok(RawRecord {
            id: row.get(0)?,
            content: row.get(1)?,
            embedding: row.get(2)?,
            memory_type: row.get(3)?,
            metadata_json: row.get(4)?,
            version: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }
}

impl RawRecord {
    fn decode(self) -> Result<VectorRecord> {
        let memory_type: MemoryType = self.memory_type.parse()?;
        let metadata: Metadata = serde_json::from_str(&self.metadata_json)?;
        let embedding = decode_embedding(&self.id, &self.embedding)?;
        let created_at = millis_to_datetime(&self.id, self.created_at)?;
        let updated_at = millis_to_datetime(&self.id, self.updated_at)?;

        Ok(VectorRecord {
            id: self.id,
            content: self.content,
            embedding,
            memory_type,
            metadata,
            version: self.version as u64,
            created_at,
            updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MetadataValue;
    use chrono::Utc;

    fn setup() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db
    }

    fn record(id: &str, version: u64, embedding: Vec<f32>) -> VectorRecord {
        let mut metadata = Metadata::new();
        metadata.insert("source".into(), MetadataValue::from("test"));
        let now = Utc::now();
        VectorRecord {
            id: id.into(),
            content: format!("content of {} v{}", id, version),
            embedding,
            memory_type: MemoryType::SemanticMemory,
            metadata,
            version,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_insert_and_get() {
        let db = setup();
        let outcome = db.upsert_vector_record(&record("a", 1, vec![1.0, 0.0])).unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted);

        let stored = db.get_vector_record("a").unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.embedding, vec![1.0, 0.0]);
        assert_eq!(stored.memory_type, MemoryType::SemanticMemory);
        assert_eq!(stored.metadata.get("source"), Some(&MetadataValue::from("test")));

        assert!(db.get_vector_record("missing").unwrap().is_none());
    }

    #[test]
    fn test_last_write_wins_by_version() {
        let db = setup();
        db.upsert_vector_record(&record("a", 3, vec![1.0])).unwrap();

        // Older version arriving late is ignored regardless of wall clock
        let outcome = db.upsert_vector_record(&record("a", 2, vec![9.0])).unwrap();
        assert_eq!(outcome, UpsertOutcome::Stale { stored_version: 3 });
        assert_eq!(db.get_vector_record("a").unwrap().unwrap().embedding, vec![1.0]);

        // Same version is a no-op
        let outcome = db.upsert_vector_record(&record("a", 3, vec![5.0])).unwrap();
        assert!(!outcome.is_written());

        let outcome = db.upsert_vector_record(&record("a", 4, vec![7.0])).unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated { previous_version: 3 });
        let stored = db.get_vector_record("a").unwrap().unwrap();
        assert_eq!(stored.version, 4);
        assert_eq!(stored.embedding, vec![7.0]);
    }

    #[test]
    fn test_batch_upsert() {
        let db = setup();
        let outcomes = db
            .upsert_vector_records(&[record("a", 1, vec![1.0]), record("b", 1, vec![2.0]), record("a", 1, vec![3.0])])
            .unwrap();
        assert_eq!(
            outcomes,
            vec![
                UpsertOutcome::Inserted,
                UpsertOutcome::Inserted,
                UpsertOutcome::Stale { stored_version: 1 }
            ]
        );
        assert_eq!(db.count_vector_records().unwrap(), 2);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let db = setup();
        db.upsert_vector_record(&record("a", 1, vec![1.0])).unwrap();
        assert!(db.delete_vector_record("a").unwrap());
        assert!(!db.delete_vector_record("a").unwrap());
        assert!(!db.delete_vector_record("never-existed").unwrap());
        assert_eq!(db.count_vector_records().unwrap(), 0);
    }

    #[test]
    fn test_list_pages_by_id() {
        let db = setup();
        for id in ["c", "a", "b", "d"] {
            db.upsert_vector_record(&record(id, 1, vec![1.0])).unwrap();
        }

        let first = db.list_vector_records(None, 2, None).unwrap();
        let ids: Vec<&str> = first.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        let second = db.list_vector_records(Some("b"), 2, None).unwrap();
        let ids: Vec<&str> = second.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "d"]);

        assert!(db.list_vector_records(Some("d"), 2, None).unwrap().is_empty());
        assert!(db
            .list_vector_records(None, 10, Some(MemoryType::EpisodicMemory))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_scan_embeddings() {
        let db = setup();
        db.upsert_vector_record(&record("a", 2, vec![0.5, 0.5])).unwrap();
        let rows = db.scan_embeddings().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "a");
        assert_eq!(rows[0].version, 2);
        assert_eq!(rows[0].embedding, vec![0.5, 0.5]);
    }

    #[test]
    fn test_open_path_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strata.db");
        {
            let db = Database::open_path(&path).unwrap();
            db.migrate().unwrap();
            db.upsert_vector_record(&record("a", 1, vec![1.0])).unwrap();
        }
        let db = Database::open_path(&path).unwrap();
        db.migrate().unwrap();
        assert!(db.ping().is_ok());
        assert_eq!(db.get_vector_record("a").unwrap().unwrap().version, 1);
    }
}
