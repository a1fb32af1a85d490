use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use super::{next_revision, validate_field, Document, DocumentStore, StoreError};

/// SQLite-backed document store.
///
/// All logical databases live in one `documents` table keyed by
/// `(db, id)`; [`SqliteStore::database`] hands out views sharing the
/// connection.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    db: String,
}

impl SqliteStore {
    /// Open (or create) the store at `database_url` and select logical database `db`.
    pub fn open(database_url: &str, db: &str) -> Result<Self, StoreError> {
        // Parse sqlite: prefix if present
        let path = database_url.strip_prefix("sqlite:").unwrap_or(database_url);

        let conn = if path == ":memory:" {
            Connection::open_in_memory()
        } else {
            // Create parent directories if needed
            if let Some(parent) = Path::new(path).parent() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::Database(e.to_string()))?;
            }
            Connection::open(path)
        }
        .map_err(|e| StoreError::Database(e.to_string()))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS documents (
                db TEXT NOT NULL,
                id TEXT NOT NULL,
                rev TEXT NOT NULL,
                body TEXT NOT NULL,
                PRIMARY KEY (db, id)
            )",
            [],
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::info!("Document store initialized with database: {}", path);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db: db.to_string(),
        })
    }

    /// Another logical database on the same connection.
    pub fn database(&self, db: &str) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
            db: db.to_string(),
        }
    }

    /// Name of the logical database this view reads and writes.
    pub fn name(&self) -> &str {
        &self.db
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|e| StoreError::Database(e.to_string()))
    }
}

fn to_document(id: String, rev: String, body: String) -> Result<Document, StoreError> {
    let body: Value =
        serde_json::from_str(&body).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(Document {
        id,
        rev: Some(rev),
        body,
    })
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, id: &str) -> Result<Document, StoreError> {
        let conn = self.lock()?;

        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT rev, body FROM documents WHERE db = ?1 AND id = ?2",
                params![self.db, id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        match row {
            Some((rev, body)) => to_document(id.to_string(), rev, body),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    async fn put(&self, doc: Document) -> Result<String, StoreError> {
        let body =
            serde_json::to_string(&doc.body).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let conn = self.lock()?;

        let current: Option<String> = conn
            .query_row(
                "SELECT rev FROM documents WHERE db = ?1 AND id = ?2",
                params![self.db, doc.id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        if current.as_deref() != doc.rev.as_deref() {
            return Err(StoreError::Conflict(doc.id));
        }

        let rev = next_revision(current.as_deref());
        let changed = match &current {
            Some(expected) => conn.execute(
                "UPDATE documents SET rev = ?1, body = ?2 WHERE db = ?3 AND id = ?4 AND rev = ?5",
                params![rev, body, self.db, doc.id, expected],
            ),
            None => conn.execute(
                "INSERT OR IGNORE INTO documents (db, id, rev, body) VALUES (?1, ?2, ?3, ?4)",
                params![self.db, doc.id, rev, body],
            ),
        }
        .map_err(|e| StoreError::Database(e.to_string()))?;

        if changed == 0 {
            return Err(StoreError::Conflict(doc.id));
        }

        tracing::debug!("Stored {}/{} at {}", self.db, doc.id, rev);
        Ok(rev)
    }

    async fn find_by_field(&self, field: &str, value: &str) -> Result<Vec<Document>, StoreError> {
        validate_field(field)?;
        let path = format!("$.{}", field);
        let conn = self.lock()?;

        // json_each over a scalar yields the scalar itself, so one query
        // covers both plain and array-valued fields.
        let mut stmt = conn
            .prepare(
                "SELECT d.id, d.rev, d.body FROM documents d
                 WHERE d.db = ?1
                   AND EXISTS (
                       SELECT 1 FROM json_each(d.body, ?2) j
                       WHERE j.type = 'text' AND lower(j.value) = lower(?3)
                   )
                 ORDER BY d.id",
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![self.db, path, value], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
            })
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let mut docs = Vec::new();
        for row in rows {
            let (id, rev, body) = row.map_err(|e| StoreError::Database(e.to_string()))?;
            docs.push(to_document(id, rev, body)?);
        }
        Ok(docs)
    }

    async fn remove(&self, id: &str, rev: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;

        let deleted = conn
            .execute(
                "DELETE FROM documents WHERE db = ?1 AND id = ?2 AND rev = ?3",
                params![self.db, id, rev],
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;

        if deleted == 1 {
            return Ok(());
        }

        let exists: bool = conn
            .query_row(
                "SELECT EXISTS (SELECT 1 FROM documents WHERE db = ?1 AND id = ?2)",
                params![self.db, id],
                |row| row.get(0),
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;

        if exists {
            Err(StoreError::Conflict(id.to_string()))
        } else {
            Err(StoreError::NotFound(id.to_string()))
        }
    }
}
