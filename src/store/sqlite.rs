//! SQLite-backed vector store
//!
//! Same exhaustive cosine search as the snapshot store, with records kept in
//! an embedded database instead of one JSON file. Each mutation commits its
//! own transaction, synced to disk, before returning.

use super::{
    similarity_to_distance, rank_by_similarity, CollectionInfo, CollectionStats, Metadata,
    NewDocuments, QueryResult, StoreError, VectorStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use std::path::Path;

type DbPool = Pool<SqliteConnectionManager>;

/// Database migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: collections and their records
    r#"
    CREATE TABLE collections (
        name TEXT PRIMARY KEY,
        created_at TEXT NOT NULL
    );

    CREATE TABLE records (
        collection TEXT NOT NULL,
        position INTEGER NOT NULL,
        id TEXT NOT NULL,
        document TEXT NOT NULL,
        embedding BLOB NOT NULL,
        dimension INTEGER NOT NULL,
        metadata TEXT NOT NULL,  -- JSON metadata
        PRIMARY KEY (collection, position),
        UNIQUE (collection, id),
        FOREIGN KEY (collection) REFERENCES collections(name) ON DELETE CASCADE
    );
    "#,
];

/// Vector store persisted in SQLite through a connection pool
pub struct SqliteVectorStore {
    pool: DbPool,
}

impl SqliteVectorStore {
    /// Open (or create) the database and run migrations
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::Io {
                    source: e,
                    context: format!("Failed to create database directory: {:?}", parent),
                })?;
            }
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = FULL;
                PRAGMA foreign_keys = ON;
                PRAGMA busy_timeout = 5000;
                ",
            )
        });

        let pool = Pool::builder().max_size(8).build(manager)?;
        let store = Self { pool };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        let conn = self.pool.get()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM _migrations",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                tracing::info!("Applying vector store migration {}", version);
                conn.execute_batch(migration)?;
                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }

    /// Run blocking database work off the async executor
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut rusqlite::Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut *conn)
        })
        .await
        .map_err(|e| StoreError::Database(format!("Blocking task failed: {}", e)))?
    }
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(format!("Invalid timestamp '{}': {}", raw, e)))
}

fn ensure_collection(conn: &rusqlite::Connection, name: &str) -> Result<DateTime<Utc>, StoreError> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT created_at FROM collections WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()?;

    match existing {
        Some(raw) => parse_timestamp(&raw),
        None => {
            let now = Utc::now();
            conn.execute(
                "INSERT INTO collections (name, created_at) VALUES (?1, ?2)",
                params![name, now.to_rfc3339()],
            )?;
            Ok(now)
        }
    }
}

fn collection_info(
    conn: &rusqlite::Connection,
    name: &str,
) -> Result<Option<(CollectionInfo, u64)>, StoreError> {
    let created: Option<String> = conn
        .query_row(
            "SELECT created_at FROM collections WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()?;

    let Some(created) = created else {
        return Ok(None);
    };

    let (count, size): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(LENGTH(CAST(document AS BLOB)) + LENGTH(embedding)), 0)
         FROM records WHERE collection = ?1",
        params![name],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    Ok(Some((
        CollectionInfo {
            name: name.to_string(),
            document_count: count as usize,
            created_at: parse_timestamp(&created)?,
        },
        size as u64,
    )))
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn get_or_create_collection(&self, name: &str) -> Result<CollectionInfo, StoreError> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            ensure_collection(conn, &name)?;
            collection_info(conn, &name)?
                .map(|(info, _)| info)
                .ok_or_else(|| StoreError::Database(format!("Collection {} vanished", name)))
        })
        .await
    }

    async fn add_documents(&self, name: &str, batch: NewDocuments) -> Result<(), StoreError> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            ensure_collection(&tx, &name)?;

            let dimension: Option<i64> = tx
                .query_row(
                    "SELECT dimension FROM records WHERE collection = ?1 LIMIT 1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()?;

            let existing_ids: Vec<String> = {
                let mut stmt = tx.prepare(
                    "SELECT id FROM records WHERE collection = ?1 ORDER BY position",
                )?;
                let ids = stmt
                    .query_map(params![name], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                ids
            };

            let (ids, metadatas) = batch.prepare(dimension.map(|d| d as usize), &existing_ids)?;
            let offset = existing_ids.len();

            {
                let mut stmt = tx.prepare(
                    "INSERT INTO records (collection, position, id, document, embedding, dimension, metadata)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )?;
                for (i, ((document, embedding), (id, metadata))) in batch
                    .documents
                    .iter()
                    .zip(batch.embeddings.iter())
                    .zip(ids.iter().zip(metadatas.iter()))
                    .enumerate()
                {
                    let metadata = serde_json::to_string(metadata)
                        .map_err(|e| StoreError::Serialization(e.to_string()))?;
                    stmt.execute(params![
                        name,
                        (offset + i) as i64,
                        id,
                        document,
                        encode_embedding(embedding),
                        embedding.len() as i64,
                        metadata,
                    ])?;
                }
            }

            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn query(
        &self,
        name: &str,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<QueryResult, StoreError> {
        let name = name.to_string();
        let query_embedding = query_embedding.to_vec();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, document, embedding, metadata FROM records
                 WHERE collection = ?1 ORDER BY position",
            )?;
            let rows = stmt
                .query_map(params![name], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            if rows.is_empty() {
                return Ok(QueryResult::default());
            }

            let embeddings: Vec<Vec<f32>> = rows.iter().map(|r| decode_embedding(&r.2)).collect();
            let ranked = rank_by_similarity(&query_embedding, &embeddings, top_k);

            let mut result = QueryResult::default();
            for (idx, similarity) in ranked {
                let (id, document, _, metadata) = &rows[idx];
                let metadata: Metadata = serde_json::from_str(metadata)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                result.ids.push(id.clone());
                result.documents.push(document.clone());
                result.metadatas.push(metadata);
                result.distances.push(similarity_to_distance(similarity));
            }
            Ok(result)
        })
        .await
    }

    async fn delete_collection(&self, name: &str) -> Result<bool, StoreError> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM records WHERE collection = ?1", params![name])?;
            let removed = tx.execute("DELETE FROM collections WHERE name = ?1", params![name])?;
            tx.commit()?;
            Ok(removed > 0)
        })
        .await
    }

    async fn get_stats(&self, name: &str) -> Result<Option<CollectionStats>, StoreError> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            Ok(collection_info(conn, &name)?.map(|(info, total_size)| CollectionStats {
                document_count: info.document_count,
                created_at: info.created_at,
                total_size,
            }))
        })
        .await
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>, StoreError> {
        self.with_conn(|conn| {
            let names: Vec<String> = {
                let mut stmt = conn.prepare("SELECT name FROM collections ORDER BY name")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                names
            };

            let mut infos = Vec::with_capacity(names.len());
            for name in names {
                if let Some((info, _)) = collection_info(conn, &name)? {
                    infos.push(info);
                }
            }
            Ok(infos)
        })
        .await
    }
}
