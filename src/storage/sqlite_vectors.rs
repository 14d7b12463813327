//! Plain SQLite vector index
//!
//! Persists vectors as little-endian f32 blobs and ranks by a brute-force
//! cosine scan. Needs no extension, so it is the default persistent backend.
//! Uses its own connection (WAL mode) so it does not contend with the graph
//! store.

use super::memory::rank;
use super::traits::{StorageError, StorageResult, VectorFilter, VectorIndex, VectorMatch, VectorMetadata};
use crate::graph::NodeId;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

pub struct SqliteVectorIndex {
    conn: Mutex<Connection>,
    dimensions: usize,
}

/// Encode a vector as little-endian f32 bytes.
pub(crate) fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

pub(crate) fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

impl SqliteVectorIndex {
    pub fn open(path: &Path, dimensions: usize) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init_connection(Connection::open(path)?, dimensions)
    }

    pub fn open_in_memory(dimensions: usize) -> StorageResult<Self> {
        Self::init_connection(Connection::open_in_memory()?, dimensions)
    }

    fn init_connection(conn: Connection, dimensions: usize) -> StorageResult<Self> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;

            CREATE TABLE IF NOT EXISTS node_vectors (
                node_id TEXT PRIMARY KEY,
                subtype TEXT NOT NULL,
                embedding BLOB NOT NULL,
                metadata_json TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_node_vectors_subtype ON node_vectors(subtype);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            dimensions,
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn check(&self, vector: &[f32]) -> StorageResult<()> {
        if vector.len() != self.dimensions {
            return Err(StorageError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn upsert(&self, id: &NodeId, vector: &[f32], metadata: VectorMetadata) -> StorageResult<()> {
        self.check(vector)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO node_vectors (node_id, subtype, embedding, metadata_json)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(node_id) DO UPDATE SET
                 subtype = excluded.subtype,
                 embedding = excluded.embedding,
                 metadata_json = excluded.metadata_json",
            params![
                id.to_string(),
                metadata.subtype,
                encode_vector(vector),
                serde_json::to_string(&metadata)?,
            ],
        )?;
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&VectorFilter>,
    ) -> StorageResult<Vec<VectorMatch>> {
        self.check(vector)?;
        let subtype = filter.and_then(|f| f.subtype.clone());
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT node_id, embedding, metadata_json FROM node_vectors
             WHERE ?1 IS NULL OR subtype = ?1",
        )?;
        let rows = stmt.query_map(params![subtype], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Vec<u8>>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut decoded = Vec::new();
        for row in rows {
            let (id, blob, metadata_json) = row?;
            let id = NodeId::parse(&id).map_err(|e| StorageError::Backend(e.to_string()))?;
            let metadata: VectorMetadata = serde_json::from_str(&metadata_json)?;
            decoded.push((id, decode_vector(&blob), metadata));
        }
        Ok(rank(
            decoded.iter().map(|(id, v, m)| (*id, v.as_slice(), m.clone())),
            vector,
            top_k,
        ))
    }

    async fn contains(&self, id: &NodeId) -> StorageResult<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM node_vectors WHERE node_id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    async fn len(&self) -> StorageResult<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM node_vectors", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
