//! SqliteVecIndex: persistent vector index via sqlite-vec
//!
//! KNN search runs in a vec0 virtual table partitioned by subtype. A plain
//! side table maps node ids to vec0 rowids and holds the node metadata.
//!
//! Vectors are L2-normalized on insert so that L2 distance from vec0
//! can be converted to cosine similarity: `sim = 1 - dist² / 2`.

#[cfg(feature = "embeddings")]
mod inner {
    use crate::embedding::l2_normalize;
    use crate::graph::NodeId;
    use crate::storage::sqlite_vectors::encode_vector;
    use crate::storage::traits::{
        StorageError, StorageResult, VectorFilter, VectorIndex, VectorMatch, VectorMetadata,
    };
    use async_trait::async_trait;
    use rusqlite::{params, Connection, OptionalExtension};
    use sqlite_vec::sqlite3_vec_init;
    use std::path::Path;
    use std::sync::Mutex;

    pub struct SqliteVecIndex {
        conn: Mutex<Connection>,
        dimensions: usize,
    }

    /// Register the sqlite-vec extension globally (safe under parallel test execution).
    fn register_vec_extension() {
        use std::sync::Once;
        static INIT: Once = Once::new();
        INIT.call_once(|| unsafe {
            rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
                sqlite3_vec_init as *const (),
            )));
        });
    }

    impl SqliteVecIndex {
        pub fn open(path: &Path, dimensions: usize) -> StorageResult<Self> {
            register_vec_extension();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            Self::init_connection(Connection::open(path)?, dimensions)
        }

        pub fn open_in_memory(dimensions: usize) -> StorageResult<Self> {
            register_vec_extension();
            Self::init_connection(Connection::open_in_memory()?, dimensions)
        }

        fn init_connection(conn: Connection, dimensions: usize) -> StorageResult<Self> {
            conn.execute_batch("PRAGMA journal_mode=WAL;")?;
            conn.execute_batch(&format!(
                "CREATE VIRTUAL TABLE IF NOT EXISTS vec_nodes USING vec0(\
                     subtype TEXT PARTITION KEY,\
                     embedding float[{}]\
                 );
                 CREATE TABLE IF NOT EXISTS vec_node_map (
                     node_id TEXT PRIMARY KEY,
                     vec_rowid INTEGER NOT NULL UNIQUE,
                     metadata_json TEXT NOT NULL
                 );",
                dimensions
            ))?;
            Ok(Self {
                conn: Mutex::new(conn),
                dimensions,
            })
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
    impl VectorIndex for SqliteVecIndex {
        async fn upsert(
            &self,
            id: &NodeId,
            vector: &[f32],
            metadata: VectorMetadata,
        ) -> StorageResult<()> {
            self.check(vector)?;
            let normalized = l2_normalize(vector);
            let mut conn = self.conn.lock().unwrap();
            let tx = conn.transaction()?;

            let previous: Option<i64> = tx
                .query_row(
                    "SELECT vec_rowid FROM vec_node_map WHERE node_id = ?1",
                    params![id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(rowid) = previous {
                tx.execute("DELETE FROM vec_nodes WHERE rowid = ?1", params![rowid])?;
            }

            tx.execute(
                "INSERT INTO vec_nodes(subtype, embedding) VALUES (?1, ?2)",
                params![metadata.subtype, encode_vector(&normalized)],
            )?;
            let rowid = tx.last_insert_rowid();
            tx.execute(
                "INSERT OR REPLACE INTO vec_node_map (node_id, vec_rowid, metadata_json)
                 VALUES (?1, ?2, ?3)",
                params![id.to_string(), rowid, serde_json::to_string(&metadata)?],
            )?;
            tx.commit()?;
            Ok(())
        }

        async fn query(
            &self,
            vector: &[f32],
            top_k: usize,
            filter: Option<&VectorFilter>,
        ) -> StorageResult<Vec<VectorMatch>> {
            self.check(vector)?;
            let normalized = l2_normalize(vector);
            let bytes = encode_vector(&normalized);
            let conn = self.conn.lock().unwrap();

            // For unit vectors: L2_dist² = 2(1 - cos_sim), so cos_sim = 1 - dist²/2.
            let knn: Vec<(i64, f32)> = match filter.and_then(|f| f.subtype.as_deref()) {
                Some(subtype) => {
                    let mut stmt = conn.prepare(
                        "SELECT rowid, distance FROM vec_nodes
                         WHERE embedding MATCH ?1 AND k = ?2 AND subtype = ?3
                         ORDER BY distance",
                    )?;
                    let rows = stmt.query_map(params![bytes, top_k as i64, subtype], |row| {
                        Ok((row.get(0)?, row.get(1)?))
                    })?;
                    rows.collect::<Result<_, _>>()?
                }
                None => {
                    let mut stmt = conn.prepare(
                        "SELECT rowid, distance FROM vec_nodes
                         WHERE embedding MATCH ?1 AND k = ?2
                         ORDER BY distance",
                    )?;
                    let rows = stmt.query_map(params![bytes, top_k as i64], |row| {
                        Ok((row.get(0)?, row.get(1)?))
                    })?;
                    rows.collect::<Result<_, _>>()?
                }
            };

            let mut matches = Vec::with_capacity(knn.len());
            for (rowid, distance) in knn {
                let mapped: Option<(String, String)> = conn
                    .query_row(
                        "SELECT node_id, metadata_json FROM vec_node_map WHERE vec_rowid = ?1",
                        params![rowid],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;
                if let Some((node_id, metadata_json)) = mapped {
                    matches.push(VectorMatch {
                        id: NodeId::parse(&node_id)
                            .map_err(|e| StorageError::Backend(e.to_string()))?,
                        score: 1.0 - (distance * distance) / 2.0,
                        metadata: serde_json::from_str(&metadata_json)?,
                    });
                }
            }
            Ok(matches)
        }

        async fn contains(&self, id: &NodeId) -> StorageResult<bool> {
            let conn = self.conn.lock().unwrap();
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM vec_node_map WHERE node_id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        }

        async fn len(&self) -> StorageResult<usize> {
            let conn = self.conn.lock().unwrap();
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM vec_node_map", [], |row| row.get(0))?;
            Ok(count as usize)
        }
    }

}

#[cfg(feature = "embeddings")]
pub use inner::SqliteVecIndex;
