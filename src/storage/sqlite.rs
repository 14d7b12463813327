//! SQLite graph store
//!
//! Nodes are keyed by id (derived from provenance) with a UNIQUE provenance
//! column, labels are kept in order in a side table for label filtering, and
//! relationships use `(source_id, rel_type, target_id)` as primary key.
//! Thread-safe via internal mutex on the connection.

use super::traits::{GraphStore, OpenStore, StorageError, StorageResult};
use crate::graph::{property, string_property, GraphNode, NodeId, Properties, Relationship};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

pub struct SqliteGraphStore {
    conn: Mutex<Connection>,
}

type NodeRow = (String, String, String);

impl SqliteGraphStore {
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS nodes (
                id TEXT PRIMARY KEY,
                provenance TEXT NOT NULL UNIQUE,
                name_lower TEXT,
                labels_json TEXT NOT NULL,
                properties_json TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_nodes_name_lower ON nodes(name_lower);

            CREATE TABLE IF NOT EXISTS node_labels (
                node_id TEXT NOT NULL,
                label TEXT NOT NULL,
                position INTEGER NOT NULL,
                PRIMARY KEY (node_id, label),
                FOREIGN KEY (node_id) REFERENCES nodes(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_node_labels_label ON node_labels(label);

            CREATE TABLE IF NOT EXISTS relationships (
                source_id TEXT NOT NULL,
                rel_type TEXT NOT NULL,
                target_id TEXT NOT NULL,
                properties_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (source_id, rel_type, target_id),
                FOREIGN KEY (source_id) REFERENCES nodes(id) ON DELETE CASCADE,
                FOREIGN KEY (target_id) REFERENCES nodes(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_relationships_target ON relationships(target_id);

            PRAGMA foreign_keys = ON;

            -- WAL mode for concurrent reads during writes
            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    fn row_to_node(row: NodeRow) -> StorageResult<GraphNode> {
        let (id, labels_json, properties_json) = row;
        let id = NodeId::parse(&id).map_err(|e| StorageError::NodeNotFound(e.to_string()))?;
        Ok(GraphNode::new(
            id,
            serde_json::from_str(&labels_json)?,
            serde_json::from_str(&properties_json)?,
        ))
    }

    fn parse_timestamp(raw: &str) -> StorageResult<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(raw)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| StorageError::DateParse(e.to_string()))
    }

    fn load_node(conn: &Connection, id: &NodeId) -> StorageResult<Option<GraphNode>> {
        let row: Option<NodeRow> = conn
            .query_row(
                "SELECT id, labels_json, properties_json FROM nodes WHERE id = ?1",
                params![id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        row.map(Self::row_to_node).transpose()
    }

    fn node_exists(conn: &Connection, id: &NodeId) -> StorageResult<bool> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM nodes WHERE id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

impl OpenStore for SqliteGraphStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    async fn merge_node(
        &self,
        labels: &[String],
        properties: &Properties,
        provenance: &str,
    ) -> StorageResult<(GraphNode, bool)> {
        let id = NodeId::for_provenance(provenance);
        let name_lower = string_property(properties, property::NAME).map(str::to_lowercase);
        let created_at = string_property(properties, property::CREATED_AT)
            .map(str::to_string)
            .unwrap_or_else(|| Utc::now().to_rfc3339());

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let inserted = tx.execute(
            "INSERT INTO nodes (id, provenance, name_lower, labels_json, properties_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(provenance) DO NOTHING",
            params![
                id.to_string(),
                provenance,
                name_lower,
                serde_json::to_string(labels)?,
                serde_json::to_string(properties)?,
                created_at,
            ],
        )?;
        if inserted == 1 {
            for (position, label) in labels.iter().enumerate() {
                tx.execute(
                    "INSERT OR IGNORE INTO node_labels (node_id, label, position) VALUES (?1, ?2, ?3)",
                    params![id.to_string(), label, position as i64],
                )?;
            }
        }

        let row: NodeRow = tx.query_row(
            "SELECT id, labels_json, properties_json FROM nodes WHERE provenance = ?1",
            params![provenance],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        tx.commit()?;
        Ok((Self::row_to_node(row)?, inserted == 1))
    }

    async fn get_node(&self, id: &NodeId) -> StorageResult<Option<GraphNode>> {
        let conn = self.conn.lock().unwrap();
        Self::load_node(&conn, id)
    }

    async fn find_by_exact_name(&self, name: &str) -> StorageResult<Option<GraphNode>> {
        let conn = self.conn.lock().unwrap();
        let row: Option<NodeRow> = conn
            .query_row(
                "SELECT id, labels_json, properties_json FROM nodes
                 WHERE name_lower = ?1 ORDER BY created_at LIMIT 1",
                params![name.trim().to_lowercase()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        row.map(Self::row_to_node).transpose()
    }

    async fn search_by_name(
        &self,
        fragment: &str,
        label: Option<&str>,
        limit: usize,
    ) -> StorageResult<Vec<GraphNode>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, labels_json, properties_json FROM nodes n
             WHERE instr(n.name_lower, ?1) > 0
               AND (?2 IS NULL OR EXISTS (
                   SELECT 1 FROM node_labels l WHERE l.node_id = n.id AND l.label = ?2))
             ORDER BY length(n.name_lower), n.name_lower
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(
            params![fragment.trim().to_lowercase(), label, limit as i64],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        let mut nodes = Vec::new();
        for row in rows {
            nodes.push(Self::row_to_node(row?)?);
        }
        Ok(nodes)
    }

    async fn merge_relationship(&self, relationship: &Relationship) -> StorageResult<bool> {
        let conn = self.conn.lock().unwrap();
        for endpoint in [&relationship.source, &relationship.target] {
            if !Self::node_exists(&conn, endpoint)? {
                return Err(StorageError::NodeNotFound(endpoint.to_string()));
            }
        }
        let inserted = conn.execute(
            "INSERT INTO relationships (source_id, rel_type, target_id, properties_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(source_id, rel_type, target_id) DO NOTHING",
            params![
                relationship.source.to_string(),
                relationship.rel_type,
                relationship.target.to_string(),
                serde_json::to_string(&relationship.properties)?,
                relationship.created_at.to_rfc3339(),
            ],
        )?;
        Ok(inserted == 1)
    }

    async fn relationships_from(&self, source: &NodeId) -> StorageResult<Vec<Relationship>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT target_id, rel_type, properties_json, created_at
             FROM relationships WHERE source_id = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map(params![source.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut relationships = Vec::new();
        for row in rows {
            let (target, rel_type, properties_json, created_at) = row?;
            let target =
                NodeId::parse(&target).map_err(|e| StorageError::NodeNotFound(e.to_string()))?;
            relationships.push(Relationship {
                source: *source,
                target,
                rel_type,
                properties: serde_json::from_str(&properties_json)?,
                created_at: Self::parse_timestamp(&created_at)?,
            });
        }
        Ok(relationships)
    }

    async fn node_count(&self) -> StorageResult<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create_test_store() -> SqliteGraphStore {
        SqliteGraphStore::open_in_memory().unwrap()
    }

    fn props(name: &str) -> Properties {
        let mut p = Properties::new();
        p.insert(property::NAME.into(), json!(name));
        p.insert(property::AI_GENERATED.into(), json!(true));
        p.insert(property::EMBEDDING.into(), json!([0.1, 0.2, 0.3]));
        p
    }

    fn labels(l: &[&str]) -> Vec<String> {
        l.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_merge_node_round_trip() {
        let store = create_test_store();
        let (node, created) = store
            .merge_node(&labels(&["L1", "Knowledge", "History"]), &props("Transistor"), "wiki/t.json")
            .await
            .unwrap();
        assert!(created);
        assert_eq!(node.id, NodeId::for_provenance("wiki/t.json"));

        let loaded = store.get_node(&node.id).await.unwrap().unwrap();
        assert_eq!(loaded.labels, vec!["L1", "Knowledge", "History"]);
        assert_eq!(loaded.embedding(), Some(vec![0.1, 0.2, 0.3]));
        assert!(loaded.is_ai_generated());
    }

    #[tokio::test]
    async fn test_merge_node_keeps_first_write() {
        let store = create_test_store();
        store
            .merge_node(&labels(&["L1", "Knowledge"]), &props("Transistor"), "t.json")
            .await
            .unwrap();
        let (again, created) = store
            .merge_node(&labels(&["L2", "Skill"]), &props("Renamed"), "t.json")
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(again.name(), Some("Transistor"));
        assert_eq!(store.node_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_search_by_name_with_label() {
        let store = create_test_store();
        store
            .merge_node(&labels(&["L1", "Knowledge"]), &props("Electronics"), "a")
            .await
            .unwrap();
        store
            .merge_node(&labels(&["L1", "Knowledge"]), &props("Power Electronics"), "b")
            .await
            .unwrap();
        store
            .merge_node(&labels(&["L1", "Skill"]), &props("Electronics repair"), "c")
            .await
            .unwrap();

        let hits = store.search_by_name("electronics", Some("Knowledge"), 5).await.unwrap();
        let names: Vec<_> = hits.iter().filter_map(|n| n.name()).collect();
        assert_eq!(names, vec!["Electronics", "Power Electronics"]);

        let all = store.search_by_name("ELECTRONICS", None, 10).await.unwrap();
        assert_eq!(all.len(), 3);

        let exact = store.find_by_exact_name("power electronics").await.unwrap();
        assert_eq!(exact.unwrap().name(), Some("Power Electronics"));
        assert!(store.find_by_exact_name("electron").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_relationship_merge() {
        let store = create_test_store();
        let (a, _) = store.merge_node(&labels(&["L1"]), &props("A"), "a").await.unwrap();
        let (b, _) = store.merge_node(&labels(&["L1"]), &props("B"), "b").await.unwrap();

        let mut rel_props = Properties::new();
        rel_props.insert("weight".into(), json!(0.5));
        let rel = Relationship::new(a.id, "PART_OF", b.id).with_properties(rel_props);
        assert!(store.merge_relationship(&rel).await.unwrap());
        assert!(!store.merge_relationship(&rel).await.unwrap());

        let out = store.relationships_from(&a.id).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].target, b.id);
        assert_eq!(out[0].properties["weight"], json!(0.5));

        let dangling = Relationship::new(a.id, "PART_OF", NodeId::new());
        assert!(matches!(
            store.merge_relationship(&dangling).await,
            Err(StorageError::NodeNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_persistence_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/graph.db");
        {
            let store = SqliteGraphStore::open(&path).unwrap();
            store.merge_node(&labels(&["L1"]), &props("A"), "a").await.unwrap();
        }
        let store = SqliteGraphStore::open(&path).unwrap();
        assert_eq!(store.node_count().await.unwrap(), 1);
    }
}
