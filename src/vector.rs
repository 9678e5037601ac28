//! Vector Index (§4.5): a durable, fixed-dimension embedding store with
//! brute-force cosine-distance search. At the MVP scale (≤10^5 vectors of
//! ~384 dimensions) a sophisticated ANN index isn't warranted (§4.5).

use std::{cmp::Ordering, collections::BinaryHeap, str::FromStr};

use parking_lot::Mutex;
use sqlx::{
    migrate::MigrateDatabase,
    sqlite::{Sqlite, SqliteConnectOptions},
    ConnectOptions, Pool, Row,
};

use crate::error::RouxError;

const SCHEMA: &str = "\
    CREATE TABLE IF NOT EXISTS vectors ( \
        id TEXT PRIMARY KEY, \
        model TEXT NOT NULL, \
        vector BLOB NOT NULL \
    );";

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for component in vector {
        bytes.extend_from_slice(&component.to_le_bytes());
    }
    bytes
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a: f64 = a.iter().map(|x| *x as f64 * *x as f64).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| *x as f64 * *x as f64).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

fn validate_vector(vector: &[f32]) -> Result<(), RouxError> {
    if vector.is_empty() {
        return Err(RouxError::InvalidParams("vector must be non-empty".into()));
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(RouxError::InvalidParams("vector contains non-finite components".into()));
    }
    Ok(())
}

struct HeapEntry {
    distance: f64,
    id: String,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.distance == other.distance && self.id == other.id
    }
}
impl Eq for HeapEntry {}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .partial_cmp(&other.distance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.id.cmp(&self.id))
    }
}

pub struct VectorIndex {
    pool: Pool<Sqlite>,
    warned_multi_model: Mutex<bool>,
}

impl VectorIndex {
    pub async fn open(db_path: &std::path::Path) -> Result<VectorIndex, RouxError> {
        let fqdb = format!("sqlite:{}", db_path.to_str().unwrap());
        if !Sqlite::database_exists(&fqdb).await.unwrap_or(false) {
            Sqlite::create_database(&fqdb).await?;
        }
        let options = SqliteConnectOptions::from_str(&fqdb)?
            .read_only(false)
            .disable_statement_logging()
            .create_if_missing(true);
        let pool = sqlx::sqlite::SqlitePoolOptions::new().connect_with(options).await?;
        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(VectorIndex { pool, warned_multi_model: Mutex::new(false) })
    }

    async fn first_dimension(&self) -> Result<Option<usize>, RouxError> {
        let row = sqlx::query("SELECT vector FROM vectors LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| {
            let bytes: Vec<u8> = r.get("vector");
            bytes.len() / 4
        }))
    }

    async fn check_multi_model(&self, model: &str) -> Result<(), RouxError> {
        if *self.warned_multi_model.lock() {
            return Ok(());
        }
        let row = sqlx::query("SELECT COUNT(*) as n FROM vectors WHERE model <> ?")
            .bind(model)
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.get("n");
        if count > 0 {
            tracing::warn!("vector index holds embeddings from more than one model; search remains operational");
            *self.warned_multi_model.lock() = true;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, vector))]
    pub async fn store(&self, id: &str, vector: &[f32], model: &str) -> Result<(), RouxError> {
        validate_vector(vector)?;
        if let Some(existing_dim) = self.first_dimension().await? {
            if existing_dim != vector.len() {
                return Err(RouxError::InvalidParams(format!(
                    "vector dimension {} does not match index dimension {existing_dim}",
                    vector.len()
                )));
            }
        }
        self.check_multi_model(model).await?;
        sqlx::query(
            "INSERT INTO vectors (id, model, vector) VALUES (?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET model=excluded.model, vector=excluded.vector",
        )
        .bind(id)
        .bind(model)
        .bind(encode_vector(vector))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Top-k by ascending cosine distance, bounded with a k-sized max-heap.
    pub async fn search(&self, query: &[f32], limit: usize) -> Result<Vec<(String, f64)>, RouxError> {
        validate_vector(query)?;
        if limit == 0 {
            return Err(RouxError::InvalidParams("limit must be positive".into()));
        }
        let rows = sqlx::query("SELECT id, vector FROM vectors").fetch_all(&self.pool).await?;
        let mut heap: BinaryHeap<HeapEntry> = BinaryHeap::new();
        for row in rows {
            let id: String = row.get("id");
            let bytes: Vec<u8> = row.get("vector");
            let candidate = decode_vector(&bytes);
            let distance = cosine_distance(query, &candidate);
            if heap.len() < limit {
                heap.push(HeapEntry { distance, id });
            } else if let Some(worst) = heap.peek() {
                if distance < worst.distance {
                    heap.pop();
                    heap.push(HeapEntry { distance, id });
                }
            }
        }
        let mut out: Vec<(String, f64)> = heap.into_iter().map(|e| (e.id, e.distance)).collect();
        out.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal).then_with(|| a.0.cmp(&b.0)));
        Ok(out)
    }

    pub async fn delete(&self, id: &str) -> Result<(), RouxError> {
        sqlx::query("DELETE FROM vectors WHERE id = ?").bind(id).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn get_model(&self, id: &str) -> Result<Option<String>, RouxError> {
        let row = sqlx::query("SELECT model FROM vectors WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("model")))
    }

    pub async fn has_embedding(&self, id: &str) -> Result<bool, RouxError> {
        Ok(self.get_model(id).await?.is_some())
    }

    pub async fn count(&self) -> Result<usize, RouxError> {
        let row = sqlx::query("SELECT COUNT(*) as n FROM vectors").fetch_one(&self.pool).await?;
        let n: i64 = row.get("n");
        Ok(n as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn open_test_index() -> (VectorIndex, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let index = VectorIndex::open(&dir.path().join("vectors.db")).await.unwrap();
        (index, dir)
    }

    #[tokio::test]
    async fn store_then_search_finds_identical_vector_first() {
        let (index, _dir) = open_test_index().await;
        index.store("a", &[1.0, 0.0, 0.0], "model-x").await.unwrap();
        index.store("b", &[0.0, 1.0, 0.0], "model-x").await.unwrap();
        let results = index.search(&[1.0, 0.0, 0.0], 2).await.unwrap();
        assert_eq!(results[0].0, "a");
        assert!(results[0].1 < 1e-9);
    }

    #[tokio::test]
    async fn store_rejects_empty_and_nonfinite_vectors() {
        let (index, _dir) = open_test_index().await;
        assert!(index.store("a", &[], "model-x").await.is_err());
        assert!(index.store("a", &[f32::NAN], "model-x").await.is_err());
    }

    #[tokio::test]
    async fn store_rejects_dimension_mismatch() {
        let (index, _dir) = open_test_index().await;
        index.store("a", &[1.0, 0.0], "model-x").await.unwrap();
        assert!(index.store("b", &[1.0, 0.0, 0.0], "model-x").await.is_err());
    }

    #[tokio::test]
    async fn search_rejects_nonpositive_limit() {
        let (index, _dir) = open_test_index().await;
        index.store("a", &[1.0, 0.0], "model-x").await.unwrap();
        assert!(index.search(&[1.0, 0.0], 0).await.is_err());
    }

    #[tokio::test]
    async fn zero_vector_has_max_distance() {
        let (index, _dir) = open_test_index().await;
        index.store("a", &[0.0, 0.0], "model-x").await.unwrap();
        let results = index.search(&[1.0, 0.0], 1).await.unwrap();
        assert_eq!(results[0].1, 1.0);
    }

    #[tokio::test]
    async fn delete_and_has_embedding_reflect_state() {
        let (index, _dir) = open_test_index().await;
        index.store("a", &[1.0, 0.0], "model-x").await.unwrap();
        assert!(index.has_embedding("a").await.unwrap());
        index.delete("a").await.unwrap();
        assert!(!index.has_embedding("a").await.unwrap());
    }

    #[tokio::test]
    async fn count_reflects_stored_vectors() {
        let (index, _dir) = open_test_index().await;
        index.store("a", &[1.0, 0.0], "model-x").await.unwrap();
        index.store("b", &[0.0, 1.0], "model-x").await.unwrap();
        assert_eq!(index.count().await.unwrap(), 2);
    }
}
