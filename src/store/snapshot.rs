//! In-memory vector store mirrored to a single JSON snapshot file
//!
//! Every mutation rewrites the whole snapshot before returning. This trades
//! write throughput for simplicity: a crash can never leave a half-applied
//! append on disk because the file is replaced atomically via rename.

use super::{
    Collection, CollectionInfo, CollectionStats, NewDocuments, QueryResult, StoreError,
    VectorStore,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

const SNAPSHOT_VERSION: u32 = 1;

/// On-disk representation of the whole store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreSnapshot {
    pub version: u32,
    pub collections: BTreeMap<String, Collection>,
}

/// Vector store kept in process memory with write-through persistence
pub struct SnapshotVectorStore {
    path: PathBuf,
    /// `None` until `initialize` has run
    collections: RwLock<Option<HashMap<String, Collection>>>,
    /// Serializes read-modify-write-persist cycles per collection
    write_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    /// Keeps snapshot files from being written out of order
    persist_lock: Mutex<()>,
}

impl SnapshotVectorStore {
    /// Create an uninitialized store backed by `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            collections: RwLock::new(None),
            write_locks: Mutex::new(HashMap::new()),
            persist_lock: Mutex::new(()),
        }
    }

    /// Create and initialize in one step
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self::new(path);
        store.initialize().await?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn is_initialized(&self) -> bool {
        self.collections.read().await.is_some()
    }

    /// Load the snapshot if present. A missing file starts an empty store; an
    /// unreadable or malformed one is logged and also starts empty.
    pub async fn initialize(&self) -> Result<(), StoreError> {
        let loaded = Self::load_snapshot(&self.path).await;
        let count = loaded.len();

        let mut guard = self.collections.write().await;
        *guard = Some(loaded);

        info!(
            "Vector store initialized from {} ({} collections)",
            self.path.display(),
            count
        );
        Ok(())
    }

    async fn load_snapshot(path: &Path) -> HashMap<String, Collection> {
        let content = match tokio::fs::read(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No snapshot at {}, starting empty", path.display());
                return HashMap::new();
            }
            Err(e) => {
                warn!(
                    "Failed to read vector store snapshot {}: {}; starting empty",
                    path.display(),
                    e
                );
                return HashMap::new();
            }
        };

        match serde_json::from_slice::<StoreSnapshot>(&content) {
            Ok(snapshot) => snapshot.collections.into_iter().collect(),
            Err(e) => {
                warn!(
                    "Malformed vector store snapshot {}: {}; starting empty",
                    path.display(),
                    e
                );
                HashMap::new()
            }
        }
    }

    async fn collection_lock(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.write_locks.lock().await;
        locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Write the current in-memory state to disk
    async fn persist(&self) -> Result<(), StoreError> {
        let _persist = self.persist_lock.lock().await;

        let content = {
            let guard = self.collections.read().await;
            let collections = guard.as_ref().ok_or(StoreError::NotInitialized)?;
            let snapshot = StoreSnapshot {
                version: SNAPSHOT_VERSION,
                collections: collections
                    .iter()
                    .map(|(name, c)| (name.clone(), c.clone()))
                    .collect(),
            };
            serde_json::to_vec(&snapshot).map_err(|e| StoreError::Serialization(e.to_string()))?
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StoreError::Io {
                        source: e,
                        context: format!("Failed to create snapshot directory: {}", parent.display()),
                    })?;
            }
        }

        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &content)
            .await
            .map_err(|e| StoreError::Io {
                source: e,
                context: format!("Failed to write snapshot: {}", tmp_path.display()),
            })?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| StoreError::Io {
                source: e,
                context: format!("Failed to replace snapshot: {}", self.path.display()),
            })?;

        debug!("Persisted snapshot ({} bytes)", content.len());
        Ok(())
    }
}

#[async_trait]
impl VectorStore for SnapshotVectorStore {
    async fn get_or_create_collection(&self, name: &str) -> Result<CollectionInfo, StoreError> {
        let mut guard = self.collections.write().await;
        let collections = guard.as_mut().ok_or(StoreError::NotInitialized)?;
        let collection = collections
            .entry(name.to_string())
            .or_insert_with(|| Collection::new(name));
        Ok(collection.info())
    }

    async fn add_documents(&self, name: &str, batch: NewDocuments) -> Result<(), StoreError> {
        let lock = self.collection_lock(name).await;
        let _write = lock.lock().await;

        let previous_len = {
            let mut guard = self.collections.write().await;
            let collections = guard.as_mut().ok_or(StoreError::NotInitialized)?;
            let collection = collections
                .entry(name.to_string())
                .or_insert_with(|| Collection::new(name));

            let (ids, metadatas) = batch.prepare(collection.dimension(), &collection.ids)?;
            let previous_len = collection.len();

            collection.documents.extend(batch.documents);
            collection.embeddings.extend(batch.embeddings);
            collection.metadatas.extend(metadatas);
            collection.ids.extend(ids);
            previous_len
        };

        if let Err(e) = self.persist().await {
            // Undo the append so memory never runs ahead of disk
            let mut guard = self.collections.write().await;
            if let Some(collection) = guard.as_mut().and_then(|c| c.get_mut(name)) {
                collection.documents.truncate(previous_len);
                collection.embeddings.truncate(previous_len);
                collection.metadatas.truncate(previous_len);
                collection.ids.truncate(previous_len);
            }
            return Err(e);
        }

        Ok(())
    }

    async fn query(
        &self,
        name: &str,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<QueryResult, StoreError> {
        let guard = self.collections.read().await;
        let collections = guard.as_ref().ok_or(StoreError::NotInitialized)?;

        Ok(match collections.get(name) {
            Some(collection) if !collection.is_empty() => collection.query(query_embedding, top_k),
            _ => QueryResult::default(),
        })
    }

    async fn delete_collection(&self, name: &str) -> Result<bool, StoreError> {
        let lock = self.collection_lock(name).await;
        let _write = lock.lock().await;

        let removed = {
            let mut guard = self.collections.write().await;
            let collections = guard.as_mut().ok_or(StoreError::NotInitialized)?;
            collections.remove(name)
        };

        match removed {
            Some(collection) => {
                if let Err(e) = self.persist().await {
                    let mut guard = self.collections.write().await;
                    if let Some(collections) = guard.as_mut() {
                        collections.insert(name.to_string(), collection);
                    }
                    return Err(e);
                }
                info!("Deleted collection {}", name);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_stats(&self, name: &str) -> Result<Option<CollectionStats>, StoreError> {
        let guard = self.collections.read().await;
        let collections = guard.as_ref().ok_or(StoreError::NotInitialized)?;
        Ok(collections.get(name).map(Collection::stats))
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>, StoreError> {
        let guard = self.collections.read().await;
        let collections = guard.as_ref().ok_or(StoreError::NotInitialized)?;
        let mut infos: Vec<CollectionInfo> = collections.values().map(Collection::info).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Metadata;
    use tempfile::TempDir;

    fn unit(dim: usize, hot: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[hot] = 1.0;
        v
    }

    #[tokio::test]
    async fn test_uninitialized_store_is_an_error() {
        let temp = TempDir::new().unwrap();
        let store = SnapshotVectorStore::new(temp.path().join("store.json"));

        let err = store.query("any", &[1.0], 5).await.unwrap_err();
        assert!(matches!(err, StoreError::NotInitialized));
        assert!(!store.is_initialized().await);
    }

    #[tokio::test]
    async fn test_missing_collection_returns_empty() {
        let temp = TempDir::new().unwrap();
        let store = SnapshotVectorStore::open(temp.path().join("store.json"))
            .await
            .unwrap();

        let result = store.query("nope", &[1.0, 0.0], 5).await.unwrap();
        assert!(result.is_empty());
        assert!(result.distances.is_empty());
        assert!(store.get_stats("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_or_create_does_not_touch_disk() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store.json");
        let store = SnapshotVectorStore::open(&path).await.unwrap();

        let info = store.get_or_create_collection("catalog").await.unwrap();
        assert_eq!(info.document_count, 0);
        assert!(!path.exists());

        let again = store.get_or_create_collection("catalog").await.unwrap();
        assert_eq!(again.created_at, info.created_at);
    }

    #[tokio::test]
    async fn test_add_and_query() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store.json");
        let store = SnapshotVectorStore::open(&path).await.unwrap();

        let docs: Vec<String> = (0..4).map(|i| format!("doc {}", i)).collect();
        let embs: Vec<Vec<f32>> = (0..4).map(|i| unit(4, i)).collect();
        store
            .add_documents("c", NewDocuments::new(docs, embs))
            .await
            .unwrap();
        assert!(path.exists());

        let result = store.query("c", &unit(4, 2), 2).await.unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result.documents[0], "doc 2");
        assert!(result.distances[0].abs() < 1e-6);
        assert!(result.distances[0] <= result.distances[1]);
    }

    #[tokio::test]
    async fn test_top_k_larger_than_collection() {
        let temp = TempDir::new().unwrap();
        let store = SnapshotVectorStore::open(temp.path().join("s.json"))
            .await
            .unwrap();
        store
            .add_documents(
                "c",
                NewDocuments::new(vec!["a".into(), "b".into()], vec![unit(2, 0), unit(2, 1)]),
            )
            .await
            .unwrap();

        let result = store.query("c", &unit(2, 0), 10).await.unwrap();
        assert_eq!(result.len(), 2);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected_and_not_applied() {
        let temp = TempDir::new().unwrap();
        let store = SnapshotVectorStore::open(temp.path().join("s.json"))
            .await
            .unwrap();

        let err = store
            .add_documents("c", NewDocuments::new(vec!["a".into()], vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { .. }));

        store
            .add_documents("c", NewDocuments::new(vec!["a".into()], vec![unit(3, 0)]))
            .await
            .unwrap();
        let err = store
            .add_documents("c", NewDocuments::new(vec!["b".into()], vec![unit(2, 0)]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InconsistentDimension { .. }));

        assert_eq!(store.get_stats("c").await.unwrap().unwrap().document_count, 1);
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store.json");

        let mut meta = Metadata::new();
        meta.insert("source".into(), "ideas.pdf".into());
        meta.insert("page".into(), serde_json::json!(3));

        let before = {
            let store = SnapshotVectorStore::open(&path).await.unwrap();
            store
                .add_documents(
                    "c",
                    NewDocuments::new(vec!["alpha".into()], vec![vec![0.125, -3.5, 1e-7]])
                        .with_metadatas(vec![meta.clone()])
                        .with_ids(vec!["id-1".into()]),
                )
                .await
                .unwrap();
            store.get_stats("c").await.unwrap().unwrap()
        };

        let store = SnapshotVectorStore::open(&path).await.unwrap();
        let after = store.get_stats("c").await.unwrap().unwrap();
        assert_eq!(before, after);

        let result = store.query("c", &[0.125, -3.5, 1e-7], 1).await.unwrap();
        assert_eq!(result.ids, vec!["id-1".to_string()]);
        assert_eq!(result.metadatas[0], meta);
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_starts_empty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let store = SnapshotVectorStore::open(&path).await.unwrap();
        assert!(store.list_collections().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_collection() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store.json");
        let store = SnapshotVectorStore::open(&path).await.unwrap();

        store
            .add_documents("c", NewDocuments::new(vec!["a".into()], vec![unit(2, 0)]))
            .await
            .unwrap();

        assert!(store.delete_collection("c").await.unwrap());
        assert!(!store.delete_collection("c").await.unwrap());

        let reopened = SnapshotVectorStore::open(&path).await.unwrap();
        assert!(reopened.get_stats("c").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_not_lost() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store.json");
        let store = Arc::new(SnapshotVectorStore::open(&path).await.unwrap());

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .add_documents(
                        "shared",
                        NewDocuments::new(vec![format!("doc {}", i)], vec![unit(8, i)]),
                    )
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let reopened = SnapshotVectorStore::open(&path).await.unwrap();
        let stats = reopened.get_stats("shared").await.unwrap().unwrap();
        assert_eq!(stats.document_count, 8);
    }
}
