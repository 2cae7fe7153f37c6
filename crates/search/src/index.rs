//! Collection-scoped embedding index
//!
//! Each collection's chunks live in memory behind their own `RwLock` and are
//! backed by the `chunks` table. Slices load lazily on first query, so a
//! restart only costs a reload. Writers swap in a new chunk list; queries
//! score against the list they snapshotted and hold no lock while scoring.
//!
//! Vectors are only compared when they come from the same embedding model;
//! a collection embedded with another model must be reindexed first.

use docmind_common::db::models::{ChunkActiveModel, Document, ProcessingStatus};
use docmind_common::embeddings::{cosine_similarity, Embedder};
use docmind_common::errors::{AppError, Result};
use docmind_common::ids;
use docmind_common::Repository;
use docmind_ingestion::chunker::{chunk_text, ChunkingConfig};
use docmind_ingestion::outline::annotation_quads;
use sea_orm::Set;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// A chunk held in memory with its decoded vector
#[derive(Debug, Clone)]
struct IndexedChunk {
    chunk_id: String,
    document_id: String,
    collection_id: String,
    section_id: String,
    section_title: String,
    page_number: i32,
    content: String,
    quad_points: Vec<Vec<f32>>,
    embedding: Vec<f32>,
    embedding_model: String,
}

#[derive(Debug, Default)]
struct CollectionSlice {
    loaded: bool,
    chunks: Arc<Vec<IndexedChunk>>,
}

impl CollectionSlice {
    /// Replace a document's chunks, copying the list if a query still holds it
    fn replace_document(&mut self, document_id: &str, chunks: Vec<IndexedChunk>) {
        let list = Arc::make_mut(&mut self.chunks);
        list.retain(|c| c.document_id != document_id);
        list.extend(chunks);
    }
}

type SliceHandle = Arc<RwLock<CollectionSlice>>;

/// A query hit
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub collection_id: String,
    pub section_id: String,
    pub section_title: String,
    pub page_number: i32,
    pub content: String,
    pub quad_points: Vec<Vec<f32>>,
    /// Cosine similarity to the query
    pub score: f32,
    #[serde(skip)]
    pub embedding: Vec<f32>,
}

/// Per-collection embedding index
pub struct EmbeddingIndex {
    repository: Repository,
    embedder: Arc<dyn Embedder>,
    chunking: ChunkingConfig,
    slices: RwLock<HashMap<String, SliceHandle>>,
}

impl EmbeddingIndex {
    pub fn new(repository: Repository, embedder: Arc<dyn Embedder>, chunking: ChunkingConfig) -> Self {
        Self {
            repository,
            embedder,
            chunking,
            slices: RwLock::new(HashMap::new()),
        }
    }

    /// Model name of the query embedder
    pub fn model_name(&self) -> &str {
        self.embedder.model_name()
    }

    /// Embed arbitrary text with the index's embedder
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embedder.embed(text).await
    }

    async fn slice(&self, collection_id: &str) -> SliceHandle {
        if let Some(slice) = self.slices.read().await.get(collection_id) {
            return slice.clone();
        }
        self.slices
            .write()
            .await
            .entry(collection_id.to_string())
            .or_default()
            .clone()
    }

    async fn load_slice(&self, collection_id: &str, slice: &mut CollectionSlice) -> Result<()> {
        let rows = self.repository.chunks_for_collection(collection_id).await?;
        let chunks: Vec<IndexedChunk> = rows
            .into_iter()
            .map(|row| IndexedChunk {
                embedding: row.vector(),
                quad_points: row.quads(),
                chunk_id: row.id,
                document_id: row.document_id,
                collection_id: row.collection_id,
                section_id: row.section_id,
                section_title: row.section_title,
                page_number: row.page_number,
                content: row.content,
                embedding_model: row.embedding_model,
            })
            .collect();
        slice.chunks = Arc::new(chunks);
        slice.loaded = true;

        debug!(collection_id = %collection_id, chunks = slice.chunks.len(), "Index slice loaded");
        Ok(())
    }

    /// Chunk, embed and store a document, replacing its previous chunks.
    ///
    /// Sets `is_embedding_created` to `success` or `failed`. Returns the
    /// number of chunks written.
    #[instrument(skip(self, document), fields(doc_id = %document.id))]
    pub async fn ingest_document(&self, document: &Document) -> Result<usize> {
        match self.build_and_store(document).await {
            Ok(count) => {
                self.repository
                    .set_embedding_status(&document.id, ProcessingStatus::Success, None)
                    .await?;
                info!(chunks = count, "Document indexed");
                Ok(count)
            }
            Err(e) => {
                warn!(error = %e, "Document indexing failed");
                self.repository
                    .set_embedding_status(&document.id, ProcessingStatus::Failed, Some(e.to_string()))
                    .await?;
                Err(e)
            }
        }
    }

    async fn build_and_store(&self, document: &Document) -> Result<usize> {
        let outline = self.repository.outline_items(&document.id).await?;

        let mut pending = Vec::new();
        for item in &outline {
            let pieces = chunk_text(&item.section_text, &self.chunking)?;
            let quads = annotation_quads(item.annotation.as_ref());
            for piece in pieces {
                pending.push(IndexedChunk {
                    chunk_id: ids::new_id(ids::CHUNK),
                    document_id: document.id.clone(),
                    collection_id: document.collection_id.clone(),
                    section_id: item.section_id.clone(),
                    section_title: item.text.clone(),
                    page_number: item.page,
                    content: piece.content,
                    quad_points: quads.clone(),
                    embedding: Vec::new(),
                    embedding_model: self.embedder.model_name().to_string(),
                });
            }
        }

        if !pending.is_empty() {
            let texts: Vec<String> = pending.iter().map(|c| c.content.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts).await?;
            if vectors.len() != pending.len() {
                return Err(AppError::EmbeddingError {
                    message: format!("expected {} embeddings, got {}", pending.len(), vectors.len()),
                });
            }
            for (chunk, vector) in pending.iter_mut().zip(vectors) {
                chunk.embedding = vector;
            }
        }

        let now = chrono::Utc::now();
        let rows: Vec<ChunkActiveModel> = pending
            .iter()
            .enumerate()
            .map(|(index, c)| ChunkActiveModel {
                id: Set(c.chunk_id.clone()),
                document_id: Set(c.document_id.clone()),
                collection_id: Set(c.collection_id.clone()),
                section_id: Set(c.section_id.clone()),
                section_title: Set(c.section_title.clone()),
                page_number: Set(c.page_number),
                chunk_index: Set(index as i32),
                content: Set(c.content.clone()),
                token_count: Set((c.content.len() / 4).max(1) as i32),
                quad_points: Set(serde_json::json!(c.quad_points)),
                embedding: Set(serde_json::json!(c.embedding)),
                embedding_model: Set(c.embedding_model.clone()),
                created_at: Set(now.into()),
            })
            .collect();

        let count = pending.len();

        // Hold the slice write lock across the table swap so queries never see half a document
        let slice = self.slice(&document.collection_id).await;
        let mut guard = slice.write().await;
        self.repository.replace_chunks(&document.id, rows).await?;
        if guard.loaded {
            guard.replace_document(&document.id, pending);
        }

        Ok(count)
    }

    /// Re-embed every successfully extracted document of a collection.
    ///
    /// Returns `(documents indexed, chunks written)`.
    #[instrument(skip(self))]
    pub async fn ingest_collection(&self, collection_id: &str) -> Result<(usize, usize)> {
        self.repository.get_collection(collection_id).await?;
        let documents = self.repository.list_documents(collection_id).await?;

        let mut indexed = 0;
        let mut chunks = 0;
        for document in documents
            .iter()
            .filter(|d| d.processing_status() == ProcessingStatus::Success)
        {
            chunks += self.ingest_document(document).await?;
            indexed += 1;
        }

        info!(documents = indexed, chunks, model = %self.model_name(), "Collection reindexed");
        Ok((indexed, chunks))
    }

    /// Top `k` chunks across `collection_ids` by cosine similarity to `text`.
    ///
    /// Ties keep union order: collections as requested, then insertion order.
    #[instrument(skip(self, text, collection_ids), fields(collections = collection_ids.len()))]
    pub async fn query(&self, text: &str, collection_ids: &[String], k: usize) -> Result<Vec<ScoredChunk>> {
        if collection_ids.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut seen = HashSet::new();
        let mut snapshots = Vec::new();
        for collection_id in collection_ids {
            if !seen.insert(collection_id.as_str()) {
                continue;
            }
            let chunks = self.snapshot(collection_id).await?;
            if let Some(other) = chunks
                .iter()
                .find(|c| c.embedding_model != self.embedder.model_name())
            {
                return Err(AppError::EmbeddingModelMismatch {
                    collection_id: collection_id.clone(),
                    indexed_model: other.embedding_model.clone(),
                    query_model: self.embedder.model_name().to_string(),
                });
            }
            snapshots.push(chunks);
        }

        if snapshots.iter().all(|chunks| chunks.is_empty()) {
            return Ok(Vec::new());
        }

        let query = self.embedder.embed(text).await?;

        // stable sort, so equal scores stay in union order
        let mut scored: Vec<(f32, &IndexedChunk)> = snapshots
            .iter()
            .flat_map(|chunks| chunks.iter())
            .map(|c| (cosine_similarity(&query, &c.embedding), c))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(score, c)| ScoredChunk {
                chunk_id: c.chunk_id.clone(),
                document_id: c.document_id.clone(),
                collection_id: c.collection_id.clone(),
                section_id: c.section_id.clone(),
                section_title: c.section_title.clone(),
                page_number: c.page_number,
                content: c.content.clone(),
                quad_points: c.quad_points.clone(),
                score,
                embedding: c.embedding.clone(),
            })
            .collect())
    }

    /// Current chunk list of a collection, loading it on first use
    async fn snapshot(&self, collection_id: &str) -> Result<Arc<Vec<IndexedChunk>>> {
        let slice = self.slice(collection_id).await;
        {
            let guard = slice.read().await;
            if guard.loaded {
                return Ok(guard.chunks.clone());
            }
        }
        let mut guard = slice.write().await;
        if !guard.loaded {
            self.load_slice(collection_id, &mut guard).await?;
        }
        Ok(guard.chunks.clone())
    }

    /// Drop a collection's slice
    pub async fn evict(&self, collection_id: &str) {
        self.slices.write().await.remove(collection_id);
    }

    /// Drop a document's chunks from its collection's slice
    pub async fn remove_document(&self, collection_id: &str, document_id: &str) {
        let slice = self.slices.read().await.get(collection_id).cloned();
        if let Some(slice) = slice {
            slice.write().await.replace_document(document_id, Vec::new());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docmind_common::db::{DbPool, NewDocument, NewOutlineItem};
    use docmind_common::embeddings::HashingEmbedder;

    async fn repository() -> Repository {
        Repository::new(DbPool::in_memory().await.unwrap())
    }

    async fn add_document(repository: &Repository, collection_id: &str, name: &str, sections: &[(&str, &str)]) -> Document {
        let id = ids::new_id(ids::DOCUMENT);
        repository
            .create_document(NewDocument {
                id: id.clone(),
                collection_id: collection_id.to_string(),
                doc_name: name.to_string(),
                doc_size_kb: 1,
                doc_type: "application/pdf".to_string(),
                doc_url: format!("http://localhost/storage/uploads/{}", name),
                storage_path: format!("uploads/{}", name),
                content_hash: "00".repeat(32),
            })
            .await
            .unwrap();

        let outline = sections
            .iter()
            .enumerate()
            .map(|(page, (title, text))| NewOutlineItem {
                section_id: ids::new_id(ids::SECTION),
                level: "H1".to_string(),
                text: title.to_string(),
                page: page as i32 + 1,
                section_text: text.to_string(),
                annotation: None,
            })
            .collect();

        repository.save_extraction(&id, Some(name.to_string()), sections.len() as i32, outline).await.unwrap()
    }

    fn index(repository: &Repository, dimension: usize) -> EmbeddingIndex {
        EmbeddingIndex::new(
            repository.clone(),
            Arc::new(HashingEmbedder::new(dimension)),
            ChunkingConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_reingest_is_idempotent() {
        let repository = repository().await;
        let collection = repository.create_collection(Some("c".into()), None, vec![]).await.unwrap();
        let doc = add_document(
            &repository,
            &collection.id,
            "a.pdf",
            &[("Intro", "Revenue growth strategy for the year."), ("Costs", "Cost control in operations.")],
        )
        .await;

        let index = index(&repository, 128);
        assert_eq!(index.ingest_document(&doc).await.unwrap(), 2);
        let hits = index.query("revenue", &[collection.id.clone()], 10).await.unwrap();
        assert_eq!(hits.len(), 2);

        assert_eq!(index.ingest_document(&doc).await.unwrap(), 2);
        assert_eq!(repository.chunks_for_document(&doc.id).await.unwrap().len(), 2);
        let hits = index.query("revenue", &[collection.id.clone()], 10).await.unwrap();
        assert_eq!(hits.len(), 2);

        let stored = repository.get_document(&doc.id).await.unwrap();
        assert_eq!(stored.embedding_status(), ProcessingStatus::Success);
    }

    #[tokio::test]
    async fn test_query_ranks_and_is_deterministic() {
        let repository = repository().await;
        let collection = repository.create_collection(None, None, vec![]).await.unwrap();
        let a = add_document(&repository, &collection.id, "A.pdf", &[("Plan", "revenue growth strategy")]).await;
        let b = add_document(&repository, &collection.id, "B.pdf", &[("Other", "unrelated topic about gardening")]).await;

        let index = index(&repository, 256);
        index.ingest_document(&a).await.unwrap();
        index.ingest_document(&b).await.unwrap();

        let ids = vec![collection.id.clone()];
        let first = index.query("revenue growth", &ids, 5).await.unwrap();
        assert_eq!(first[0].document_id, a.id);
        assert!(first[0].score > first[1].score);

        let second = index.query("revenue growth", &ids, 5).await.unwrap();
        let order = |hits: &[ScoredChunk]| hits.iter().map(|h| h.chunk_id.clone()).collect::<Vec<_>>();
        assert_eq!(order(&first), order(&second));
    }

    #[tokio::test]
    async fn test_empty_inputs() {
        let repository = repository().await;
        let index = index(&repository, 64);
        assert!(index.query("anything", &[], 5).await.unwrap().is_empty());
        assert!(index
            .query("anything", &["collection_unknown".to_string()], 5)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_model_mismatch_is_rejected() {
        let repository = repository().await;
        let collection = repository.create_collection(None, None, vec![]).await.unwrap();
        let doc = add_document(&repository, &collection.id, "a.pdf", &[("Intro", "some indexed text")]).await;

        index(&repository, 128).ingest_document(&doc).await.unwrap();

        let other = index(&repository, 64);
        let err = other.query("text", &[collection.id.clone()], 3).await.unwrap_err();
        assert!(matches!(err, AppError::EmbeddingModelMismatch { .. }));

        // Reindexing with the new model resolves it
        other.ingest_collection(&collection.id).await.unwrap();
        assert_eq!(other.query("text", &[collection.id.clone()], 3).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_and_evict() {
        let repository = repository().await;
        let collection = repository.create_collection(None, None, vec![]).await.unwrap();
        let doc = add_document(&repository, &collection.id, "a.pdf", &[("Intro", "quarterly numbers")]).await;

        let index = index(&repository, 64);
        index.ingest_document(&doc).await.unwrap();
        let ids = vec![collection.id.clone()];
        assert_eq!(index.query("numbers", &ids, 3).await.unwrap().len(), 1);

        index.remove_document(&collection.id, &doc.id).await;
        assert!(index.query("numbers", &ids, 3).await.unwrap().is_empty());

        // Evicted slices reload from the table
        index.evict(&collection.id).await;
        assert_eq!(index.query("numbers", &ids, 3).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_equal_scores_keep_insertion_order() {
        let repository = repository().await;
        let collection = repository.create_collection(None, None, vec![]).await.unwrap();
        let text = "identical section about quarterly revenue";
        let first = add_document(&repository, &collection.id, "first.pdf", &[("Summary", text)]).await;
        let second = add_document(&repository, &collection.id, "second.pdf", &[("Summary", text)]).await;

        let index = index(&repository, 128);
        let ids = vec![collection.id.clone()];
        index.query("warm", &ids, 1).await.unwrap();
        index.ingest_document(&first).await.unwrap();
        index.ingest_document(&second).await.unwrap();

        let hits = index.query("quarterly revenue", &ids, 2).await.unwrap();
        assert_eq!(hits[0].score, hits[1].score);
        assert_eq!(hits[0].document_id, first.id);
        assert_eq!(hits[1].document_id, second.id);

        // Reloading from the table gives the same order
        index.evict(&collection.id).await;
        let hits = index.query("quarterly revenue", &ids, 2).await.unwrap();
        assert_eq!(hits[0].document_id, first.id);
        assert_eq!(hits[1].document_id, second.id);
    }

    #[tokio::test]
    async fn test_snapshot_is_unaffected_by_later_writes() {
        let repository = repository().await;
        let collection = repository.create_collection(None, None, vec![]).await.unwrap();
        let a = add_document(&repository, &collection.id, "a.pdf", &[("Intro", "first text")]).await;
        let b = add_document(&repository, &collection.id, "b.pdf", &[("Intro", "second text")]).await;

        let index = index(&repository, 64);
        index.ingest_document(&a).await.unwrap();

        let before = index.snapshot(&collection.id).await.unwrap();
        assert_eq!(before.len(), 1);

        index.ingest_document(&b).await.unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(index.snapshot(&collection.id).await.unwrap().len(), 2);
    }
}
