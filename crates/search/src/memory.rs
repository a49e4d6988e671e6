//! In-process search index.
//!
//! Keeps documents in a map and logs every write it accepts, which makes
//! it the backend of choice for tests. Failures can be injected per
//! document or for the whole index.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::index::{IndexDocument, IndexError, SearchIndex};

/// One accepted write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexWrite {
    Upsert(String),
    Delete(String),
}

#[derive(Default)]
struct MemoryState {
    documents: BTreeMap<String, IndexDocument>,
    writes: Vec<IndexWrite>,
    failing: HashSet<String>,
    unavailable: bool,
}

impl MemoryState {
    fn check(&self, doc_id: &str) -> Result<(), IndexError> {
        if self.unavailable {
            return Err(IndexError::Unavailable("memory index switched off".to_string()));
        }
        if self.failing.contains(doc_id) {
            return Err(IndexError::Rejected {
                doc_id: doc_id.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

/// Map-backed [`SearchIndex`]. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryIndex {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every write to `doc_id` until [`heal`](Self::heal).
    pub async fn fail_document(&self, doc_id: impl Into<String>) {
        self.state.lock().await.failing.insert(doc_id.into());
    }

    /// Reject every write until [`heal`](Self::heal).
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().await.unavailable = unavailable;
    }

    /// Clear all injected failures.
    pub async fn heal(&self) {
        let mut state = self.state.lock().await;
        state.failing.clear();
        state.unavailable = false;
    }

    /// Accepted writes, oldest first.
    pub async fn writes(&self) -> Vec<IndexWrite> {
        self.state.lock().await.writes.clone()
    }

    pub async fn clear_writes(&self) {
        self.state.lock().await.writes.clear();
    }

    pub async fn document(&self, doc_id: &str) -> Option<IndexDocument> {
        self.state.lock().await.documents.get(doc_id).cloned()
    }

    /// Ids of every stored document, sorted.
    pub async fn document_ids(&self) -> Vec<String> {
        self.state.lock().await.documents.keys().cloned().collect()
    }
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    fn name(&self) -> &str {
        "memory"
    }

    async fn upsert(&self, document: IndexDocument) -> Result<(), IndexError> {
        let mut state = self.state.lock().await;
        state.check(&document.id)?;
        state.writes.push(IndexWrite::Upsert(document.id.clone()));
        state.documents.insert(document.id.clone(), document);
        Ok(())
    }

    async fn delete(&self, doc_id: &str) -> Result<(), IndexError> {
        let mut state = self.state.lock().await;
        state.check(doc_id)?;
        state.writes.push(IndexWrite::Delete(doc_id.to_string()));
        state.documents.remove(doc_id);
        Ok(())
    }
}

impl std::fmt::Debug for MemoryIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryIndex").finish_non_exhaustive()
    }
}
