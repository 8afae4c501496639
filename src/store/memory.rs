//! In-memory document store

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tracing::debug;

use super::{check_size, DocumentStore, OriginalDocument};
use crate::types::Result;

#[derive(Debug, Default, Clone)]
struct Entry {
    original: Option<OriginalDocument>,
    signed: Option<Bytes>,
}

/// Document store backed by a concurrent map
pub struct MemoryDocumentStore {
    entries: DashMap<String, Entry>,
    max_bytes: usize,
}

impl MemoryDocumentStore {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_bytes,
        }
    }

    /// Number of ids with any stored bytes
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn put(&self, id: &str, bytes: Bytes, file_name: &str) -> Result<()> {
        check_size(bytes.len(), self.max_bytes)?;
        debug!(session_id = %id, size = bytes.len(), "Stored original in memory");
        self.entries.entry(id.to_string()).or_default().original = Some(OriginalDocument {
            file_name: file_name.to_string(),
            bytes,
        });
        Ok(())
    }

    async fn get_original(&self, id: &str) -> Result<Option<OriginalDocument>> {
        Ok(self.entries.get(id).and_then(|e| e.original.clone()))
    }

    async fn put_signed(&self, id: &str, bytes: Bytes) -> Result<()> {
        check_size(bytes.len(), self.max_bytes)?;
        self.entries.entry(id.to_string()).or_default().signed = Some(bytes);
        Ok(())
    }

    async fn get_signed(&self, id: &str) -> Result<Option<Bytes>> {
        Ok(self.entries.get(id).and_then(|e| e.signed.clone()))
    }

    async fn remove_signed(&self, id: &str) -> Result<()> {
        if let Some(mut entry) = self.entries.get_mut(id) {
            entry.signed = None;
        }
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.entries.remove(id);
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
