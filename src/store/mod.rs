//! Document Store
//!
//! Holds the unsigned document and, once delivered, the signed result for each
//! session id. Two backends:
//!
//! - [`MemoryDocumentStore`] keeps bytes in a concurrent map
//! - [`FileDocumentStore`] writes them under a scratch directory
//!
//! Both release storage synchronously on `remove`.

pub mod file;
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;

pub use file::FileDocumentStore;
pub use memory::MemoryDocumentStore;

use crate::types::{RelayError, Result};

/// Unsigned document with the name it was registered under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalDocument {
    pub file_name: String,
    pub bytes: Bytes,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Store the unsigned document, replacing any previous one for `id`
    async fn put(&self, id: &str, bytes: Bytes, file_name: &str) -> Result<()>;

    async fn get_original(&self, id: &str) -> Result<Option<OriginalDocument>>;

    /// Store the signed document, replacing any previous one for `id`
    async fn put_signed(&self, id: &str, bytes: Bytes) -> Result<()>;

    async fn get_signed(&self, id: &str) -> Result<Option<Bytes>>;

    /// Drop only the signed document. Missing ids are not an error.
    async fn remove_signed(&self, id: &str) -> Result<()>;

    /// Drop everything stored for `id`. Missing ids are not an error.
    async fn remove(&self, id: &str) -> Result<()>;

    /// Backend name for logs and health output
    fn backend(&self) -> &'static str;
}

pub(crate) fn check_size(size: usize, limit: usize) -> Result<()> {
    if size > limit {
        return Err(RelayError::PayloadTooLarge { size, limit });
    }
    Ok(())
}
