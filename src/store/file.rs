//! File-backed document store
//!
//! Documents are written to `<root>/<id>.original` and `<root>/<id>.signed`.
//! Writes go to a `.tmp` sibling first and are renamed into place, so a reader
//! never sees a half-written file. Nothing survives a restart: leftovers from
//! a previous process are removed on startup.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::fs;
use tracing::{debug, info, warn};

use super::{check_size, DocumentStore, OriginalDocument};
use crate::session::validate_session_id;
use crate::types::Result;

const ORIGINAL_EXT: &str = "original";
const SIGNED_EXT: &str = "signed";
const TMP_EXT: &str = "tmp";

/// Document store writing each document to its own file
pub struct FileDocumentStore {
    root_dir: PathBuf,
    /// File names by session id
    names: DashMap<String, String>,
    max_bytes: usize,
}

impl FileDocumentStore {
    /// Open a store at `root_dir`, creating it and clearing stale documents
    pub async fn new<P: AsRef<Path>>(root_dir: P, max_bytes: usize) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        fs::create_dir_all(&root_dir).await?;

        let cleared = clear_leftovers(&root_dir).await?;
        if cleared > 0 {
            info!(path = %root_dir.display(), cleared, "Removed documents left by a previous run");
        }

        info!(path = %root_dir.display(), "Initialized file document store");

        Ok(Self {
            root_dir,
            names: DashMap::new(),
            max_bytes,
        })
    }

    fn path(&self, id: &str, ext: &str) -> Result<PathBuf> {
        validate_session_id(id)?;
        Ok(self.root_dir.join(format!("{}.{}", id, ext)))
    }

    async fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let tmp = path.with_extension(format!(
            "{}.{}",
            path.extension().and_then(|e| e.to_str()).unwrap_or_default(),
            TMP_EXT
        ));
        fs::write(&tmp, bytes).await?;
        if let Err(e) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

async fn read_optional(path: &Path) -> Result<Option<Bytes>> {
    match fs::read(path).await {
        Ok(data) => Ok(Some(Bytes::from(data))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn remove_optional(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn clear_leftovers(root_dir: &Path) -> Result<usize> {
    let mut cleared = 0;
    let mut entries = fs::read_dir(root_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let ours = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| matches!(ext, ORIGINAL_EXT | SIGNED_EXT | TMP_EXT));
        if !ours {
            continue;
        }
        match fs::remove_file(&path).await {
            Ok(()) => cleared += 1,
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove stale document"),
        }
    }
    Ok(cleared)
}

#[async_trait]
impl DocumentStore for FileDocumentStore {
    async fn put(&self, id: &str, bytes: Bytes, file_name: &str) -> Result<()> {
        check_size(bytes.len(), self.max_bytes)?;
        let path = self.path(id, ORIGINAL_EXT)?;
        self.write_atomic(&path, &bytes).await?;
        self.names.insert(id.to_string(), file_name.to_string());
        debug!(session_id = %id, size = bytes.len(), path = %path.display(), "Stored original on disk");
        Ok(())
    }

    async fn get_original(&self, id: &str) -> Result<Option<OriginalDocument>> {
        let Some(file_name) = self.names.get(id).map(|n| n.clone()) else {
            return Ok(None);
        };
        let path = self.path(id, ORIGINAL_EXT)?;
        Ok(read_optional(&path)
            .await?
            .map(|bytes| OriginalDocument { file_name, bytes }))
    }

    async fn put_signed(&self, id: &str, bytes: Bytes) -> Result<()> {
        check_size(bytes.len(), self.max_bytes)?;
        let path = self.path(id, SIGNED_EXT)?;
        self.write_atomic(&path, &bytes).await?;
        debug!(session_id = %id, size = bytes.len(), "Stored signed document on disk");
        Ok(())
    }

    async fn get_signed(&self, id: &str) -> Result<Option<Bytes>> {
        let path = self.path(id, SIGNED_EXT)?;
        read_optional(&path).await
    }

    async fn remove_signed(&self, id: &str) -> Result<()> {
        let path = self.path(id, SIGNED_EXT)?;
        remove_optional(&path).await
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let original = self.path(id, ORIGINAL_EXT)?;
        let signed = self.path(id, SIGNED_EXT)?;
        self.names.remove(id);
        remove_optional(&original).await?;
        remove_optional(&signed).await
    }

    fn backend(&self) -> &'static str {
        "file"
    }
}
