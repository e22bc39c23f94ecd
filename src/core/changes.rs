//! Rendered file change tracking.
//!
//! A rendered file counts as changed until its content has been *applied*
//! (the follow-up action succeeded). The BLAKE3 hash of the last applied
//! content is kept in the store under `file_hash:<path>`, so a failed apply
//! is retried on the next run even though the file on disk is already current.

use crate::core::kv::{KeyValueStore, keys};
use crate::errors::Result;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// A file written to disk together with its content hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFile {
    pub path: PathBuf,
    pub hash: String,
}

impl RenderedFile {
    fn state_key(&self) -> String {
        format!("{}{}", keys::FILE_HASH_PREFIX, self.path.display())
    }
}

/// Hex BLAKE3 digest of `content`
#[must_use]
pub fn content_hash(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

/// Writes `content` to `path`, creating parent directories as needed.
#[instrument(skip(content))]
pub async fn write_rendered(path: &Path, content: &str) -> Result<RenderedFile> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await?;
    Ok(RenderedFile {
        path: path.to_path_buf(),
        hash: content_hash(content),
    })
}

/// Whether `file` differs from the last applied content of its path.
pub async fn has_changed(store: &dyn KeyValueStore, file: &RenderedFile) -> Result<bool> {
    let previous = store.get(&file.state_key()).await?;
    let changed = previous.as_deref() != Some(file.hash.as_str());
    debug!("Rendered file {:?} changed: {}", file.path, changed);
    Ok(changed)
}

/// Records `file`'s content as applied.
pub async fn mark_applied(store: &dyn KeyValueStore, file: &RenderedFile) -> Result<()> {
    store.set(&file.state_key(), &file.hash).await
}
