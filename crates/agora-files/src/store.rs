//! File store
//!
//! Blobs live under `files/<sha256>` so identical uploads share
//! storage; metadata lives in `file_index.jsonl`, one record per line,
//! rewritten atomically on every mutation.

use crate::error::{Error, Result};
use crate::file::{mime_for_extension, FileCategory, FileRecord, FileRight, Permission};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Default upload limit (100 MiB)
pub const DEFAULT_MAX_BYTES: u64 = 100 * 1024 * 1024;

/// File store configuration
#[derive(Debug, Clone)]
pub struct FileStoreConfig {
    /// Root directory; blobs land in `<root>/files`
    pub root: PathBuf,
    /// Upload size limit in bytes
    pub max_bytes: u64,
    /// Allowed lowercase extensions, leading dot included
    pub allowed_extensions: Vec<String>,
}

impl FileStoreConfig {
    /// Configuration rooted at `root` with the default limits
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_bytes: DEFAULT_MAX_BYTES,
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

fn default_allowed_extensions() -> Vec<String> {
    [
        ".txt", ".md", ".json", ".yaml", ".yml", ".toml", ".csv", ".xml", ".rs", ".go", ".js",
        ".ts", ".py", ".html", ".css", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".pdf", ".zip",
        ".tar", ".gz",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Filter for [`FileStore::list`]
#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    /// Only files owned by this principal
    pub owner: Option<String>,
    /// Only files in this category
    pub category: Option<FileCategory>,
    /// Only files carrying this tag
    pub tag: Option<String>,
    /// Only public files
    pub public_only: bool,
}

/// Content-addressed file store
pub struct FileStore {
    config: FileStoreConfig,
    files: RwLock<HashMap<String, FileRecord>>,
}

impl FileStore {
    /// Open the store, creating directories and loading the index.
    pub async fn open(config: FileStoreConfig) -> Result<Self> {
        tokio::fs::create_dir_all(config.root.join("files")).await?;

        let mut files = HashMap::new();
        let index = config.root.join("file_index.jsonl");
        if let Ok(content) = tokio::fs::read_to_string(&index).await {
            for line in content.lines().filter(|l| !l.is_empty()) {
                let record: FileRecord = serde_json::from_str(line)?;
                files.insert(record.id.clone(), record);
            }
        }
        info!(root = ?config.root, files = files.len(), "File store opened");

        Ok(Self {
            config,
            files: RwLock::new(files),
        })
    }

    fn blob_path(&self, checksum: &str) -> PathBuf {
        self.config.root.join("files").join(checksum)
    }

    fn index_path(&self) -> PathBuf {
        self.config.root.join("file_index.jsonl")
    }

    async fn persist_index(&self, files: &HashMap<String, FileRecord>) -> Result<()> {
        let mut records: Vec<&FileRecord> = files.values().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let mut out = String::new();
        for record in records {
            out.push_str(&serde_json::to_string(record)?);
            out.push('\n');
        }

        let tmp = self.index_path().with_extension("jsonl.tmp");
        tokio::fs::write(&tmp, out).await?;
        tokio::fs::rename(&tmp, self.index_path()).await?;
        Ok(())
    }

    /// Upload a local file into the store.
    ///
    /// Validates size and extension, hashes the content, and reuses an
    /// existing blob when the checksum is already stored.
    pub async fn upload(
        &self,
        local_path: impl AsRef<Path>,
        owner_id: impl Into<String>,
        permissions: Vec<Permission>,
        is_public: bool,
    ) -> Result<FileRecord> {
        let local_path = local_path.as_ref();
        let owner_id = owner_id.into();

        let meta = tokio::fs::metadata(local_path).await?;
        if meta.len() > self.config.max_bytes {
            return Err(Error::SizeExceeded {
                size: meta.len(),
                max: self.config.max_bytes,
            });
        }

        let ext = local_path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        if !self.config.allowed_extensions.iter().any(|a| *a == ext) {
            return Err(Error::TypeDisallowed(ext));
        }

        let bytes = tokio::fs::read(local_path).await?;
        let checksum = hex::encode(Sha256::digest(&bytes));

        let blob = self.blob_path(&checksum);
        if tokio::fs::metadata(&blob).await.is_err() {
            tokio::fs::write(&blob, &bytes).await?;
            debug!(checksum = %checksum, "Blob stored");
        } else {
            debug!(checksum = %checksum, "Blob already present, sharing storage");
        }

        let now = Utc::now();
        let record = FileRecord {
            id: mint_file_id(),
            name: local_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "unnamed".to_string()),
            size: meta.len(),
            mime_type: mime_for_extension(&ext).to_string(),
            category: FileCategory::from_extension(&ext),
            owner_id,
            permissions,
            tags: Vec::new(),
            created_at: now,
            modified_at: now,
            checksum,
            is_public,
            download_count: 0,
            description: None,
        };

        let mut files = self.files.write().await;
        files.insert(record.id.clone(), record.clone());
        self.persist_index(&files).await?;
        Ok(record)
    }

    /// Resolve a file for download, bumping its download counter.
    ///
    /// Returns the blob path; the caller streams the bytes out.
    pub async fn download(&self, file_id: &str, principal: &str) -> Result<PathBuf> {
        let mut files = self.files.write().await;
        let record = files
            .get_mut(file_id)
            .ok_or_else(|| Error::NotFound(file_id.to_string()))?;
        if !record.allows(principal, FileRight::Read) {
            return Err(Error::Unauthorized {
                principal: principal.to_string(),
                right: FileRight::Read.as_str().to_string(),
                file: file_id.to_string(),
            });
        }
        record.download_count += 1;
        record.modified_at = Utc::now();
        let path = self.blob_path(&record.checksum);
        self.persist_index(&files).await?;
        Ok(path)
    }

    /// Mint a share link valid for `ttl`
    pub async fn share(&self, file_id: &str, principal: &str, ttl: Duration) -> Result<String> {
        let files = self.files.read().await;
        let record = files
            .get(file_id)
            .ok_or_else(|| Error::NotFound(file_id.to_string()))?;
        if !record.allows(principal, FileRight::Share) {
            return Err(Error::Unauthorized {
                principal: principal.to_string(),
                right: FileRight::Share.as_str().to_string(),
                file: file_id.to_string(),
            });
        }
        let expires = Utc::now() + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::hours(24));
        Ok(format!(
            "agora://share/{file_id}?expires={}",
            expires.timestamp()
        ))
    }

    /// Delete a file; the blob is removed only when no other record
    /// shares its checksum.
    pub async fn delete(&self, file_id: &str, principal: &str) -> Result<FileRecord> {
        let mut files = self.files.write().await;
        let record = files
            .get(file_id)
            .ok_or_else(|| Error::NotFound(file_id.to_string()))?;
        if !record.allows(principal, FileRight::Delete) {
            return Err(Error::Unauthorized {
                principal: principal.to_string(),
                right: FileRight::Delete.as_str().to_string(),
                file: file_id.to_string(),
            });
        }

        let record = files.remove(file_id).expect("checked above");
        let orphaned = !files.values().any(|f| f.checksum == record.checksum);
        if orphaned {
            if let Err(e) = tokio::fs::remove_file(self.blob_path(&record.checksum)).await {
                // The index is already consistent; a stale blob is only wasted space.
                tracing::warn!(checksum = %record.checksum, error = %e, "Failed to remove blob");
            }
        }
        self.persist_index(&files).await?;
        info!(file = %file_id, orphaned, "File deleted");
        Ok(record)
    }

    /// Look up one record
    pub async fn get(&self, file_id: &str) -> Result<FileRecord> {
        let files = self.files.read().await;
        files
            .get(file_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(file_id.to_string()))
    }

    /// List records matching `filter`, newest first
    pub async fn list(&self, filter: &FileFilter) -> Vec<FileRecord> {
        let files = self.files.read().await;
        let mut matched: Vec<FileRecord> = files
            .values()
            .filter(|f| {
                filter.owner.as_deref().is_none_or(|o| f.owner_id == o)
                    && filter.category.is_none_or(|c| f.category == c)
                    && filter
                        .tag
                        .as_deref()
                        .is_none_or(|t| f.tags.iter().any(|tag| tag == t))
                    && (!filter.public_only || f.is_public)
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        matched
    }
}

/// Mint a file id: millisecond timestamp prefix keeps index order
/// aligned with upload order, the uuid tail guarantees uniqueness.
fn mint_file_id() -> String {
    format!(
        "{:012x}-{}",
        Utc::now().timestamp_millis(),
        uuid::Uuid::new_v4().simple()
    )
}

#[cfg(test)]
mod tests;
