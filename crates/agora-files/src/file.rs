//! File record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// File category, derived from the extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCategory {
    /// Text and office documents
    Document,
    /// Raster and vector images
    Image,
    /// Video containers
    Video,
    /// Audio formats
    Audio,
    /// Source code
    Code,
    /// Structured data
    Data,
    /// Anything else
    Other,
}

impl FileCategory {
    /// Categorize a lowercase file extension (with leading dot)
    #[must_use]
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            ".txt" | ".md" | ".doc" | ".docx" | ".pdf" => Self::Document,
            ".jpg" | ".jpeg" | ".png" | ".gif" | ".bmp" | ".svg" => Self::Image,
            ".mp4" | ".avi" | ".mov" | ".mkv" => Self::Video,
            ".mp3" | ".wav" | ".flac" | ".ogg" => Self::Audio,
            ".rs" | ".go" | ".js" | ".ts" | ".py" | ".java" | ".cpp" | ".c" | ".h" => Self::Code,
            ".json" | ".yaml" | ".yml" | ".csv" | ".xml" | ".toml" => Self::Data,
            _ => Self::Other,
        }
    }
}

/// A right a principal can hold on a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileRight {
    /// Read the content
    Read,
    /// Modify the content
    Write,
    /// Remove the file
    Delete,
    /// Mint share links
    Share,
    /// Grant or revoke rights
    Admin,
}

impl FileRight {
    /// Returns the string representation of the right
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Delete => "delete",
            Self::Share => "share",
            Self::Admin => "admin",
        }
    }
}

/// Rights granted to one principal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    /// User or agent the grant applies to
    pub principal_id: String,
    /// Rights granted
    pub rights: BTreeSet<FileRight>,
}

impl Permission {
    /// Grant `rights` to `principal_id`
    #[must_use]
    pub fn new(principal_id: impl Into<String>, rights: impl IntoIterator<Item = FileRight>) -> Self {
        Self {
            principal_id: principal_id.into(),
            rights: rights.into_iter().collect(),
        }
    }

    /// Read-only grant
    #[must_use]
    pub fn read_only(principal_id: impl Into<String>) -> Self {
        Self::new(principal_id, [FileRight::Read])
    }
}

/// A stored file record
///
/// The checksum addresses the on-disk blob; two records with equal
/// checksums share storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// Unique file id
    pub id: String,
    /// Original file name
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// MIME type guessed from the extension
    pub mime_type: String,
    /// Category derived from the extension
    pub category: FileCategory,
    /// Owning principal; implicitly holds every right
    pub owner_id: String,
    /// Explicit grants beyond the owner
    pub permissions: Vec<Permission>,
    /// Free-form tags
    pub tags: Vec<String>,
    /// Upload time
    pub created_at: DateTime<Utc>,
    /// Last metadata change
    pub modified_at: DateTime<Utc>,
    /// SHA-256 of the content, hex encoded
    pub checksum: String,
    /// Whether any principal may read
    pub is_public: bool,
    /// Completed downloads
    pub download_count: u64,
    /// Optional description
    #[serde(default)]
    pub description: Option<String>,
}

impl FileRecord {
    /// Whether `principal` holds `right` on this file.
    ///
    /// The owner holds all rights; `Read` is satisfied by `is_public`.
    #[must_use]
    pub fn allows(&self, principal: &str, right: FileRight) -> bool {
        if self.owner_id == principal {
            return true;
        }
        if right == FileRight::Read && self.is_public {
            return true;
        }
        self.permissions
            .iter()
            .any(|p| p.principal_id == principal && (p.rights.contains(&right) || p.rights.contains(&FileRight::Admin)))
    }
}

/// Guess a MIME type from a lowercase extension (with leading dot)
#[must_use]
pub fn mime_for_extension(ext: &str) -> &'static str {
    match ext {
        ".txt" => "text/plain",
        ".md" => "text/markdown",
        ".html" => "text/html",
        ".css" => "text/css",
        ".csv" => "text/csv",
        ".json" => "application/json",
        ".yaml" | ".yml" => "application/yaml",
        ".xml" => "application/xml",
        ".pdf" => "application/pdf",
        ".zip" => "application/zip",
        ".gz" => "application/gzip",
        ".tar" => "application/x-tar",
        ".png" => "image/png",
        ".jpg" | ".jpeg" => "image/jpeg",
        ".gif" => "image/gif",
        ".svg" => "image/svg+xml",
        ".mp3" => "audio/mpeg",
        ".wav" => "audio/wav",
        ".mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}
