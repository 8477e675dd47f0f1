//! Agora Files - File sharing and collaboration
//!
//! This crate provides the file surface of the hub:
//! - File: records, categories, rights
//! - Store: content-addressed blobs with a JSONL index
//! - Collab: linearized collaborative editing sessions

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod collab;
pub mod error;
pub mod file;
pub mod store;

pub use collab::{Change, ChangeKind, ChangeRequest, CollabManager, CollabSession};
pub use error::{Error, Result};
pub use file::{FileCategory, FileRecord, FileRight, Permission};
pub use store::{FileFilter, FileStore, FileStoreConfig, DEFAULT_MAX_BYTES};
