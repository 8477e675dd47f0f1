//! Agora Replay - Append-only journal
//!
//! This crate provides the persistence layer every Agora component
//! records through:
//! - Record: the stable line-delimited JSON envelope
//! - Journal: durable, single-writer append with torn-write repair
//! - Replay: folding rules for reconstructing state from a journal

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod journal;
pub mod record;
pub mod replay;

pub use error::{Error, Result};
pub use journal::Journal;
pub use record::{Record, RecordKind};
pub use replay::{events, ids_are_unique, latest_snapshots};
