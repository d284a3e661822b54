//! Remote log API contract.
//!
//! The tailer never talks to AWS directly; it sees a [`LogSource`] bound to a
//! single database instance that can list log files and download portions of
//! them. Pagination is the implementation's concern: callers always receive a
//! flattened listing and the full text of a download.

// Local crates
use crate::source::models::{Portion, RemoteLogFile};

// External crates
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure of a remote list or read call. Never retried by the tailer.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to list log files for instance {instance}: {source}")]
    List {
        instance: String,
        #[source]
        source: BoxError,
    },
    #[error("failed to download log file {file} for instance {instance}: {source}")]
    Read {
        instance: String,
        file: String,
        #[source]
        source: BoxError,
    },
}

/// Remote log storage for one database instance.
#[async_trait]
pub trait LogSource: Send + Sync + std::fmt::Debug {
    /// Instance identifier this source is bound to.
    fn instance(&self) -> &str;

    /// List log files written at or after `since`, or every file when `since` is `None`.
    async fn list_files(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RemoteLogFile>, SourceError>;

    /// Download from `file`.
    ///
    /// `lines` caps the download to the last N lines, `marker` resumes after a
    /// previously returned position. With neither, the whole file is returned.
    async fn read_portion(
        &self,
        file: &str,
        lines: Option<u32>,
        marker: Option<&str>,
    ) -> Result<Portion, SourceError>;
}
