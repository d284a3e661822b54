//! Deciding which remote log file is "current".
//!
//! RDS keeps many log files per instance and the listing call is comparatively
//! expensive, so discovery is tiered: the last day is searched first, then the
//! last week, then everything. Within a tier the file with the greatest
//! last-written time wins; among equal times the one listed last wins.

// Local crates
use crate::metrics::metrics::LIST_CALLS_TOTAL;
use crate::source::{
    models::{LogFile, RemoteLogFile},
    source::{LogSource, SourceError},
};

// External crates
use chrono::{DateTime, Duration, Utc};
use tracing::instrument;

/// Time windows searched by [`find_most_recent_file`], narrowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    LastDay,
    LastWeek,
    All,
}

impl Tier {
    pub const SEARCH_ORDER: [Tier; 3] = [Tier::LastDay, Tier::LastWeek, Tier::All];

    /// Lower bound on last-written time for this tier, relative to `now`.
    pub fn since(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Tier::LastDay => Some(now - Duration::hours(24)),
            Tier::LastWeek => Some(now - Duration::days(7)),
            Tier::All => None,
        }
    }
}

/// Pick the most recently written candidate from a listing.
pub fn select_most_recent(files: &[RemoteLogFile]) -> Option<LogFile> {
    files
        .iter()
        .filter_map(LogFile::from_remote)
        .fold(None, |best: Option<LogFile>, candidate| match best {
            Some(b) if candidate.last_written < b.last_written => Some(b),
            _ => Some(candidate),
        })
}

/// Find the most recently written log file, widening the search window until
/// one is found. `None` only when the instance has no usable log files at all.
#[instrument(
    name = "rdstail_selector::find_most_recent_file",
    target = "selector::selector",
    level = "debug",
    skip_all,
    fields(instance = %source.instance())
)]
pub async fn find_most_recent_file(
    source: &dyn LogSource,
) -> Result<Option<LogFile>, SourceError> {
    let now = Utc::now();

    for tier in Tier::SEARCH_ORDER {
        let since = tier.since(now);
        LIST_CALLS_TOTAL.inc();
        let files = source.list_files(since).await?;

        if let Some(file) = select_most_recent(&files) {
            tracing::debug!(?tier, log_file = %file.name, "Found most recent log file");
            return Ok(Some(file));
        }

        tracing::debug!(?tier, listed = files.len(), "No log file in search window, widening");
    }

    Ok(None)
}

/// Single listing of files written at or after `current` was last written.
/// The result may be `current` itself; callers compare names.
#[instrument(
    name = "rdstail_selector::find_newer_file",
    target = "selector::selector",
    level = "debug",
    skip_all,
    fields(instance = %source.instance(), log_file = %current.name)
)]
pub async fn find_newer_file(
    source: &dyn LogSource,
    current: &LogFile,
) -> Result<Option<LogFile>, SourceError> {
    LIST_CALLS_TOTAL.inc();
    let files = source.list_files(Some(current.last_written)).await?;
    Ok(select_most_recent(&files))
}
