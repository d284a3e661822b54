//! Scripted in-memory [`LogSource`] used by unit tests.

// Local crates
use crate::source::{
    models::{Portion, RemoteLogFile},
    source::{LogSource, SourceError},
};

// External crates
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;

/// A call observed by [`FakeSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List {
        since: Option<DateTime<Utc>>,
    },
    Read {
        file: String,
        lines: Option<u32>,
        marker: Option<String>,
    },
}

#[derive(Debug, Default)]
struct Inner {
    files: Vec<RemoteLogFile>,
    portions: VecDeque<Result<Portion, String>>,
    list_failure: Option<String>,
    calls: Vec<Call>,
}

/// Filters its listing by `since` like the remote API does and answers reads
/// from a queue of scripted portions. Once the queue is empty every read
/// returns empty text and echoes the marker it was given.
#[derive(Debug, Default)]
pub struct FakeSource {
    inner: Mutex<Inner>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, name: &str, last_written: DateTime<Utc>) -> Self {
        self.push_file(RemoteLogFile {
            name: Some(name.to_string()),
            last_written: Some(last_written),
            size: Some(0),
        });
        self
    }

    pub fn with_entry(self, entry: RemoteLogFile) -> Self {
        self.push_file(entry);
        self
    }

    pub fn push_file(&self, entry: RemoteLogFile) {
        self.inner.lock().unwrap().files.push(entry);
    }

    pub fn push_portion(&self, text: &str, marker: &str) {
        self.inner.lock().unwrap().portions.push_back(Ok(Portion {
            text: text.to_string(),
            marker: marker.to_string(),
        }));
    }

    pub fn push_read_failure(&self, message: &str) {
        self.inner
            .lock()
            .unwrap()
            .portions
            .push_back(Err(message.to_string()));
    }

    pub fn fail_listing(&self, message: &str) {
        self.inner.lock().unwrap().list_failure = Some(message.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn list_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::List { .. }))
            .count()
    }

    pub fn reads(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Read { .. }))
            .collect()
    }
}

#[async_trait]
impl LogSource for FakeSource {
    fn instance(&self) -> &str {
        "fake-instance"
    }

    async fn list_files(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RemoteLogFile>, SourceError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::List { since });

        if let Some(message) = &inner.list_failure {
            return Err(SourceError::List {
                instance: "fake-instance".into(),
                source: message.clone().into(),
            });
        }

        Ok(inner
            .files
            .iter()
            .filter(|f| match (since, f.last_written) {
                (Some(since), Some(written)) => written >= since,
                _ => true,
            })
            .cloned()
            .collect())
    }

    async fn read_portion(
        &self,
        file: &str,
        lines: Option<u32>,
        marker: Option<&str>,
    ) -> Result<Portion, SourceError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::Read {
            file: file.to_string(),
            lines,
            marker: marker.map(str::to_string),
        });

        match inner.portions.pop_front() {
            Some(Ok(portion)) => Ok(portion),
            Some(Err(message)) => Err(SourceError::Read {
                instance: "fake-instance".into(),
                file: file.to_string(),
                source: message.into(),
            }),
            None => Ok(Portion {
                text: String::new(),
                marker: marker.unwrap_or_default().to_string(),
            }),
        }
    }
}

/// A timestamp `hours` before now.
pub fn hours_ago(hours: i64) -> DateTime<Utc> {
    Utc::now() - Duration::hours(hours)
}

/// A fixed timestamp `secs` after the epoch.
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap()
}
