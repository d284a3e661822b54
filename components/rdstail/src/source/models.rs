// External crates
use chrono::{DateTime, Utc};

/// One entry of a remote log file listing, exactly as the remote API reported it.
///
/// Any field may be missing; entries missing a name or a last-written time are
/// never candidates for tailing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLogFile {
    pub name: Option<String>,
    pub last_written: Option<DateTime<Utc>>,
    pub size: Option<i64>,
}

/// A remote log file that can be tailed. Identity is the file name.
#[derive(Debug, Clone, Eq)]
pub struct LogFile {
    pub name: String,
    pub last_written: DateTime<Utc>,
}

impl PartialEq for LogFile {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl LogFile {
    /// Build a candidate from a listing entry, `None` when the entry lacks a
    /// name or a last-written time.
    pub fn from_remote(remote: &RemoteLogFile) -> Option<Self> {
        match (&remote.name, remote.last_written) {
            (Some(name), Some(last_written)) => Some(Self {
                name: name.clone(),
                last_written,
            }),
            _ => None,
        }
    }
}

/// Text downloaded from a log file, with the continuation marker to resume from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Portion {
    pub text: String,
    pub marker: String,
}
