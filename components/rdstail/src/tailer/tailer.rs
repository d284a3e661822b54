//! The tail engine.
//!
//! RDS offers no streaming access to log files, only "download a portion after
//! this marker". A [`Tailer`] therefore polls at a fixed rate, carrying the
//! marker from one read to the next so that no text is delivered twice.
//!
//! ```text
//! establish -> poll -> poll -> ... -> (rollover check) -> poll -> ... -> stopped
//! ```
//!
//! RDS also rotates log files. Listing files costs far more than a tail read,
//! so the tailer only looks for a newer file after [`ROLLOVER_CHECK_THRESHOLD`]
//! consecutive empty reads. On switching files the marker is discarded, since
//! markers are only meaningful for the file that issued them.

// Local crates
use crate::metrics::metrics::{
    DELIVERED_BYTES_TOTAL, DELIVERIES_TOTAL, EMPTY_READS_TOTAL, PORTIONS_READ_TOTAL,
    ROLLOVERS_TOTAL,
};
use crate::selector::selector::{find_most_recent_file, find_newer_file};
use crate::sink::sink::{Sink, SinkError};
use crate::source::{
    models::LogFile,
    source::{LogSource, SourceError},
};

// External crates
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Consecutive empty reads after which the tailer checks for a newer file.
pub const ROLLOVER_CHECK_THRESHOLD: u32 = 4;

#[derive(Debug, thiserror::Error)]
pub enum TailError {
    #[error("no log files found for RDS instance {instance}")]
    NoLogFile { instance: String },
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Delivery(#[from] SinkError),
    #[error("poll rate {0:?} is too large")]
    RateOutOfRange(Duration),
}

/// Which file to tail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailTarget {
    /// The most recently written file, following rotation.
    Latest,
    /// A named file, never switched away from.
    Pinned(String),
}

/// The file currently being tailed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackedFile {
    Latest(LogFile),
    Pinned(String),
}

impl TrackedFile {
    pub fn name(&self) -> &str {
        match self {
            TrackedFile::Latest(file) => &file.name,
            TrackedFile::Pinned(name) => name,
        }
    }
}

/// Where the tail currently is. `marker` is only valid for `file`; an empty
/// marker means "from the start of the file".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailPosition {
    pub file: TrackedFile,
    pub marker: String,
}

async fn resolve_target(
    source: &dyn LogSource,
    target: &TailTarget,
) -> Result<TrackedFile, TailError> {
    match target {
        TailTarget::Pinned(name) => Ok(TrackedFile::Pinned(name.clone())),
        TailTarget::Latest => find_most_recent_file(source)
            .await?
            .map(TrackedFile::Latest)
            .ok_or_else(|| TailError::NoLogFile {
                instance: source.instance().to_string(),
            }),
    }
}

/// One-shot tail: the last `lines` lines of the target file (`0` for the
/// whole file). Nothing is retained afterwards.
#[instrument(
    name = "rdstail_tailer::tail",
    target = "tailer::tailer",
    level = "debug",
    skip(source),
    fields(instance = %source.instance())
)]
pub async fn tail(
    source: &dyn LogSource,
    target: &TailTarget,
    lines: u32,
) -> Result<String, TailError> {
    let file = resolve_target(source, target).await?;
    let lines = (lines != 0).then_some(lines);

    tracing::debug!(log_file = %file.name(), ?lines, "Reading tail of log file");
    let portion = source.read_portion(file.name(), lines, None).await?;
    PORTIONS_READ_TOTAL.inc();

    Ok(portion.text)
}

/// Continuous tail of one instance's logs.
#[derive(Debug)]
pub struct Tailer<'a> {
    source: &'a dyn LogSource,
    position: TailPosition,
    empty_streak: u32,
}

impl<'a> Tailer<'a> {
    /// Pick the file to tail and anchor at its current end by reading a single
    /// line. The anchoring line itself is not delivered.
    #[instrument(
        name = "rdstail_tailer::establish",
        target = "tailer::tailer",
        level = "debug",
        skip(source),
        fields(instance = %source.instance())
    )]
    pub async fn establish(
        source: &'a dyn LogSource,
        target: &TailTarget,
    ) -> Result<Self, TailError> {
        let file = resolve_target(source, target).await?;
        let anchor = source.read_portion(file.name(), Some(1), None).await?;
        PORTIONS_READ_TOTAL.inc();

        tracing::info!(log_file = %file.name(), "Starting with most recent log file");

        Ok(Self {
            source,
            position: TailPosition {
                file,
                marker: anchor.marker,
            },
            empty_streak: 0,
        })
    }

    pub fn position(&self) -> &TailPosition {
        &self.position
    }

    pub fn empty_streak(&self) -> u32 {
        self.empty_streak
    }

    /// Switch to a newer file if one has appeared. Pinned files never switch.
    async fn check_rollover(&mut self) -> Result<(), TailError> {
        let TrackedFile::Latest(current) = &self.position.file else {
            return Ok(());
        };

        tracing::debug!(
            log_file = %current.name,
            threshold = ROLLOVER_CHECK_THRESHOLD,
            "Checking for a new log file, no new logs in recent polls"
        );

        // The listing includes files written at the same instant as the current
        // one; only a different, strictly newer file counts as a rollover.
        let Some(newer) = find_newer_file(self.source, current)
            .await?
            .filter(|f| f.name != current.name && f.last_written > current.last_written)
        else {
            return Ok(());
        };

        tracing::info!(
            previous = %current.name,
            log_file = %newer.name,
            "Found a new log file"
        );
        ROLLOVERS_TOTAL.inc();
        self.position = TailPosition {
            file: TrackedFile::Latest(newer),
            marker: String::new(),
        };

        Ok(())
    }

    /// One polling step: maybe check for rotation, read everything new since
    /// the marker, deliver it if non-empty.
    pub async fn poll_once(&mut self, sink: &mut dyn Sink) -> Result<(), TailError> {
        if self.empty_streak >= ROLLOVER_CHECK_THRESHOLD {
            self.empty_streak = 0;
            self.check_rollover().await?;
        }

        let marker = Some(self.position.marker.as_str()).filter(|m| !m.is_empty());
        let portion = self
            .source
            .read_portion(self.position.file.name(), None, marker)
            .await?;
        PORTIONS_READ_TOTAL.inc();

        self.position.marker = portion.marker;

        if portion.text.is_empty() {
            self.empty_streak += 1;
            EMPTY_READS_TOTAL.inc();
            tracing::trace!(empty_streak = self.empty_streak, "No new log data");
            return Ok(());
        }

        self.empty_streak = 0;
        tracing::trace!(
            bytes = portion.text.len(),
            marker = %self.position.marker,
            "Delivering log data"
        );
        sink.deliver(&portion.text).await?;
        DELIVERIES_TOTAL.inc();
        DELIVERED_BYTES_TOTAL.inc_by(portion.text.len() as f64);

        Ok(())
    }

    /// Poll every `rate` until `cancel` fires or an error occurs.
    ///
    /// Cancellation is only observed between ticks: a read or a delivery
    /// (including its retries) in progress is allowed to finish.
    #[instrument(
        name = "rdstail_tailer::run",
        target = "tailer::tailer",
        level = "debug",
        skip_all,
        fields(instance = %self.source.instance(), rate = ?rate)
    )]
    pub async fn run(
        mut self,
        sink: &mut dyn Sink,
        rate: Duration,
        cancel: CancellationToken,
    ) -> Result<(), TailError> {
        let start = Instant::now()
            .checked_add(rate)
            .ok_or(TailError::RateOutOfRange(rate))?;
        let mut ticker = interval_at(start, rate);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    tracing::info!(
                        log_file = %self.position().file.name(),
                        empty_streak = self.empty_streak(),
                        "Tail stopped"
                    );
                    return Ok(());
                }

                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once(sink).await {
                        tracing::error!(
                            error = %e,
                            log_file = %self.position.file.name(),
                            "Tail failed"
                        );
                        return Err(e);
                    }
                }
            }
        }
    }
}

/// Establish a tail on `target` and stream it into `sink` until cancelled.
pub async fn watch(
    source: &dyn LogSource,
    target: &TailTarget,
    rate: Duration,
    sink: &mut dyn Sink,
    cancel: CancellationToken,
) -> Result<(), TailError> {
    Tailer::establish(source, target)
        .await?
        .run(sink, rate, cancel)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::sink::recording::RecordingSink;
    use crate::source::fake::{Call, FakeSource, at, hours_ago};
    use pretty_assertions::assert_eq;

    fn read(file: &str, lines: Option<u32>, marker: Option<&str>) -> Call {
        Call::Read {
            file: file.to_string(),
            lines,
            marker: marker.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn one_shot_full_dump_returns_text_verbatim() {
        let source = FakeSource::new().with_file("A", at(100));
        source.push_portion("line one\nline two\n", "1:200");

        let text = tail(&source, &TailTarget::Latest, 0).await.unwrap();

        assert_eq!(text, "line one\nline two\n");
        assert_eq!(source.reads(), vec![read("A", None, None)]);
    }

    #[tokio::test]
    async fn one_shot_caps_lines() {
        let source = FakeSource::new().with_file("A", hours_ago(1));
        source.push_portion("last\n", "1:50");

        tail(&source, &TailTarget::Latest, 20).await.unwrap();

        assert_eq!(source.reads(), vec![read("A", Some(20), None)]);
    }

    #[tokio::test]
    async fn one_shot_without_files_is_not_found() {
        let source = FakeSource::new();

        let err = tail(&source, &TailTarget::Latest, 20).await.unwrap_err();

        assert!(matches!(err, TailError::NoLogFile { .. }));
    }

    #[tokio::test]
    async fn one_shot_surfaces_discovery_errors() {
        let source = FakeSource::new().with_file("A", hours_ago(1));
        source.fail_listing("access denied");

        let err = tail(&source, &TailTarget::Latest, 20).await.unwrap_err();

        assert!(matches!(err, TailError::Source(SourceError::List { .. })));
    }

    #[tokio::test]
    async fn one_shot_pinned_file_skips_discovery() {
        let source = FakeSource::new();
        source.push_portion("pinned\n", "1:7");

        let text = tail(&source, &TailTarget::Pinned("error/old.log".into()), 5)
            .await
            .unwrap();

        assert_eq!(text, "pinned\n");
        assert_eq!(source.list_calls(), 0);
    }

    #[tokio::test]
    async fn establish_anchors_on_one_line_read() {
        let source = FakeSource::new().with_file("A", hours_ago(1));
        source.push_portion("anchor line\n", "1:100");

        let tailer = Tailer::establish(&source, &TailTarget::Latest).await.unwrap();

        assert_eq!(tailer.position().marker, "1:100");
        assert_eq!(tailer.position().file.name(), "A");
        assert_eq!(source.reads(), vec![read("A", Some(1), None)]);
    }

    #[tokio::test]
    async fn establish_fails_fast_without_files() {
        let source = FakeSource::new();

        let err = Tailer::establish(&source, &TailTarget::Latest).await.unwrap_err();

        assert!(matches!(err, TailError::NoLogFile { .. }));
        assert!(source.reads().is_empty());
    }

    #[tokio::test]
    async fn markers_advance_without_duplicating_text() {
        let source = FakeSource::new().with_file("A", hours_ago(1));
        source.push_portion("anchor\n", "1:10");
        source.push_portion("a\n", "1:20");
        source.push_portion("b\n", "1:30");
        source.push_portion("", "1:30");
        source.push_portion("c\n", "1:40");
        let mut sink = RecordingSink::default();

        let mut tailer = Tailer::establish(&source, &TailTarget::Latest).await.unwrap();
        for _ in 0..4 {
            tailer.poll_once(&mut sink).await.unwrap();
        }

        assert_eq!(sink.delivered, vec!["a\n", "b\n", "c\n"]);
        assert_eq!(
            source.reads(),
            vec![
                read("A", Some(1), None),
                read("A", None, Some("1:10")),
                read("A", None, Some("1:20")),
                read("A", None, Some("1:30")),
                read("A", None, Some("1:30")),
            ]
        );
    }

    #[tokio::test]
    async fn checks_for_rollover_once_after_four_empty_reads() {
        let source = FakeSource::new().with_file("A", hours_ago(1));
        source.push_portion("anchor\n", "1:10");
        let mut sink = RecordingSink::default();

        let mut tailer = Tailer::establish(&source, &TailTarget::Latest).await.unwrap();
        let lists_after_establish = source.list_calls();

        for _ in 0..ROLLOVER_CHECK_THRESHOLD {
            tailer.poll_once(&mut sink).await.unwrap();
        }
        assert_eq!(tailer.empty_streak(), ROLLOVER_CHECK_THRESHOLD);
        assert_eq!(source.list_calls(), lists_after_establish);

        // No newer file: streak still resets and the same file is kept.
        tailer.poll_once(&mut sink).await.unwrap();
        assert_eq!(source.list_calls(), lists_after_establish + 1);
        assert_eq!(tailer.empty_streak(), 1);
        assert_eq!(tailer.position().file.name(), "A");
        assert_eq!(tailer.position().marker, "1:10");
        assert!(sink.delivered.is_empty());
    }

    #[tokio::test]
    async fn rollover_switches_file_and_resets_marker() {
        let started = hours_ago(1);
        let source = FakeSource::new().with_file("A", started);
        source.push_portion("anchor\n", "1:10");
        let mut sink = RecordingSink::default();

        let mut tailer = Tailer::establish(&source, &TailTarget::Latest).await.unwrap();
        for _ in 0..ROLLOVER_CHECK_THRESHOLD {
            tailer.poll_once(&mut sink).await.unwrap();
        }

        source.push_file(crate::source::models::RemoteLogFile {
            name: Some("B".into()),
            last_written: Some(hours_ago(0)),
            size: Some(10),
        });
        source.push_portion("first line of B\n", "2:16");
        tailer.poll_once(&mut sink).await.unwrap();

        let reads = source.reads();
        assert_eq!(reads.last().unwrap(), &read("B", None, None));
        assert_eq!(tailer.position().file.name(), "B");
        assert_eq!(tailer.position().marker, "2:16");
        assert_eq!(tailer.empty_streak(), 0);
        assert_eq!(sink.delivered, vec!["first line of B\n"]);
        assert!(source.calls().contains(&Call::List {
            since: Some(started)
        }));
    }

    #[tokio::test]
    async fn same_timestamp_file_does_not_replace_current() {
        let written = hours_ago(1);
        let source = FakeSource::new().with_file("A", written);
        source.push_portion("anchor\n", "1:10");
        let mut sink = RecordingSink::default();

        let mut tailer = Tailer::establish(&source, &TailTarget::Latest).await.unwrap();
        source.push_file(crate::source::models::RemoteLogFile {
            name: Some("B".into()),
            last_written: Some(written),
            size: Some(10),
        });
        for _ in 0..=ROLLOVER_CHECK_THRESHOLD {
            tailer.poll_once(&mut sink).await.unwrap();
        }

        assert_eq!(source.list_calls(), 2);
        assert_eq!(tailer.position().file.name(), "A");
        assert_eq!(tailer.position().marker, "1:10");
        assert!(
            source
                .reads()
                .iter()
                .all(|r| matches!(r, Call::Read { file, .. } if file == "A"))
        );
    }

    #[tokio::test]
    async fn overflowing_rate_is_an_error() {
        let source = FakeSource::new().with_file("A", hours_ago(1));
        source.push_portion("anchor\n", "1:10");
        let mut sink = RecordingSink::default();

        let tailer = Tailer::establish(&source, &TailTarget::Latest).await.unwrap();
        let err = tailer
            .run(&mut sink, Duration::MAX, CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, TailError::RateOutOfRange(_)));
        assert!(sink.delivered.is_empty());
    }

    #[tokio::test]
    async fn pinned_file_never_checks_for_rollover() {
        let source = FakeSource::new().with_file("B", hours_ago(0));
        source.push_portion("anchor\n", "1:10");
        let mut sink = RecordingSink::default();

        let mut tailer = Tailer::establish(&source, &TailTarget::Pinned("A".into()))
            .await
            .unwrap();
        for _ in 0..(ROLLOVER_CHECK_THRESHOLD * 3) {
            tailer.poll_once(&mut sink).await.unwrap();
        }

        assert_eq!(source.list_calls(), 0);
        assert_eq!(tailer.position().file.name(), "A");
    }

    #[tokio::test]
    async fn read_errors_are_fatal() {
        let source = FakeSource::new().with_file("A", hours_ago(1));
        source.push_portion("anchor\n", "1:10");
        source.push_read_failure("throttled");
        let mut sink = RecordingSink::default();

        let mut tailer = Tailer::establish(&source, &TailTarget::Latest).await.unwrap();
        let err = tailer.poll_once(&mut sink).await.unwrap_err();

        assert!(matches!(err, TailError::Source(SourceError::Read { .. })));
    }

    #[tokio::test]
    async fn delivery_errors_are_fatal() {
        let source = FakeSource::new().with_file("A", hours_ago(1));
        source.push_portion("anchor\n", "1:10");
        source.push_portion("a\n", "1:20");
        let mut sink = RecordingSink {
            fail_on: Some(0),
            ..Default::default()
        };

        let mut tailer = Tailer::establish(&source, &TailTarget::Latest).await.unwrap();
        let err = tailer.poll_once(&mut sink).await.unwrap_err();

        assert!(matches!(err, TailError::Delivery(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_between_ticks_returns_cleanly_after_n_deliveries() {
        let rate = Duration::from_secs(3);
        let source = FakeSource::new().with_file("A", hours_ago(1));
        source.push_portion("anchor\n", "1:0");
        for i in 1..=10 {
            source.push_portion(&format!("line {i}\n"), &format!("1:{i}"));
        }
        let mut sink = RecordingSink::default();
        let cancel = CancellationToken::new();

        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(rate * 3 + rate / 2).await;
            stopper.cancel();
        });

        watch(&source, &TailTarget::Latest, rate, &mut sink, cancel)
            .await
            .unwrap();

        assert_eq!(sink.delivered, vec!["line 1\n", "line 2\n", "line 3\n"]);
    }

    #[tokio::test(start_paused = true)]
    async fn loop_stops_on_first_error() {
        let source = FakeSource::new().with_file("A", hours_ago(1));
        source.push_portion("anchor\n", "1:0");
        source.push_portion("line\n", "1:1");
        source.push_read_failure("service unavailable");
        let mut sink = RecordingSink::default();

        let err = watch(
            &source,
            &TailTarget::Latest,
            Duration::from_secs(1),
            &mut sink,
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, TailError::Source(_)));
        assert_eq!(sink.delivered, vec!["line\n"]);
    }
}
