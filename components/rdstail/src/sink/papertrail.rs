//! Network delivery to a remote syslog-style collector (Papertrail).
//!
//! Every portion is framed as a single plaintext message
//!
//! ```text
//! <YYYY-MM-DDTHH:MM:SS> <hostname> <app>: <log text>
//! ```
//!
//! and written to one long-lived encrypted stream. There is no acknowledgement
//! protocol: a delivery succeeded when the write returned without error.
//!
//! Failed writes are retried with exponential backoff and jitter. Each wait is
//! capped at `max_interval` and retrying stops once `deadline` has elapsed
//! since the first failure; the last write error is then returned and the tail
//! loop terminates. Retries resend the identical framed buffer.

// Local crates
use crate::metrics::metrics::DELIVERY_RETRIES_TOTAL;
use crate::sink::sink::{Sink, SinkError};

// External crates
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::{Instant, sleep};
use tracing::instrument;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Backoff policy for failed writes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub deadline: Duration,
    pub multiplier: f64,
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(60),
            deadline: Duration::from_secs(5 * 60),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

/// Writes framed log text to `stream`, which must already be connected.
///
/// The stream is owned for the sink's lifetime and closed when it is dropped.
#[derive(Debug)]
pub struct PapertrailSink<S> {
    stream: S,
    addr: String,
    name_segment: String,
    frame: Vec<u8>,
    policy: RetryPolicy,
}

impl<S> PapertrailSink<S>
where
    S: AsyncWrite + Unpin + Send,
{
    pub fn new(
        stream: S,
        addr: impl Into<String>,
        hostname: &str,
        app: &str,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            stream,
            addr: addr.into(),
            name_segment: format!(" {hostname} {app}: "),
            frame: Vec::new(),
            policy,
        }
    }

    fn build_frame(&mut self, text: &str) {
        self.frame.clear();
        self.frame
            .extend_from_slice(Utc::now().format(TIMESTAMP_FORMAT).to_string().as_bytes());
        self.frame.extend_from_slice(self.name_segment.as_bytes());
        self.frame.extend_from_slice(text.as_bytes());
    }

    async fn write_frame(&mut self) -> std::io::Result<()> {
        self.stream.write_all(&self.frame).await?;
        self.stream.flush().await
    }

    /// Write the current frame, retrying with backoff until it succeeds or the
    /// deadline passes.
    #[instrument(
        name = "rdstail_sink::papertrail::write_with_retry",
        target = "sink::papertrail",
        level = "debug",
        skip_all,
        fields(addr = %self.addr, frame_len = self.frame.len())
    )]
    async fn write_with_retry(&mut self) -> Result<(), SinkError> {
        let mut attempts: u32 = 0;
        let mut delay = self.policy.initial_interval;
        let mut first_failure: Option<Instant> = None;

        loop {
            attempts += 1;

            let err = match self.write_frame().await {
                Ok(()) => {
                    if attempts > 1 {
                        tracing::info!(attempts, "Write to Papertrail succeeded after retrying");
                    }
                    return Ok(());
                }
                Err(e) => e,
            };

            let started = *first_failure.get_or_insert_with(Instant::now);
            let elapsed = started.elapsed();
            if elapsed >= self.policy.deadline {
                tracing::error!(
                    error = %err,
                    attempts,
                    elapsed = ?elapsed,
                    "Giving up on Papertrail write, retry deadline exceeded"
                );
                return Err(SinkError::Network {
                    addr: self.addr.clone(),
                    attempts,
                    elapsed,
                    source: err,
                });
            }

            let jitter = if self.policy.jitter > 0.0 {
                rand::rng().random_range(1.0 - self.policy.jitter..1.0 + self.policy.jitter)
            } else {
                1.0
            };
            let wait = delay
                .mul_f64(jitter)
                .min(self.policy.max_interval)
                .min(self.policy.deadline - elapsed);

            tracing::warn!(
                error = %err,
                attempts,
                retry_in = ?wait,
                "Writing to Papertrail failed, this will be retried"
            );
            DELIVERY_RETRIES_TOTAL.inc();
            sleep(wait).await;

            delay = delay
                .mul_f64(self.policy.multiplier)
                .min(self.policy.max_interval);
        }
    }
}

#[async_trait]
impl<S> Sink for PapertrailSink<S>
where
    S: AsyncWrite + Unpin + Send,
{
    async fn deliver(&mut self, text: &str) -> Result<(), SinkError> {
        self.build_frame(text);
        self.write_with_retry().await
    }
}
