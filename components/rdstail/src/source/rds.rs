//! AWS RDS implementation of [`LogSource`].
//!
//! Wraps `DescribeDBLogFiles` and `DownloadDBLogFilePortion`. Both calls page
//! through their results; pages are flattened here so the tailer only ever sees
//! complete listings and complete downloads. Transport-level retries are left
//! to the SDK's standard retry mode.
//!
//! The page walks are written against a fetch closure so they can be driven
//! without the SDK.

// Local crates
use crate::source::{
    models::{Portion, RemoteLogFile},
    source::{LogSource, SourceError},
};

// External crates
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, retry::RetryConfig};
use aws_sdk_rds::Client;
use chrono::{DateTime, Utc};
use std::future::Future;
use tracing::instrument;

#[derive(Debug, Clone)]
pub struct RdsLogSource {
    client: Client,
    instance: String,
}

impl RdsLogSource {
    /// Build a client from the ambient AWS credential chain for `region`.
    ///
    /// `max_retries` is the number of SDK-level retries per request, on top of
    /// the first attempt.
    #[instrument(
        name = "rdstail_source::connect",
        target = "source::rds",
        level = "debug",
        skip_all,
        fields(instance = %instance, region = %region)
    )]
    pub async fn connect(instance: String, region: String, max_retries: u32) -> Self {
        tracing::debug!(max_retries, "Loading AWS configuration for RDS client");
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region))
            .retry_config(RetryConfig::standard().with_max_attempts(max_retries.saturating_add(1)))
            .load()
            .await;

        Self {
            client: Client::new(&shared),
            instance,
        }
    }
}

/// One page of a `DescribeDBLogFiles` listing.
#[derive(Debug, Default)]
pub(crate) struct ListPage {
    pub files: Vec<RemoteLogFile>,
    pub marker: Option<String>,
}

/// One page of a `DownloadDBLogFilePortion` download.
#[derive(Debug, Default)]
pub(crate) struct PortionPage {
    pub data: Option<String>,
    pub marker: Option<String>,
    pub pending: bool,
}

/// `NumberOfLines` for a request. Zero means "no limit" and is left unset.
pub(crate) fn number_of_lines(lines: Option<u32>) -> Option<i32> {
    lines
        .filter(|n| *n != 0)
        .map(|n| i32::try_from(n).unwrap_or(i32::MAX))
}

fn non_empty(marker: Option<String>) -> Option<String> {
    marker.filter(|m| !m.is_empty())
}

/// Fetch listing pages until the service stops returning a marker, flattening
/// the files in page order.
pub(crate) async fn walk_listing<F, Fut>(mut fetch: F) -> Result<Vec<RemoteLogFile>, SourceError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<ListPage, SourceError>>,
{
    let mut files = Vec::new();
    let mut marker = None;

    loop {
        let page = fetch(marker.clone()).await?;
        files.extend(page.files);

        let returned = non_empty(page.marker);
        if returned.is_none() || returned == marker {
            break;
        }
        marker = returned;
    }

    Ok(files)
}

/// Fetch portion pages starting at `marker`, concatenating their data. The
/// returned marker is the one from the final page fetched.
pub(crate) async fn walk_portions<F, Fut>(
    mut fetch: F,
    marker: Option<&str>,
) -> Result<Portion, SourceError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<PortionPage, SourceError>>,
{
    let mut next_marker = non_empty(marker.map(str::to_string));
    let mut text = String::new();

    loop {
        let page = fetch(next_marker.clone()).await?;
        if let Some(data) = page.data {
            text.push_str(&data);
        }

        let advanced = page.marker.is_some() && page.marker != next_marker;
        next_marker = page.marker;

        // Stop on the last page, or if the service keeps handing back the
        // same marker.
        if !page.pending || !advanced {
            break;
        }
    }

    Ok(Portion {
        text,
        marker: next_marker.unwrap_or_default(),
    })
}

#[async_trait]
impl LogSource for RdsLogSource {
    fn instance(&self) -> &str {
        &self.instance
    }

    #[instrument(
        name = "rdstail_source::list_files",
        target = "source::rds",
        level = "trace",
        skip(self)
    )]
    async fn list_files(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RemoteLogFile>, SourceError> {
        let since = since.map(|s| s.timestamp_millis());

        let files = walk_listing(|marker| {
            let request = self
                .client
                .describe_db_log_files()
                .db_instance_identifier(&self.instance)
                .set_file_last_written(since)
                .set_marker(marker);

            async move {
                let page = request.send().await.map_err(|e| SourceError::List {
                    instance: self.instance.clone(),
                    source: Box::new(e),
                })?;

                Ok::<_, SourceError>(ListPage {
                    files: page
                        .describe_db_log_files()
                        .iter()
                        .map(|d| RemoteLogFile {
                            name: d.log_file_name().map(str::to_string),
                            last_written: d
                                .last_written()
                                .and_then(DateTime::<Utc>::from_timestamp_millis),
                            size: d.size(),
                        })
                        .collect(),
                    marker: page.marker().map(str::to_string),
                })
            }
        })
        .await?;

        tracing::trace!(
            count = files.len(),
            total_bytes = files.iter().filter_map(|f| f.size).sum::<i64>(),
            "Listed RDS log files"
        );
        Ok(files)
    }

    #[instrument(
        name = "rdstail_source::read_portion",
        target = "source::rds",
        level = "trace",
        skip(self)
    )]
    async fn read_portion(
        &self,
        file: &str,
        lines: Option<u32>,
        marker: Option<&str>,
    ) -> Result<Portion, SourceError> {
        let number_of_lines = number_of_lines(lines);

        walk_portions(
            |marker| {
                let request = self
                    .client
                    .download_db_log_file_portion()
                    .db_instance_identifier(&self.instance)
                    .log_file_name(file)
                    .set_number_of_lines(number_of_lines)
                    .set_marker(marker);

                async move {
                    let page = request.send().await.map_err(|e| SourceError::Read {
                        instance: self.instance.clone(),
                        file: file.to_string(),
                        source: Box::new(e),
                    })?;

                    Ok::<_, SourceError>(PortionPage {
                        data: page.log_file_data().map(str::to_string),
                        marker: page.marker().map(str::to_string),
                        pending: page.additional_data_pending().unwrap_or(false),
                    })
                }
            },
            marker,
        )
        .await
    }
}
