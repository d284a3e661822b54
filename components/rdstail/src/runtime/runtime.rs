//! Command orchestration: resolves effective settings from flags, environment
//! and configuration file, then wires the RDS source, the sink and the
//! shutdown token into the tail engine.

// Local crates
use crate::{
    helpers::{
        load_config::{GeneralConfig, PapertrailConfig},
        shutdown::Shutdown,
    },
    metrics::http::serve_metrics,
    sink::{
        console::ConsoleSink,
        papertrail::{PapertrailSink, RetryPolicy},
        sink::Sink,
        tls,
    },
    source::rds::RdsLogSource,
    tailer::tailer::{self, TailTarget},
};

// External crates
use anyhow::{Context, Result, bail};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_MAX_RETRIES: u32 = 10;
pub const DEFAULT_RATE: Duration = Duration::from_secs(3);
pub const MAX_RATE: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_LINES: u32 = 20;
pub const DEFAULT_APP: &str = "rdstail";

/// Which instance to read and how to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSettings {
    pub instance: String,
    pub region: String,
    pub max_retries: u32,
}

impl SourceSettings {
    pub fn resolve(
        instance: Option<String>,
        region: Option<String>,
        max_retries: Option<u32>,
        general: &GeneralConfig,
    ) -> Result<Self> {
        let instance = instance
            .or_else(|| general.instance.clone())
            .filter(|i| !i.is_empty())
            .context("--instance required")?;

        Ok(Self {
            instance,
            region: region
                .or_else(|| general.region.clone())
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            max_retries: max_retries
                .or(general.max_retries)
                .unwrap_or(DEFAULT_MAX_RETRIES),
        })
    }

    async fn connect(&self) -> RdsLogSource {
        RdsLogSource::connect(self.instance.clone(), self.region.clone(), self.max_retries).await
    }
}

/// Where and how to forward logs to Papertrail.
#[derive(Debug, Clone, PartialEq)]
pub struct PapertrailSettings {
    pub host: String,
    pub app: String,
    pub hostname: String,
    pub ca_file: Option<PathBuf>,
    pub retry: RetryPolicy,
}

impl PapertrailSettings {
    pub fn resolve(
        host: Option<String>,
        app: Option<String>,
        hostname: Option<String>,
        ca_file: Option<PathBuf>,
        config: &PapertrailConfig,
    ) -> Result<Self> {
        let host = host
            .or_else(|| config.host.clone())
            .filter(|h| !h.is_empty())
            .context("--papertrail required")?;

        let hostname = match hostname.or_else(|| config.hostname.clone()) {
            Some(hostname) => hostname,
            None => sysinfo::System::host_name()
                .context("Could not determine this machine's hostname, pass --hostname")?,
        };

        let mut retry = RetryPolicy::default();
        if let Some(max_interval) = config.max_retry_interval {
            retry.max_interval = max_interval;
        }
        if let Some(deadline) = config.retry_deadline {
            retry.deadline = deadline;
        }
        if retry.max_interval.is_zero() {
            bail!("papertrail.max_retry_interval must be greater than zero");
        }

        Ok(Self {
            host,
            app: app
                .or_else(|| config.app.clone())
                .unwrap_or_else(|| DEFAULT_APP.to_string()),
            hostname,
            ca_file: ca_file.or_else(|| config.ca_file.clone()),
            retry,
        })
    }
}

/// Polling rate from the flag, then the config file, then the default.
pub fn resolve_rate(rate: Option<Duration>, general: &GeneralConfig) -> Result<Duration> {
    let rate = rate.or(general.rate).unwrap_or(DEFAULT_RATE);
    if rate.is_zero() {
        bail!("--rate must be greater than zero");
    }
    if rate > MAX_RATE {
        bail!("--rate must be at most {}", humantime::format_duration(MAX_RATE));
    }
    Ok(rate)
}

fn spawn_metrics_server(addr: Option<SocketAddr>, cancel: CancellationToken) {
    let Some(addr) = addr else {
        return;
    };

    tokio::spawn(async move {
        if let Err(e) = serve_metrics(addr, cancel).await {
            tracing::error!(error = %e, metrics_endpoint = %addr, "Metrics server failed");
        }
    });
}

/// Print the tail of the current (or named) log file once.
#[instrument(
    name = "rdstail_runtime::tail",
    target = "runtime::runtime",
    level = "debug",
    skip_all
)]
pub async fn run_tail(source: SourceSettings, target: TailTarget, lines: u32) -> Result<()> {
    let rds = source.connect().await;

    let text = tailer::tail(&rds, &target, lines)
        .await
        .with_context(|| format!("Failed to tail logs of RDS instance {}", source.instance))?;

    ConsoleSink::stdout().deliver(&format!("{text}\n")).await?;
    Ok(())
}

async fn stream_until_stopped(
    source: &SourceSettings,
    target: &TailTarget,
    rate: Duration,
    sink: &mut dyn Sink,
    shutdown: &Shutdown,
) -> Result<()> {
    let rds = source.connect().await;

    let result = tailer::watch(&rds, target, rate, sink, shutdown.token()).await;
    let signalled = shutdown.is_triggered();

    // Also stops the metrics server.
    shutdown.trigger();
    result.with_context(|| format!("Stopped watching logs of RDS instance {}", source.instance))?;

    info!(signalled, "Stopped cleanly");
    Ok(())
}

/// Stream new log lines to stdout until interrupted.
#[instrument(
    name = "rdstail_runtime::watch",
    target = "runtime::runtime",
    level = "debug",
    skip_all
)]
pub async fn run_watch(
    source: SourceSettings,
    target: TailTarget,
    rate: Duration,
    metrics_addr: Option<SocketAddr>,
) -> Result<()> {
    let shutdown = Shutdown::new();
    shutdown
        .listen_for_signals()
        .context("Failed to install signal handlers")?;
    spawn_metrics_server(metrics_addr, shutdown.token());

    let mut sink = ConsoleSink::stdout();
    stream_until_stopped(&source, &target, rate, &mut sink, &shutdown).await
}

/// Stream new log lines of the most recent file to Papertrail until interrupted.
///
/// The TLS connection is opened before polling starts and closed when this
/// returns, whatever the outcome.
#[instrument(
    name = "rdstail_runtime::papertrail",
    target = "runtime::runtime",
    level = "debug",
    skip_all
)]
pub async fn run_papertrail(
    source: SourceSettings,
    papertrail: PapertrailSettings,
    rate: Duration,
    metrics_addr: Option<SocketAddr>,
) -> Result<()> {
    let shutdown = Shutdown::new();
    shutdown
        .listen_for_signals()
        .context("Failed to install signal handlers")?;

    let stream = tls::connect(&papertrail.host, papertrail.ca_file.as_deref())
        .await
        .context("Failed to establish connection with Papertrail")?;

    spawn_metrics_server(metrics_addr, shutdown.token());

    info!(
        papertrail = %papertrail.host,
        app = %papertrail.app,
        hostname = %papertrail.hostname,
        "Forwarding RDS logs to Papertrail"
    );
    let mut sink = PapertrailSink::new(
        stream,
        papertrail.host.clone(),
        &papertrail.hostname,
        &papertrail.app,
        papertrail.retry,
    );

    stream_until_stopped(&source, &TailTarget::Latest, rate, &mut sink, &shutdown).await
}
