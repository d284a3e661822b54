// Local crates
use crate::{
    helpers::load_config::Config,
    instrumentation,
    runtime::runtime::{self, PapertrailSettings, SourceSettings},
    tailer::tailer::TailTarget,
};

// External crates
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(
    name = "rdstail",
    about = "Reads AWS RDS logs",
    long_about = "Reads AWS RDS logs.\n\nAWS credentials are taken from an ~/.aws/credentials file or the env vars AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY.",
    version,
    term_width = 100,
    after_help = "\
    EXAMPLES:
        rdstail -i orders-db tail -n 50
        rdstail -i orders-db watch --rate 5s
        rdstail -i orders-db papertrail -p logs.papertrailapp.com:12345 -a orders"
)]
struct Cli {
    /// Name of the db instance in RDS [required]
    #[arg(short, long, global = true)]
    instance: Option<String>,

    /// AWS region [default: us-east-1]
    #[arg(long, env = "AWS_REGION", global = true)]
    region: Option<String>,

    /// Maximum number of retries for RDS requests [default: 10]
    #[arg(long, global = true)]
    max_retries: Option<u32>,

    /// Optional TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Diagnostic log level, e.g. "debug" or "rdstail=trace" [default: info]
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Tail the last N lines
    Tail {
        /// Output the last n lines. Use 0 for a full dump of the most recent file [default: 20]
        #[arg(short = 'n', long)]
        lines: Option<u32>,

        /// Name of the log file to tail
        #[arg(short, long)]
        file: Option<String>,
    },

    /// Stream logs to stdout
    Watch {
        /// RDS log polling rate [default: 3s]
        #[arg(short, long, value_parser = parse_duration)]
        rate: Option<Duration>,

        /// Name of the log file to watch, disables following rotation
        #[arg(short, long)]
        file: Option<String>,

        /// Serve Prometheus metrics on this address
        #[arg(long)]
        metrics_addr: Option<SocketAddr>,
    },

    /// Stream logs into Papertrail
    Papertrail {
        /// Papertrail host e.g. logs.papertrailapp.com:8888 [required]
        #[arg(short = 'p', long = "papertrail")]
        host: Option<String>,

        /// App name to send to Papertrail [default: rdstail]
        #[arg(short, long)]
        app: Option<String>,

        /// Hostname of the client, sent to Papertrail [default: this machine's hostname]
        #[arg(long)]
        hostname: Option<String>,

        /// RDS log polling rate [default: 3s]
        #[arg(short, long, value_parser = parse_duration)]
        rate: Option<Duration>,

        /// PEM file with the root certificate(s) to trust instead of the bundled roots
        #[arg(long)]
        ca_file: Option<PathBuf>,

        /// Serve Prometheus metrics on this address
        #[arg(long)]
        metrics_addr: Option<SocketAddr>,
    },

    /// Validate the configuration file and print the effective settings
    Validate,
}

/// Parse a duration for clap (e.g. "3s", "500ms", "1m")
fn parse_duration(s: &str) -> Result<Duration, String> {
    humantime::parse_duration(s).map_err(|e| {
        format!("Invalid duration format: '{s}'. Use formats like '3s', '500ms', '1m'. Error: {e}")
    })
}

/// Entry function for CLI
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if cli.log_level.is_some() {
        config.logging.log_level = cli.log_level.clone();
    }

    // Held until the command finishes so buffered diagnostics are flushed.
    let _guard = instrumentation::tracing::init_tracing(&config.logging)?;

    let source = || {
        SourceSettings::resolve(
            cli.instance.clone(),
            cli.region.clone(),
            cli.max_retries,
            &config.general,
        )
    };

    match cli.command {
        Commands::Tail { lines, ref file } => {
            let lines = lines
                .or(config.general.lines)
                .unwrap_or(runtime::DEFAULT_LINES);
            runtime::run_tail(source()?, target(file.clone()), lines).await?
        }
        Commands::Watch {
            rate,
            ref file,
            metrics_addr,
        } => {
            let rate = runtime::resolve_rate(rate, &config.general)?;
            let metrics_addr = metrics_addr.or(config.metrics.listen_addr);
            runtime::run_watch(source()?, target(file.clone()), rate, metrics_addr).await?
        }
        Commands::Papertrail {
            ref host,
            ref app,
            ref hostname,
            rate,
            ref ca_file,
            metrics_addr,
        } => {
            let rate = runtime::resolve_rate(rate, &config.general)?;
            let papertrail = PapertrailSettings::resolve(
                host.clone(),
                app.clone(),
                hostname.clone(),
                ca_file.clone(),
                &config.papertrail,
            )?;
            let metrics_addr = metrics_addr.or(config.metrics.listen_addr);
            runtime::run_papertrail(source()?, papertrail, rate, metrics_addr).await?
        }
        Commands::Validate => validate_config(cli.config.as_deref(), &config),
    }

    Ok(())
}

fn target(file: Option<String>) -> TailTarget {
    match file {
        Some(name) => TailTarget::Pinned(name),
        None => TailTarget::Latest,
    }
}

//
// ------------------------ Command Implementations ------------------------------
//

/// Validate configuration file
fn validate_config(path: Option<&std::path::Path>, config: &Config) {
    match path {
        Some(path) => println!("Configuration file {:?} is valid:\n{:#?}", path, config),
        None => println!("No configuration file given, using defaults:\n{:#?}", config),
    }
}
