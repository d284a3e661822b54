mod cli;
mod helpers;
mod instrumentation;
mod metrics;
mod runtime;
mod selector;
mod sink;
mod source;
mod tailer;

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    instrumentation::tracing::init_panic_handler();

    // Main entrypoint simply delegates control to CLI layer.
    // The CLI loads configuration, sets up tracing and runs the selected command
    cli::cli::run().await
}
