// External crates
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Exit status used when a second termination signal arrives.
pub const ABORT_EXIT_CODE: i32 = 2;

/// Process-wide shutdown handle, built on-top of a `CancellationToken`.
///
/// - The tail loop receives a clone of the token and checks it between polls.
/// - The first SIGINT/SIGTERM triggers the token.
/// - A second signal while shutdown is pending aborts the process: graceful
///   shutdown already had its chance.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token to hand to long-running components
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    #[instrument(name = "rdstail_shutdown_trigger", target = "helpers::shutdown", level = "trace")]
    pub fn trigger(&self) {
        tracing::trace!("Shutdown triggered");
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Listen for OS termination signals in the background.
    pub fn listen_for_signals(&self) -> std::io::Result<JoinHandle<()>> {
        let (tx, rx) = mpsc::channel(4);
        forward_os_signals(tx)?;

        let shutdown = self.clone();
        Ok(tokio::spawn(handle_signals(shutdown, rx, || {
            std::process::exit(ABORT_EXIT_CODE);
        })))
    }
}

/// React to a stream of termination signals: trigger shutdown on the first,
/// call `abort` on the second.
pub async fn handle_signals<A>(
    shutdown: Shutdown,
    mut signals: mpsc::Receiver<&'static str>,
    abort: A,
)
where
    A: FnOnce(),
{
    let Some(signal) = signals.recv().await else {
        return;
    };
    tracing::info!(signal, "Termination signal received, stopping after the current poll");
    shutdown.trigger();

    let Some(signal) = signals.recv().await else {
        return;
    };
    tracing::error!(signal, "Aborting on second signal");
    eprintln!("Aborting on second signal");
    abort();
}

#[cfg(unix)]
fn forward_os_signals(tx: mpsc::Sender<&'static str>) -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    tokio::spawn(async move {
        loop {
            let name = tokio::select! {
                Some(()) = interrupt.recv() => "SIGINT",
                Some(()) = terminate.recv() => "SIGTERM",
                else => return,
            };
            if tx.send(name).await.is_err() {
                return;
            }
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn forward_os_signals(tx: mpsc::Sender<&'static str>) -> std::io::Result<()> {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send("ctrl-c").await.is_err() {
                return;
            }
        }
    });

    Ok(())
}
