// Local crates
use crate::sink::sink::{Sink, SinkError};

// External crates
use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt, Stdout};

/// Writes log text straight to stdout (or any writer), unbuffered, no retry.
#[derive(Debug)]
pub struct ConsoleSink<W = Stdout> {
    out: W,
}

impl ConsoleSink<Stdout> {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl<W> ConsoleSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

#[async_trait]
impl<W> Sink for ConsoleSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn deliver(&mut self, text: &str) -> Result<(), SinkError> {
        self.out
            .write_all(text.as_bytes())
            .await
            .map_err(SinkError::Console)?;
        self.out.flush().await.map_err(SinkError::Console)
    }
}
