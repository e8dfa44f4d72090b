use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt, Stdout};
use tokio::sync::Mutex;

use crate::record::SourceRecord;

/// Destination write path for converted records.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Hand one record to the destination.
    ///
    /// # Errors
    /// Implementations return an error when the record could not be written;
    /// the bridge then requeues the delivery.
    async fn write(&self, record: SourceRecord) -> Result<()>;
}

/// Writes each record as one line of JSON.
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

impl<W> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl JsonLinesSink<Stdout> {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

#[async_trait]
impl<W> RecordSink for JsonLinesSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write(&self, record: SourceRecord) -> Result<()> {
        let mut line = serde_json::to_vec(&record).context("Failed to encode record")?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer
            .write_all(&line)
            .await
            .with_context(|| format!("Failed to write record for topic '{}'", record.topic))?;
        writer.flush().await.context("Failed to flush record")?;
        Ok(())
    }
}
