//! JSON-lines event source driving the snapshot service.
//!
//! Stands in for the stream subscription: one JSON envelope per line, read
//! from a file or stdin. Handlers run under a bounded semaphore; every record
//! produces exactly one ack, and raw records that fail non-retryably are
//! appended to the DLQ file.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use snapshot_core::{Ack, SnapshotService, StreamMessage};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Semaphore};

#[derive(Debug, Default)]
pub struct SourceStats {
    pub delivered: u64,
    pub committed: u64,
    pub retryable_failures: u64,
    pub dead_lettered: u64,
}

pub struct EventSource {
    events_file: Option<PathBuf>,
    dlq_path: Option<PathBuf>,
    start_offset: i64,
    max_concurrency: usize,
}

impl EventSource {
    pub fn new(
        events_file: Option<PathBuf>,
        dlq_path: Option<PathBuf>,
        start_offset: i64,
        max_concurrency: usize,
    ) -> Self {
        Self {
            events_file,
            dlq_path,
            start_offset,
            max_concurrency,
        }
    }

    /// Consume the stream to exhaustion or until shutdown fires.
    pub async fn run(
        &self,
        service: Arc<SnapshotService>,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> Result<SourceStats> {
        match &self.events_file {
            Some(path) => {
                let file = tokio::fs::File::open(path)
                    .await
                    .with_context(|| format!("failed to open events file {}", path.display()))?;
                self.consume(BufReader::new(file), service, &mut shutdown)
                    .await
            }
            None => {
                self.consume(BufReader::new(tokio::io::stdin()), service, &mut shutdown)
                    .await
            }
        }
    }

    async fn consume<R>(
        &self,
        reader: BufReader<R>,
        service: Arc<SnapshotService>,
        shutdown: &mut tokio::sync::watch::Receiver<bool>,
    ) -> Result<SourceStats>
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        let mut stats = SourceStats::default();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let (ack_tx, mut ack_rx) = mpsc::channel::<Ack>(self.max_concurrency * 2);

        // Raw records kept until their ack arrives, for DLQ routing.
        let mut in_flight: HashMap<(i64, i64), String> = HashMap::new();
        let mut lines = reader.lines();
        let mut offset: i64 = -1;

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!(target: "snapshot_indexer::source", "shutdown requested");
                    break;
                }
                line = lines.next_line() => {
                    let Some(line) = line.context("failed to read event record")? else {
                        break;
                    };
                    offset += 1;
                    if offset < self.start_offset || line.trim().is_empty() {
                        continue;
                    }

                    let message = match StreamMessage::parse(&line, offset) {
                        Ok(message) => message,
                        Err(error) => {
                            tracing::error!(
                                target: "snapshot_indexer::source",
                                offset,
                                %error,
                                "undecodable record"
                            );
                            self.dead_letter(&line).await;
                            stats.delivered += 1;
                            stats.dead_lettered += 1;
                            continue;
                        }
                    };

                    stats.delivered += 1;
                    in_flight.insert((message.batch_id, message.batch_index), line);

                    // Drain acks that arrived while reading.
                    while let Ok(ack) = ack_rx.try_recv() {
                        self.settle(ack, &mut in_flight, &mut stats).await;
                    }

                    let permit = semaphore
                        .clone()
                        .acquire_owned()
                        .await
                        .context("semaphore closed")?;
                    let service = service.clone();
                    let ack_tx = ack_tx.clone();
                    tokio::spawn(async move {
                        service.handle_message(message, &ack_tx).await;
                        drop(permit);
                    });
                }
            }
        }

        // Wait out the in-flight handlers.
        drop(ack_tx);
        while let Some(ack) = ack_rx.recv().await {
            self.settle(ack, &mut in_flight, &mut stats).await;
        }

        Ok(stats)
    }

    async fn settle(
        &self,
        ack: Ack,
        in_flight: &mut HashMap<(i64, i64), String>,
        stats: &mut SourceStats,
    ) {
        let raw = in_flight.remove(&(ack.batch_id, ack.batch_index));
        match ack.error {
            None => stats.committed += 1,
            Some(error) if error.is_retryable() => {
                // The stream layer owns redelivery; this source only reports.
                tracing::warn!(
                    target: "snapshot_indexer::source",
                    batch_id = ack.batch_id,
                    batch_index = ack.batch_index,
                    %error,
                    "transient failure, record left for redelivery"
                );
                stats.retryable_failures += 1;
            }
            Some(error) => {
                tracing::error!(
                    target: "snapshot_indexer::source",
                    batch_id = ack.batch_id,
                    batch_index = ack.batch_index,
                    %error,
                    "permanent failure, routing to DLQ"
                );
                if let Some(raw) = raw {
                    self.dead_letter(&raw).await;
                }
                stats.dead_lettered += 1;
            }
        }
    }

    async fn dead_letter(&self, raw: &str) {
        let Some(path) = &self.dlq_path else {
            return;
        };
        let result = async {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await?;
            file.write_all(raw.as_bytes()).await?;
            file.write_all(b"\n").await?;
            Ok::<(), std::io::Error>(())
        }
        .await;
        if let Err(error) = result {
            tracing::error!(
                target: "snapshot_indexer::source",
                dlq = %path.display(),
                %error,
                "failed to append to DLQ"
            );
        }
    }
}
