//! Batch Accumulator
//!
//! Groups row writes into one logged batch against the backend.
//!
//! ## Lifecycle
//! 1. `begin_batch` opens a batch lazily (and counts one use).
//! 2. `delete_partition` and `store_block` append statements, opening a batch if none is open.
//! 3. `end_batch` commits whenever a batch is open.
//! 4. `flush_batch` commits unconditionally and resets all batch state.
//!
//! `end_batch` never defers a commit, so a `store` that returns `Ok` is
//! persisted. The configured time window and size limit are not applied here.
//!
//! The accumulator carries no lock of its own. `ChunkedBitmapStore` owns it
//! behind a mutex so that one `store` call is a single begin/store/end sequence.

use super::backend::ColumnStore;
use super::schema::{BatchStatement, PartitionKey, RowWrite, StoredRow};
use crate::config::NodeConfig;
use crate::error::StoreError;
use crate::metrics::{
    TIMER_END_BATCH, TIMER_FLUSH_BATCH, TIMER_STORE_BLOCK, TimerSink, timer_name,
};

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub struct BatchAccumulator {
    backend: Arc<dyn ColumnStore>,
    timers: Arc<dyn TimerSink>,
    metric_prefix: String,

    /// Statements queued since the last flush; `None` when no batch is open.
    batch: Option<Vec<BatchStatement>>,
    batch_started: Instant,
    /// Number of `begin_batch` calls since the last flush.
    batch_counter: usize,

    backend_timeout: Duration,
}

impl BatchAccumulator {
    pub fn new(
        backend: Arc<dyn ColumnStore>,
        timers: Arc<dyn TimerSink>,
        config: &NodeConfig,
    ) -> Self {
        Self {
            backend,
            timers,
            metric_prefix: config.metric_prefix.clone(),
            batch: None,
            batch_started: Instant::now(),
            batch_counter: 0,
            backend_timeout: config.backend_timeout(),
        }
    }

    pub fn begin_batch(&mut self) {
        if self.batch.is_none() {
            self.batch = Some(Vec::new());
            self.batch_started = Instant::now();
        }
        self.batch_counter += 1;
    }

    /// Queues a delete of every existing row of `partition`.
    ///
    /// Inserts queued after it in the same batch survive.
    pub fn delete_partition(&mut self, partition: &PartitionKey) {
        if self.batch.is_none() {
            self.begin_batch();
        }
        if let Some(batch) = self.batch.as_mut() {
            batch.push(BatchStatement::DeletePartition(partition.clone()));
        }
    }

    /// Queues one row in the open batch.
    pub fn store_block(
        &mut self,
        partition: &PartitionKey,
        filter: i32,
        chunk_key: i64,
        block_index: i32,
        block: i64,
    ) {
        if self.batch.is_none() {
            self.begin_batch();
        }
        let start = Instant::now();

        if let Some(batch) = self.batch.as_mut() {
            batch.push(BatchStatement::Insert(RowWrite {
                partition: partition.clone(),
                row: StoredRow {
                    chunk_key,
                    block_index,
                    filter,
                    block,
                },
            }));
        }

        self.record(TIMER_STORE_BLOCK, start.elapsed());
    }

    /// Commits whatever is queued and resets the batch state, even on failure.
    pub async fn flush_batch(&mut self) -> Result<(), StoreError> {
        let start = Instant::now();
        let batch = self.batch.take();
        self.batch_started = Instant::now();
        self.batch_counter = 0;

        let result = match batch {
            Some(statements) if !statements.is_empty() => {
                let count = statements.len();
                match tokio::time::timeout(
                    self.backend_timeout,
                    self.backend.execute_batch(statements),
                )
                .await
                {
                    Ok(Ok(())) => {
                        tracing::debug!("Flushed batch of {} statements", count);
                        Ok(())
                    }
                    Ok(Err(e)) => {
                        tracing::error!("Batch of {} statements failed: {}", count, e);
                        Err(StoreError::Backend(e))
                    }
                    Err(_) => {
                        tracing::error!("Batch of {} statements timed out", count);
                        Err(StoreError::Timeout {
                            operation: "execute_batch",
                            after: self.backend_timeout,
                        })
                    }
                }
            }
            _ => Ok(()),
        };

        self.record(TIMER_FLUSH_BATCH, start.elapsed());
        result
    }

    /// Closes a logical batch, committing it if one is open.
    pub async fn end_batch(&mut self) -> Result<(), StoreError> {
        let start = Instant::now();

        let result = if self.batch.is_some() {
            tracing::trace!(
                "Ending batch ({} statements, age {:?})",
                self.pending_statements(),
                self.batch_started.elapsed()
            );
            self.flush_batch().await
        } else {
            tracing::debug!("end_batch called with no open batch");
            Ok(())
        };

        self.record(TIMER_END_BATCH, start.elapsed());
        result
    }

    /// Drops queued statements without sending them.
    pub fn discard(&mut self) {
        if let Some(batch) = self.batch.take() {
            tracing::warn!("Discarding batch of {} statements", batch.len());
        }
        self.batch_counter = 0;
    }

    pub fn pending_statements(&self) -> usize {
        self.batch.as_ref().map(Vec::len).unwrap_or(0)
    }

    pub fn is_open(&self) -> bool {
        self.batch.is_some()
    }

    pub fn usage(&self) -> usize {
        self.batch_counter
    }

    fn record(&self, operation: &str, elapsed: Duration) {
        self.timers
            .record(&timer_name(&self.metric_prefix, operation), elapsed);
    }
}
