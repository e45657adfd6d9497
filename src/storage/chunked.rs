use super::backend::ColumnStore;
use super::batch::BatchAccumulator;
use super::schema::{COUNTERMASK, PartitionKey, StoredRow};
use crate::bitmap::{Bitmap, Chunk, WORDS_PER_CHUNK};
use crate::config::NodeConfig;
use crate::error::StoreError;
use crate::metrics::{TIMER_FETCH, TimerSink, timer_name};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Maps bitmaps to rows of the `bitmap` table and back.
///
/// Each non-zero word becomes one row keyed by `(chunk_key, block_index)`;
/// one extra row under [`COUNTERMASK`] caches the population count.
pub struct ChunkedBitmapStore {
    backend: Arc<dyn ColumnStore>,
    batch: Mutex<BatchAccumulator>,
    timers: Arc<dyn TimerSink>,
    metric_prefix: String,
    backend_timeout: Duration,
    closed: AtomicBool,
}

impl ChunkedBitmapStore {
    pub fn new(
        backend: Arc<dyn ColumnStore>,
        timers: Arc<dyn TimerSink>,
        config: &NodeConfig,
    ) -> Self {
        Self {
            batch: Mutex::new(BatchAccumulator::new(
                backend.clone(),
                timers.clone(),
                config,
            )),
            backend,
            timers,
            metric_prefix: config.metric_prefix.clone(),
            backend_timeout: config.backend_timeout(),
            closed: AtomicBool::new(false),
        }
    }

    /// Reads every row of `partition` and rebuilds the bitmap.
    ///
    /// Returns the bitmap (with its cached count) and the filter stored
    /// alongside it. Relies on the backend returning each chunk's rows
    /// contiguously, in clustering order.
    pub async fn fetch(&self, partition: &PartitionKey) -> Result<(Bitmap, u64), StoreError> {
        self.ensure_open()?;
        let start = Instant::now();

        let rows = match tokio::time::timeout(
            self.backend_timeout,
            self.backend.scan_partition(partition),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(StoreError::Timeout {
                    operation: "scan_partition",
                    after: self.backend_timeout,
                });
            }
        };

        let result = rebuild(partition, &rows);
        self.timers.record(
            &timer_name(&self.metric_prefix, TIMER_FETCH),
            start.elapsed(),
        );
        result
    }

    /// Replaces the stored bitmap with `bitmap` in one atomic batch.
    ///
    /// The batch deletes the partition first, so words of an earlier version
    /// do not survive. Zero words produce no rows. The count row is queued
    /// last, in the same batch, so no reader sees content without its count.
    ///
    /// `filter` must fit the 32-bit `filter` column.
    /// [`StoreError::FilterOutOfRange`] is returned before anything is queued otherwise.
    pub async fn store(
        &self,
        partition: &PartitionKey,
        filter: u64,
        bitmap: &Bitmap,
    ) -> Result<(), StoreError> {
        self.ensure_open()?;
        let column = u32::try_from(filter).map_err(|_| StoreError::FilterOutOfRange(filter))?;
        // Bit-for-bit into the signed column.
        let filter = column as i32;

        let mut batch = self.batch.lock().await;
        batch.begin_batch();
        batch.delete_partition(partition);

        let mut rows = 0usize;
        for chunk in bitmap.chunks() {
            for (block_index, word) in chunk.non_zero_words() {
                batch.store_block(
                    partition,
                    filter,
                    chunk.key as i64,
                    block_index as i32,
                    word as i64,
                );
                rows += 1;
            }
        }

        let count = bitmap.bit_count();
        batch.store_block(partition, filter, COUNTERMASK, 0, count as i64);

        if let Err(e) = batch.end_batch().await {
            batch.discard();
            return Err(e);
        }

        tracing::debug!(
            "Stored bitmap {} ({}/{}/{}): {} rows, count={}",
            partition.bitmap_id,
            partition.db,
            partition.frame,
            partition.slice,
            rows,
            count
        );
        Ok(())
    }

    /// Releases the backend session. Safe to call more than once.
    ///
    /// Waits for an in-flight `store` to finish its batch first.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let _batch = self.batch.lock().await;
        self.backend.close().await;
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

fn rebuild(partition: &PartitionKey, rows: &[StoredRow]) -> Result<(Bitmap, u64), StoreError> {
    let mut bitmap = Bitmap::new();
    let mut current: Option<Chunk> = None;
    let mut cached_count: Option<u64> = None;
    let mut filter: Option<i32> = None;

    for row in rows {
        match filter {
            None => filter = Some(row.filter),
            Some(expected) if expected != row.filter => {
                return Err(StoreError::FilterMismatch {
                    chunk_key: row.chunk_key,
                    expected,
                    found: row.filter,
                });
            }
            Some(_) => {}
        }

        if row.is_sentinel() {
            cached_count = Some(row.block as u64);
            continue;
        }

        if row.chunk_key < 0 || !(0..WORDS_PER_CHUNK as i32).contains(&row.block_index) {
            return Err(StoreError::MalformedRow {
                chunk_key: row.chunk_key,
                block_index: row.block_index,
            });
        }

        let key = row.chunk_key as u64;
        if current.as_ref().map(|chunk| chunk.key) != Some(key) {
            if let Some(done) = current.take() {
                bitmap.add_chunk(done);
            }
            current = Some(Chunk::new(key));
        }
        if let Some(chunk) = current.as_mut() {
            chunk.words[row.block_index as usize] = row.block as u64;
        }
    }

    if let Some(done) = current.take() {
        bitmap.add_chunk(done);
    }
    bitmap.prune();

    match cached_count {
        Some(count) => bitmap.set_count(count),
        None => {
            let count = bitmap.bit_count();
            if !rows.is_empty() {
                tracing::warn!(
                    "Bitmap {} ({}/{}/{}) has no count row; recomputed count={}",
                    partition.bitmap_id,
                    partition.db,
                    partition.frame,
                    partition.slice,
                    count
                );
            }
            bitmap.set_count(count);
        }
    }

    // Widened back bit-for-bit from the 32-bit column.
    let filter = filter.map(|f| f as u32 as u64).unwrap_or(0);
    Ok((bitmap, filter))
}
