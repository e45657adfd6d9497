//! Storage Module Tests
//!
//! Validates the bitmap ⇄ row mapping and the batching behaviour.
//!
//! ## Test Scopes
//! - **Layout**: sparsity, the count row, the concrete chunk/word layout.
//! - **Round trip**: positions, count and filter survive store + fetch.
//! - **Reconstruction edge cases**: missing count row, filter disagreement, malformed rows.
//! - **Batching**: one batch per store, failure propagation, atomicity under an injected fault.

#[cfg(test)]
mod tests {
    use crate::bitmap::Bitmap;
    use crate::config::NodeConfig;
    use crate::error::StoreError;
    use crate::metrics::testing::RecordingTimerSink;
    use crate::metrics::TracingTimerSink;
    use crate::storage::backend::ColumnStore;
    use crate::storage::batch::BatchAccumulator;
    use crate::storage::chunked::ChunkedBitmapStore;
    use crate::storage::handlers::{handle_fetch_bitmap, handle_store_bitmap};
    use crate::storage::memory::MemoryColumnStore;
    use crate::storage::protocol::StoreBitmapRequest;
    use crate::storage::schema::{BatchStatement, COUNTERMASK, PartitionKey, RowWrite, StoredRow};
    use axum::extract::{Extension, Path};
    use axum::http::StatusCode;
    use axum::Json;
    use rand::Rng;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    fn setup(config: NodeConfig) -> (Arc<MemoryColumnStore>, Arc<ChunkedBitmapStore>) {
        let backend = Arc::new(MemoryColumnStore::new("test"));
        let store = Arc::new(ChunkedBitmapStore::new(
            backend.clone(),
            Arc::new(TracingTimerSink),
            &config,
        ));
        (backend, store)
    }

    fn key() -> PartitionKey {
        PartitionKey::new(42, "db", "general", 0)
    }

    fn raw(chunk_key: i64, block_index: i32, filter: i32, block: i64) -> BatchStatement {
        RowWrite {
            partition: key(),
            row: StoredRow {
                chunk_key,
                block_index,
                filter,
                block,
            },
        }
        .into()
    }

    // ============================================================
    // LAYOUT TESTS
    // ============================================================

    #[tokio::test]
    async fn test_scenario_rows_match_chunk_layout() {
        let (backend, store) = setup(NodeConfig::default());
        let bitmap = Bitmap::from_positions([0, 64, 2048, 4101]);

        store.store(&key(), 7, &bitmap).await.unwrap();

        let rows = backend.scan_partition(&key()).await.unwrap();
        let layout: Vec<(i64, i32, i64)> = rows
            .iter()
            .map(|row| (row.chunk_key, row.block_index, row.block))
            .collect();

        assert_eq!(
            layout,
            vec![
                (COUNTERMASK, 0, 4),
                (0, 0, 1),
                (0, 1, 1),
                (1, 0, 1),
                (2, 0, 32),
            ]
        );
        assert!(rows.iter().all(|row| row.filter == 7));
    }

    #[tokio::test]
    async fn test_zero_words_produce_no_rows() {
        let (backend, store) = setup(NodeConfig::default());

        // 3 distinct words across two chunks, far apart.
        let bitmap = Bitmap::from_positions([1, 2, 3, 130, 2048 * 500 + 7]);
        store.store(&key(), 0, &bitmap).await.unwrap();

        assert_eq!(backend.row_count(&key()).await, 3 + 1);
        let rows = backend.scan_partition(&key()).await.unwrap();
        assert!(rows.iter().filter(|r| !r.is_sentinel()).all(|r| r.block != 0));
        assert_eq!(rows.iter().filter(|r| r.is_sentinel()).count(), 1);
    }

    #[tokio::test]
    async fn test_transient_zero_chunk_is_not_stored() {
        let (backend, store) = setup(NodeConfig::default());
        let mut bitmap = Bitmap::from_positions([5]);
        bitmap.chunk_mut(12);

        store.store(&key(), 0, &bitmap).await.unwrap();

        assert_eq!(backend.row_count(&key()).await, 2);
    }

    #[tokio::test]
    async fn test_full_word_survives_signed_column() {
        let (_backend, store) = setup(NodeConfig::default());
        let bitmap = Bitmap::from_positions(0..64);

        store.store(&key(), 0, &bitmap).await.unwrap();
        let (fetched, _) = store.fetch(&key()).await.unwrap();

        assert_eq!(fetched.chunk(0).unwrap().words[0], u64::MAX);
        assert_eq!(fetched.count(), 64);
    }

    // ============================================================
    // ROUND TRIP TESTS
    // ============================================================

    #[tokio::test]
    async fn test_round_trip_preserves_positions_count_and_filter() {
        let (_backend, store) = setup(NodeConfig::default());
        let positions = vec![0u64, 64, 2048, 4101, 65_535, 1 << 20];
        let bitmap = Bitmap::from_positions(positions.iter().copied());

        store.store(&key(), 12345, &bitmap).await.unwrap();
        let (fetched, filter) = store.fetch(&key()).await.unwrap();

        assert_eq!(fetched.positions().collect::<Vec<_>>(), positions);
        assert_eq!(fetched.count(), positions.len() as u64);
        assert_eq!(filter, 12345);
    }

    #[tokio::test]
    async fn test_filter_uses_all_32_bits() {
        let (_backend, store) = setup(NodeConfig::default());

        store.store(&key(), u32::MAX as u64, &Bitmap::from_positions([1])).await.unwrap();
        let (_, filter) = store.fetch(&key()).await.unwrap();

        assert_eq!(filter, u32::MAX as u64);
    }

    #[tokio::test]
    async fn test_filter_wider_than_column_is_rejected() {
        let (backend, store) = setup(NodeConfig::default());
        store.store(&key(), 7, &Bitmap::from_positions([1])).await.unwrap();

        let wide = (1u64 << 32) | 7;
        let result = store.store(&key(), wide, &Bitmap::from_positions([2])).await;

        assert!(matches!(result, Err(StoreError::FilterOutOfRange(f)) if f == wide));
        assert_eq!(backend.batches_applied(), 1);

        let (fetched, filter) = store.fetch(&key()).await.unwrap();
        assert_eq!(fetched.positions().collect::<Vec<_>>(), vec![1]);
        assert_eq!(filter, 7);
    }

    #[tokio::test]
    async fn test_store_replaces_previous_version() {
        let (backend, store) = setup(NodeConfig::default());

        store.store(&key(), 1, &Bitmap::from_positions([0, 5000])).await.unwrap();
        store.store(&key(), 2, &Bitmap::from_positions([1])).await.unwrap();

        let (fetched, filter) = store.fetch(&key()).await.unwrap();
        assert_eq!(fetched.positions().collect::<Vec<_>>(), vec![1]);
        assert_eq!(fetched.count(), 1);
        assert_eq!(fetched.bit_count(), 1);
        assert_eq!(filter, 2);
        assert_eq!(backend.row_count(&key()).await, 2);
    }

    #[tokio::test]
    async fn test_storing_empty_bitmap_clears_content() {
        let (_backend, store) = setup(NodeConfig::default());

        store.store(&key(), 0, &Bitmap::from_positions([3, 9000])).await.unwrap();
        store.store(&key(), 0, &Bitmap::new()).await.unwrap();

        let (fetched, _) = store.fetch(&key()).await.unwrap();
        assert!(fetched.is_empty());
        assert_eq!(fetched.count(), 0);
    }

    #[tokio::test]
    async fn test_random_round_trip() {
        let (_backend, store) = setup(NodeConfig::default());
        let mut rng = rand::thread_rng();

        for slice in 0..5 {
            let partition = PartitionKey::new(9, "db", "random", slice);
            let expected: BTreeSet<u64> = (0..300).map(|_| rng.gen_range(0..200_000)).collect();
            let filter = rng.gen_range(0..1_000_000u64);

            let bitmap = Bitmap::from_positions(expected.iter().copied());
            store.store(&partition, filter, &bitmap).await.unwrap();

            let (fetched, fetched_filter) = store.fetch(&partition).await.unwrap();
            let actual: BTreeSet<u64> = fetched.positions().collect();
            assert_eq!(actual, expected);
            assert_eq!(fetched.count(), expected.len() as u64);
            assert_eq!(fetched_filter, filter);
        }
    }

    #[tokio::test]
    async fn test_fetch_unknown_bitmap_is_empty() {
        let (_backend, store) = setup(NodeConfig::default());

        let (bitmap, filter) = store.fetch(&key()).await.unwrap();

        assert!(bitmap.is_empty());
        assert_eq!(bitmap.count(), 0);
        assert_eq!(filter, 0);
    }

    #[tokio::test]
    async fn test_partitions_are_isolated() {
        let (_backend, store) = setup(NodeConfig::default());
        let a = PartitionKey::new(1, "db", "frame", 0);
        let b = PartitionKey::new(1, "db", "frame", 1);

        store.store(&a, 1, &Bitmap::from_positions([1])).await.unwrap();
        store.store(&b, 2, &Bitmap::from_positions([2, 3])).await.unwrap();

        let (fetched_a, filter_a) = store.fetch(&a).await.unwrap();
        assert_eq!(fetched_a.positions().collect::<Vec<_>>(), vec![1]);
        assert_eq!(filter_a, 1);
    }

    // ============================================================
    // RECONSTRUCTION EDGE CASES
    // ============================================================

    #[tokio::test]
    async fn test_cached_count_comes_from_count_row() {
        let (backend, store) = setup(NodeConfig::default());
        backend
            .execute_batch(vec![raw(0, 0, 0, 0b111), raw(COUNTERMASK, 0, 0, 99)])
            .await
            .unwrap();

        let (bitmap, _) = store.fetch(&key()).await.unwrap();

        assert_eq!(bitmap.count(), 99, "cached count is trusted as stored");
        assert_eq!(bitmap.bit_count(), 3);
    }

    #[tokio::test]
    async fn test_missing_count_row_recomputes_count() {
        let (backend, store) = setup(NodeConfig::default());
        backend
            .execute_batch(vec![raw(0, 0, 0, 0b101), raw(3, 31, 0, 1)])
            .await
            .unwrap();

        let (bitmap, _) = store.fetch(&key()).await.unwrap();

        assert_eq!(bitmap.count(), 3);
        assert!(bitmap.contains(3 * 2048 + 31 * 64));
    }

    #[tokio::test]
    async fn test_filter_disagreement_fails_loudly() {
        let (backend, store) = setup(NodeConfig::default());
        backend
            .execute_batch(vec![raw(0, 0, 1, 1), raw(0, 1, 2, 1)])
            .await
            .unwrap();

        let result = store.fetch(&key()).await;

        assert!(matches!(
            result,
            Err(StoreError::FilterMismatch {
                expected: 1,
                found: 2,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_out_of_range_block_index_is_rejected() {
        let (backend, store) = setup(NodeConfig::default());
        backend.execute_batch(vec![raw(0, 32, 0, 1)]).await.unwrap();

        let result = store.fetch(&key()).await;

        assert!(matches!(result, Err(StoreError::MalformedRow { block_index: 32, .. })));
    }

    // ============================================================
    // BATCHING TESTS
    // ============================================================

    #[tokio::test]
    async fn test_each_store_commits_one_batch() {
        let (backend, store) = setup(NodeConfig::default());

        store.store(&key(), 0, &Bitmap::from_positions([1, 5000])).await.unwrap();
        store.store(&key(), 0, &Bitmap::from_positions([2])).await.unwrap();

        assert_eq!(backend.batches_applied(), 2);
    }

    #[tokio::test]
    async fn test_backend_failure_is_returned() {
        let (backend, store) = setup(NodeConfig::default());
        backend.inject_batch_fault(0);

        let result = store.store(&key(), 0, &Bitmap::from_positions([1])).await;

        assert!(matches!(result, Err(StoreError::Backend(_))));

        // The failed batch is gone; the next store starts clean.
        store.store(&key(), 0, &Bitmap::from_positions([2])).await.unwrap();
        assert_eq!(backend.row_count(&key()).await, 2);
    }

    #[tokio::test]
    async fn test_fault_mid_batch_leaves_previous_version_visible() {
        let (backend, store) = setup(NodeConfig::default());
        let original = Bitmap::from_positions([10, 20]);
        store.store(&key(), 1, &original).await.unwrap();

        backend.inject_batch_fault(2);
        let replacement = Bitmap::from_positions([10, 20, 4096, 9000, 70_000]);
        assert!(store.store(&key(), 1, &replacement).await.is_err());

        let (fetched, _) = store.fetch(&key()).await.unwrap();
        assert_eq!(fetched.positions().collect::<Vec<_>>(), vec![10, 20]);
        assert_eq!(fetched.count(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_fetch_never_sees_partial_store() {
        let (_backend, store) = setup(NodeConfig::default());

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for step in 1..=40u64 {
                    let bitmap = Bitmap::from_positions((0..step * 50).map(|p| p * 37));
                    store.store(&key(), 3, &bitmap).await.unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };

        let reader = {
            let store = store.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    let (bitmap, _) = store.fetch(&key()).await.unwrap();
                    if !bitmap.is_empty() {
                        assert_eq!(bitmap.count(), bitmap.bit_count());
                    }
                    tokio::task::yield_now().await;
                }
            })
        };

        writer.await.unwrap();
        reader.await.unwrap();
    }

    #[tokio::test]
    async fn test_end_batch_always_flushes_by_default() {
        let backend = Arc::new(MemoryColumnStore::new("test"));
        let mut batch = BatchAccumulator::new(
            backend.clone(),
            Arc::new(TracingTimerSink),
            &NodeConfig::default(),
        );

        batch.begin_batch();
        batch.store_block(&key(), 0, 0, 0, 1);
        assert_eq!(batch.usage(), 1);
        batch.end_batch().await.unwrap();

        assert!(!batch.is_open());
        assert_eq!(batch.usage(), 0);
        assert_eq!(backend.batches_applied(), 1);

        // No open batch: nothing happens.
        batch.end_batch().await.unwrap();
        assert_eq!(backend.batches_applied(), 1);
    }

    #[tokio::test]
    async fn test_store_block_opens_batch_lazily() {
        let backend = Arc::new(MemoryColumnStore::new("test"));
        let mut batch = BatchAccumulator::new(
            backend.clone(),
            Arc::new(TracingTimerSink),
            &NodeConfig::default(),
        );

        batch.store_block(&key(), 0, 0, 0, 1);
        batch.store_block(&key(), 0, 0, 1, 1);

        assert!(batch.is_open());
        assert_eq!(batch.pending_statements(), 2);
        assert_eq!(batch.usage(), 1);

        batch.flush_batch().await.unwrap();
        assert_eq!(backend.row_count(&key()).await, 2);
    }

    #[tokio::test]
    async fn test_store_is_persisted_regardless_of_thresholds() {
        let config = NodeConfig {
            batch_max_size: 1000,
            batch_time_window_secs: 3600,
            ..NodeConfig::default()
        };
        let (backend, store) = setup(config);

        store.store(&key(), 0, &Bitmap::from_positions([1])).await.unwrap();
        assert_eq!(backend.batches_applied(), 1);

        // A later failing store must not take the acknowledged one with it.
        backend.inject_batch_fault(1);
        assert!(store.store(&key(), 0, &Bitmap::from_positions([2])).await.is_err());

        let (fetched, _) = store.fetch(&key()).await.unwrap();
        assert_eq!(fetched.positions().collect::<Vec<_>>(), vec![1]);
        assert_eq!(fetched.count(), 1);
    }

    #[tokio::test]
    async fn test_delete_partition_is_queued_in_the_open_batch() {
        let backend = Arc::new(MemoryColumnStore::new("test"));
        let mut batch = BatchAccumulator::new(
            backend.clone(),
            Arc::new(TracingTimerSink),
            &NodeConfig::default(),
        );

        batch.store_block(&key(), 0, 0, 0, 1);
        batch.flush_batch().await.unwrap();

        batch.begin_batch();
        batch.delete_partition(&key());
        batch.store_block(&key(), 0, 4, 2, 1);
        assert_eq!(batch.pending_statements(), 2);
        assert_eq!(batch.usage(), 1);
        batch.end_batch().await.unwrap();

        let rows = backend.scan_partition(&key()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!((rows[0].chunk_key, rows[0].block_index), (4, 2));
    }

    #[tokio::test]
    async fn test_timers_are_reported() {
        let backend = Arc::new(MemoryColumnStore::new("test"));
        let timers = Arc::new(RecordingTimerSink::default());
        let store = ChunkedBitmapStore::new(backend, timers.clone(), &NodeConfig::default());

        store.store(&key(), 0, &Bitmap::from_positions([1, 100])).await.unwrap();
        store.fetch(&key()).await.unwrap();

        assert_eq!(timers.count("bitmap_storage_StoreBlock"), 3);
        assert_eq!(timers.count("bitmap_storage_EndBatch"), 1);
        assert_eq!(timers.count("bitmap_storage_FlushBatch"), 1);
        assert_eq!(timers.count("bitmap_storage_Fetch"), 1);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (_backend, store) = setup(NodeConfig::default());

        store.close().await;
        store.close().await;

        assert!(matches!(store.fetch(&key()).await, Err(StoreError::Closed)));
        assert!(matches!(
            store.store(&key(), 0, &Bitmap::new()).await,
            Err(StoreError::Closed)
        ));
    }

    // ============================================================
    // HTTP HANDLER TESTS
    // ============================================================

    #[tokio::test]
    async fn test_handlers_store_then_fetch() {
        let (_backend, store) = setup(NodeConfig::default());

        let (status, Json(response)) = handle_store_bitmap(
            Extension(store.clone()),
            Json(StoreBitmapRequest {
                bitmap_id: 42,
                db: "db".to_string(),
                frame: "general".to_string(),
                slice: 0,
                filter: 5,
                positions: vec![4101, 0, 64, 2048],
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(response.success);

        let (status, Json(response)) = handle_fetch_bitmap(
            Extension(store),
            Path(("db".to_string(), "general".to_string(), 0, 42)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let response = response.expect("body");
        assert_eq!(response.positions, vec![0, 64, 2048, 4101]);
        assert_eq!(response.count, 4);
        assert_eq!(response.filter, 5);
    }

    #[tokio::test]
    async fn test_store_handler_rejects_wide_filter() {
        let (backend, store) = setup(NodeConfig::default());

        let (status, Json(response)) = handle_store_bitmap(
            Extension(store),
            Json(StoreBitmapRequest {
                bitmap_id: 42,
                db: "db".to_string(),
                frame: "general".to_string(),
                slice: 0,
                filter: 1 << 40,
                positions: vec![1],
            }),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!response.success);
        assert_eq!(backend.row_count(&key()).await, 0);
    }
}
