//! In-process column store.
//!
//! Partitions are kept in ordered maps, so scans come back in clustering
//! order. Batches are staged against a copy of the touched partitions and
//! swapped in under a single write lock, which makes them atomic with
//! respect to concurrent scans.

use super::backend::ColumnStore;
use super::schema::{BatchStatement, PartitionKey, RowWrite, StoredRow};
use crate::config::NodeConfig;

use anyhow::{Result, bail};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

type Partition = BTreeMap<(i64, i32), (i32, i64)>;

pub struct MemoryColumnStore {
    keyspace: String,
    partitions: RwLock<BTreeMap<PartitionKey, Partition>>,
    /// Fail the next batch once it has staged this many statements.
    fault_after: Mutex<Option<usize>>,
    batches_applied: AtomicUsize,
    closed: AtomicBool,
}

impl MemoryColumnStore {
    pub fn new(keyspace: &str) -> Self {
        Self {
            keyspace: keyspace.to_string(),
            partitions: RwLock::new(BTreeMap::new()),
            fault_after: Mutex::new(None),
            batches_applied: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Opens a session for the configured keyspace.
    ///
    /// Fails when no host or keyspace is configured, which the node treats as fatal.
    pub fn connect(config: &NodeConfig) -> Result<Self> {
        if config.backend_hosts.is_empty() {
            bail!("no backend hosts configured");
        }
        if config.keyspace.trim().is_empty() {
            bail!("no keyspace configured");
        }

        tracing::info!(
            "Opened column store session (keyspace={}, hosts={:?})",
            config.keyspace,
            config.backend_hosts
        );
        Ok(Self::new(&config.keyspace))
    }

    /// Makes the next batch fail after `statements` have been staged.
    pub fn inject_batch_fault(&self, statements: usize) {
        if let Ok(mut fault) = self.fault_after.lock() {
            *fault = Some(statements);
        }
    }

    pub fn batches_applied(&self) -> usize {
        self.batches_applied.load(Ordering::SeqCst)
    }

    /// Number of stored rows in a partition, sentinel included.
    pub async fn row_count(&self, partition: &PartitionKey) -> usize {
        self.partitions
            .read()
            .await
            .get(partition)
            .map(|rows| rows.len())
            .unwrap_or(0)
    }

    fn take_fault(&self) -> Option<usize> {
        self.fault_after.lock().ok().and_then(|mut fault| fault.take())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            bail!("column store session is closed");
        }
        Ok(())
    }
}

#[async_trait]
impl ColumnStore for MemoryColumnStore {
    async fn scan_partition(&self, partition: &PartitionKey) -> Result<Vec<StoredRow>> {
        self.ensure_open()?;

        let partitions = self.partitions.read().await;
        let rows = partitions
            .get(partition)
            .map(|rows| {
                rows.iter()
                    .map(|(&(chunk_key, block_index), &(filter, block))| StoredRow {
                        chunk_key,
                        block_index,
                        filter,
                        block,
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(rows)
    }

    async fn execute_batch(&self, statements: Vec<BatchStatement>) -> Result<()> {
        self.ensure_open()?;

        let fault = self.take_fault();
        let mut partitions = self.partitions.write().await;
        let mut staged: HashMap<PartitionKey, Partition> = HashMap::new();

        for (applied, statement) in statements.into_iter().enumerate() {
            if fault == Some(applied) {
                tracing::warn!("Injected batch fault after {} statements", applied);
                bail!("batch aborted after {} statements", applied);
            }

            match statement {
                BatchStatement::DeletePartition(partition) => {
                    staged.insert(partition, Partition::new());
                }
                BatchStatement::Insert(RowWrite { partition, row }) => {
                    let rows = staged
                        .entry(partition)
                        .or_insert_with_key(|key| partitions.get(key).cloned().unwrap_or_default());
                    rows.insert((row.chunk_key, row.block_index), (row.filter, row.block));
                }
            }
        }

        for (key, rows) in staged {
            if rows.is_empty() {
                partitions.remove(&key);
            } else {
                partitions.insert(key, rows);
            }
        }
        self.batches_applied.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::info!("Closed column store session (keyspace={})", self.keyspace);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(
        partition: &PartitionKey,
        chunk_key: i64,
        block_index: i32,
        block: i64,
    ) -> BatchStatement {
        BatchStatement::Insert(RowWrite {
            partition: partition.clone(),
            row: StoredRow {
                chunk_key,
                block_index,
                filter: 0,
                block,
            },
        })
    }

    #[tokio::test]
    async fn test_scan_returns_clustering_order() {
        let store = MemoryColumnStore::new("test");
        let key = PartitionKey::new(1, "db", "frame", 0);

        store
            .execute_batch(vec![
                write(&key, 5, 1, 10),
                write(&key, 0, 3, 11),
                write(&key, 5, 0, 12),
                write(&key, 0, 0, 13),
            ])
            .await
            .unwrap();

        let rows = store.scan_partition(&key).await.unwrap();
        let order: Vec<(i64, i32)> = rows.iter().map(|r| (r.chunk_key, r.block_index)).collect();
        assert_eq!(order, vec![(0, 0), (0, 3), (5, 0), (5, 1)]);
    }

    #[tokio::test]
    async fn test_faulted_batch_leaves_nothing_behind() {
        let store = MemoryColumnStore::new("test");
        let key = PartitionKey::new(1, "db", "frame", 0);

        store.inject_batch_fault(2);
        let result = store
            .execute_batch(vec![write(&key, 0, 0, 1), write(&key, 0, 1, 1), write(&key, 0, 2, 1)])
            .await;

        assert!(result.is_err());
        assert_eq!(store.row_count(&key).await, 0);
        assert_eq!(store.batches_applied(), 0);
    }

    #[tokio::test]
    async fn test_partition_delete_replaces_earlier_rows() {
        let store = MemoryColumnStore::new("test");
        let key = PartitionKey::new(1, "db", "frame", 0);
        let other = PartitionKey::new(2, "db", "frame", 0);

        store
            .execute_batch(vec![write(&key, 0, 0, 1), write(&key, 7, 3, 1), write(&other, 0, 0, 1)])
            .await
            .unwrap();
        store
            .execute_batch(vec![
                BatchStatement::DeletePartition(key.clone()),
                write(&key, 0, 1, 2),
            ])
            .await
            .unwrap();

        let rows = store.scan_partition(&key).await.unwrap();
        let order: Vec<(i64, i32, i64)> = rows
            .iter()
            .map(|r| (r.chunk_key, r.block_index, r.block))
            .collect();
        assert_eq!(order, vec![(0, 1, 2)]);
        assert_eq!(store.row_count(&other).await, 1);
    }

    #[tokio::test]
    async fn test_connect_requires_hosts() {
        let config = NodeConfig {
            backend_hosts: vec![],
            ..NodeConfig::default()
        };
        assert!(MemoryColumnStore::connect(&config).is_err());

        let store = MemoryColumnStore::connect(&NodeConfig::default()).unwrap();
        assert_eq!(store.keyspace, "hotbox");
    }

    #[tokio::test]
    async fn test_closed_store_rejects_calls() {
        let store = MemoryColumnStore::new("test");
        store.close().await;
        store.close().await;

        let key = PartitionKey::new(1, "db", "frame", 0);
        assert!(store.scan_partition(&key).await.is_err());
        assert!(store.execute_batch(vec![]).await.is_err());
    }
}
