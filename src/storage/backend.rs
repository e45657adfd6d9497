use anyhow::Result;
use async_trait::async_trait;

use super::schema::{BatchStatement, PartitionKey, StoredRow};

/// The wide-column backend the bitmap store persists into.
///
/// Implementations must return partition rows in clustering order
/// (`chunk_key`, then `block_index`, ascending) and apply a batch atomically:
/// either every statement of the batch becomes visible or none does.
#[async_trait]
pub trait ColumnStore: Send + Sync {
    /// All rows of one partition, in clustering order.
    async fn scan_partition(&self, partition: &PartitionKey) -> Result<Vec<StoredRow>>;

    /// Applies the statements, in order, as one logged batch.
    async fn execute_batch(&self, statements: Vec<BatchStatement>) -> Result<()>;

    /// Releases the session.
    async fn close(&self);
}
