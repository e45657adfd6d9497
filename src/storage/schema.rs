//! Row layout of the `bitmap` table.
//!
//! ```text
//! PRIMARY KEY ((bitmap_id, db, frame, slice), chunk_key, block_index)
//! ```
//!
//! One row per non-zero word, plus one sentinel row per bitmap whose `block`
//! holds the cached population count.
//!
//! A store replaces the whole partition: the batch opens with a partition
//! delete, followed by the inserts. On a CQL cluster this is one logged batch
//! where the `DELETE ... USING TIMESTAMP t` precedes inserts written at `t + 1`.

use serde::{Deserialize, Serialize};

/// Clustering key reserved for the count row. Real chunk keys are never negative.
pub const COUNTERMASK: i64 = -1;

pub const CREATE_KEYSPACE: &str = "CREATE KEYSPACE IF NOT EXISTS {keyspace} WITH replication = { 'class': 'SimpleStrategy', 'replication_factor': 1 } AND durable_writes = true;";

pub const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS bitmap ( bitmap_id bigint, db varchar, frame varchar, slice int, filter int, chunk_key bigint, block_index int, block bigint, PRIMARY KEY ((bitmap_id, db, frame, slice), chunk_key, block_index) );";

/// Schema statements for `keyspace`, in execution order.
pub fn schema_statements(keyspace: &str) -> Vec<String> {
    vec![
        CREATE_KEYSPACE.replace("{keyspace}", keyspace),
        format!("USE {};", keyspace),
        CREATE_TABLE.to_string(),
    ]
}

/// Partition key of one bitmap.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionKey {
    pub bitmap_id: i64,
    pub db: String,
    pub frame: String,
    pub slice: i32,
}

impl PartitionKey {
    pub fn new(bitmap_id: i64, db: impl Into<String>, frame: impl Into<String>, slice: i32) -> Self {
        Self {
            bitmap_id,
            db: db.into(),
            frame: frame.into(),
            slice,
        }
    }
}

/// Clustering and value columns of one stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredRow {
    pub chunk_key: i64,
    pub block_index: i32,
    pub filter: i32,
    pub block: i64,
}

impl StoredRow {
    pub fn is_sentinel(&self) -> bool {
        self.chunk_key == COUNTERMASK
    }
}

/// A single insert queued in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowWrite {
    pub partition: PartitionKey,
    pub row: StoredRow,
}

/// One statement of a logged batch, applied in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchStatement {
    /// Drops every row of the partition written before this batch.
    DeletePartition(PartitionKey),
    Insert(RowWrite),
}

impl From<RowWrite> for BatchStatement {
    fn from(write: RowWrite) -> Self {
        BatchStatement::Insert(write)
    }
}
