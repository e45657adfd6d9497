use std::time::Duration;

use thiserror::Error;

use crate::rpc::types::RequestId;

/// Errors surfaced by the chunked bitmap store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backend rejected or failed a query or batch.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),

    /// A backend call did not complete within the session timeout.
    #[error("backend call '{operation}' timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// Rows of one bitmap carried different filter values.
    #[error("filter mismatch on chunk {chunk_key}: expected {expected}, found {found}")]
    FilterMismatch {
        chunk_key: i64,
        expected: i32,
        found: i32,
    },

    /// The filter does not fit the 32-bit `filter` column.
    #[error("filter {0} does not fit the 32-bit filter column")]
    FilterOutOfRange(u64),

    /// A row that cannot belong to any chunk.
    #[error("malformed row: chunk_key={chunk_key} block_index={block_index}")]
    MalformedRow { chunk_key: i64, block_index: i32 },

    #[error("storage is closed")]
    Closed,
}

/// Errors returned by the correlation table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HoldError {
    /// No reply arrived within the wait window.
    #[error("request {id} timed out after {after:?}")]
    Timeout { id: RequestId, after: Duration },

    /// A waiter is already registered for this id.
    #[error("request {0} already has a pending waiter")]
    Duplicate(RequestId),

    /// The waiter's sender was dropped without a value.
    #[error("request {0} was abandoned")]
    Dropped(RequestId),
}
