//! Chunked Bitmap Storage Module
//!
//! Persists bitmaps into a wide-column table, one row per non-zero word.
//!
//! ## Core Concepts
//! - **Schema**: partition `(bitmap_id, db, frame, slice)`, clustering `(chunk_key, block_index)`.
//! - **Sparsity**: zero words are never written.
//! - **Count row**: a sentinel row under `COUNTERMASK` caches the population count.
//! - **Batching**: all rows of one `store` call commit as a single atomic batch.
//! - **Backend**: anything implementing `ColumnStore`; `MemoryColumnStore` ships in-process.

pub mod backend;
pub mod batch;
pub mod chunked;
pub mod handlers;
pub mod memory;
pub mod protocol;
pub mod schema;

#[cfg(test)]
mod tests;
